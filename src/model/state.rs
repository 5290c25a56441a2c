/// Canonical lifecycle state of a reloaded module, owned by the reload
/// broker. A module starts `New` when the classifier first sees its artifact
/// and becomes `Promoted` exactly once, either when every interested listener
/// has applied it or when built-in discovery claims it. Deleting and
/// recreating the artifact restarts the module at `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    New,
    Promoted,
}

/// State transition delivered to reload listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A freshly loaded module the built-in mechanism does not know about.
    Discovered,
    /// Built-in discovery has taken ownership; listeners drop the module
    /// from any pending set they track.
    Promoted,
}
