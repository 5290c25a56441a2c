pub mod persistence;
pub mod routes;

pub use persistence::PersistenceRefresher;
pub use routes::RouteRefresher;

use crate::context::AppContext;
use crate::model::{LoadedModule, ModuleName, ModuleState, Transition};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A component that reacts to reloaded modules.
///
/// Two-phase contract: `process` marks (and must be idempotent), `execute`
/// applies. Listeners receive typed transitions: `Discovered` for a module
/// the built-in mechanism does not know, `Promoted` when built-in discovery
/// has taken ownership and the listener must drop the module from any
/// pending set it tracks.
pub trait ReloadListener: Send + Sync {
    fn name(&self) -> &str;

    /// Called once at startup with the live application context; a listener
    /// may install itself (or its collaborators) as beans here.
    fn register(&self, _ctx: &AppContext) {}

    /// Fast predicate with no side effects: is this module within the
    /// listener's domain?
    fn supports(&self, module: &LoadedModule) -> bool;

    /// Mark phase. Idempotent: a repeated call with the same arguments
    /// leaves the listener's state unchanged from a single call.
    fn process(&self, module: &Arc<LoadedModule>, transition: Transition);

    /// Apply phase. Returns whether any change was applied; the result is
    /// used for logging only, never for control flow.
    fn execute(&self) -> anyhow::Result<bool>;

    /// Whether the listener has fully applied this module. Gates promotion;
    /// listeners without per-module apply tracking accept the default.
    fn applied(&self, _module: &ModuleName) -> bool {
        true
    }
}

struct Tracked {
    module: Arc<LoadedModule>,
    state: ModuleState,
}

/// Owner of the canonical per-module lifecycle state and of listener
/// dispatch. Listeners may keep derived views, but state transitions flow
/// from here only.
#[derive(Default)]
pub struct ReloadBroker {
    listeners: Vec<Arc<dyn ReloadListener>>,
    tracked: Mutex<HashMap<ModuleName, Tracked>>,
}

impl ReloadBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration order is dispatch order.
    pub fn add_listener(&mut self, listener: Arc<dyn ReloadListener>) {
        log::debug!("registered reload listener '{}'", listener.name());
        self.listeners.push(listener);
    }

    /// Call each listener's `register` with the live context. Once, at
    /// startup.
    pub fn install(&self, ctx: &AppContext) {
        for listener in &self.listeners {
            listener.register(ctx);
        }
    }

    pub fn state(&self, name: &str) -> Option<ModuleState> {
        self.tracked.lock().get(name).map(|t| t.state)
    }

    /// Dispatch a transition for one module: `supports` on every listener in
    /// registration order, then `process` and `execute` for each supporter.
    ///
    /// One listener failing to apply never prevents the rest from running;
    /// the failure is logged against that listener and dispatch continues.
    /// Returns whether any listener applied a change.
    pub fn dispatch(&self, module: &Arc<LoadedModule>, transition: Transition) -> bool {
        let name = module.name().clone();
        {
            // A recreated or recompiled module restarts at New, even if it
            // was Promoted before.
            let state = match transition {
                Transition::Discovered => ModuleState::New,
                Transition::Promoted => ModuleState::Promoted,
            };
            self.tracked.lock().insert(
                name.clone(),
                Tracked {
                    module: module.clone(),
                    state,
                },
            );
        }

        let mut any_applied = false;
        for listener in &self.listeners {
            if !listener.supports(module) {
                continue;
            }
            listener.process(module, transition);
            match listener.execute() {
                Ok(applied) => {
                    any_applied |= applied;
                    log::debug!(
                        "listener '{}' processed '{}' (applied: {})",
                        listener.name(),
                        name,
                        applied
                    );
                }
                Err(e) => {
                    log::error!("reload listener '{}' failed: {:#}", listener.name(), e);
                }
            }
        }

        self.sweep_settled();
        any_applied
    }

    /// Built-in discovery claims a module.
    pub fn promote(&self, module: &Arc<LoadedModule>) -> bool {
        self.dispatch(module, Transition::Promoted)
    }

    /// Promote every still-New module once all of its supporting listeners
    /// report it applied. A module no listener claims is promoted right
    /// after its initial load.
    fn sweep_settled(&self) {
        let mut tracked = self.tracked.lock();
        for (name, t) in tracked.iter_mut() {
            if t.state != ModuleState::New {
                continue;
            }
            let settled = self
                .listeners
                .iter()
                .filter(|l| l.supports(&t.module))
                .all(|l| l.applied(name));
            if settled {
                log::debug!("module '{}' promoted", name);
                t.state = ModuleState::Promoted;
            }
        }
    }
}
