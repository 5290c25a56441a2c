use std::path::{Path, PathBuf};

/// Simplified filesystem event kinds the reload pipeline acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Create,
    Modify,
    Remove,
}

/// A filesystem event as delivered to the classifier: the parent directory,
/// the file name within it, and what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub parent: PathBuf,
    pub file_name: String,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(parent: impl Into<PathBuf>, file_name: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            parent: parent.into(),
            file_name: file_name.into(),
            kind,
        }
    }

    /// Split a full path into parent + file name. Returns `None` for paths
    /// without both components.
    pub fn from_path(path: &Path, kind: ChangeKind) -> Option<Self> {
        let parent = path.parent()?;
        let file_name = path.file_name()?.to_str()?;
        Some(Self::new(parent, file_name, kind))
    }

    pub fn path(&self) -> PathBuf {
        self.parent.join(&self.file_name)
    }
}
