use crate::model::{
    module_name_from_rel, ChangeEvent, ChangeKind, ModuleName, ARTIFACT_EXT,
};
use crate::engine::loader::ModuleLoader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One watched compiled-output directory and the loader dedicated to it.
/// Loaders are per-root, not per-module, so module identity stays stable
/// across repeated reloads of the same root.
pub struct WatchedRoot {
    root: PathBuf,
    loader: Arc<ModuleLoader>,
}

impl WatchedRoot {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }
}

/// A freshly compiled module the classifier recognized. Starts its lifecycle
/// in the `New` state with the reload broker.
#[derive(Clone)]
pub struct PendingModule {
    pub name: ModuleName,
    pub root: Arc<WatchedRoot>,
    pub artifact: PathBuf,
}

/// Registry of watched roots. Built once at engine startup and immutable
/// afterwards, so the serving and reload paths can read it without locks.
pub struct RootRegistry {
    roots: Vec<Arc<WatchedRoot>>,
}

impl RootRegistry {
    pub fn new<I>(paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let roots = paths
            .into_iter()
            .enumerate()
            .map(|(id, root)| {
                Arc::new(WatchedRoot {
                    loader: Arc::new(ModuleLoader::new(id, root.clone())),
                    root,
                })
            })
            .collect();
        Self { roots }
    }

    pub fn roots(&self) -> &[Arc<WatchedRoot>] {
        &self.roots
    }

    /// Decide whether a filesystem event names a newly compiled module, and
    /// if so derive its dotted name from the path relative to the owning
    /// root.
    ///
    /// Only `Create` events for files with the artifact extension classify;
    /// modifications to known artifacts are the hot-swap registry's job once
    /// a module has been loaded. The owning root is the one whose path is
    /// the longest directory prefix of the event's parent, ties broken by
    /// registration order. An event matching no root is logged and ignored:
    /// watch configuration may be wider than the set of interesting roots.
    pub fn classify(&self, event: &ChangeEvent) -> Option<PendingModule> {
        if event.kind != ChangeKind::Create {
            return None;
        }
        if Path::new(&event.file_name).extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXT) {
            return None;
        }

        let mut best: Option<(&Arc<WatchedRoot>, usize)> = None;
        for root in &self.roots {
            if event.parent.starts_with(root.root()) {
                let depth = root.root().components().count();
                // Strictly greater keeps the first-registered root on ties.
                if best.map(|(_, d)| depth > d).unwrap_or(true) {
                    best = Some((root, depth));
                }
            }
        }
        let Some((root, _)) = best else {
            log::warn!(
                "artifact event under {} matches no watched root, ignoring",
                event.parent.display()
            );
            return None;
        };

        let rel = match event.parent.strip_prefix(root.root()) {
            Ok(rel) => rel.join(&event.file_name),
            Err(_) => return None,
        };
        let Some(name) = module_name_from_rel(&rel) else {
            log::debug!("ignoring artifact with empty relative path: {}", rel.display());
            return None;
        };

        Some(PendingModule {
            name,
            root: root.clone(),
            artifact: event.path(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(paths: &[&str]) -> RootRegistry {
        RootRegistry::new(paths.iter().map(PathBuf::from))
    }

    fn create(parent: &str, file: &str) -> ChangeEvent {
        ChangeEvent::new(parent, file, ChangeKind::Create)
    }

    #[test]
    fn test_classify_derives_dotted_name() {
        let reg = registry(&["/out/classes"]);
        let pending = reg
            .classify(&create("/out/classes/com/x", "Foo.module"))
            .unwrap();
        assert_eq!(pending.name, "com.x.Foo");
        assert_eq!(
            pending.artifact,
            PathBuf::from("/out/classes/com/x/Foo.module")
        );
    }

    #[test]
    fn test_classify_ignores_modify_and_remove() {
        let reg = registry(&["/out/classes"]);
        for kind in [ChangeKind::Modify, ChangeKind::Remove] {
            let ev = ChangeEvent::new("/out/classes", "Foo.module", kind);
            assert!(reg.classify(&ev).is_none());
        }
    }

    #[test]
    fn test_classify_ignores_other_extensions() {
        let reg = registry(&["/out/classes"]);
        assert!(reg.classify(&create("/out/classes", "Foo.txt")).is_none());
        assert!(reg.classify(&create("/out/classes", "Foo")).is_none());
    }

    #[test]
    fn test_classify_ignores_unmatched_root() {
        let reg = registry(&["/out/classes"]);
        assert!(reg.classify(&create("/elsewhere", "Foo.module")).is_none());
    }

    #[test]
    fn test_classify_picks_longest_prefix() {
        let reg = registry(&["/out", "/out/classes"]);
        let pending = reg.classify(&create("/out/classes", "Foo.module")).unwrap();
        assert!(pending.root.root().ends_with("classes"));
        assert_eq!(pending.name, "Foo");
    }

    #[test]
    fn test_classify_tie_keeps_registration_order() {
        let reg = registry(&["/out/classes", "/out/classes"]);
        let pending = reg.classify(&create("/out/classes", "Foo.module")).unwrap();
        assert!(Arc::ptr_eq(&pending.root, &reg.roots()[0]));
    }

    #[test]
    fn test_classify_rejects_empty_relative_name() {
        let reg = registry(&["/out/classes"]);
        assert!(reg.classify(&create("/out/classes", ".module")).is_none());
    }
}
