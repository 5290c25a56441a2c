use crate::engine::loader::{read_image, LoadError};
use crate::model::LoadedModule;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Handle to a reloadable module, keyed by loader identity and the
/// artifact's path relative to its root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SwapHandle {
    loader: usize,
    rel_path: PathBuf,
}

/// The hot-swap registry: the mechanism that lets everything already holding
/// a loaded module see new artifact content without a new identity.
///
/// `reloadable` answers whether a handle exists for an artifact (it does
/// once the module has been loaded before); `fire` delivers a reload with a
/// version stamp to that handle.
pub trait SwapRegistry: Send + Sync {
    fn reloadable(&self, loader: usize, rel_path: &Path) -> Option<SwapHandle>;
    fn track(&self, loader: usize, module: &Arc<LoadedModule>);
    fn fire(&self, handle: &SwapHandle, version: SystemTime) -> Result<(), LoadError>;
}

/// In-process registry: firing re-reads the artifact and swaps the module's
/// image in place, stamped with the supplied version.
#[derive(Default)]
pub struct VersionSwapRegistry {
    entries: Mutex<HashMap<SwapHandle, Arc<LoadedModule>>>,
}

impl VersionSwapRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SwapRegistry for VersionSwapRegistry {
    fn reloadable(&self, loader: usize, rel_path: &Path) -> Option<SwapHandle> {
        let handle = SwapHandle {
            loader,
            rel_path: rel_path.to_path_buf(),
        };
        self.entries.lock().contains_key(&handle).then_some(handle)
    }

    fn track(&self, loader: usize, module: &Arc<LoadedModule>) {
        let handle = SwapHandle {
            loader,
            rel_path: module.rel_path().to_path_buf(),
        };
        self.entries.lock().insert(handle, module.clone());
    }

    fn fire(&self, handle: &SwapHandle, version: SystemTime) -> Result<(), LoadError> {
        let Some(module) = self.entries.lock().get(handle).cloned() else {
            log::debug!("swap fired for untracked handle {:?}", handle);
            return Ok(());
        };
        let mut image = read_image(module.artifact_path())?;
        image.version = version;
        module.swap_image(image);
        log::info!("hot-swapped module '{}'", module.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModuleImage, ModuleManifest};
    use std::fs;

    #[test]
    fn test_reloadable_only_after_track() {
        let registry = VersionSwapRegistry::new();
        assert!(registry.reloadable(0, Path::new("a.module")).is_none());

        let module = Arc::new(LoadedModule::new(
            "a".to_string(),
            PathBuf::from("a.module"),
            PathBuf::from("/out/a.module"),
            ModuleImage {
                manifest: ModuleManifest::default(),
                version: SystemTime::UNIX_EPOCH,
            },
        ));
        registry.track(0, &module);
        assert!(registry.reloadable(0, Path::new("a.module")).is_some());
        // Another loader's identity does not collide.
        assert!(registry.reloadable(1, Path::new("a.module")).is_none());
    }

    #[test]
    fn test_fire_rereads_artifact_and_stamps_version() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("a.module");
        fs::write(&artifact, "{}").unwrap();

        let registry = VersionSwapRegistry::new();
        let module = Arc::new(LoadedModule::new(
            "a".to_string(),
            PathBuf::from("a.module"),
            artifact.clone(),
            read_image(&artifact).unwrap(),
        ));
        registry.track(7, &module);

        fs::write(&artifact, r#"{"entities": ["Widget"]}"#).unwrap();
        let handle = registry.reloadable(7, Path::new("a.module")).unwrap();
        let stamp = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(123);
        registry.fire(&handle, stamp).unwrap();

        assert_eq!(module.entities(), vec!["Widget".to_string()]);
        assert_eq!(module.image().version, stamp);
    }

    #[test]
    fn test_fire_propagates_malformed_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("a.module");
        fs::write(&artifact, "{}").unwrap();

        let registry = VersionSwapRegistry::new();
        let module = Arc::new(LoadedModule::new(
            "a".to_string(),
            PathBuf::from("a.module"),
            artifact.clone(),
            read_image(&artifact).unwrap(),
        ));
        registry.track(0, &module);

        fs::write(&artifact, "garbage").unwrap();
        let handle = registry.reloadable(0, Path::new("a.module")).unwrap();
        let err = registry.fire(&handle, SystemTime::now()).unwrap_err();
        assert!(matches!(err, LoadError::Manifest { .. }));
        // The previous image stays current.
        assert!(module.entities().is_empty());
    }
}
