use crate::engine::roots::PendingModule;
use crate::engine::swap::SwapRegistry;
use crate::model::{rel_path_for, LoadedModule, ModuleImage, ModuleName};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed module manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse an artifact into a module image, stamped with the artifact's
/// modification time.
pub(crate) fn read_image(path: &Path) -> Result<ModuleImage, LoadError> {
    let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest = serde_json::from_str(&raw).map_err(|source| LoadError::Manifest {
        path: path.to_path_buf(),
        source,
    })?;
    let version = fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or_else(|_| SystemTime::now());
    Ok(ModuleImage { manifest, version })
}

/// Loader scoped to one watched root.
///
/// Resolution is first-load-wins per name: the first resolve of a name
/// creates the module's identity and every later resolve hands back the same
/// `Arc`, so two loads can never produce two identities for one name. New
/// artifact content reaches an existing identity only through the hot-swap
/// registry.
pub struct ModuleLoader {
    id: usize,
    root: PathBuf,
    cache: RwLock<HashMap<ModuleName, Arc<LoadedModule>>>,
}

impl ModuleLoader {
    pub fn new(id: usize, root: PathBuf) -> Self {
        Self {
            id,
            root,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Identity of this loader within the process, used to key the hot-swap
    /// registry.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<LoadedModule>, LoadError> {
        if let Some(module) = self.cache.read().get(name) {
            return Ok(module.clone());
        }
        let rel = rel_path_for(name);
        let path = self.root.join(&rel);
        let image = read_image(&path)?;

        let mut cache = self.cache.write();
        let module = cache
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(LoadedModule::new(name.to_string(), rel, path, image))
            })
            .clone();
        Ok(module)
    }

    pub fn cached(&self, name: &str) -> Option<Arc<LoadedModule>> {
        self.cache.read().get(name).cloned()
    }
}

/// The loading and instrumentation bridge: resolves a pending module through
/// its root's loader and keeps the hot-swap registry in the loop.
///
/// For a module the registry already tracks, firing its handle with a fresh
/// version stamp makes everything holding the module see the new content.
/// A genuinely first-time module needs no signal; it is simply available to
/// new lookups. It is still tracked, so the *next* reload of the same
/// artifact does fire.
pub struct LoaderBridge {
    swap: Arc<dyn SwapRegistry>,
}

impl LoaderBridge {
    pub fn new(swap: Arc<dyn SwapRegistry>) -> Self {
        Self { swap }
    }

    pub fn load(&self, pending: &PendingModule) -> Result<Arc<LoadedModule>, LoadError> {
        let loader = pending.root.loader();
        let module = loader.resolve(&pending.name)?;
        match self.swap.reloadable(loader.id(), module.rel_path()) {
            Some(handle) => {
                let version = fs::metadata(&pending.artifact)
                    .and_then(|m| m.modified())
                    .unwrap_or_else(|_| SystemTime::now());
                self.swap.fire(&handle, version)?;
            }
            None => self.swap.track(loader.id(), &module),
        }
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::swap::VersionSwapRegistry;
    use crate::engine::roots::RootRegistry;
    use crate::model::{ChangeEvent, ChangeKind};
    use std::io::Write;

    fn write_artifact(dir: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_resolve_returns_identical_handles() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), "com/x/Foo.module", "{}");
        let loader = ModuleLoader::new(0, dir.path().to_path_buf());

        let first = loader.resolve("com.x.Foo").unwrap();
        let second = loader.resolve("com.x.Foo").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_resolve_missing_artifact_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ModuleLoader::new(0, dir.path().to_path_buf());
        let err = loader.resolve("nope").unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_resolve_malformed_manifest_is_manifest_error() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), "bad.module", "not json");
        let loader = ModuleLoader::new(0, dir.path().to_path_buf());
        let err = loader.resolve("bad").unwrap_err();
        assert!(matches!(err, LoadError::Manifest { .. }));
    }

    #[test]
    fn test_bridge_fires_swap_only_for_known_modules() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path(), "orders.module", r#"{"entities": ["Order"]}"#);
        let registry = RootRegistry::new([dir.path().to_path_buf()]);
        let swap = Arc::new(VersionSwapRegistry::new());
        let bridge = LoaderBridge::new(swap.clone());

        let event = ChangeEvent::from_path(&artifact, ChangeKind::Create).unwrap();
        let pending = registry.classify(&event).unwrap();

        // First sighting: tracked, not fired.
        let module = bridge.load(&pending).unwrap();
        assert_eq!(module.entities(), vec!["Order".to_string()]);
        assert!(swap
            .reloadable(pending.root.loader().id(), module.rel_path())
            .is_some());

        // Recompile with new content: same identity, swapped image.
        write_artifact(dir.path(), "orders.module", r#"{"entities": ["Order", "Line"]}"#);
        let again = bridge.load(&pending).unwrap();
        assert!(Arc::ptr_eq(&module, &again));
        assert_eq!(
            again.entities(),
            vec!["Order".to_string(), "Line".to_string()]
        );
    }
}
