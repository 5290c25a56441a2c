use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Dotted module name derived from an artifact path, e.g. `api.orders`.
pub type ModuleName = String;

/// Extension the build pipeline gives compiled module artifacts.
pub const ARTIFACT_EXT: &str = "module";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One HTTP entry point declared by a module: the route plus the name of the
/// handler bean and the operation to invoke on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub method: HttpMethod,
    pub path: String,
    pub handler: String,
    pub operation: String,
}

/// Contents of a compiled module artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
    #[serde(default)]
    pub entities: Vec<String>,
}

/// One parsed version of a module artifact, stamped with the artifact's
/// modification time at load.
#[derive(Debug, Clone)]
pub struct ModuleImage {
    pub manifest: ModuleManifest,
    pub version: SystemTime,
}

/// A module resolved through a watched root's loader.
///
/// Identity is per (root, name): repeated loads of the same name through the
/// same root hand back the same `Arc<LoadedModule>`. New artifact content
/// replaces the inner image, never the identity, so everything holding the
/// module sees the new content on its next read.
pub struct LoadedModule {
    name: ModuleName,
    rel_path: PathBuf,
    artifact_path: PathBuf,
    image: ArcSwap<ModuleImage>,
}

impl LoadedModule {
    pub fn new(
        name: ModuleName,
        rel_path: PathBuf,
        artifact_path: PathBuf,
        image: ModuleImage,
    ) -> Self {
        Self {
            name,
            rel_path,
            artifact_path,
            image: ArcSwap::from_pointee(image),
        }
    }

    pub fn name(&self) -> &ModuleName {
        &self.name
    }

    pub fn rel_path(&self) -> &Path {
        &self.rel_path
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn image(&self) -> Arc<ModuleImage> {
        self.image.load_full()
    }

    pub fn swap_image(&self, image: ModuleImage) {
        self.image.store(Arc::new(image));
    }

    /// Web-facing module: declares at least one HTTP entry point.
    pub fn is_controller(&self) -> bool {
        !self.image().manifest.endpoints.is_empty()
    }

    pub fn entities(&self) -> Vec<String> {
        self.image().manifest.entities.clone()
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("rel_path", &self.rel_path)
            .finish()
    }
}

/// Derive the dotted module name from a path relative to its watched root.
///
/// `com/acme/orders.module` becomes `com.acme.orders`. Returns `None` for an
/// empty relative path or path components that are not valid UTF-8.
pub fn module_name_from_rel(rel: &Path) -> Option<ModuleName> {
    let mut parts: Vec<String> = Vec::new();
    for component in rel.components() {
        let part = component.as_os_str().to_str()?;
        parts.push(part.to_string());
    }
    let last = parts.pop()?;
    let stem = Path::new(&last).file_stem()?.to_str()?.to_string();
    if stem.is_empty() {
        return None;
    }
    parts.push(stem);
    Some(parts.join("."))
}

/// Inverse of [`module_name_from_rel`]: the artifact path for a module name,
/// relative to its root.
pub fn rel_path_for(name: &str) -> PathBuf {
    let mut path: PathBuf = name.split('.').collect();
    path.set_extension(ARTIFACT_EXT);
    path
}
