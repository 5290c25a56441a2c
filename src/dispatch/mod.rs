use crate::model::{EndpointSpec, HttpMethod, LoadedModule, ModuleName};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Key of one live route: HTTP method plus path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub method: HttpMethod,
    pub pattern: String,
}

impl RouteKey {
    pub fn new(method: HttpMethod, pattern: impl Into<String>) -> Self {
        Self {
            method,
            pattern: pattern.into(),
        }
    }
}

/// What a route resolves to: the owning module, the operation name on the
/// handler bean, and the bean itself.
#[derive(Clone)]
pub struct RouteEntry {
    pub module: ModuleName,
    pub operation: String,
    pub handler: Arc<dyn RequestHandler>,
}

pub type RouteSnapshot = Arc<HashMap<RouteKey, RouteEntry>>;

/// The live route table, as an explicit abstraction: the rest of the system
/// talks to this trait and never reaches into framework internals.
///
/// Implementations must make `clear` + rebuilds appear atomic to readers; a
/// request racing a rebuild sees either the old or the new table, never a
/// half-empty one.
pub trait RouteTable: Send + Sync {
    fn insert(&self, key: RouteKey, entry: RouteEntry);
    fn clear(&self);
    fn snapshot(&self) -> RouteSnapshot;
    /// Replace the whole table in a single publication step.
    fn replace_all(&self, entries: HashMap<RouteKey, RouteEntry>);
}

/// Route table backed by an immutable snapshot behind an atomic pointer.
/// Readers take the snapshot once per request; writers build a new map and
/// swap it in.
pub struct SnapshotRouteTable {
    inner: ArcSwap<HashMap<RouteKey, RouteEntry>>,
}

impl SnapshotRouteTable {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(HashMap::new()),
        }
    }
}

impl Default for SnapshotRouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable for SnapshotRouteTable {
    fn insert(&self, key: RouteKey, entry: RouteEntry) {
        let current = self.inner.load();
        if current.contains_key(&key) {
            log::warn!(
                "route {} {} replaced by module '{}'",
                key.method,
                key.pattern,
                entry.module
            );
        }
        let mut next: HashMap<RouteKey, RouteEntry> = (**current).clone();
        next.insert(key, entry);
        self.inner.store(Arc::new(next));
    }

    fn clear(&self) {
        self.inner.store(Arc::new(HashMap::new()));
    }

    fn snapshot(&self) -> RouteSnapshot {
        self.inner.load_full()
    }

    fn replace_all(&self, entries: HashMap<RouteKey, RouteEntry>) {
        self.inner.store(Arc::new(entries));
    }
}

/// Derive the route set a module declares. This is the single derivation
/// used both by built-in discovery and by the reload path, so the two agree
/// on what counts as an HTTP entry point.
///
/// Endpoints with a pattern that does not start with `/` are not recognized
/// and are skipped with a warning.
pub fn derive_endpoints(module: &LoadedModule) -> Vec<(RouteKey, EndpointSpec)> {
    let image = module.image();
    let mut routes = Vec::new();
    for spec in &image.manifest.endpoints {
        if !spec.path.starts_with('/') {
            log::warn!(
                "module '{}' endpoint '{}' is not an absolute path, skipping",
                module.name(),
                spec.path
            );
            continue;
        }
        routes.push((RouteKey::new(spec.method, spec.path.clone()), spec.clone()));
    }
    routes
}

/// Match a path against a pattern with `{param}` segments.
/// Returns captured parameters on success.
pub fn match_pattern(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_segs: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let path_segs: Vec<&str> = path.trim_matches('/').split('/').collect();
    if pattern_segs.len() != path_segs.len() {
        return None;
    }
    let mut params = HashMap::new();
    for (p, s) in pattern_segs.iter().zip(path_segs.iter()) {
        if let Some(name) = p.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            if s.is_empty() {
                return None;
            }
            params.insert(name.to_string(), (*s).to_string());
        } else if p != s {
            return None;
        }
    }
    Some(params)
}

/// Look a request up in a snapshot: exact pattern first, then `{param}`
/// patterns in deterministic order.
pub fn lookup(
    snapshot: &RouteSnapshot,
    method: HttpMethod,
    path: &str,
) -> Option<(RouteEntry, HashMap<String, String>)> {
    let exact = RouteKey::new(method, path);
    if let Some(entry) = snapshot.get(&exact) {
        return Some((entry.clone(), HashMap::new()));
    }
    let mut candidates: Vec<(&RouteKey, &RouteEntry)> = snapshot
        .iter()
        .filter(|(key, _)| key.method == method && key.pattern.contains('{'))
        .collect();
    candidates.sort_by(|a, b| a.0.pattern.cmp(&b.0.pattern));
    for (key, entry) in candidates {
        if let Some(params) = match_pattern(&key.pattern, path) {
            return Some((entry.clone(), params));
        }
    }
    None
}

/// A request as seen by handler beans: enough of the HTTP request to act on,
/// decoupled from the web framework's types.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub method: HttpMethod,
    pub path: String,
    pub params: HashMap<String, String>,
    pub query: Option<String>,
    pub body: Value,
}

#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub status: u16,
    pub body: Value,
}

impl HandlerResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

/// A handler bean resolved from the application context. The `operation`
/// selects which of the bean's entry points a route maps to.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn call(&self, operation: &str, request: HandlerRequest)
        -> anyhow::Result<HandlerResponse>;
}
