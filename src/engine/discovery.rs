use crate::context::AppContext;
use crate::dispatch::{derive_endpoints, RouteEntry, RouteKey, RouteTable};
use crate::engine::loader::LoaderBridge;
use crate::engine::roots::{PendingModule, RootRegistry};
use crate::model::{module_name_from_rel, LoadedModule, ARTIFACT_EXT};
use crate::persist::PersistenceHandle;
use crate::reload::ReloadBroker;
use itertools::Itertools;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The built-in mapping discovery: the "normal" mechanism that owns modules
/// once it has seen them. It scans every watched root, registers endpoints
/// into the static route table and entities into the persistence unit, then
/// promotes each claimed module so the reload listeners release it.
pub struct BuiltinDiscovery {
    roots: Arc<RootRegistry>,
    bridge: Arc<LoaderBridge>,
    context: Arc<AppContext>,
    table: Arc<dyn RouteTable>,
    persistence: Arc<PersistenceHandle>,
    broker: Arc<ReloadBroker>,
}

#[derive(Debug, Default, PartialEq)]
pub struct DiscoveryReport {
    pub modules: usize,
    pub routes: usize,
    pub entities: usize,
}

impl BuiltinDiscovery {
    pub fn new(
        roots: Arc<RootRegistry>,
        bridge: Arc<LoaderBridge>,
        context: Arc<AppContext>,
        table: Arc<dyn RouteTable>,
        persistence: Arc<PersistenceHandle>,
        broker: Arc<ReloadBroker>,
    ) -> Self {
        Self {
            roots,
            bridge,
            context,
            table,
            persistence,
            broker,
        }
    }

    /// Run a discovery pass. Per-module load failures are logged and
    /// skipped; a persistence rebuild failure propagates.
    pub fn scan(&self) -> anyhow::Result<DiscoveryReport> {
        let mut routes: HashMap<RouteKey, RouteEntry> = HashMap::new();
        let mut entities: BTreeSet<String> = BTreeSet::new();
        let mut claimed: Vec<Arc<LoadedModule>> = Vec::new();

        for root in self.roots.roots() {
            let mut artifacts = Vec::new();
            if let Err(e) = collect_artifacts(root.root(), &mut artifacts) {
                log::warn!(
                    "skipping unreadable watched root {}: {}",
                    root.root().display(),
                    e
                );
                continue;
            }
            artifacts.sort();

            for artifact in artifacts {
                let Ok(rel) = artifact.strip_prefix(root.root()) else {
                    continue;
                };
                let Some(name) = module_name_from_rel(rel) else {
                    continue;
                };
                let pending = PendingModule {
                    name: name.clone(),
                    root: root.clone(),
                    artifact: artifact.clone(),
                };
                let module = match self.bridge.load(&pending) {
                    Ok(module) => module,
                    Err(e) => {
                        log::error!("discovery failed to load module '{}': {}", name, e);
                        continue;
                    }
                };

                for (key, spec) in derive_endpoints(&module) {
                    match self.context.handler(&spec.handler) {
                        Some(handler) => {
                            routes.insert(
                                key,
                                RouteEntry {
                                    module: name.clone(),
                                    operation: spec.operation.clone(),
                                    handler,
                                },
                            );
                        }
                        None => log::warn!(
                            "module '{}' references unknown handler bean '{}'",
                            name,
                            spec.handler
                        ),
                    }
                }
                entities.extend(module.entities());
                claimed.push(module);
            }
        }

        let report = DiscoveryReport {
            modules: claimed.len(),
            routes: routes.len(),
            entities: entities.len(),
        };

        self.table.replace_all(routes);
        self.persistence.reload(entities)?;
        for module in &claimed {
            self.broker.promote(module);
        }

        if !claimed.is_empty() {
            log::info!(
                "discovery claimed {} modules: {}",
                claimed.len(),
                claimed.iter().map(|m| m.name().as_str()).join(", ")
            );
        }
        Ok(report)
    }
}

fn collect_artifacts(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_artifacts(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXT) {
            out.push(path);
        }
    }
    Ok(())
}
