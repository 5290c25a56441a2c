use crate::context::AppContext;
use crate::dispatch::{derive_endpoints, RouteEntry, RouteKey, RouteTable};
use crate::model::{LoadedModule, ModuleName, Transition};
use crate::reload::ReloadListener;
use itertools::Itertools;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControllerState {
    /// Marked for registration; routes not live yet.
    Pending,
    /// Routes registered in the dynamic table.
    Registered,
}

struct OwnedController {
    module: Arc<LoadedModule>,
    state: ControllerState,
}

/// The route re-registrar: the reload listener responsible for HTTP routing.
///
/// It owns the controllers built-in discovery does not know yet and keeps
/// their routes in the *dynamic* table. The serving path consults the
/// built-in table first, so this listener's table is additive: routes owned
/// by built-in discovery are never restored here.
///
/// Every `execute` rebuilds the dynamic table from scratch: there is no
/// incremental replace-one-mapping primitive, so the only safe way to drop
/// superseded routes is to stage the full table and publish it in one swap.
pub struct RouteRefresher {
    table: Arc<dyn RouteTable>,
    context: Arc<AppContext>,
    owned: Mutex<HashMap<ModuleName, OwnedController>>,
}

impl RouteRefresher {
    pub fn new(table: Arc<dyn RouteTable>, context: Arc<AppContext>) -> Self {
        Self {
            table,
            context,
            owned: Mutex::new(HashMap::new()),
        }
    }

    /// Controllers marked but not yet live, in name order.
    pub fn pending(&self) -> Vec<ModuleName> {
        self.owned
            .lock()
            .iter()
            .filter(|(_, c)| c.state == ControllerState::Pending)
            .map(|(name, _)| name.clone())
            .sorted()
            .collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.owned
            .lock()
            .get(name)
            .map(|c| c.state == ControllerState::Registered)
            .unwrap_or(false)
    }
}

impl ReloadListener for RouteRefresher {
    fn name(&self) -> &str {
        "route-table"
    }

    fn register(&self, ctx: &AppContext) {
        // The serving path checks the built-in table before this one, so
        // this listener only ever manages controllers built-in discovery
        // does not know about yet.
        ctx.insert_value("hotmod.dynamic-routes", self.table.clone());
        log::info!("route re-registrar installed behind built-in discovery");
    }

    fn supports(&self, module: &LoadedModule) -> bool {
        module.is_controller()
    }

    fn process(&self, module: &Arc<LoadedModule>, transition: Transition) {
        let mut owned = self.owned.lock();
        match transition {
            Transition::Discovered => {
                // A recompile needs a fresh apply, so the state returns to
                // Pending even if an earlier image was registered.
                owned.insert(
                    module.name().clone(),
                    OwnedController {
                        module: module.clone(),
                        state: ControllerState::Pending,
                    },
                );
            }
            Transition::Promoted => {
                // Built-in discovery claimed it before (or after) we applied
                // it: back to unseen either way.
                owned.remove(module.name());
            }
        }
    }

    fn execute(&self) -> anyhow::Result<bool> {
        let mut owned = self.owned.lock();
        let before = self.table.snapshot();
        let mut next: HashMap<RouteKey, RouteEntry> = HashMap::new();

        let names: Vec<ModuleName> = owned.keys().cloned().sorted().collect();
        for name in names {
            let Some(controller) = owned.get_mut(&name) else {
                continue;
            };
            let specs = derive_endpoints(&controller.module);
            let mut staged: Vec<(RouteKey, RouteEntry)> = Vec::new();
            let mut resolved = true;
            for (key, spec) in specs {
                match self.context.handler(&spec.handler) {
                    Some(handler) => staged.push((
                        key,
                        RouteEntry {
                            module: name.clone(),
                            operation: spec.operation,
                            handler,
                        },
                    )),
                    None => {
                        log::warn!(
                            "handler bean '{}' for controller '{}' not available yet, will retry",
                            spec.handler,
                            name
                        );
                        resolved = false;
                        break;
                    }
                }
            }
            if resolved && !staged.is_empty() {
                next.extend(staged);
                controller.state = ControllerState::Registered;
            } else {
                // No route made it live this pass; a later cycle retries.
                controller.state = ControllerState::Pending;
            }
        }

        let changed =
            next.len() != before.len() || next.keys().any(|key| !before.contains_key(key));
        // Publish the rebuilt table in one step; requests in flight see the
        // old snapshot or the new one, never a half-empty table.
        self.table.replace_all(next);
        Ok(changed)
    }

    fn applied(&self, module: &ModuleName) -> bool {
        self.owned
            .lock()
            .get(module)
            .map(|c| c.state == ControllerState::Registered)
            .unwrap_or(true)
    }
}
