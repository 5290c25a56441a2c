use crate::context::AppContext;
use crate::model::{LoadedModule, Transition};
use crate::persist::PersistenceHandle;
use crate::reload::ReloadListener;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Reload listener for the persistence layer: queues entity types declared
/// by discovered modules and drains them into the persistence unit on
/// `execute`.
///
/// Unlike routing failures, a factory rebuild failure is escalated, since a
/// broken persistence layer is not safely ignorable. The drained names are
/// put back so the next cycle retries them.
pub struct PersistenceRefresher {
    handle: Arc<PersistenceHandle>,
    pending: Mutex<BTreeSet<String>>,
}

impl PersistenceRefresher {
    pub fn new(handle: Arc<PersistenceHandle>) -> Self {
        Self {
            handle,
            pending: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn pending(&self) -> Vec<String> {
        self.pending.lock().iter().cloned().collect()
    }
}

impl ReloadListener for PersistenceRefresher {
    fn name(&self) -> &str {
        "persistence-unit"
    }

    fn register(&self, ctx: &AppContext) {
        ctx.insert_value("hotmod.persistence", self.handle.clone());
    }

    fn supports(&self, module: &LoadedModule) -> bool {
        !module.entities().is_empty()
    }

    fn process(&self, module: &Arc<LoadedModule>, transition: Transition) {
        let mut pending = self.pending.lock();
        match transition {
            Transition::Discovered => {
                pending.extend(module.entities());
            }
            Transition::Promoted => {
                // Built-in discovery registered these itself.
                for entity in module.entities() {
                    pending.remove(&entity);
                }
            }
        }
    }

    fn execute(&self) -> anyhow::Result<bool> {
        let drained: Vec<String> = {
            let mut pending = self.pending.lock();
            std::mem::take(&mut *pending).into_iter().collect()
        };
        if drained.is_empty() {
            return Ok(false);
        }
        match self.handle.reload(drained.clone()) {
            Ok(changed) => Ok(changed),
            Err(e) => {
                self.pending.lock().extend(drained);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModuleImage, ModuleManifest};
    use crate::persist::{
        FactoryBuilder, InMemoryFactoryBuilder, PersistenceUnit, SessionFactory,
    };
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::SystemTime;

    fn entity_module(name: &str, entities: &[&str]) -> Arc<LoadedModule> {
        Arc::new(LoadedModule::new(
            name.to_string(),
            PathBuf::from(format!("{name}.module")),
            PathBuf::from(format!("/out/{name}.module")),
            ModuleImage {
                manifest: ModuleManifest {
                    endpoints: vec![],
                    entities: entities.iter().map(|e| e.to_string()).collect(),
                },
                version: SystemTime::UNIX_EPOCH,
            },
        ))
    }

    fn handle() -> Arc<PersistenceHandle> {
        Arc::new(
            PersistenceHandle::new(
                Box::new(InMemoryFactoryBuilder::new()),
                PersistenceUnit::default(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_execute_drains_into_the_unit() {
        let handle = handle();
        let refresher = PersistenceRefresher::new(handle.clone());
        let m = entity_module("m", &["Order", "Customer"]);

        refresher.process(&m, Transition::Discovered);
        assert!(refresher.execute().unwrap());
        assert_eq!(
            handle.metamodel(),
            vec!["Customer".to_string(), "Order".to_string()]
        );
        assert!(refresher.pending().is_empty());

        // Nothing queued: nothing applied.
        assert!(!refresher.execute().unwrap());
    }

    #[test]
    fn test_known_entities_do_not_rebuild_the_factory() {
        let handle = handle();
        handle.reload(["Order"]).unwrap();
        let factory = handle.current_factory();

        let refresher = PersistenceRefresher::new(handle.clone());
        let m = entity_module("m", &["Order"]);
        refresher.process(&m, Transition::Discovered);
        assert!(!refresher.execute().unwrap());
        assert!(Arc::ptr_eq(&factory, &handle.current_factory()));
    }

    #[test]
    fn test_promoted_entities_leave_the_queue() {
        let refresher = PersistenceRefresher::new(handle());
        let m = entity_module("m", &["Order"]);
        refresher.process(&m, Transition::Discovered);
        refresher.process(&m, Transition::Promoted);
        assert!(refresher.pending().is_empty());
    }

    #[test]
    fn test_build_failure_escalates_and_requeues() {
        struct FlakyBuilder {
            fail: Arc<AtomicBool>,
            inner: InMemoryFactoryBuilder,
        }
        impl FactoryBuilder for FlakyBuilder {
            fn build(&self, unit: &PersistenceUnit) -> anyhow::Result<Arc<dyn SessionFactory>> {
                if self.fail.load(Ordering::SeqCst) && !unit.managed_types.is_empty() {
                    anyhow::bail!("metadata rejected");
                }
                self.inner.build(unit)
            }
        }

        let fail = Arc::new(AtomicBool::new(true));
        let handle = Arc::new(
            PersistenceHandle::new(
                Box::new(FlakyBuilder {
                    fail: fail.clone(),
                    inner: InMemoryFactoryBuilder::new(),
                }),
                PersistenceUnit::default(),
            )
            .unwrap(),
        );
        let refresher = PersistenceRefresher::new(handle.clone());
        let m = entity_module("m", &["Order"]);

        refresher.process(&m, Transition::Discovered);
        assert!(refresher.execute().is_err());
        assert_eq!(refresher.pending(), vec!["Order".to_string()]);

        fail.store(false, Ordering::SeqCst);
        assert!(refresher.execute().unwrap());
        assert!(refresher.pending().is_empty());
        assert_eq!(handle.metamodel(), vec!["Order".to_string()]);
    }
}
