pub mod memory;

pub use memory::{DataStore, InMemoryFactoryBuilder, InMemorySessionFactory};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("entity type '{0}' is not managed by this persistence unit")]
    UnmanagedType(String),
}

/// The canonical persistence-unit metadata: the set of managed entity types
/// plus raw configuration properties. Mutated only by appending entity type
/// names; appending an already-present name is a no-op.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistenceUnit {
    pub managed_types: BTreeSet<String>,
    pub properties: BTreeMap<String, String>,
}

impl PersistenceUnit {
    pub fn new(properties: BTreeMap<String, String>) -> Self {
        Self {
            managed_types: BTreeSet::new(),
            properties,
        }
    }

    /// Append entity type names. Returns true when the set actually changed.
    pub fn append_managed<I, S>(&mut self, types: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut changed = false;
        for t in types {
            changed |= self.managed_types.insert(t.into());
        }
        changed
    }
}

/// A live session minted by the current factory. Sessions are independent of
/// the factory that created them: a rebuild does not invalidate sessions
/// already handed out.
pub struct Session {
    id: Uuid,
    managed: Arc<BTreeSet<String>>,
    store: Arc<DataStore>,
}

impl Session {
    pub(crate) fn new(managed: Arc<BTreeSet<String>>, store: Arc<DataStore>) -> Self {
        Self {
            id: Uuid::new_v4(),
            managed,
            store,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn check_managed(&self, entity_type: &str) -> Result<(), PersistError> {
        if self.managed.contains(entity_type) {
            Ok(())
        } else {
            Err(PersistError::UnmanagedType(entity_type.to_string()))
        }
    }

    pub fn save(&self, entity_type: &str, id: &str, value: Value) -> Result<(), PersistError> {
        self.check_managed(entity_type)?;
        self.store.put(entity_type, id, value);
        Ok(())
    }

    pub fn find(&self, entity_type: &str, id: &str) -> Result<Option<Value>, PersistError> {
        self.check_managed(entity_type)?;
        Ok(self.store.get(entity_type, id))
    }

    pub fn list(&self, entity_type: &str) -> Result<Vec<Value>, PersistError> {
        self.check_managed(entity_type)?;
        Ok(self.store.list(entity_type))
    }
}

/// The session/entity-manager factory derived from a persistence unit.
/// Exactly one factory is current at a time; accessors on
/// [`PersistenceHandle`] delegate to whichever factory is current at the
/// moment of the call.
pub trait SessionFactory: Send + Sync {
    fn create_session(&self) -> Session;
    fn metamodel(&self) -> Vec<String>;
}

/// The factory construction pipeline. Construction may fail (a broken
/// persistence layer is not ignorable), in which case the previous factory
/// stays current.
pub trait FactoryBuilder: Send + Sync {
    fn build(&self, unit: &PersistenceUnit) -> anyhow::Result<Arc<dyn SessionFactory>>;
}

/// Long-lived owner of the persistence unit and its derived factory. Held by
/// the composition root and shared by handle; there is no static instance.
pub struct PersistenceHandle {
    builder: Box<dyn FactoryBuilder>,
    metadata: Mutex<PersistenceUnit>,
    current: RwLock<Arc<dyn SessionFactory>>,
}

impl PersistenceHandle {
    pub fn new(builder: Box<dyn FactoryBuilder>, unit: PersistenceUnit) -> anyhow::Result<Self> {
        let factory = builder.build(&unit)?;
        Ok(Self {
            builder,
            metadata: Mutex::new(unit),
            current: RwLock::new(factory),
        })
    }

    /// Append entity types to the unit and rebuild the factory when the
    /// metadata actually changed. The rebuild is synchronous; the swap to
    /// the new factory is a single store, so concurrent session requests see
    /// either the old or the new factory.
    ///
    /// Returns whether a rebuild happened. Construction failures propagate,
    /// leave the previous factory current, and roll the append back so a
    /// retry with the same names rebuilds again.
    pub fn reload<I, S>(&self, new_types: I) -> anyhow::Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut metadata = self.metadata.lock();
        let mut added: Vec<String> = Vec::new();
        for t in new_types {
            let t = t.into();
            if metadata.managed_types.insert(t.clone()) {
                added.push(t);
            }
        }
        if added.is_empty() {
            return Ok(false);
        }
        match self.builder.build(&metadata) {
            Ok(factory) => {
                *self.current.write() = factory;
                log::info!(
                    "persistence unit rebuilt with {} managed types",
                    metadata.managed_types.len()
                );
                Ok(true)
            }
            Err(e) => {
                for t in &added {
                    metadata.managed_types.remove(t);
                }
                Err(e)
            }
        }
    }

    pub fn create_session(&self) -> Session {
        self.current.read().create_session()
    }

    pub fn metamodel(&self) -> Vec<String> {
        self.current.read().metamodel()
    }

    /// The factory current at this instant. Mostly useful to observe rebuild
    /// boundaries.
    pub fn current_factory(&self) -> Arc<dyn SessionFactory> {
        self.current.read().clone()
    }

    pub fn managed_types(&self) -> Vec<String> {
        self.metadata.lock().managed_types.iter().cloned().collect()
    }
}
