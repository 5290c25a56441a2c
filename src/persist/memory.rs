use super::{FactoryBuilder, PersistenceUnit, Session, SessionFactory};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Backing store shared by every factory the builder produces. Rebuilding
/// the factory changes which entity types are managed, not where rows live,
/// so data written before a reload stays visible after it.
#[derive(Default)]
pub struct DataStore {
    rows: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, entity_type: &str, id: &str, value: Value) {
        self.rows
            .write()
            .entry(entity_type.to_string())
            .or_default()
            .insert(id.to_string(), value);
    }

    pub fn get(&self, entity_type: &str, id: &str) -> Option<Value> {
        self.rows.read().get(entity_type)?.get(id).cloned()
    }

    pub fn list(&self, entity_type: &str) -> Vec<Value> {
        self.rows
            .read()
            .get(entity_type)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Development-time session factory over the in-process store.
pub struct InMemorySessionFactory {
    managed: Arc<BTreeSet<String>>,
    store: Arc<DataStore>,
}

impl SessionFactory for InMemorySessionFactory {
    fn create_session(&self) -> Session {
        Session::new(self.managed.clone(), self.store.clone())
    }

    fn metamodel(&self) -> Vec<String> {
        self.managed.iter().cloned().collect()
    }
}

/// Builds [`InMemorySessionFactory`] instances over one shared store.
pub struct InMemoryFactoryBuilder {
    store: Arc<DataStore>,
}

impl InMemoryFactoryBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(DataStore::new()),
        }
    }
}

impl Default for InMemoryFactoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FactoryBuilder for InMemoryFactoryBuilder {
    fn build(&self, unit: &PersistenceUnit) -> anyhow::Result<Arc<dyn SessionFactory>> {
        Ok(Arc::new(InMemorySessionFactory {
            managed: Arc::new(unit.managed_types.clone()),
            store: self.store.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_round_trip() {
        let store = DataStore::new();
        store.put("Order", "1", serde_json::json!({"total": 5}));
        assert_eq!(
            store.get("Order", "1"),
            Some(serde_json::json!({"total": 5}))
        );
        assert_eq!(store.get("Order", "2"), None);
        assert_eq!(store.list("Order").len(), 1);
        assert!(store.list("Customer").is_empty());
    }

    #[test]
    fn test_builder_shares_store_across_factories() {
        let builder = InMemoryFactoryBuilder::new();
        let mut unit = PersistenceUnit::default();
        unit.append_managed(["Order"]);

        let first = builder.build(&unit).unwrap();
        first
            .create_session()
            .save("Order", "1", serde_json::json!({}))
            .unwrap();

        unit.append_managed(["Customer"]);
        let second = builder.build(&unit).unwrap();
        assert_eq!(second.create_session().list("Order").unwrap().len(), 1);
    }
}
