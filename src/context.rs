use crate::dispatch::RequestHandler;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// The live application context: the composition root's registry of named
/// singletons. Handler beans live in their own typed map so route dispatch
/// can resolve them without downcasting; everything else goes through the
/// value map.
///
/// There are no process-wide statics; one `AppContext` is created at
/// startup and handed by `Arc` to every component that needs it.
#[derive(Default)]
pub struct AppContext {
    handlers: RwLock<HashMap<String, Arc<dyn RequestHandler>>>,
    values: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl AppContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler bean under a name. Replaces any previous bean with
    /// the same name.
    pub fn register_handler(&self, name: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        let name = name.into();
        log::debug!("registering handler bean '{}'", name);
        self.handlers.write().insert(name, handler);
    }

    /// Resolve a handler bean by name.
    pub fn handler(&self, name: &str) -> Option<Arc<dyn RequestHandler>> {
        self.handlers.read().get(name).cloned()
    }

    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Register an arbitrary singleton under a name.
    pub fn insert_value<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        self.values.write().insert(name.into(), Arc::new(value));
    }

    /// Resolve a singleton by name and concrete type.
    pub fn value<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let value = self.values.read().get(name).cloned()?;
        value.downcast::<T>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{HandlerRequest, HandlerResponse};
    use async_trait::async_trait;

    struct NullHandler;

    #[async_trait]
    impl RequestHandler for NullHandler {
        async fn call(
            &self,
            _operation: &str,
            _request: HandlerRequest,
        ) -> anyhow::Result<HandlerResponse> {
            Ok(HandlerResponse::ok(serde_json::Value::Null))
        }
    }

    #[test]
    fn test_handler_registration_and_lookup() {
        let ctx = AppContext::new();
        assert!(ctx.handler("echo").is_none());

        ctx.register_handler("echo", Arc::new(NullHandler));
        assert!(ctx.handler("echo").is_some());
        assert_eq!(ctx.handler_names(), vec!["echo".to_string()]);
    }

    #[test]
    fn test_value_round_trip_with_type() {
        let ctx = AppContext::new();
        ctx.insert_value("answer", 42u32);

        assert_eq!(ctx.value::<u32>("answer").as_deref(), Some(&42));
        assert!(ctx.value::<String>("answer").is_none());
        assert!(ctx.value::<u32>("missing").is_none());
    }
}
