use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::info;

use super::descriptor::{ActionDescriptor, ServiceDescriptor};
use crate::traits::DocumentStore;

// ---------------------------------------------------------------------------
// ServiceFactory
// ---------------------------------------------------------------------------

/// Builds one service descriptor at load time.
///
/// The loader only ever receives an explicit list of factories; it never
/// discovers services on its own.
pub type ServiceFactory = Box<dyn FnOnce() -> anyhow::Result<ServiceDescriptor> + Send>;

/// Failures while loading the service set.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("service factory #{index} failed: {source}")]
    Factory {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("duplicate service name: {0}")]
    DuplicateService(String),
}

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Registry of loaded service descriptors.
///
/// Provides two lookup mechanisms:
/// - **By service name** (`get`)
/// - **By qualified action name** (`resolve_action`), `{service}.{action}`
///
/// Populated once by [`ServiceRegistry::load`]; read-only afterwards and
/// shared through `Arc`.
pub struct ServiceRegistry {
    by_name: DashMap<String, Arc<ServiceDescriptor>>,
    /// Registration order for deterministic route publication.
    load_order: RwLock<Vec<String>>,
}

impl ServiceRegistry {
    fn empty() -> Self {
        Self {
            by_name: DashMap::new(),
            load_order: RwLock::new(Vec::new()),
        }
    }

    /// Builds every service in factory order and binds `store` to each.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Factory`] if a factory fails and
    /// [`LoadError::DuplicateService`] if two services share a name.
    pub fn load(
        factories: Vec<ServiceFactory>,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self, LoadError> {
        let registry = Self::empty();
        for (index, factory) in factories.into_iter().enumerate() {
            let descriptor = factory().map_err(|source| LoadError::Factory { index, source })?;
            descriptor.bind_store(Arc::clone(&store));
            registry.register(descriptor)?;
        }
        info!(services = registry.len(), "service registry loaded");
        Ok(registry)
    }

    fn register(&self, descriptor: ServiceDescriptor) -> Result<(), LoadError> {
        let name = descriptor.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(LoadError::DuplicateService(name));
        }
        info!(
            service = %name,
            namespace = descriptor.namespace(),
            actions = descriptor.actions().count(),
            "service registered"
        );
        self.by_name.insert(name.clone(), Arc::new(descriptor));
        self.load_order.write().push(name);
        Ok(())
    }

    /// Retrieve a service by its name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ServiceDescriptor>> {
        self.by_name.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// All services in load order.
    #[must_use]
    pub fn services(&self) -> Vec<Arc<ServiceDescriptor>> {
        self.load_order
            .read()
            .iter()
            .filter_map(|name| self.get(name))
            .collect()
    }

    /// Splits `service.action` and looks both up.
    #[must_use]
    pub fn resolve_action(
        &self,
        qualified_name: &str,
    ) -> Option<(Arc<ServiceDescriptor>, Arc<ActionDescriptor>)> {
        let (service_name, action_name) = qualified_name.split_once('.')?;
        let service = self.get(service_name)?;
        let action = Arc::clone(service.action(action_name)?);
        Some((service, action))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use actionhub_core::InvocationError;
    use serde_json::Value;

    use super::*;
    use crate::service::descriptor::ActionSpec;
    use crate::service::operation::{ActionOutput, InvocationContext};
    use crate::storage::MemoryStore;

    async fn noop(_ctx: Arc<InvocationContext>) -> Result<ActionOutput, InvocationError> {
        Ok(ActionOutput::Final(Value::Null))
    }

    fn factory(name: &'static str) -> ServiceFactory {
        Box::new(move || {
            ServiceDescriptor::builder(name)
                .action("get", ActionSpec::inline(noop))
                .build()
        })
    }

    fn store() -> Arc<dyn DocumentStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn load_preserves_order_and_binds_store() {
        let registry =
            ServiceRegistry::load(vec![factory("users"), factory("docs"), factory("tags")], store())
                .unwrap();

        let names: Vec<String> = registry
            .services()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["users", "docs", "tags"]);
        assert!(registry.services().iter().all(|s| s.store().is_some()));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn duplicate_service_is_rejected() {
        let result = ServiceRegistry::load(vec![factory("docs"), factory("docs")], store());
        assert!(matches!(result, Err(LoadError::DuplicateService(name)) if name == "docs"));
    }

    #[test]
    fn failing_factory_reports_index() {
        let failing: ServiceFactory = Box::new(|| ServiceDescriptor::builder("").build());
        let result = ServiceRegistry::load(vec![factory("docs"), failing], store());
        assert!(matches!(result, Err(LoadError::Factory { index: 1, .. })));
    }

    #[test]
    fn resolve_action_by_qualified_name() {
        let registry = ServiceRegistry::load(vec![factory("docs")], store()).unwrap();

        let (service, action) = registry.resolve_action("docs.get").unwrap();
        assert_eq!(service.name(), "docs");
        assert_eq!(action.qualified_name, "docs.get");

        assert!(registry.resolve_action("docs.missing").is_none());
        assert!(registry.resolve_action("nope.get").is_none());
        assert!(registry.resolve_action("docs").is_none());
    }
}
