//! Default service container.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::AppError;
use crate::result::AppResult;
use crate::traits::registry::{Service, ServiceFactory, ServiceRegistry};

/// A registered binding.
struct Binding {
    /// Factory producing the service.
    factory: ServiceFactory,
    /// Whether the first instance is cached.
    shared: bool,
}

/// In-process service container with transient and singleton bindings.
#[derive(Default)]
pub struct Container {
    /// Key → binding.
    bindings: RwLock<HashMap<String, Binding>>,
    /// Key → resolved singleton instance.
    instances: RwLock<HashMap<String, Service>>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<&String> = bindings.keys().collect();
        keys.sort();
        f.debug_struct("Container").field("bindings", &keys).finish()
    }
}

impl Container {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds an already-built value as a shared instance.
    pub fn instance(&self, key: &str, service: Service) {
        self.singleton(key, Arc::new(move |_| Ok(service.clone())));
    }

    fn insert(&self, key: &str, factory: ServiceFactory, shared: bool) {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), Binding { factory, shared });
        debug!(key = %key, shared, "Service bound");
    }
}

impl ServiceRegistry for Container {
    fn bind(&self, key: &str, factory: ServiceFactory) {
        self.insert(key, factory, false);
    }

    fn singleton(&self, key: &str, factory: ServiceFactory) {
        self.insert(key, factory, true);
    }

    fn get(&self, key: &str) -> AppResult<Service> {
        if let Some(existing) = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Ok(existing.clone());
        }

        // Factories may resolve other services, so no lock is held while they run.
        let (factory, shared) = {
            let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
            let binding = bindings
                .get(key)
                .ok_or_else(|| AppError::not_found(format!("Service '{}' not found", key)))?;
            (binding.factory.clone(), binding.shared)
        };

        let service = factory(self)?;

        if shared {
            let mut instances = self.instances.write().unwrap_or_else(PoisonError::into_inner);
            return Ok(instances
                .entry(key.to_string())
                .or_insert(service)
                .clone());
        }

        Ok(service)
    }

    fn has(&self, key: &str) -> bool {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::traits::registry::resolve;

    #[test]
    fn test_bind_builds_each_time() {
        let container = Container::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        container.bind(
            "counter",
            Arc::new(move |_| Ok(Arc::new(counter.fetch_add(1, Ordering::SeqCst)) as Service)),
        );

        let first = resolve::<usize>(&container, "counter").unwrap();
        let second = resolve::<usize>(&container, "counter").unwrap();
        assert_eq!((*first, *second), (0, 1));
    }

    #[test]
    fn test_singleton_is_cached() {
        let container = Container::new();
        container.singleton(
            "greeting",
            Arc::new(|_| Ok(Arc::new("hello".to_string()) as Service)),
        );

        let a = container.get("greeting").unwrap();
        let b = container.get("greeting").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_missing_service_is_not_found() {
        let container = Container::new();
        assert!(!container.has("nope"));
        let err = container.get("nope").unwrap_err();
        assert!(err.is(crate::error::ErrorKind::NotFound));
    }

    #[test]
    fn test_rebinding_drops_cached_instance() {
        let container = Container::new();
        container.instance("n", Arc::new(1_u32));
        assert_eq!(*resolve::<u32>(&container, "n").unwrap(), 1);
        container.instance("n", Arc::new(2_u32));
        assert_eq!(*resolve::<u32>(&container, "n").unwrap(), 2);
    }

    #[test]
    fn test_resolve_wrong_type() {
        let container = Container::new();
        container.instance("n", Arc::new(1_u32));
        assert!(resolve::<String>(&container, "n").is_err());
    }
}
