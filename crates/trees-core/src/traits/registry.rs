//! Service registry abstraction.

use std::any::Any;
use std::sync::Arc;

use crate::error::AppError;
use crate::result::AppResult;

/// A type-erased service instance.
pub type Service = Arc<dyn Any + Send + Sync>;

/// Builds a service instance, optionally resolving other services.
pub type ServiceFactory = Arc<dyn Fn(&dyn ServiceRegistry) -> AppResult<Service> + Send + Sync>;

/// Keyed service registry (dependency-injection container).
///
/// The runtime relies only on these four operations; resolution strategy
/// is up to the implementation.
pub trait ServiceRegistry: Send + Sync {
    /// Binds a factory that is invoked on every `get`.
    fn bind(&self, key: &str, factory: ServiceFactory);

    /// Binds a factory whose first result is cached and shared.
    fn singleton(&self, key: &str, factory: ServiceFactory);

    /// Resolves a service by key.
    fn get(&self, key: &str) -> AppResult<Service>;

    /// Returns whether a binding exists for `key`.
    fn has(&self, key: &str) -> bool;
}

/// Resolves a service and downcasts it to its concrete type.
pub fn resolve<T>(registry: &dyn ServiceRegistry, key: &str) -> AppResult<Arc<T>>
where
    T: Any + Send + Sync,
{
    registry.get(key)?.downcast::<T>().map_err(|_| {
        AppError::internal(format!(
            "Service '{}' is not a {}",
            key,
            std::any::type_name::<T>()
        ))
    })
}
