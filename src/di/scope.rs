use crate::di::ServiceRegistry;
use std::sync::{Arc, Mutex, PoisonError};

/// Function that populates a freshly created registry.
pub type Binder = Arc<dyn Fn(&ServiceRegistry) + Send + Sync>;

/// Owner of the process-scoped [`ServiceRegistry`].
///
/// The registry is created on first access and populated by every registered
/// [`Binder`] in order. [`RegistryScope::teardown`] unloads it; the next
/// access builds a new one, so instances resolved before teardown must not be
/// used afterwards.
pub struct RegistryScope {
    current: Mutex<Option<Arc<ServiceRegistry>>>,
    binders: Vec<Binder>,
}

impl RegistryScope {
    pub fn new(binders: Vec<Binder>) -> Self {
        Self {
            current: Mutex::new(None),
            binders,
        }
    }

    pub fn get(&self) -> Arc<ServiceRegistry> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(registry) = current.as_ref() {
            return Arc::clone(registry);
        }

        let registry = Arc::new(ServiceRegistry::new());
        for binder in &self.binders {
            binder(&registry);
        }
        tracing::debug!(bindings = registry.len(), "service registry created");
        *current = Some(Arc::clone(&registry));
        registry
    }

    pub fn is_initialized(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Unload the current registry, if any.
    pub fn teardown(&self) {
        let registry = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(registry) = registry {
            registry.unload_all();
        }
    }
}
