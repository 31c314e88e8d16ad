use crate::di::injectable::{Instance, downcast, erase};
use crate::di::{Dependencies, Injectable, Lifetime, ServiceKey};
use crate::error::{LifeloomError, Result};
use dashmap::DashMap;
use std::sync::Arc;

type Factory = Arc<dyn Fn(&Dependencies) -> Result<Instance> + Send + Sync>;

struct Binding {
    dependencies: Vec<ServiceKey>,
    lifetime: Lifetime,
    factory: Factory,
}

/// Thread-safe service registry with singleton and transient lifetimes.
///
/// Re-binding a key replaces the previous binding and evicts any singleton
/// already built for it. Resolution is synchronous; bindings must not change
/// while a resolution is in progress.
pub struct ServiceRegistry {
    bindings: DashMap<ServiceKey, Arc<Binding>>,
    singletons: DashMap<ServiceKey, Instance>,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
            singletons: DashMap::new(),
        }
    }

    /// Bind `key` to a factory that is handed its resolved `dependencies`.
    pub fn bind<S, F>(
        &self,
        key: ServiceKey,
        dependencies: Vec<ServiceKey>,
        lifetime: Lifetime,
        factory: F,
    ) where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&Dependencies) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |deps: &Dependencies| factory(deps).map(erase));
        let binding = Binding {
            dependencies,
            lifetime,
            factory,
        };
        if self.bindings.insert(key.clone(), Arc::new(binding)).is_some() {
            tracing::debug!(%key, "replacing existing binding");
        }
        self.singletons.remove(&key);
    }

    /// Bind `T` under its own type key.
    pub fn bind_injectable<T: Injectable>(&self, lifetime: Lifetime) {
        self.bind::<T, _>(ServiceKey::of::<T>(), T::dependencies(), lifetime, |deps| {
            T::inject(deps).map(Arc::new)
        });
    }

    /// Bind a pre-built instance as a singleton.
    pub fn bind_instance<S>(&self, key: ServiceKey, instance: Arc<S>)
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.bind::<S, _>(key, Vec::new(), Lifetime::Singleton, move |_| {
            Ok(Arc::clone(&instance))
        });
    }

    /// Resolve the service bound under `key`, building it and its
    /// dependencies as needed.
    pub fn get<S: ?Sized + Send + Sync + 'static>(&self, key: &ServiceKey) -> Result<Arc<S>> {
        let instance = self.resolve_key(key, &mut Vec::new())?;
        downcast::<S>(key, &instance)
    }

    /// Resolve by type key.
    pub fn resolve<S: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<S>> {
        self.get(&ServiceKey::of::<S>())
    }

    /// Whether `key` has a binding
    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.bindings.contains_key(key)
    }

    /// Drop every binding and every cached singleton.
    pub fn unload_all(&self) {
        let singletons = self.singletons.len();
        self.singletons.clear();
        self.bindings.clear();
        tracing::debug!(singletons, "service registry unloaded");
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn resolve_key(&self, key: &ServiceKey, path: &mut Vec<ServiceKey>) -> Result<Instance> {
        if let Some(instance) = self.singletons.get(key) {
            return Ok(Arc::clone(instance.value()));
        }

        if let Some(start) = path.iter().position(|k| k == key) {
            let cycle = path[start..]
                .iter()
                .chain(std::iter::once(key))
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(LifeloomError::CyclicDependency { cycle });
        }

        // Clone the binding out so no map guard is held while recursing.
        let binding = self
            .bindings
            .get(key)
            .map(|b| Arc::clone(b.value()))
            .ok_or_else(|| LifeloomError::UnresolvedDependency {
                key: key.to_string(),
                required_by: path.last().map(ToString::to_string),
            })?;

        path.push(key.clone());
        let mut deps = Dependencies::new(key.clone());
        for dependency in &binding.dependencies {
            let instance = self.resolve_key(dependency, path)?;
            deps.insert(dependency.clone(), instance);
        }
        let instance = (binding.factory)(&deps)?;
        path.pop();

        match binding.lifetime {
            Lifetime::Transient => Ok(instance),
            Lifetime::Singleton => Ok(Arc::clone(
                self.singletons.entry(key.clone()).or_insert(instance).value(),
            )),
        }
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
