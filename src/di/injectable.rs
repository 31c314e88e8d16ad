use crate::di::ServiceKey;
use crate::error::{LifeloomError, Result};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Type-erased instance; the concrete value is always an `Arc<S>` for the
/// service type `S` it was bound as.
pub(crate) type Instance = Arc<dyn Any + Send + Sync>;

/// Trait for types the registry can construct from their declared dependencies.
///
/// The registry resolves every key in [`Injectable::dependencies`] (recursively,
/// with cycle detection) before calling [`Injectable::inject`].
///
/// # Example
/// ```
/// use lifeloom::di::{Dependencies, Injectable, ServiceKey};
/// use std::sync::Arc;
///
/// struct Database;
///
/// struct UserService {
///     db: Arc<Database>,
/// }
///
/// impl Injectable for UserService {
///     fn dependencies() -> Vec<ServiceKey> {
///         vec![ServiceKey::of::<Database>()]
///     }
///
///     fn inject(deps: &Dependencies) -> lifeloom::Result<Self> {
///         Ok(Self { db: deps.resolve::<Database>()? })
///     }
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    fn dependencies() -> Vec<ServiceKey> {
        Vec::new()
    }

    /// Build an instance from already-resolved dependencies.
    ///
    /// # Errors
    /// Returns an error if a dependency is missing or has an unexpected type.
    fn inject(deps: &Dependencies) -> Result<Self>;
}

/// Dependencies resolved for one construction.
pub struct Dependencies {
    owner: ServiceKey,
    resolved: HashMap<ServiceKey, Instance>,
}

impl Dependencies {
    pub(crate) fn new(owner: ServiceKey) -> Self {
        Self {
            owner,
            resolved: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, key: ServiceKey, instance: Instance) {
        self.resolved.insert(key, instance);
    }

    /// Fetch a declared dependency by key.
    pub fn get<S: ?Sized + Send + Sync + 'static>(&self, key: &ServiceKey) -> Result<Arc<S>> {
        let instance =
            self.resolved
                .get(key)
                .ok_or_else(|| LifeloomError::UnresolvedDependency {
                    key: format!("{key} (not declared as a dependency)"),
                    required_by: Some(self.owner.to_string()),
                })?;
        downcast::<S>(key, instance)
    }

    /// Fetch a declared dependency by its type key.
    pub fn resolve<S: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<S>> {
        self.get(&ServiceKey::of::<S>())
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

pub(crate) fn downcast<S: ?Sized + Send + Sync + 'static>(
    key: &ServiceKey,
    instance: &Instance,
) -> Result<Arc<S>> {
    instance
        .downcast_ref::<Arc<S>>()
        .cloned()
        .ok_or_else(|| LifeloomError::DowncastFailed {
            key: key.to_string(),
            expected: std::any::type_name::<S>().to_string(),
        })
}

pub(crate) fn erase<S: ?Sized + Send + Sync + 'static>(instance: Arc<S>) -> Instance {
    Arc::new(instance)
}
