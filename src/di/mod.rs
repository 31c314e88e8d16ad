mod injectable;
mod key;
mod registry;
mod scope;

pub use injectable::{Dependencies, Injectable};
pub use key::{Lifetime, ServiceKey};
pub use registry::ServiceRegistry;
pub use scope::{Binder, RegistryScope};
