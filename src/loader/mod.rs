//! Loader chain
//!
//! ```text
//! ModuleLoader → ProviderLoader (server | client) → EventLoader → TickLoader
//! ```
//!
//! Sub-loaders are resolved through the [`ServiceRegistry`]; a missing
//! collaborator fails resolution before any provider is loaded.

mod event;
mod module;
mod provider;
mod tick;

pub use event::EventLoader;
pub use module::ModuleLoader;
pub use provider::{ClientProviderLoader, ProviderLoader, ServerProviderLoader};
pub use tick::TickLoader;

use crate::config::ExecutionSide;
use crate::di::{Lifetime, ServiceKey, ServiceRegistry};
use crate::middleware::{EventChainFactory, TickChainFactory};
use crate::scheduler::TickScheduler;
use std::sync::Arc;

/// Bind the middleware factories, the tick scheduler and the loader chain.
///
/// Expects `dyn Logger`, `dyn EventBus` and `MetadataTable` to be bound by
/// the caller. Event and tick loaders are transient so each provider loader
/// owns its own handle sets.
pub fn register_loaders(registry: &ServiceRegistry) {
    registry.bind_injectable::<EventChainFactory>(Lifetime::Singleton);
    registry.bind_injectable::<TickChainFactory>(Lifetime::Singleton);
    registry.bind_injectable::<TickScheduler>(Lifetime::Singleton);
    registry.bind_injectable::<EventLoader>(Lifetime::Transient);
    registry.bind_injectable::<TickLoader>(Lifetime::Transient);
    registry.bind_injectable::<ServerProviderLoader>(Lifetime::Singleton);
    registry.bind_injectable::<ClientProviderLoader>(Lifetime::Singleton);

    registry.bind::<dyn ProviderLoader, _>(
        ExecutionSide::Server.provider_loader_key(),
        vec![ServiceKey::of::<ServerProviderLoader>()],
        Lifetime::Singleton,
        |deps| {
            let loader: Arc<dyn ProviderLoader> = deps.resolve::<ServerProviderLoader>()?;
            Ok(loader)
        },
    );
    registry.bind::<dyn ProviderLoader, _>(
        ExecutionSide::Client.provider_loader_key(),
        vec![ServiceKey::of::<ClientProviderLoader>()],
        Lifetime::Singleton,
        |deps| {
            let loader: Arc<dyn ProviderLoader> = deps.resolve::<ClientProviderLoader>()?;
            Ok(loader)
        },
    );
}
