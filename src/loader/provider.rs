use crate::di::{Dependencies, Injectable, ServiceKey};
use crate::error::Result;
use crate::loader::{EventLoader, TickLoader};
use crate::metadata::ProviderRef;
use async_trait::async_trait;
use std::sync::Arc;

/// Attaches and detaches a provider's cross-cutting registrations.
#[async_trait]
pub trait ProviderLoader: Send + Sync + 'static {
    async fn load(&self, provider: &ProviderRef) -> Result<()>;

    /// Detach everything attached since the last unload.
    async fn unload(&self) -> Result<()>;
}

/// Event loader first, then tick loader.
struct SubLoaders {
    events: Arc<EventLoader>,
    ticks: Arc<TickLoader>,
}

impl SubLoaders {
    fn inject(deps: &Dependencies) -> Result<Self> {
        Ok(Self {
            events: deps.resolve::<EventLoader>()?,
            ticks: deps.resolve::<TickLoader>()?,
        })
    }

    fn dependencies() -> Vec<ServiceKey> {
        vec![ServiceKey::of::<EventLoader>(), ServiceKey::of::<TickLoader>()]
    }

    fn load(&self, provider: &ProviderRef) {
        let events = self.events.load(provider);
        let ticks = self.ticks.load(provider);
        tracing::debug!(provider = provider.type_name(), events, ticks, "provider loaded");
    }

    fn unload(&self) {
        let events = self.events.unload();
        let ticks = self.ticks.unload();
        tracing::debug!(events, ticks, "providers unloaded");
    }
}

/// Provider loader bound for [`ExecutionSide::Server`](crate::config::ExecutionSide::Server).
pub struct ServerProviderLoader {
    loaders: SubLoaders,
}

#[async_trait]
impl ProviderLoader for ServerProviderLoader {
    async fn load(&self, provider: &ProviderRef) -> Result<()> {
        self.loaders.load(provider);
        Ok(())
    }

    async fn unload(&self) -> Result<()> {
        self.loaders.unload();
        Ok(())
    }
}

impl Injectable for ServerProviderLoader {
    fn dependencies() -> Vec<ServiceKey> {
        SubLoaders::dependencies()
    }

    fn inject(deps: &Dependencies) -> Result<Self> {
        Ok(Self {
            loaders: SubLoaders::inject(deps)?,
        })
    }
}

/// Provider loader bound for [`ExecutionSide::Client`](crate::config::ExecutionSide::Client).
pub struct ClientProviderLoader {
    loaders: SubLoaders,
}

#[async_trait]
impl ProviderLoader for ClientProviderLoader {
    async fn load(&self, provider: &ProviderRef) -> Result<()> {
        self.loaders.load(provider);
        Ok(())
    }

    async fn unload(&self) -> Result<()> {
        self.loaders.unload();
        Ok(())
    }
}

impl Injectable for ClientProviderLoader {
    fn dependencies() -> Vec<ServiceKey> {
        SubLoaders::dependencies()
    }

    fn inject(deps: &Dependencies) -> Result<Self> {
        Ok(Self {
            loaders: SubLoaders::inject(deps)?,
        })
    }
}
