use crate::di::ServiceRegistry;
use crate::lifecycle::{LifecycleError, Module, Result};
use crate::loader::ProviderLoader;
use crate::logging::Logger;
use std::sync::Arc;

/// Initializes modules and hands their providers to the provider loader.
pub struct ModuleLoader {
    provider_loader: Arc<dyn ProviderLoader>,
    registry: Arc<ServiceRegistry>,
    logger: Arc<dyn Logger>,
}

impl ModuleLoader {
    pub fn new(
        provider_loader: Arc<dyn ProviderLoader>,
        registry: Arc<ServiceRegistry>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            provider_loader,
            registry,
            logger,
        }
    }

    /// Run `initialize()`, then load every provider the module exposes.
    ///
    /// # Errors
    /// Any failure is wrapped in [`LifecycleError::ModuleLoad`].
    pub async fn load(&self, module: &dyn Module) -> Result<()> {
        let name = module.name().to_string();
        self.logger.debug(&format!("loading module {name}"));

        module
            .initialize()
            .await
            .map_err(|source| LifecycleError::module_load(&name, source))?;

        let providers = module
            .providers(&self.registry)
            .map_err(|source| LifecycleError::module_load(&name, source))?;

        for provider in &providers {
            self.provider_loader
                .load(provider)
                .await
                .map_err(|e| LifecycleError::module_load(&name, e.into()))?;
        }

        self.logger
            .debug(&format!("module {name} loaded with {} providers", providers.len()));
        Ok(())
    }

    /// Detach every provider registration made through this loader.
    pub async fn unload(&self) -> Result<()> {
        self.provider_loader.unload().await?;
        self.logger.debug("modules unloaded");
        Ok(())
    }
}
