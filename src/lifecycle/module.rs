use crate::di::ServiceRegistry;
use crate::metadata::ProviderRef;
use async_trait::async_trait;

/// Optional participant in the application lifecycle.
///
/// Modules are added before `start()`. They are initialized in insertion
/// order while the application starts, and cleaned up in reverse order while
/// it stops.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use lifeloom::di::ServiceRegistry;
/// use lifeloom::lifecycle::Module;
/// use lifeloom::metadata::ProviderRef;
/// use std::sync::Arc;
///
/// struct Matchmaker;
///
/// struct MatchmakingModule;
///
/// #[async_trait]
/// impl Module for MatchmakingModule {
///     fn name(&self) -> &str {
///         "matchmaking"
///     }
///
///     fn providers(&self, _registry: &ServiceRegistry) -> anyhow::Result<Vec<ProviderRef>> {
///         Ok(vec![ProviderRef::new(Arc::new(Matchmaker))])
///     }
/// }
/// ```
#[async_trait]
pub trait Module: Send + Sync + 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called during shutdown. Failures are logged and do not stop the
    /// remaining modules from cleaning up.
    async fn cleanup(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Provider instances whose handlers should be attached once the module
    /// is initialized.
    fn providers(&self, _registry: &ServiceRegistry) -> anyhow::Result<Vec<ProviderRef>> {
        Ok(Vec::new())
    }
}
