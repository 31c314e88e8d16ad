//! # Lifeloom
//!
//! A process lifecycle and dependency wiring runtime for modular applications
//! built from independently registered providers.
//!
//! ## Features
//!
//! - **Service Registry**: singleton and transient bindings with cycle detection
//! - **Application State Machine**: `start()`/`stop()` with graceful, timeout-bounded shutdown
//! - **Loader Chain**: attaches provider event handlers and tick handlers, and detaches them again
//! - **Middleware Chains**: fixed logging → context wrapping around every handler
//! - **Tick Scheduler**: cancellable repeating tasks that survive failing runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lifeloom::prelude::*;
//! use std::ops::ControlFlow;
//! use std::time::Duration;
//!
//! #[derive(Default)]
//! struct Presence;
//!
//! struct PresenceModule;
//!
//! #[async_trait]
//! impl Module for PresenceModule {
//!     fn providers(&self, _registry: &ServiceRegistry) -> anyhow::Result<Vec<ProviderRef>> {
//!         Ok(vec![ProviderRef::new(Arc::new(Presence))])
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let metadata = Arc::new(MetadataTable::new());
//!     metadata.on_event(
//!         EventHandlerMetadata::new("player.joined", "on_join"),
//!         |_presence: Arc<Presence>, invocation| async move {
//!             tracing::info!(args = ?invocation.args, "player joined");
//!             Ok(ControlFlow::Continue(()))
//!         },
//!     );
//!     metadata.on_tick(
//!         TickHandlerMetadata::new("presence.sweep", "sweep", Duration::from_secs(30)),
//!         |_presence: Arc<Presence>, _invocation| async { Ok(ControlFlow::Continue(())) },
//!     );
//!
//!     let app = Application::builder()
//!         .metadata(metadata)
//!         .module(PresenceModule)
//!         .build();
//!
//!     app.start().await?;
//!     app.wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod di;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod logging;
pub mod messaging;
pub mod metadata;
pub mod middleware;
pub mod scheduler;

// Re-export core types
pub use di::{Dependencies, Injectable, Lifetime, ServiceKey, ServiceRegistry};
pub use error::{LifeloomError, Result};
pub use lifecycle::{Application, ApplicationState, Module};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;

/// Prelude module for convenient imports
///
/// ```
/// use lifeloom::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ApplicationConfig, ConfigService, ExecutionSide};
    pub use crate::di::{
        Binder, Dependencies, Injectable, Lifetime, RegistryScope, ServiceKey, ServiceRegistry,
    };
    pub use crate::error::{LifeloomError, Result};
    pub use crate::lifecycle::{
        Application, ApplicationBuilder, ApplicationState, HostSignal, LifecycleError,
        LifecycleEvent, ManualHostSignal, Module, ProcessSignal,
    };
    pub use crate::logging::{Logger, MemoryLogger, TracingLogger};
    pub use crate::messaging::{EventBus, LocalEventBus};
    pub use crate::metadata::{
        EventHandlerMetadata, HandlerKind, MetadataTable, ProviderRef, TickHandlerMetadata,
    };
    pub use crate::middleware::{Context, HandlerResult, Invocation, Middleware, Next};
    pub use crate::scheduler::TickScheduler;
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}
