//! Application lifecycle
//!
//! # Lifecycle Phases
//!
//! ```text
//! start()
//!   1. Registry created (binders run)
//!   2. Module::initialize + providers loaded (each module, insertion order)
//!   3. Host stop listener registered
//!   4. "start" once-event
//!    ↓
//! [Running...]
//!    ↓
//! stop() / host stop signal            ← raced against gracefulShutdownTimeout
//!   5. "stop" once-event
//!   6. Module::cleanup (each module, reverse order, failures logged)
//!   7. Providers unloaded (event subscriptions removed, ticks cancelled)
//!   8. Host stop listener removed
//!   9. Registry torn down
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use lifeloom::lifecycle::{Application, Module};
//!
//! struct DatabaseModule;
//!
//! #[async_trait]
//! impl Module for DatabaseModule {
//!     async fn initialize(&self) -> anyhow::Result<()> {
//!         tracing::info!("Opening database connections");
//!         Ok(())
//!     }
//!
//!     async fn cleanup(&self) -> anyhow::Result<()> {
//!         tracing::info!("Closing database connections");
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> Result<(), lifeloom::lifecycle::LifecycleError> {
//! let app = Application::builder().module(DatabaseModule).build();
//! app.start().await?;
//! let clean = app.stop().await;
//! # Ok(())
//! # }
//! ```

mod application;
mod error;
mod events;
mod host;
mod module;

pub use application::{Application, ApplicationBuilder, ApplicationState};
pub use error::{LifecycleError, Result};
pub use events::{LifecycleEvent, LifecycleEvents};
pub use host::{
    HostListener, HostSignal, HostSubscription, ManualHostSignal, ProcessSignal, shutdown_signal,
};
pub use module::Module;
