//! Lifecycle-specific error types

use crate::error::LifeloomError;
use crate::lifecycle::ApplicationState;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during lifecycle operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A module's initialization or provider loading failed
    #[error("Failed to load module {module}")]
    ModuleLoad {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    /// Operation not allowed in the current state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ApplicationState,
    },

    /// Graceful shutdown did not finish in time. Reported through logs;
    /// `stop()` itself returns `false`.
    #[error("Graceful shutdown did not complete within {timeout:?}")]
    ShutdownTimeout { timeout: Duration },

    #[error(transparent)]
    Registry(#[from] LifeloomError),
}

impl LifecycleError {
    pub fn module_load(module: impl Into<String>, source: anyhow::Error) -> Self {
        Self::ModuleLoad {
            module: module.into(),
            source,
        }
    }
}

/// A specialized Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn module_load_keeps_the_cause() {
        let err = LifecycleError::module_load("billing", anyhow::anyhow!("ledger locked"));
        assert_eq!(err.to_string(), "Failed to load module billing");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("ledger locked"));
    }

    #[test]
    fn invalid_state_names_the_state() {
        let err = LifecycleError::InvalidState {
            operation: "add a module",
            state: ApplicationState::Running,
        };
        assert_eq!(err.to_string(), "Cannot add a module while RUNNING");
    }
}
