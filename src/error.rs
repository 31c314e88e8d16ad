use thiserror::Error;

pub type Result<T> = std::result::Result<T, LifeloomError>;

/// Configuration-time failures raised by the registry and the loader chain.
///
/// These are fatal to the caller: a missing binding or a dependency cycle
/// means the runtime was wired incorrectly.
#[derive(Debug, Error)]
pub enum LifeloomError {
    #[error("Unresolved dependency: {key}{}", required_by_suffix(.required_by))]
    UnresolvedDependency {
        key: String,
        required_by: Option<String>,
    },

    #[error("Cyclic dependency detected: {cycle}")]
    CyclicDependency { cycle: String },

    #[error("Failed to downcast {key} to {expected}")]
    DowncastFailed { key: String, expected: String },

    #[error("Invalid configuration: {message}")]
    Configuration { message: String },
}

impl LifeloomError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    required_by
        .as_ref()
        .map(|requirer| format!(" (required by {requirer})"))
        .unwrap_or_default()
}
