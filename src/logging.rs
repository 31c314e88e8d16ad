//! Logger collaborator
//!
//! Runtime components log through the [`Logger`] trait so the backend can be
//! swapped. [`TracingLogger`] forwards to `tracing`; [`MemoryLogger`] keeps
//! entries in memory so tests can assert on what was reported.

use std::error::Error as StdError;
use std::sync::{Mutex, PoisonError};
use tracing::Level;

/// Logging sink used by the lifecycle engine. Implementations must never panic.
pub trait Logger: Send + Sync + 'static {
    fn log(&self, level: Level, message: &str, error: Option<&(dyn StdError + 'static)>);

    fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message, None);
    }

    fn info(&self, message: &str) {
        self.log(Level::INFO, message, None);
    }

    fn warn(&self, message: &str, error: Option<&(dyn StdError + 'static)>) {
        self.log(Level::WARN, message, error);
    }

    fn error(&self, message: &str, error: Option<&(dyn StdError + 'static)>) {
        self.log(Level::ERROR, message, error);
    }
}

/// Default [`Logger`] backed by `tracing` macros.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str, error: Option<&(dyn StdError + 'static)>) {
        let error = error.map(ToString::to_string);
        let error = error.as_deref();
        match level {
            Level::ERROR => tracing::error!(error, "{message}"),
            Level::WARN => tracing::warn!(error, "{message}"),
            Level::INFO => tracing::info!(error, "{message}"),
            Level::DEBUG => tracing::debug!(error, "{message}"),
            _ => tracing::trace!(error, "{message}"),
        }
    }
}

/// One entry captured by [`MemoryLogger`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
    pub error: Option<String>,
}

/// [`Logger`] that records every entry, for assertions in tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of entries logged at exactly `level`.
    pub fn count(&self, level: Level) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.level == level)
            .count()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|entry| entry.level == level && entry.message.contains(needle))
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, message: &str, error: Option<&(dyn StdError + 'static)>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogEntry {
                level,
                message: message.to_string(),
                error: error.map(ToString::to_string),
            });
    }
}
