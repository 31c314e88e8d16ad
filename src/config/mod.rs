use crate::di::ServiceKey;
use crate::error::{LifeloomError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const GRACEFUL_SHUTDOWN_TIMEOUT_KEY: &str = "LIFELOOM_GRACEFUL_SHUTDOWN_TIMEOUT";
pub const EXECUTION_SIDE_KEY: &str = "LIFELOOM_SIDE";

const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Key/value configuration store
#[derive(Clone, Debug, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the process environment.
    pub fn from_env() -> Self {
        let service = Self::default();
        for (key, value) in env::vars() {
            service.set(&key, &value);
        }
        service
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    /// Parse a value, `Ok(None)` when the key is absent.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                LifeloomError::configuration(format!("{key}={raw:?} is not valid: {e}"))
            }),
        }
    }
}

/// Which execution context the application runs in. Each side binds its own
/// provider loader in the registry.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExecutionSide {
    #[default]
    Server,
    Client,
}

impl ExecutionSide {
    /// Registry key under which this side's `dyn ProviderLoader` is bound.
    pub fn provider_loader_key(self) -> ServiceKey {
        ServiceKey::token(format!("provider-loader:{self}"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationConfig {
    /// Hard deadline for `Application::stop`, in milliseconds on the wire.
    #[serde(with = "millis")]
    pub graceful_shutdown_timeout: Duration,
    pub side: ExecutionSide,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            graceful_shutdown_timeout: DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT,
            side: ExecutionSide::default(),
        }
    }
}

impl ApplicationConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| LifeloomError::configuration(format!("application config: {e}")))
    }

    /// Build from a [`ConfigService`], falling back to defaults for absent keys.
    pub fn from_config(config: &ConfigService) -> Result<Self> {
        let mut app = Self::default();
        if let Some(ms) = config.get_parsed::<u64>(GRACEFUL_SHUTDOWN_TIMEOUT_KEY)? {
            app.graceful_shutdown_timeout = Duration::from_millis(ms);
        }
        if let Some(side) = config.get_parsed::<ExecutionSide>(EXECUTION_SIDE_KEY)? {
            app.side = side;
        }
        Ok(app)
    }

    pub fn with_graceful_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_shutdown_timeout = timeout;
        self
    }

    pub fn with_side(mut self, side: ExecutionSide) -> Self {
        self.side = side;
        self
    }
}

mod millis {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
