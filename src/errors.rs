use crate::sensors::SensorKind;
use crate::registry::ConsumerId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to bring a sample source up
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartError {
    #[error("Sensor source '{source_name}' is unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("Permission denied for sensor source '{source_name}'")]
    PermissionDenied { source_name: String },

    #[error("Sensor source '{source_name}' did not start within {timeout_ms}ms")]
    Timeout { source_name: String, timeout_ms: u64 },

    #[error("Sensor source '{source_name}' already has an active session")]
    AlreadyRunning { source_name: String },
}

/// Failure reported by a source while its session is running
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Sensor source '{source_name}' failed: {reason}")]
pub struct SourceError {
    pub source_name: String,
    pub reason: String,
}

/// Error delivered to a consumer's sink in place of readings
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum StreamError {
    #[error("Sensor stream could not start: {0}")]
    Start(#[from] StartError),

    #[error("Sensor stream interrupted: {0}")]
    Runtime(#[from] SourceError),
}

/// Consumer registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Consumer {id} is already registered")]
    DuplicateConsumer { id: ConsumerId },
}

/// Errors returned by the application-facing hub
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("Invalid sampling period for '{kind}': {reason}")]
    InvalidPeriod { kind: SensorKind, reason: String },

    #[error("No sample source configured for '{kind}'")]
    UnsupportedSensor { kind: SensorKind },

    #[error("Sensor '{kind}' already has an active subscriber ({active})")]
    SensorBusy { kind: SensorKind, active: ConsumerId },

    #[error("Consumer registration failed: {0}")]
    Registry(#[from] RegistryError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from '{path}': {source}")]
    LoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration format: {0}")]
    FormatError(#[from] toml::de::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<HubError> for String {
    fn from(error: HubError) -> Self {
        error.to_string()
    }
}

impl From<ConfigError> for String {
    fn from(error: ConfigError) -> Self {
        error.to_string()
    }
}

/// Result type aliases for convenience
pub type HubResult<T> = Result<T, HubError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type RegistryResult<T> = Result<T, RegistryError>;
pub type StartResult<T> = Result<T, StartError>;
