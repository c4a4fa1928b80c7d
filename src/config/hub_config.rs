use crate::errors::{ConfigError, ConfigResult};
use crate::scheduler::{period_from_hz, SamplingPreset, DEFAULT_PERIOD};
use crate::sensors::SensorKind;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Root configuration: an optional `[coordinator]` table plus `[[stream]]` entries
#[derive(Debug, Default, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(rename = "stream", default)]
    pub streams: Vec<StreamEntry>,
}

/// Start timeout used when the config does not set one
pub const DEFAULT_START_TIMEOUT_MS: u64 = 2000;

fn default_start_timeout_ms() -> u64 {
    DEFAULT_START_TIMEOUT_MS
}

/// Shared-source coordinator settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoordinatorConfig {
    /// Abandon a source start after this long
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { start_timeout_ms: DEFAULT_START_TIMEOUT_MS }
    }
}

impl CoordinatorConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }
}

/// One stream to subscribe at startup, matching each `[[stream]]` section
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEntry {
    pub kind: SensorKind,
    pub period_ms: Option<u64>,
    pub frequency_hz: Option<u32>,
    pub preset: Option<SamplingPreset>,
}

impl StreamEntry {
    /// `period_ms`, then `frequency_hz`, then `preset`; none of them means the default period
    pub fn period(&self) -> Duration {
        if let Some(ms) = self.period_ms {
            return Duration::from_millis(ms);
        }
        if let Some(period) = self.frequency_hz.and_then(period_from_hz) {
            return period;
        }
        self.preset.map_or(DEFAULT_PERIOD, SamplingPreset::period)
    }
}

impl HubConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.coordinator.start_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "coordinator.start_timeout_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        for (index, stream) in self.streams.iter().enumerate() {
            if stream.period_ms == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: format!("stream[{}].period_ms", index),
                    reason: format!("'{}' needs a positive sampling period", stream.kind),
                });
            }
            if stream.frequency_hz == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: format!("stream[{}].frequency_hz", index),
                    reason: format!("'{}' needs a positive sampling frequency", stream.kind),
                });
            }
        }
        Ok(())
    }
}

/// Parse and validate config text
pub fn parse_hub_config(content: &str) -> ConfigResult<HubConfig> {
    let parsed: HubConfig = toml::from_str(content)?;
    parsed.validate()?;
    Ok(parsed)
}

/// Loads config from TOML file
pub fn load_hub_config(path: &str) -> ConfigResult<HubConfig> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::LoadError {
        path: path.to_string(),
        source,
    })?;
    parse_hub_config(&content)
}
