use crate::errors::StreamError;
use crate::sensors::{SensorKind, Value};
use serde::{Deserialize, Serialize};

/// One converted reading delivered to a consumer
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Reading {
    /// Which stream this reading belongs to
    pub kind: SensorKind,
    /// Converted value (m/s², rad/s, µT or hPa depending on kind)
    pub value: Value,
    /// Monotonic timestamp of the originating sample in nanoseconds
    pub timestamp_ns: u64,
}

/// Everything a sink can receive
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SensorEvent {
    Reading(Reading),
    Error { error: StreamError },
}

impl SensorEvent {
    pub fn error(error: impl Into<StreamError>) -> Self {
        SensorEvent::Error { error: error.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SensorEvent::Error { .. })
    }

    /// Serialize to a single JSON line for logging or forwarding
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<Reading> for SensorEvent {
    fn from(reading: Reading) -> Self {
        SensorEvent::Reading(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{SourceError, StartError};

    #[test]
    fn test_reading_serialization() {
        let event = SensorEvent::Reading(Reading {
            kind: SensorKind::Gravity,
            value: Value::Vector([0.0, -9.81, 0.0]),
            timestamp_ns: 1_000,
        });

        let json = event.to_json().unwrap();
        assert!(json.contains("\"event\":\"reading\""));
        assert!(json.contains("\"kind\":\"gravity\""));
        assert!(json.contains("-9.81"));

        let decoded: SensorEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_scalar_reading_serialization() {
        let event = SensorEvent::Reading(Reading {
            kind: SensorKind::Barometer,
            value: Value::Scalar(1013.25),
            timestamp_ns: 7,
        });
        let json = event.to_json().unwrap();
        assert!(json.contains("\"value\":1013.25"));
    }

    #[test]
    fn test_error_event_serialization() {
        let event = SensorEvent::error(StartError::PermissionDenied {
            source_name: "motion".to_string(),
        });
        assert!(event.is_error());

        let json = event.to_json().unwrap();
        assert!(json.contains("\"event\":\"error\""));
        assert!(json.contains("PermissionDenied"));

        let runtime = SensorEvent::error(SourceError {
            source_name: "motion".to_string(),
            reason: "device lost".to_string(),
        });
        let decoded: SensorEvent = serde_json::from_str(&runtime.to_json().unwrap()).unwrap();
        assert_eq!(decoded, runtime);
    }
}
