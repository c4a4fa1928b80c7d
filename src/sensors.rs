use crate::errors::{SourceError, StartError, StartResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

pub mod simulated;
#[cfg(test)]
pub(crate) mod mock;

/// Standard gravity used to convert device-native g units to m/s²
pub const STANDARD_GRAVITY: f64 = 9.8;

/// Kilopascal to hectopascal
const KPA_TO_HPA: f64 = 10.0;

pub type Vec3 = [f64; 3];

/// Every stream the hub can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Gravity component of device motion
    Gravity,
    /// Device motion with gravity removed
    UserAcceleration,
    /// Raw accelerometer, gravity included
    Accelerometer,
    Gyroscope,
    Magnetometer,
    /// Barometric pressure
    Barometer,
}

impl SensorKind {
    pub const ALL: [SensorKind; 6] = [
        SensorKind::Gravity,
        SensorKind::UserAcceleration,
        SensorKind::Accelerometer,
        SensorKind::Gyroscope,
        SensorKind::Magnetometer,
        SensorKind::Barometer,
    ];

    /// Whether this kind is derived from the shared motion source
    pub fn is_shared(self) -> bool {
        match self {
            SensorKind::Gravity | SensorKind::UserAcceleration => true,
            SensorKind::Accelerometer
            | SensorKind::Gyroscope
            | SensorKind::Magnetometer
            | SensorKind::Barometer => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::Gravity => "gravity",
            SensorKind::UserAcceleration => "user_acceleration",
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
            SensorKind::Magnetometer => "magnetometer",
            SensorKind::Barometer => "barometer",
        }
    }

    /// Convert a device-native value into the unit delivered to consumers.
    ///
    /// Motion quantities arrive in g with the platform's inverted sign
    /// convention and leave in m/s². Pressure arrives in kPa and leaves in hPa.
    /// Gyroscope (rad/s) and magnetometer (µT) pass through.
    pub fn transform(self, value: Value) -> Value {
        match self {
            SensorKind::Gravity | SensorKind::UserAcceleration | SensorKind::Accelerometer => {
                value.scaled(-STANDARD_GRAVITY)
            }
            SensorKind::Gyroscope | SensorKind::Magnetometer => value,
            SensorKind::Barometer => value.scaled(KPA_TO_HPA),
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One derived quantity carried by a sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Vector(Vec3),
    Scalar(f64),
}

impl Value {
    pub fn scaled(self, factor: f64) -> Value {
        match self {
            Value::Vector([x, y, z]) => Value::Vector([x * factor, y * factor, z * factor]),
            Value::Scalar(s) => Value::Scalar(s * factor),
        }
    }

    pub fn as_vector(&self) -> Option<Vec3> {
        match self {
            Value::Vector(v) => Some(*v),
            Value::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(s) => Some(*s),
            Value::Vector(_) => None,
        }
    }
}

/// One reading from a sample source. All quantities share the timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Monotonic timestamp in nanoseconds
    pub timestamp_ns: u64,
    quantities: Vec<(SensorKind, Value)>,
}

impl Sample {
    pub fn new(timestamp_ns: u64) -> Self {
        Self { timestamp_ns, quantities: Vec::new() }
    }

    pub fn with(mut self, kind: SensorKind, value: Value) -> Self {
        match self.quantities.iter_mut().find(|(k, _)| *k == kind) {
            Some(slot) => slot.1 = value,
            None => self.quantities.push((kind, value)),
        }
        self
    }

    pub fn with_vector(self, kind: SensorKind, vector: Vec3) -> Self {
        self.with(kind, Value::Vector(vector))
    }

    pub fn get(&self, kind: SensorKind) -> Option<Value> {
        self.quantities
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| *v)
    }

}

/// What a running source pushes to its owner
#[derive(Debug, Clone)]
pub enum SourceEvent {
    Sample(Sample),
    /// Terminal: the session is dead once this is sent
    Error(SourceError),
}

pub type SourceSender = mpsc::UnboundedSender<SourceEvent>;
pub type SourceReceiver = mpsc::UnboundedReceiver<SourceEvent>;

/// Hardware capability producing samples at one configurable period.
///
/// `start` hands the source a fresh event channel for the new session. A source
/// supports a single session: callers stop before starting again. `stop` is
/// idempotent and must drop the session's sender.
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn start(&mut self, period: Duration, events: SourceSender) -> StartResult<()>;
    async fn stop(&mut self);
    fn name(&self) -> &str;
}

/// Start `source`, giving up after `limit`.
///
/// A timed-out start is stopped before the error is returned so a late
/// completion cannot leave a session running.
pub async fn start_source(
    source: &mut dyn SampleSource,
    period: Duration,
    events: SourceSender,
    limit: Duration,
) -> StartResult<()> {
    let outcome = tokio::time::timeout(limit, source.start(period, events)).await;
    match outcome {
        Ok(result) => result,
        Err(_) => {
            source.stop().await;
            Err(StartError::Timeout {
                source_name: source.name().to_string(),
                timeout_ms: limit.as_millis() as u64,
            })
        }
    }
}
