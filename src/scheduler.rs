use crate::registry::ConsumerRegistry;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Period used when a consumer does not ask for one
pub const DEFAULT_PERIOD: Duration = SamplingPreset::Normal.period();

/// Named sampling periods matching the usual mobile sensor intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingPreset {
    /// 5 Hz
    Normal,
    /// ~15 Hz, suitable for UI updates
    Ui,
    /// 50 Hz
    Game,
}

impl SamplingPreset {
    pub const fn period(self) -> Duration {
        match self {
            SamplingPreset::Normal => Duration::from_millis(200),
            SamplingPreset::Ui => Duration::from_micros(66_667),
            SamplingPreset::Game => Duration::from_millis(20),
        }
    }
}

/// Convert a frequency in Hz to a sampling period. Zero maps to `None`.
pub fn period_from_hz(frequency: u32) -> Option<Duration> {
    if frequency == 0 {
        return None;
    }
    Some(Duration::from_nanos(1_000_000_000 / frequency as u64))
}

pub fn hz_from_period(period: Duration) -> f64 {
    if period.is_zero() {
        return f64::INFINITY;
    }
    1.0 / period.as_secs_f64()
}

/// Single hardware period for every consumer of a shared source.
///
/// The fastest request wins: consumers may receive more often than asked, never
/// less. `None` when nobody is registered.
pub fn effective_period(registry: &ConsumerRegistry) -> Option<Duration> {
    registry.periods().min()
}
