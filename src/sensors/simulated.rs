use super::{SampleSource, Sample, SensorKind, SourceEvent, SourceSender, Value, Vec3};
use crate::errors::{StartError, StartResult};
use async_trait::async_trait;
use std::f64::consts::TAU;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Interval-driven source that synthesises plausible readings.
///
/// Values are in device-native units (g, rad/s, µT, kPa) so they go through
/// the same transform table as hardware data.
pub struct SimulatedSource {
    name: String,
    kinds: Vec<SensorKind>,
    epoch: Instant,
    task: Option<JoinHandle<()>>,
}

impl SimulatedSource {
    pub fn new(name: impl Into<String>, kinds: Vec<SensorKind>) -> Self {
        Self {
            name: name.into(),
            kinds,
            epoch: Instant::now(),
            task: None,
        }
    }

    /// Composite device-motion source carrying gravity and user acceleration
    pub fn motion() -> Self {
        Self::new(
            "simulated-motion",
            vec![SensorKind::Gravity, SensorKind::UserAcceleration],
        )
    }

    pub fn for_kind(kind: SensorKind) -> Self {
        Self::new(format!("simulated-{}", kind), vec![kind])
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

#[async_trait]
impl SampleSource for SimulatedSource {
    async fn start(&mut self, period: Duration, events: SourceSender) -> StartResult<()> {
        if self.task.is_some() {
            return Err(StartError::AlreadyRunning { source_name: self.name.clone() });
        }
        if period.is_zero() {
            return Err(StartError::Unavailable {
                source_name: self.name.clone(),
                reason: "zero sampling period".to_string(),
            });
        }

        let kinds = self.kinds.clone();
        let epoch = self.epoch;
        let name = self.name.clone();
        info!("[simulated] '{}' starting at {:?}", name, period);

        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let elapsed = epoch.elapsed();
                if events.send(SourceEvent::Sample(synthesize(&kinds, elapsed))).is_err() {
                    debug!("[simulated] '{}' receiver gone, stopping", name);
                    break;
                }
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("[simulated] '{}' stopped", self.name);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SimulatedSource {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn synthesize(kinds: &[SensorKind], elapsed: Duration) -> Sample {
    let t = elapsed.as_secs_f64();
    kinds.iter().fold(Sample::new(elapsed.as_nanos() as u64), |sample, kind| {
        sample.with(*kind, synthetic_value(*kind, t))
    })
}

fn synthetic_value(kind: SensorKind, t: f64) -> Value {
    match kind {
        SensorKind::Gravity => Value::Vector(gravity(t)),
        SensorKind::UserAcceleration => Value::Vector(user_acceleration(t)),
        SensorKind::Accelerometer => {
            let [gx, gy, gz] = gravity(t);
            let [ux, uy, uz] = user_acceleration(t);
            Value::Vector([gx + ux, gy + uy, gz + uz])
        }
        SensorKind::Gyroscope => Value::Vector([0.02 * (TAU * 0.5 * t).sin(), 0.0, 0.2]),
        SensorKind::Magnetometer => {
            let heading = 0.2 * t;
            Value::Vector([22.0 * heading.cos(), 22.0 * heading.sin(), -40.0])
        }
        SensorKind::Barometer => Value::Scalar(101.325 - 0.0005 * (TAU * 0.05 * t).sin()),
    }
}

/// Unit vector slowly tipping about the x axis
fn gravity(t: f64) -> Vec3 {
    let tilt = 0.3 * (TAU * 0.1 * t).sin();
    [0.0, -tilt.cos(), -tilt.sin()]
}

/// Small hand shake along x
fn user_acceleration(t: f64) -> Vec3 {
    [0.05 * (TAU * 1.5 * t).sin(), 0.0, 0.0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_motion_sample_carries_both_quantities() {
        let sample = synthesize(
            &[SensorKind::Gravity, SensorKind::UserAcceleration],
            Duration::from_millis(250),
        );
        assert_eq!(sample.timestamp_ns, 250_000_000);

        let g = sample.get(SensorKind::Gravity).unwrap().as_vector().unwrap();
        let norm = (g[0] * g[0] + g[1] * g[1] + g[2] * g[2]).sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
        assert!(sample.get(SensorKind::UserAcceleration).is_some());
        assert!(sample.get(SensorKind::Barometer).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_at_requested_period_until_stopped() {
        let mut source = SimulatedSource::motion();
        let (tx, mut rx) = mpsc::unbounded_channel();
        source.start(Duration::from_millis(100), tx).await.unwrap();
        assert!(source.is_running());

        let mut stamps = Vec::new();
        for _ in 0..3 {
            match rx.recv().await {
                Some(SourceEvent::Sample(sample)) => stamps.push(sample.timestamp_ns),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert!(stamps.windows(2).all(|w| w[1] - w[0] == 100_000_000));

        source.stop().await;
        assert!(!source.is_running());
        // Task aborted: the channel drains and closes
        while rx.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn test_second_start_rejected() {
        let mut source = SimulatedSource::for_kind(SensorKind::Gyroscope);
        let (tx, _rx) = mpsc::unbounded_channel();
        source.start(Duration::from_millis(10), tx.clone()).await.unwrap();

        let err = source.start(Duration::from_millis(10), tx).await.unwrap_err();
        assert!(matches!(err, StartError::AlreadyRunning { .. }));
        source.stop().await;
    }
}
