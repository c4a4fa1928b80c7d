use crate::config::CoordinatorConfig;
use crate::coordinator::{CoordinatorStatus, MotionCoordinator};
use crate::direct::DirectSensor;
use crate::errors::{HubError, HubResult};
use crate::registry::ConsumerId;
use crate::scheduler::hz_from_period;
use crate::sensors::simulated::SimulatedSource;
use crate::sensors::{SampleSource, SensorKind};
use crate::sink::{EventSink, SensorStream};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct DirectStatus {
    pub kind: SensorKind,
    pub subscriber: Option<ConsumerId>,
    pub is_running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HubStatus {
    /// Live subscriptions across shared and direct kinds
    pub subscriptions: usize,
    pub motion: CoordinatorStatus,
    pub direct: Vec<DirectStatus>,
}

/// Application-facing entry point.
///
/// Gravity and user acceleration go through the shared motion coordinator;
/// every other kind goes to its own direct sensor. Consumer ids are unique
/// across both.
pub struct SensorHub {
    motion: MotionCoordinator,
    direct: HashMap<SensorKind, DirectSensor>,
    routes: RwLock<HashMap<ConsumerId, SensorKind>>,
    next_id: AtomicU64,
    config: CoordinatorConfig,
}

impl SensorHub {
    pub fn new(motion_source: impl SampleSource + 'static, config: CoordinatorConfig) -> Self {
        Self {
            motion: MotionCoordinator::with_config(motion_source, &config),
            direct: HashMap::new(),
            routes: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Hub backed entirely by simulated sources
    pub fn simulated(config: CoordinatorConfig) -> Self {
        let mut hub = Self::new(SimulatedSource::motion(), config);
        for kind in SensorKind::ALL.into_iter().filter(|k| !k.is_shared()) {
            if let Err(e) = hub.add_direct_source(kind, SimulatedSource::for_kind(kind)) {
                warn!("[hub] no simulated source for {}: {}", kind, e);
            }
        }
        hub
    }

    /// Attach the dedicated source for a non-shared kind
    pub fn add_direct_source(
        &mut self,
        kind: SensorKind,
        source: impl SampleSource + 'static,
    ) -> HubResult<()> {
        if kind.is_shared() {
            return Err(HubError::UnsupportedSensor { kind });
        }
        self.direct
            .insert(kind, DirectSensor::with_config(kind, source, &self.config));
        Ok(())
    }

    pub fn motion(&self) -> &MotionCoordinator {
        &self.motion
    }

    /// Subscribe `sink` to `kind` at `period`
    pub async fn subscribe(
        &self,
        kind: SensorKind,
        period: Duration,
        sink: impl EventSink,
    ) -> HubResult<ConsumerId> {
        validate_period(kind, period)?;
        let direct = if kind.is_shared() {
            None
        } else {
            Some(self.direct.get(&kind).ok_or(HubError::UnsupportedSensor { kind })?)
        };

        let id = ConsumerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match direct {
            Some(sensor) => sensor.subscribe(id, period, Box::new(sink)).await?,
            None => self.motion.register(id, kind, period, Box::new(sink)).await?,
        }
        self.routes.write().await.insert(id, kind);
        info!(
            "[hub] {} subscribed to {} every {:?} ({:.1} Hz)",
            id,
            kind,
            period,
            hz_from_period(period)
        );
        self.sweep_routes().await;
        Ok(id)
    }

    /// Subscribe and get the events back as a stream
    pub async fn subscribe_stream(
        &self,
        kind: SensorKind,
        period: Duration,
    ) -> HubResult<(ConsumerId, SensorStream)> {
        let (tx, stream) = SensorStream::channel();
        let id = self.subscribe(kind, period, tx).await?;
        Ok((id, stream))
    }

    /// Change a subscription's period. Unknown ids are ignored.
    pub async fn update_rate(&self, id: ConsumerId, period: Duration) -> HubResult<()> {
        let Some(kind) = self.routes.read().await.get(&id).copied() else {
            debug!("[hub] update_rate for unknown {}", id);
            return Ok(());
        };
        validate_period(kind, period)?;
        match self.direct.get(&kind) {
            Some(sensor) => sensor.update_rate(id, period).await,
            None => self.motion.update_period(id, period).await,
        }
        if !self.is_live(id, kind).await {
            self.routes.write().await.remove(&id);
            debug!("[hub] {} was dropped, route removed", id);
        }
        Ok(())
    }

    /// End a subscription. Unknown ids are ignored.
    pub async fn unsubscribe(&self, id: ConsumerId) {
        let Some(kind) = self.routes.write().await.remove(&id) else {
            return;
        };
        match self.direct.get(&kind) {
            Some(sensor) => sensor.unsubscribe(id).await,
            None => self.motion.unregister(id).await,
        }
        info!("[hub] {} unsubscribed from {}", id, kind);
    }

    pub async fn status(&self) -> HubStatus {
        self.sweep_routes().await;
        let mut direct = Vec::with_capacity(self.direct.len());
        for sensor in self.direct.values() {
            direct.push(DirectStatus {
                kind: sensor.kind(),
                subscriber: sensor.subscriber().await,
                is_running: sensor.is_running().await,
            });
        }
        direct.sort_by_key(|s| s.kind);
        HubStatus {
            subscriptions: self.routes.read().await.len(),
            motion: self.motion.status().await,
            direct,
        }
    }

    pub async fn shutdown(&self) {
        self.routes.write().await.clear();
        self.motion.shutdown().await;
        for sensor in self.direct.values() {
            sensor.shutdown().await;
        }
        info!("[hub] shut down");
    }

    /// Whether the coordinator or direct sensor still holds `id`
    async fn is_live(&self, id: ConsumerId, kind: SensorKind) -> bool {
        match self.direct.get(&kind) {
            Some(sensor) => sensor.subscriber().await == Some(id),
            None => self.motion.contains(id).await,
        }
    }

    /// Forget routes whose consumer was dropped behind the hub's back,
    /// e.g. pruned after its stream closed
    async fn sweep_routes(&self) {
        let routes: Vec<_> = self.routes.read().await.iter().map(|(id, kind)| (*id, *kind)).collect();
        let mut dead = Vec::new();
        for (id, kind) in routes {
            if !self.is_live(id, kind).await {
                dead.push(id);
            }
        }
        if dead.is_empty() {
            return;
        }
        let mut routes = self.routes.write().await;
        for id in dead {
            routes.remove(&id);
            debug!("[hub] {} was dropped, route removed", id);
        }
    }
}

fn validate_period(kind: SensorKind, period: Duration) -> HubResult<()> {
    if period.is_zero() {
        return Err(HubError::InvalidPeriod {
            kind,
            reason: "sampling period must be positive".to_string(),
        });
    }
    Ok(())
}
