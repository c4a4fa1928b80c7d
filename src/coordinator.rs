//! Multiplexes one shared motion source across many logical consumers.
//!
//! The coordinator owns the only session on the source. Consumers register
//! with their own kind and sampling period; the session runs at the fastest
//! requested period and each raw sample is fanned out to the consumers whose
//! kind it carries. All state sits behind one lock, and source events are
//! drained by a per-session pump task that takes the same lock, so fan-out
//! never races registration changes.

use crate::config::CoordinatorConfig;
use crate::errors::{RegistryResult, SourceError, StartResult, StreamError};
use crate::messages::{Reading, SensorEvent};
use crate::registry::{ConsumerId, ConsumerRegistry};
use crate::scheduler::effective_period;
use crate::sensors::{start_source, Sample, SampleSource, SensorKind, SourceEvent, SourceReceiver};
use crate::sink::{EventSink, SinkClosed};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of the shared source session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running { period: Duration, generation: u64 },
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running { .. })
    }

    pub fn period(&self) -> Option<Duration> {
        match self {
            SessionState::Running { period, .. } => Some(*period),
            SessionState::Idle => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    pub starts: u64,
    /// Stop-then-start cycles caused by a period change
    pub restarts: u64,
    pub stops: u64,
    pub start_failures: u64,
    pub runtime_errors: u64,
    pub samples_received: u64,
    pub readings_delivered: u64,
    /// Events that arrived from a session that had already ended
    pub stale_events_dropped: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub source: String,
    pub session: SessionState,
    pub consumers: usize,
    pub stats: CoordinatorStats,
}

/// What caused a reconciliation
#[derive(Debug, Clone, Copy)]
enum Trigger {
    /// A consumer joined or changed its period; it receives any start error
    Registration(ConsumerId),
    /// A consumer left; never retries a failed session
    Departure,
}

struct Inner {
    source: Box<dyn SampleSource>,
    registry: ConsumerRegistry,
    session: SessionState,
    next_generation: u64,
    start_timeout: Duration,
    stats: CoordinatorStats,
    /// Handed to pump tasks so they never keep the coordinator alive
    self_ref: Weak<Mutex<Inner>>,
}

/// Owned handle to the shared-source coordinator. Cloning shares the instance.
#[derive(Clone)]
pub struct MotionCoordinator {
    inner: Arc<Mutex<Inner>>,
}

impl MotionCoordinator {
    pub fn new(source: impl SampleSource + 'static) -> Self {
        Self::with_config(source, &CoordinatorConfig::default())
    }

    pub fn with_config(source: impl SampleSource + 'static, config: &CoordinatorConfig) -> Self {
        let source: Box<dyn SampleSource> = Box::new(source);
        let start_timeout = config.start_timeout();
        let inner = Arc::new_cyclic(|weak| {
            Mutex::new(Inner {
                source,
                registry: ConsumerRegistry::new(),
                session: SessionState::Idle,
                next_generation: 0,
                start_timeout,
                stats: CoordinatorStats::default(),
                self_ref: weak.clone(),
            })
        });
        Self { inner }
    }

    /// Add a consumer and bring the session up (or faster) if needed.
    ///
    /// A failed start is reported on the new consumer's sink, not here: the
    /// registration stands and a later registration event retries.
    pub async fn register(
        &self,
        id: ConsumerId,
        kind: SensorKind,
        period: Duration,
        sink: Box<dyn EventSink>,
    ) -> RegistryResult<()> {
        let mut inner = self.inner.lock().await;
        inner.registry.register(id, kind, period, sink)?;
        inner.reconcile(Trigger::Registration(id)).await;
        Ok(())
    }

    /// Change a consumer's period. Unknown ids are ignored.
    pub async fn update_period(&self, id: ConsumerId, period: Duration) {
        let mut inner = self.inner.lock().await;
        if inner.registry.update_period(id, period) {
            inner.reconcile(Trigger::Registration(id)).await;
        } else {
            trace!("[coordinator] update_period for unknown {}", id);
        }
    }

    /// Remove a consumer. Once this returns its sink receives nothing more.
    pub async fn unregister(&self, id: ConsumerId) {
        let mut inner = self.inner.lock().await;
        if inner.registry.unregister(id).is_some() {
            inner.reconcile(Trigger::Departure).await;
        }
    }

    pub async fn contains(&self, id: ConsumerId) -> bool {
        self.inner.lock().await.registry.contains(id)
    }

    pub async fn session(&self) -> SessionState {
        self.inner.lock().await.session
    }

    pub async fn status(&self) -> CoordinatorStatus {
        let inner = self.inner.lock().await;
        CoordinatorStatus {
            source: inner.source.name().to_string(),
            session: inner.session,
            consumers: inner.registry.len(),
            stats: inner.stats.clone(),
        }
    }

    /// Stop the session and drop every consumer
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.registry.clear();
        if inner.session.is_running() {
            inner.stop_session().await;
        }
        info!("[coordinator] '{}' shut down", inner.source.name());
    }
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        matches!(self.session, SessionState::Running { generation: g, .. } if g == generation)
    }

    /// Bring the session in line with the registry
    async fn reconcile(&mut self, trigger: Trigger) {
        let target = effective_period(&self.registry);
        match (self.session, target) {
            (SessionState::Idle, None) => {}
            (SessionState::Running { .. }, None) => {
                self.stop_session().await;
                info!("[coordinator] last consumer left, '{}' idle", self.source.name());
            }
            (SessionState::Idle, Some(period)) => {
                let Trigger::Registration(id) = trigger else {
                    return;
                };
                if let Err(e) = self.start_session(period).await {
                    warn!("[coordinator] start for {} failed: {}", id, e);
                    self.deliver_error(id, StreamError::Start(e));
                }
            }
            (SessionState::Running { period: current, .. }, Some(period)) if current == period => {}
            (SessionState::Running { period: current, .. }, Some(period)) => {
                debug!(
                    "[coordinator] effective period {:?} -> {:?}, restarting '{}'",
                    current,
                    period,
                    self.source.name()
                );
                self.stop_session().await;
                self.stats.restarts += 1;
                if let Err(e) = self.start_session(period).await {
                    error!("[coordinator] restart at {:?} failed: {}", period, e);
                    self.broadcast_error(StreamError::Start(e));
                }
            }
        }
    }

    async fn start_session(&mut self, period: Duration) -> StartResult<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let result = start_source(self.source.as_mut(), period, tx, self.start_timeout).await;

        if let Err(e) = result {
            self.stats.start_failures += 1;
            return Err(e);
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.session = SessionState::Running { period, generation };
        self.stats.starts += 1;
        info!(
            "[coordinator] '{}' running at {:?} (session {})",
            self.source.name(),
            period,
            generation
        );
        spawn_pump(self.self_ref.clone(), generation, rx);
        Ok(())
    }

    async fn stop_session(&mut self) {
        self.source.stop().await;
        self.session = SessionState::Idle;
        self.stats.stops += 1;
    }

    /// Fan one sample out to every consumer whose kind it carries
    async fn on_raw_sample(&mut self, sample: &Sample) {
        self.stats.samples_received += 1;
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, consumer) in self.registry.iter() {
            let Some(value) = sample.get(consumer.kind) else {
                continue;
            };
            let reading = Reading {
                kind: consumer.kind,
                value: consumer.kind.transform(value),
                timestamp_ns: sample.timestamp_ns,
            };
            match consumer.sink.deliver(SensorEvent::Reading(reading)) {
                Ok(()) => delivered += 1,
                Err(SinkClosed) => closed.push(id),
            }
        }

        self.stats.readings_delivered += delivered;
        trace!(
            "[coordinator] sample t={} delivered to {} consumer(s)",
            sample.timestamp_ns,
            delivered
        );

        if self.prune(closed) {
            self.reconcile(Trigger::Departure).await;
        }
    }

    /// The shared session died: everyone hears about it, nobody retries yet
    async fn on_source_error(&mut self, error: SourceError) {
        self.stats.runtime_errors += 1;
        error!(
            "[coordinator] '{}' failed, notifying {} consumer(s): {}",
            self.source.name(),
            self.registry.len(),
            error
        );
        self.broadcast_error(StreamError::Runtime(error));
        self.stop_session().await;
    }

    fn deliver_error(&mut self, id: ConsumerId, error: StreamError) {
        let closed = match self.registry.get(id) {
            Some(consumer) => consumer.sink.deliver(SensorEvent::error(error)).is_err(),
            None => false,
        };
        if closed {
            self.prune(vec![id]);
        }
    }

    fn broadcast_error(&mut self, error: StreamError) {
        let closed: Vec<_> = self
            .registry
            .iter()
            .filter(|(_, consumer)| consumer.sink.deliver(SensorEvent::error(error.clone())).is_err())
            .map(|(id, _)| id)
            .collect();
        self.prune(closed);
    }

    /// Drop consumers whose receivers are gone. Returns whether any were removed.
    fn prune(&mut self, closed: Vec<ConsumerId>) -> bool {
        let mut removed = false;
        for id in closed {
            if self.registry.unregister(id).is_some() {
                debug!("[coordinator] {} stream closed, dropping consumer", id);
                removed = true;
            }
        }
        removed
    }
}

type PumpFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn spawn_pump(inner: Weak<Mutex<Inner>>, generation: u64, events: SourceReceiver) {
    let pump: PumpFuture = Box::pin(pump(inner, generation, events));
    tokio::spawn(pump);
}

/// Drain one session's events into the coordinator
async fn pump(inner: Weak<Mutex<Inner>>, generation: u64, mut events: SourceReceiver) {
    while let Some(event) = events.recv().await {
        let Some(strong) = inner.upgrade() else {
            break;
        };
        let mut guard = strong.lock().await;
        if !guard.is_current(generation) {
            guard.stats.stale_events_dropped += 1;
            trace!("[coordinator] dropping event from ended session {}", generation);
            break;
        }
        match event {
            SourceEvent::Sample(sample) => guard.on_raw_sample(&sample).await,
            SourceEvent::Error(error) => guard.on_source_error(error).await,
        }
    }
    trace!("[coordinator] pump for session {} finished", generation);
}
