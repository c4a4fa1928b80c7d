//! Sensors with a dedicated source and a single subscriber.
//!
//! Accelerometer, gyroscope, magnetometer and barometer each own their
//! hardware session outright, so there is nothing to reconcile: the one
//! subscriber's period is the source period.

use crate::config::CoordinatorConfig;
use crate::errors::{HubError, HubResult, StreamError};
use crate::messages::{Reading, SensorEvent};
use crate::registry::ConsumerId;
use crate::sensors::{start_source, SampleSource, SensorKind, SourceEvent, SourceReceiver};
use crate::sink::EventSink;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, trace, warn};

struct Subscription {
    id: ConsumerId,
    period: Duration,
    sink: Box<dyn EventSink>,
    /// Session feeding this subscription; `None` after a failed start or runtime error
    generation: Option<u64>,
}

struct DirectInner {
    kind: SensorKind,
    source: Box<dyn SampleSource>,
    active: Option<Subscription>,
    next_generation: u64,
    start_timeout: Duration,
    self_ref: Weak<Mutex<DirectInner>>,
}

/// 1:1 poller for one non-shared sensor kind
#[derive(Clone)]
pub struct DirectSensor {
    kind: SensorKind,
    inner: Arc<Mutex<DirectInner>>,
}

impl DirectSensor {
    pub fn new(kind: SensorKind, source: impl SampleSource + 'static) -> Self {
        Self::with_config(kind, source, &CoordinatorConfig::default())
    }

    pub fn with_config(
        kind: SensorKind,
        source: impl SampleSource + 'static,
        config: &CoordinatorConfig,
    ) -> Self {
        let source: Box<dyn SampleSource> = Box::new(source);
        let start_timeout = config.start_timeout();
        let inner = Arc::new_cyclic(|weak| {
            Mutex::new(DirectInner {
                kind,
                source,
                active: None,
                next_generation: 0,
                start_timeout,
                self_ref: weak.clone(),
            })
        });
        Self { kind, inner }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Start streaming to `sink`. Start failures are delivered to the sink and
    /// the subscription stays in place until `update_rate` or `unsubscribe`.
    pub async fn subscribe(
        &self,
        id: ConsumerId,
        period: Duration,
        sink: Box<dyn EventSink>,
    ) -> HubResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(active) = &inner.active {
            return Err(HubError::SensorBusy { kind: self.kind, active: active.id });
        }
        inner.active = Some(Subscription { id, period, sink, generation: None });
        inner.restart().await;
        Ok(())
    }

    pub async fn update_rate(&self, id: ConsumerId, period: Duration) {
        let mut inner = self.inner.lock().await;
        let changed = match inner.active.as_mut() {
            Some(active) if active.id == id => {
                let changed = active.period != period || active.generation.is_none();
                active.period = period;
                changed
            }
            _ => false,
        };
        if changed {
            inner.restart().await;
        }
    }

    pub async fn unsubscribe(&self, id: ConsumerId) {
        let mut inner = self.inner.lock().await;
        if inner.active.as_ref().map(|a| a.id) == Some(id) {
            inner.stop().await;
            inner.active = None;
            debug!("[direct] {} unsubscribed from {}", id, self.kind);
        }
    }

    pub async fn subscriber(&self) -> Option<ConsumerId> {
        self.inner.lock().await.active.as_ref().map(|a| a.id)
    }

    pub async fn is_running(&self) -> bool {
        self.inner
            .lock()
            .await
            .active
            .as_ref()
            .is_some_and(|a| a.generation.is_some())
    }

    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.stop().await;
        inner.active = None;
    }
}

impl DirectInner {
    /// (Re)start the source at the subscriber's period
    async fn restart(&mut self) {
        self.stop().await;
        let Some(period) = self.active.as_ref().map(|a| a.period) else {
            return;
        };

        let (tx, rx) = mpsc::unbounded_channel();
        match start_source(self.source.as_mut(), period, tx, self.start_timeout).await {
            Ok(()) => {
                let generation = self.next_generation;
                self.next_generation += 1;
                if let Some(active) = self.active.as_mut() {
                    active.generation = Some(generation);
                }
                info!("[direct] '{}' running at {:?}", self.source.name(), period);
                tokio::spawn(pump(self.self_ref.clone(), generation, rx));
            }
            Err(e) => {
                warn!("[direct] '{}' failed to start: {}", self.source.name(), e);
                if !self.deliver(SensorEvent::error(e)) {
                    self.active = None;
                }
            }
        }
    }

    async fn stop(&mut self) {
        let running = self
            .active
            .as_mut()
            .and_then(|a| a.generation.take())
            .is_some();
        if running {
            self.source.stop().await;
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.active.as_ref().and_then(|a| a.generation) == Some(generation)
    }

    /// Returns false when the subscriber's receiver is gone
    fn deliver(&self, event: SensorEvent) -> bool {
        match &self.active {
            Some(active) => active.sink.deliver(event).is_ok(),
            None => true,
        }
    }

    async fn on_event(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::Sample(sample) => {
                let Some(value) = sample.get(self.kind) else {
                    return;
                };
                let reading = Reading {
                    kind: self.kind,
                    value: self.kind.transform(value),
                    timestamp_ns: sample.timestamp_ns,
                };
                if !self.deliver(SensorEvent::Reading(reading)) {
                    debug!("[direct] {} stream closed, stopping", self.kind);
                    self.stop().await;
                    self.active = None;
                }
            }
            SourceEvent::Error(e) => {
                error!("[direct] '{}' failed: {}", self.source.name(), e);
                let delivered = self.deliver(SensorEvent::error(StreamError::Runtime(e)));
                self.stop().await;
                if !delivered {
                    self.active = None;
                }
            }
        }
    }
}

async fn pump(inner: Weak<Mutex<DirectInner>>, generation: u64, mut events: SourceReceiver) {
    while let Some(event) = events.recv().await {
        let Some(strong) = inner.upgrade() else {
            break;
        };
        let mut guard = strong.lock().await;
        if !guard.is_current(generation) {
            trace!("[direct] dropping event from ended session {}", generation);
            break;
        }
        guard.on_event(event).await;
    }
}
