use crate::errors::{RegistryError, RegistryResult};
use crate::sensors::SensorKind;
use crate::sink::EventSink;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Opaque consumer identity, unique per hub for the life of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConsumerId(pub u64);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer#{}", self.0)
    }
}

/// One registered subscriber
pub struct Consumer {
    pub kind: SensorKind,
    pub period: Duration,
    pub sink: Box<dyn EventSink>,
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("kind", &self.kind)
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

/// Consumers keyed by id. Iteration is in id order.
#[derive(Debug, Default)]
pub struct ConsumerRegistry {
    consumers: BTreeMap<ConsumerId, Consumer>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: ConsumerId,
        kind: SensorKind,
        period: Duration,
        sink: Box<dyn EventSink>,
    ) -> RegistryResult<()> {
        if self.consumers.contains_key(&id) {
            return Err(RegistryError::DuplicateConsumer { id });
        }
        debug!("[registry] register {} kind={} period={:?}", id, kind, period);
        self.consumers.insert(id, Consumer { kind, period, sink });
        Ok(())
    }

    /// Returns whether the consumer was present
    pub fn update_period(&mut self, id: ConsumerId, period: Duration) -> bool {
        match self.consumers.get_mut(&id) {
            Some(consumer) => {
                debug!("[registry] {} period {:?} -> {:?}", id, consumer.period, period);
                consumer.period = period;
                true
            }
            None => false,
        }
    }

    /// Returns the removed consumer, if any
    pub fn unregister(&mut self, id: ConsumerId) -> Option<Consumer> {
        let removed = self.consumers.remove(&id);
        if removed.is_some() {
            debug!("[registry] unregister {}", id);
        }
        removed
    }

    pub fn get(&self, id: ConsumerId) -> Option<&Consumer> {
        self.consumers.get(&id)
    }

    pub fn contains(&self, id: ConsumerId) -> bool {
        self.consumers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConsumerId, &Consumer)> {
        self.consumers.iter().map(|(id, c)| (*id, c))
    }

    pub fn periods(&self) -> impl Iterator<Item = Duration> + '_ {
        self.consumers.values().map(|c| c.period)
    }

    pub fn clear(&mut self) {
        self.consumers.clear();
    }
}
