use crate::messages::SensorEvent;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;

/// The receiving side of a sink is gone; the consumer can be pruned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Delivery target for one consumer.
///
/// `deliver` is called while the coordinator holds its lock, so it must not
/// block or wait on the consumer.
pub trait EventSink: Send + Sync + 'static {
    fn deliver(&self, event: SensorEvent) -> Result<(), SinkClosed>;
}

impl EventSink for mpsc::UnboundedSender<SensorEvent> {
    fn deliver(&self, event: SensorEvent) -> Result<(), SinkClosed> {
        self.send(event).map_err(|_| SinkClosed)
    }
}

impl EventSink for broadcast::Sender<SensorEvent> {
    fn deliver(&self, event: SensorEvent) -> Result<(), SinkClosed> {
        // No active subscribers - this is fine, more may subscribe later
        let _ = self.send(event);
        Ok(())
    }
}

/// Bounded sink that drops readings when the consumer falls behind.
///
/// An error that does not fit is reported as closed: the consumer is dropped
/// and its receiver sees the end of the stream instead of missing the failure.
impl EventSink for mpsc::Sender<SensorEvent> {
    fn deliver(&self, event: SensorEvent) -> Result<(), SinkClosed> {
        match self.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(SensorEvent::Reading(_))) => {
                tracing::trace!("[sink] consumer lagging, dropping reading");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("[sink] consumer queue full, cannot deliver error");
                Err(SinkClosed)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkClosed),
        }
    }
}

/// Consumer-side stream of events for one subscription
#[derive(Debug)]
pub struct SensorStream {
    inner: UnboundedReceiverStream<SensorEvent>,
}

impl SensorStream {
    /// Create a linked sink/stream pair
    pub fn channel() -> (mpsc::UnboundedSender<SensorEvent>, SensorStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, SensorStream { inner: UnboundedReceiverStream::new(rx) })
    }

    /// Take the next event without waiting
    pub fn try_next(&mut self) -> Option<SensorEvent> {
        self.inner.as_mut().try_recv().ok()
    }
}

impl Stream for SensorStream {
    type Item = SensorEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StartError;
    use crate::messages::Reading;
    use crate::sensors::{SensorKind, Value};
    use tokio_stream::StreamExt;

    fn reading() -> SensorEvent {
        SensorEvent::Reading(Reading {
            kind: SensorKind::Gyroscope,
            value: Value::Vector([0.0, 0.0, 1.0]),
            timestamp_ns: 1,
        })
    }

    #[tokio::test]
    async fn test_stream_receives_delivered_events() {
        let (tx, mut stream) = SensorStream::channel();
        tx.deliver(reading()).unwrap();
        drop(tx);

        assert_eq!(stream.next().await, Some(reading()));
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn test_closed_unbounded_sink() {
        let (tx, stream) = SensorStream::channel();
        drop(stream);
        assert_eq!(tx.deliver(reading()), Err(SinkClosed));
    }

    #[test]
    fn test_broadcast_sink_without_receivers_stays_open() {
        let (tx, _) = broadcast::channel(4);
        assert_eq!(tx.deliver(reading()), Ok(()));
    }

    #[test]
    fn test_bounded_sink_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        assert_eq!(tx.deliver(reading()), Ok(()));
        assert_eq!(tx.deliver(reading()), Ok(()));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        drop(rx);
        assert_eq!(tx.deliver(reading()), Err(SinkClosed));
    }

    #[test]
    fn test_bounded_sink_refuses_error_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        assert_eq!(tx.deliver(reading()), Ok(()));

        let error = SensorEvent::error(StartError::PermissionDenied { source_name: "motion".to_string() });
        assert_eq!(tx.deliver(error.clone()), Err(SinkClosed));

        assert_eq!(rx.try_recv().ok(), Some(reading()));
        assert_eq!(tx.deliver(error.clone()), Ok(()));
        assert_eq!(rx.try_recv().ok(), Some(error));
    }
}
