//! Scripted source for driving the coordinator from tests.

use super::{SampleSource, Sample, SourceEvent, SourceSender};
use crate::errors::{SourceError, StartError, StartResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    start_attempts: Vec<Duration>,
    stops: usize,
    fail_next: VecDeque<StartError>,
    hang_next: bool,
    sender: Option<SourceSender>,
}

/// Test-side handle to a `MockSource`
#[derive(Clone, Default)]
pub(crate) struct MockControl {
    state: Arc<Mutex<MockState>>,
}

impl MockControl {
    pub fn fail_next_start(&self, error: StartError) {
        self.state.lock().unwrap().fail_next.push_back(error);
    }

    pub fn hang_next_start(&self) {
        self.state.lock().unwrap().hang_next = true;
    }

    /// Periods of every start call, failed ones included
    pub fn start_attempts(&self) -> Vec<Duration> {
        self.state.lock().unwrap().start_attempts.clone()
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().sender.is_some()
    }

    /// Sender of the current session, for replaying events after it ends
    pub fn sender(&self) -> Option<SourceSender> {
        self.state.lock().unwrap().sender.clone()
    }

    pub fn emit(&self, sample: Sample) -> bool {
        match &self.state.lock().unwrap().sender {
            Some(tx) => tx.send(SourceEvent::Sample(sample)).is_ok(),
            None => false,
        }
    }

    /// Report a terminal failure and drop the session
    pub fn fail(&self, reason: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.sender.take() {
            Some(tx) => tx
                .send(SourceEvent::Error(SourceError {
                    source_name: "mock".to_string(),
                    reason: reason.to_string(),
                }))
                .is_ok(),
            None => false,
        }
    }
}

pub(crate) struct MockSource {
    control: MockControl,
}

impl MockSource {
    pub fn new() -> (Self, MockControl) {
        let control = MockControl::default();
        (Self { control: control.clone() }, control)
    }
}

#[async_trait]
impl SampleSource for MockSource {
    async fn start(&mut self, period: Duration, events: SourceSender) -> StartResult<()> {
        let hang = {
            let mut state = self.control.state.lock().unwrap();
            state.start_attempts.push(period);
            if state.sender.is_some() {
                return Err(StartError::AlreadyRunning {
                    source_name: "mock".to_string(),
                });
            }
            if let Some(error) = state.fail_next.pop_front() {
                return Err(error);
            }
            std::mem::take(&mut state.hang_next)
        };

        if hang {
            std::future::pending::<()>().await;
        }

        self.control.state.lock().unwrap().sender = Some(events);
        Ok(())
    }

    async fn stop(&mut self) {
        let mut state = self.control.state.lock().unwrap();
        state.stops += 1;
        state.sender = None;
    }

    fn name(&self) -> &str {
        "mock"
    }
}
