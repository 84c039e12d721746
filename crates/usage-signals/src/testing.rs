use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::signal::Signal;
use crate::transport::{Transport, TransportError};

#[derive(Default)]
struct MockState {
    batches: Mutex<Vec<Vec<Signal>>>,
    attempts: AtomicUsize,
    fail_remaining: AtomicUsize,
}

/// Records every delivered batch. Clones share state, so a test can keep one
/// handle while the client owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the first `n` deliveries with a 500.
    pub fn failing_first(n: usize) -> Self {
        let transport = Self::default();
        transport.state.fail_remaining.store(n, Ordering::SeqCst);
        transport
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<Vec<Signal>> {
        self.state.batches.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<Signal> {
        self.batches().into_iter().flatten().collect()
    }

    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Clones still alive, this one included. Drops to 1 once the client's
    /// flusher task has exited and released its copy.
    pub fn live_handles(&self) -> usize {
        Arc::strong_count(&self.state)
    }
}

impl Transport for MockTransport {
    async fn deliver(&self, batch: &[Signal]) -> Result<(), TransportError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .state
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Rejected {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            });
        }
        self.state.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

pub fn signal(event: &str) -> Signal {
    Signal::new("agent-1", "cust-1", event, json!({}))
}

pub fn events(batch: &[Signal]) -> Vec<&str> {
    batch.iter().map(Signal::event_name).collect()
}
