use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::buffers::SignalBuffer;
use crate::config::DeliveryFailurePolicy;
use crate::signal::Signal;
use crate::transport::Transport;

/// Depth of the flush request queue. Timer and threshold requests that find
/// it full are coalesced into the flush already pending.
pub const REQUEST_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    Interval,
    Threshold,
    Manual,
    Drain,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushReason::Interval => write!(f, "interval"),
            FlushReason::Threshold => write!(f, "threshold"),
            FlushReason::Manual => write!(f, "manual"),
            FlushReason::Drain => write!(f, "drain"),
        }
    }
}

/// What happened to the batch a flush swapped out. Delivery failures are
/// reported here rather than as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered; no delivery was attempted.
    Empty,
    Delivered(usize),
    /// Delivery failed and the batch was discarded.
    Dropped(usize),
    /// Delivery failed and the batch went back into the buffer.
    Requeued(usize),
}

pub enum FlushRequest {
    Flush {
        reason: FlushReason,
        ack: Option<oneshot::Sender<FlushOutcome>>,
    },
    /// Seal the buffer, deliver what is left, and stop.
    Drain { ack: oneshot::Sender<FlushOutcome> },
}

impl FlushRequest {
    pub fn fire_and_forget(reason: FlushReason) -> Self {
        FlushRequest::Flush { reason, ack: None }
    }
}

/// The only consumer of the buffer. Requests are handled one at a time, so
/// each flush owns exactly the batch it swapped out.
pub struct Flusher<T: Transport> {
    buffer: Arc<SignalBuffer>,
    transport: T,
    on_failure: DeliveryFailurePolicy,
    max_buffered: usize,
}

impl<T: Transport> Flusher<T> {
    pub fn new(
        buffer: Arc<SignalBuffer>,
        transport: T,
        on_failure: DeliveryFailurePolicy,
        max_buffered: usize,
    ) -> Self {
        Self {
            buffer,
            transport,
            on_failure,
            max_buffered,
        }
    }

    /// Serve requests until a drain completes or every sender is gone.
    pub async fn run(self, mut requests: mpsc::Receiver<FlushRequest>) {
        while let Some(request) = requests.recv().await {
            match request {
                FlushRequest::Flush { reason, ack } => {
                    let outcome = self.flush(reason).await;
                    if let Some(ack) = ack {
                        let _ = ack.send(outcome);
                    }
                }
                FlushRequest::Drain { ack } => {
                    let _ = ack.send(self.drain().await);
                    break;
                }
            }
        }
        debug!("flusher stopped");
    }

    pub async fn flush(&self, reason: FlushReason) -> FlushOutcome {
        let batch = self.buffer.swap_out();
        self.deliver(batch, reason, self.on_failure).await
    }

    /// Final flush. There is no later flush to requeue into, so failures drop.
    pub async fn drain(&self) -> FlushOutcome {
        let batch = self.buffer.seal();
        self.deliver(batch, FlushReason::Drain, DeliveryFailurePolicy::Drop)
            .await
    }

    async fn deliver(
        &self,
        batch: Vec<Signal>,
        reason: FlushReason,
        on_failure: DeliveryFailurePolicy,
    ) -> FlushOutcome {
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }
        let count = batch.len();

        match self.transport.deliver(&batch).await {
            Ok(()) => {
                debug!(count, %reason, "flushed signals");
                FlushOutcome::Delivered(count)
            }
            Err(e) => {
                error!(error = %e, count, %reason, "flush failed");
                match on_failure {
                    DeliveryFailurePolicy::Drop => FlushOutcome::Dropped(count),
                    DeliveryFailurePolicy::Requeue => {
                        self.buffer.prepend_failed(batch, self.max_buffered);
                        FlushOutcome::Requeued(count)
                    }
                }
            }
        }
    }
}
