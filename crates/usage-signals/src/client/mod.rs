use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::buffers::{RecordOutcome, SignalBuffer};
use crate::config::Config;
use crate::flusher::{FlushOutcome, FlushReason, FlushRequest, Flusher, REQUEST_QUEUE_DEPTH};
use crate::scheduler::Scheduler;
use crate::signal::Signal;
use crate::transport::{HttpTransport, Transport, TransportError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("an API key is required")]
    MissingCredential,

    #[error("client must be created inside a Tokio runtime")]
    NoRuntime,

    #[error("failed to build transport: {0}")]
    Transport(#[from] TransportError),

    #[error("flush interval must be non-zero")]
    ZeroFlushInterval,

    #[error("flush threshold must be non-zero")]
    ZeroFlushThreshold,

    #[error("client is closed")]
    Closed,
}

enum Lifecycle {
    Running {
        scheduler: Scheduler,
        flusher: JoinHandle<()>,
    },
    Closed,
}

/// Buffers usage signals and delivers them in batches.
///
/// Signals are flushed every `flush_interval`, as soon as `flush_threshold`
/// are pending, on [`flush`](Client::flush), and once more on
/// [`close`](Client::close). Delivery failures are logged and reported as a
/// [`FlushOutcome`], never returned as errors.
///
/// Recording after `close` returns [`ClientError::Closed`] and buffers
/// nothing.
pub struct Client {
    buffer: Arc<SignalBuffer>,
    requests: mpsc::Sender<FlushRequest>,
    lifecycle: Mutex<Lifecycle>,
}

impl Client {
    /// Build a client delivering over HTTP to `config.endpoint`.
    pub fn new(config: Config) -> Result<Self, ClientError> {
        validate(&config)?;
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, transport)
    }

    /// Build a client around any [`Transport`]. Spawns the flusher and
    /// scheduler tasks on the current Tokio runtime.
    pub fn with_transport<T: Transport>(
        config: Config,
        transport: T,
    ) -> Result<Self, ClientError> {
        validate(&config)?;
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let buffer = Arc::new(SignalBuffer::new(config.flush_threshold));
        let (requests, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);

        let flusher = Flusher::new(
            Arc::clone(&buffer),
            transport,
            config.on_failure,
            config.max_buffered,
        );
        let flusher = runtime.spawn(flusher.run(rx));
        let scheduler = Scheduler::start(config.flush_interval, requests.clone());

        debug!(
            endpoint = %config.endpoint,
            interval = ?config.flush_interval,
            threshold = config.flush_threshold,
            "usage signals client started"
        );

        Ok(Self {
            buffer,
            requests,
            lifecycle: Mutex::new(Lifecycle::Running { scheduler, flusher }),
        })
    }

    /// Buffer one signal. Never waits on the network; crossing the flush
    /// threshold only posts a request to the flusher.
    pub fn record(
        &self,
        agent_id: impl Into<String>,
        customer_id: impl Into<String>,
        event_name: impl Into<String>,
        data: Value,
    ) -> Result<(), ClientError> {
        self.record_signal(Signal::new(agent_id, customer_id, event_name, data))
    }

    pub fn record_signal(&self, signal: Signal) -> Result<(), ClientError> {
        // The buffer lock is released before the request is posted.
        let outcome = self.buffer.record(signal).map_err(|_| ClientError::Closed)?;
        if outcome == RecordOutcome::ThresholdReached {
            debug!("buffer reached flush threshold");
            match self
                .requests
                .try_send(FlushRequest::fire_and_forget(FlushReason::Threshold))
            {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => debug!("flush already pending"),
                Err(TrySendError::Closed(_)) => warn!("flusher stopped, threshold flush skipped"),
            }
        }
        Ok(())
    }

    /// Deliver whatever is buffered now and report what happened to it.
    pub async fn flush(&self) -> Result<FlushOutcome, ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        let (ack, done) = oneshot::channel();
        self.requests
            .send(FlushRequest::Flush {
                reason: FlushReason::Manual,
                ack: Some(ack),
            })
            .await
            .map_err(|_| ClientError::Closed)?;
        done.await.map_err(|_| ClientError::Closed)
    }

    /// Stop the scheduler, let queued flushes finish, then drain the buffer.
    ///
    /// Only the first call does anything; later calls return
    /// [`FlushOutcome::Empty`].
    pub async fn close(&self) -> FlushOutcome {
        let previous = {
            let mut guard = self.lock_lifecycle();
            std::mem::replace(&mut *guard, Lifecycle::Closed)
        };
        let (scheduler, flusher) = match previous {
            Lifecycle::Running { scheduler, flusher } => (scheduler, flusher),
            Lifecycle::Closed => return FlushOutcome::Empty,
        };

        scheduler.cancel().await;
        debug!("closing client, draining remaining signals");

        let (ack, done) = oneshot::channel();
        let outcome = match self.requests.send(FlushRequest::Drain { ack }).await {
            Ok(()) => done.await.ok(),
            Err(_) => None,
        };

        if let Err(e) = flusher.await {
            error!(error = %e, "flusher task panicked");
        }

        outcome.unwrap_or_else(|| {
            let lost = self.buffer.seal().len();
            if lost > 0 {
                error!(count = lost, "flusher unavailable, dropping buffered signals");
            }
            FlushOutcome::Dropped(lost)
        })
    }

    /// Number of signals waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.lock_lifecycle(), Lifecycle::Closed)
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if matches!(lifecycle, Lifecycle::Running { .. }) && !self.buffer.is_empty() {
            warn!(
                count = self.buffer.len(),
                "client dropped without close, buffered signals lost"
            );
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn validate(config: &Config) -> Result<(), ClientError> {
    if config.api_key.is_empty() {
        return Err(ClientError::MissingCredential);
    }
    if config.flush_interval.is_zero() {
        return Err(ClientError::ZeroFlushInterval);
    }
    if config.flush_threshold == 0 {
        return Err(ClientError::ZeroFlushThreshold);
    }
    Ok(())
}
