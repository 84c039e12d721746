use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error};

use crate::flusher::{FlushReason, FlushRequest};

/// Background timer posting an interval flush request every `period`.
///
/// The first tick fires one full period after `start`. Dropping the handle
/// without calling [`Scheduler::cancel`] still stops the task.
pub struct Scheduler {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _guard: DropGuard,
}

impl Scheduler {
    pub fn start(period: Duration, requests: mpsc::Sender<FlushRequest>) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(tick(period, requests, cancel.clone()));
        Self {
            _guard: cancel.clone().drop_guard(),
            cancel,
            task,
        }
    }

    /// Stop future ticks and wait for the task to release its timer.
    pub async fn cancel(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "scheduler task panicked");
        }
    }
}

async fn tick(period: Duration, requests: mpsc::Sender<FlushRequest>, cancel: CancellationToken) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                match requests.try_send(FlushRequest::fire_and_forget(FlushReason::Interval)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        debug!("flush already pending, coalescing interval tick");
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        }
    }
    debug!("scheduler stopped");
}
