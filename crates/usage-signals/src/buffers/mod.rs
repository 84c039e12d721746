use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::warn;

use crate::signal::Signal;

#[derive(Debug, Error)]
#[error("buffer is sealed")]
pub struct BufferSealed;

/// Result of a successful [`SignalBuffer::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Buffered,
    /// This call crossed the flush threshold and should request an eager flush.
    ThresholdReached,
}

#[derive(Default)]
struct BufferState {
    items: Vec<Signal>,
    /// Set once an eager flush has been requested for the current generation.
    flush_requested: bool,
    sealed: bool,
}

/// Pending signals shared between recorders and the flusher.
///
/// Uses `std::sync::Mutex` (not tokio) because the lock is never held across
/// `.await`. Every operation is a push or a `mem::take` of the vector.
pub struct SignalBuffer {
    state: Mutex<BufferState>,
    flush_threshold: usize,
}

impl SignalBuffer {
    pub fn new(flush_threshold: usize) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            flush_threshold,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a signal. Append and threshold check happen under one lock
    /// acquisition, so only one caller per generation sees `ThresholdReached`.
    pub fn record(&self, signal: Signal) -> Result<RecordOutcome, BufferSealed> {
        let mut guard = self.lock();
        if guard.sealed {
            return Err(BufferSealed);
        }
        guard.items.push(signal);
        if guard.items.len() >= self.flush_threshold && !guard.flush_requested {
            guard.flush_requested = true;
            Ok(RecordOutcome::ThresholdReached)
        } else {
            Ok(RecordOutcome::Buffered)
        }
    }

    /// Take all pending signals, leaving the buffer empty.
    pub fn swap_out(&self) -> Vec<Signal> {
        let mut guard = self.lock();
        guard.flush_requested = false;
        std::mem::take(&mut guard.items)
    }

    /// Final swap: refuse further records and return what is left.
    pub fn seal(&self) -> Vec<Signal> {
        let mut guard = self.lock();
        guard.sealed = true;
        guard.flush_requested = false;
        std::mem::take(&mut guard.items)
    }

    #[cfg(test)]
    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    /// Put a failed batch back in front of newer signals, then evict the
    /// oldest entries until at most `max_buffered` remain.
    ///
    /// The requeued backlog does not re-arm the threshold trigger: it waits
    /// for the next interval or manual flush.
    ///
    /// Returns the number of signals evicted. A sealed buffer accepts nothing
    /// back and the whole batch counts as evicted.
    pub fn prepend_failed(&self, mut batch: Vec<Signal>, max_buffered: usize) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let mut guard = self.lock();
        if guard.sealed {
            let dropped = batch.len();
            warn!(count = dropped, "buffer sealed, dropping failed batch");
            return dropped;
        }

        batch.append(&mut guard.items);
        let evicted = batch.len().saturating_sub(max_buffered);
        if evicted > 0 {
            batch.drain(..evicted);
            warn!(count = evicted, "evicted oldest signals from buffer");
        }
        guard.items = batch;
        guard.flush_requested = true;
        evicted
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}
