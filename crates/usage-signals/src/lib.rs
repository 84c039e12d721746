//! Client-side buffer for usage signals.
//!
//! A [`Client`] accumulates [`Signal`]s in memory and ships them in batches
//! through a [`Transport`]: every `flush_interval`, whenever
//! `flush_threshold` signals are pending, on demand, and once more when the
//! client is closed. Delivery is best-effort; see [`DeliveryFailurePolicy`].

mod buffers;
mod client;
pub mod config;
mod flusher;
mod scheduler;
mod signal;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{Client, ClientError};
pub use config::{Compression, Config, ConfigError, DeliveryFailurePolicy};
pub use flusher::{FlushOutcome, FlushReason};
pub use signal::Signal;
pub use transport::{HttpTransport, Transport, TransportError};
