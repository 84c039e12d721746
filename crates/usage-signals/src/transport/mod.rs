use std::future::Future;
use std::io::Write;

use bytes::Bytes;
use flate2::write::GzEncoder;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::{Compression, Config};
use crate::signal::Signal;

const BULK_PATH: &str = "api/entries/bulk";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to serialize batch: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collector rejected batch: {status}")]
    Rejected { status: reqwest::StatusCode },

    #[error("gzip compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// Delivers one batch of signals to a remote collector.
///
/// Implementations enforce their own timeout; the flusher awaits `deliver`
/// without one.
pub trait Transport: Send + Sync + 'static {
    fn deliver(
        &self,
        batch: &[Signal],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[derive(Serialize)]
struct BulkRequest<'a> {
    transactions: &'a [Signal],
}

pub struct HttpTransport {
    client: Client,
    url: Url,
    api_key: String,
    compression: Compression,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        // Ignore the error: another component may already have installed one.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let client = Client::builder().timeout(config.export_timeout).build()?;

        Ok(Self {
            client,
            url: bulk_url(&config.endpoint),
            api_key: config.api_key.clone(),
            compression: config.compression,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for HttpTransport {
    async fn deliver(&self, batch: &[Signal]) -> Result<(), TransportError> {
        let body = encode_batch(batch)?;

        let body = if self.compression == Compression::Gzip {
            Bytes::from(compress_gzip(&body)?)
        } else {
            body
        };

        let mut req = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json");

        if self.compression == Compression::Gzip {
            req = req.header("content-encoding", "gzip");
        }

        let resp = req.body(body).send().await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::Rejected {
                status: resp.status(),
            })
        }
    }
}

/// Join the bulk path onto the endpoint, keeping any path prefix it carries.
fn bulk_url(endpoint: &Url) -> Url {
    let mut url = endpoint.clone();
    let base = url.path().trim_end_matches('/').to_owned();
    url.set_path(&format!("{base}/{BULK_PATH}"));
    url
}

fn encode_batch(batch: &[Signal]) -> Result<Bytes, serde_json::Error> {
    serde_json::to_vec(&BulkRequest {
        transactions: batch,
    })
    .map(Bytes::from)
}

fn compress_gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(data)?;
    encoder.finish()
}
