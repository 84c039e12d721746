use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://api.agentpaid.io";
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_FLUSH_THRESHOLD: usize = 100;
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_BUFFERED: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    None,
}

/// What the flusher does with a batch the transport failed to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailurePolicy {
    /// Log and discard the batch.
    Drop,
    /// Put the batch back in front of the buffer for the next flush.
    Requeue,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("USAGE_SIGNALS_API_KEY is required but not set")]
    ApiKeyMissing,

    #[error("USAGE_SIGNALS_ENDPOINT is not a valid URL: {0}")]
    EndpointInvalidUrl(String),

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),

    #[error("USAGE_SIGNALS_COMPRESSION has invalid value: {0} (expected \"gzip\" or \"none\")")]
    InvalidCompression(String),

    #[error("USAGE_SIGNALS_ON_FAILURE has invalid value: {0} (expected \"drop\" or \"requeue\")")]
    InvalidFailurePolicy(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub endpoint: Url,
    pub flush_interval: Duration,
    pub flush_threshold: usize,
    pub export_timeout: Duration,
    pub compression: Compression,
    pub on_failure: DeliveryFailurePolicy,
    /// Upper bound on buffered signals after a failed batch is requeued.
    pub max_buffered: usize,
}

impl Config {
    /// Defaults for everything but the credential.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: default_endpoint(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
            compression: Compression::None,
            on_failure: DeliveryFailurePolicy::Drop,
            max_buffered: DEFAULT_MAX_BUFFERED,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with("USAGE_SIGNALS_"))
            .collect();
        Self::parse(&vars)
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let api_key = vars
            .get("USAGE_SIGNALS_API_KEY")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::ApiKeyMissing)?;

        Ok(Self {
            api_key: api_key.clone(),
            endpoint: parse_endpoint(vars)?,
            flush_interval: parse_duration_ms(
                vars,
                "USAGE_SIGNALS_FLUSH_INTERVAL_MS",
                DEFAULT_FLUSH_INTERVAL,
            )?,
            flush_threshold: parse_positive(
                vars,
                "USAGE_SIGNALS_FLUSH_THRESHOLD",
                DEFAULT_FLUSH_THRESHOLD,
            )?,
            export_timeout: parse_duration_ms(
                vars,
                "USAGE_SIGNALS_EXPORT_TIMEOUT_MS",
                DEFAULT_EXPORT_TIMEOUT,
            )?,
            compression: parse_compression(vars)?,
            on_failure: parse_failure_policy(vars)?,
            max_buffered: parse_positive(vars, "USAGE_SIGNALS_MAX_BUFFERED", DEFAULT_MAX_BUFFERED)?,
        })
    }
}

fn default_endpoint() -> Url {
    Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL")
}

fn parse_endpoint(vars: &HashMap<String, String>) -> Result<Url, ConfigError> {
    match vars.get("USAGE_SIGNALS_ENDPOINT").filter(|s| !s.is_empty()) {
        Some(raw) => Url::parse(raw).map_err(|_| ConfigError::EndpointInvalidUrl(raw.clone())),
        None => Ok(default_endpoint()),
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    name: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match vars.get(name) {
        Some(val) => val
            .parse()
            .ok()
            .filter(|n: &usize| *n > 0)
            .ok_or_else(|| ConfigError::InvalidNumeric(name.to_owned(), val.clone())),
        None => Ok(default),
    }
}

fn parse_duration_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(val) => {
            let ms = val
                .parse()
                .ok()
                .filter(|ms: &u64| *ms > 0)
                .ok_or_else(|| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(default),
    }
}

fn parse_compression(vars: &HashMap<String, String>) -> Result<Compression, ConfigError> {
    match vars.get("USAGE_SIGNALS_COMPRESSION").map(|s| s.as_str()) {
        Some("none") | None => Ok(Compression::None),
        Some("gzip") => Ok(Compression::Gzip),
        Some(other) => Err(ConfigError::InvalidCompression(other.to_owned())),
    }
}

fn parse_failure_policy(
    vars: &HashMap<String, String>,
) -> Result<DeliveryFailurePolicy, ConfigError> {
    match vars.get("USAGE_SIGNALS_ON_FAILURE").map(|s| s.as_str()) {
        Some("drop") | None => Ok(DeliveryFailurePolicy::Drop),
        Some("requeue") => Ok(DeliveryFailurePolicy::Requeue),
        Some(other) => Err(ConfigError::InvalidFailurePolicy(other.to_owned())),
    }
}
