//! Error taxonomy. Typed errors at module boundaries, converted to
//! `eyre::Report` at the task level for uniform logging.

use thiserror::Error;

/// A malformed or incomplete log notification. Always handled by logging
/// and skipping the single event, never propagated as a fatal error.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("log is missing required field {0}")]
    MissingMetadata(&'static str),
    #[error("failed to decode log data: {0}")]
    Malformed(String),
}

/// Errors from the enrichment REST client. 4xx/5xx and network failures are
/// both recoverable: the fetcher backs off and retries on its own schedule.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("rate limited or client error (status {0}), deferring")]
    ClientError(u16),
    #[error("server error (status {0}), retrying")]
    ServerError(u16),
    #[error("unexpected response shape: {0}")]
    MalformedResponse(String),
}

/// Fatal at startup only. Anything else (missing endpoint, malformed
/// credentials) should surface here rather than panicking.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingRequired(&'static str),
    #[error("environment variable {name} has invalid value {value:?}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}
