//! Unified error type for airwatch.

use thiserror::Error;

use crate::types::DataKind;

/// Failures of the upstream air-quality provider.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Transport failure (connect, timeout, TLS, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status or a body that does not parse.
    #[error("protocol error (status={status:?}): {message}")]
    Protocol { status: Option<u16>, message: String },

    /// Provider answered but reported a non-"ok" status.
    #[error("provider rejected request: {0}")]
    Business(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No {kind} data available for {city}: {reason}")]
    DataUnavailable {
        city: String,
        kind: DataKind,
        reason: String,
    },

    #[error("Upstream failure: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn data_unavailable(city: &str, kind: DataKind, reason: impl Into<String>) -> Self {
        Error::DataUnavailable {
            city: city.to_string(),
            kind,
            reason: reason.into(),
        }
    }
}
