//! Error taxonomy for the ingestion pipeline.
//!
//! Each stage owns one error type so callers can tell "upstream is down"
//! apart from "upstream changed its layout" apart from "our store is
//! broken". Orchestration-level errors live with the orchestrator.

/// Document acquisition failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("timed out after {secs}s fetching {url}")]
    Timeout { url: String, secs: u64 },

    /// The page loaded but the selector matched nothing. Retrying will not
    /// help; the upstream layout changed and the source needs updating.
    #[error("no element matches selector '{selector}' on {url}")]
    ElementNotFound { url: String, selector: String },
}

impl FetchError {
    /// Stable label used as the `kind` field in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network { .. } => "network",
            FetchError::Timeout { .. } => "timeout",
            FetchError::ElementNotFound { .. } => "element_not_found",
        }
    }

    /// Whether a later attempt could plausibly succeed unchanged.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::ElementNotFound { .. })
    }
}

/// Conversion of a raw document into its intermediate form failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("malformed document: {0}")]
    Malformed(String),
}

/// Store operation failure. Distinct from "zero rows affected", which is
/// a successful outcome.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("store write failed: {0}")]
    WriteFailed(String),

    #[error("store read failed: {0}")]
    ReadFailed(String),
}
