use thiserror::Error;

use crate::models::resource::ResourceId;

/// Unified error type for the market-tracker-core library.
/// Every fallible public function returns `Result<T, CoreError>`.
///
/// Per-request transport failures and parse failures are normally absorbed
/// (zeroed quotes, failure counts); they only surface here when a caller asks
/// for a single resource directly.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Network ─────────────────────────────────────────────────────
    #[error("Transport error for {resource}: {source}")]
    Transport {
        resource: ResourceId,
        #[source]
        source: TransportError,
    },

    #[error("Fetch batch aborted: {0}")]
    FetchAborted(String),

    // ── Runtime / Threads ───────────────────────────────────────────
    #[error("Async runtime unavailable: {0}")]
    Runtime(String),

    #[error("Worker thread error: {0}")]
    Thread(String),

    // ── Configuration ───────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    Config(String),

    // ── Business Logic ──────────────────────────────────────────────
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Failure of one individual transfer. Never aborts sibling requests
/// unless it is [`TransportError::Fatal`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("failed reading response body: {0}")]
    Body(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The shared transport itself is unusable; the whole batch is abandoned.
    #[error("fatal transport failure: {0}")]
    Fatal(String),
}

/// Failure to turn a response body into typed values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("response body is empty")]
    Empty,

    #[error("invalid JSON payload: {0}")]
    Json(String),

    #[error("payload contains no usable rows")]
    NoData,
}

// ── Conversion helpers (From impls) ─────────────────────────────────

/// Strip query parameters from anything that looks like a URL so that API
/// keys embedded in request URLs never end up in logs or error messages.
pub(crate) fn redact_query(message: &str) -> String {
    match message.find('?') {
        Some(idx) => format!("{}?<query redacted>", &message[..idx]),
        None => message.to_string(),
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let msg = redact_query(&e.to_string());
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(msg)
        } else if e.is_builder() {
            TransportError::InvalidRequest(msg)
        } else if let Some(status) = e.status() {
            TransportError::Status(status.as_u16())
        } else {
            TransportError::Body(msg)
        }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        ParseError::Json(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Config(e.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Thread(e.to_string())
    }
}
