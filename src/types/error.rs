use thiserror::Error;

/// gpuscout error types
#[derive(Error, Debug)]
pub enum GpuScoutError {
    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// HTTP client construction failed
    #[error("http error: {0}")]
    Http(String),
}

/// Result type alias for gpuscout
pub type Result<T> = std::result::Result<T, GpuScoutError>;

/// Failure of a single marketplace adapter.
///
/// None of these escape `refresh()`: the aggregator records them in
/// source health and drops the source from the current cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// Credential absent; the adapter soft-skips instead of failing
    #[error("{source_id}: not configured")]
    ConfigMissing { source_id: String },

    /// Transport error, non-success status, or timeout
    #[error("{source_id}: upstream unavailable{}: {message}", status_suffix(.status))]
    UpstreamUnavailable {
        source_id: String,
        status: Option<u16>,
        message: String,
    },

    /// Payload did not have the expected shape
    #[error("{source_id}: unexpected payload: {message}")]
    UpstreamSchemaError { source_id: String, message: String },
}

impl AdapterError {
    pub fn unavailable(source_id: &str, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            source_id: source_id.to_string(),
            status: None,
            message: message.into(),
        }
    }

    pub fn status(source_id: &str, status: u16, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            source_id: source_id.to_string(),
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn schema(source_id: &str, message: impl Into<String>) -> Self {
        Self::UpstreamSchemaError {
            source_id: source_id.to_string(),
            message: message.into(),
        }
    }

    /// Map a reqwest transport error, keeping the status code when present
    pub fn from_reqwest(source_id: &str, err: &reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::schema(source_id, err.to_string());
        }
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else {
            err.to_string()
        };
        Self::UpstreamUnavailable {
            source_id: source_id.to_string(),
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }

    pub fn source_id(&self) -> &str {
        match self {
            Self::ConfigMissing { source_id }
            | Self::UpstreamUnavailable { source_id, .. }
            | Self::UpstreamSchemaError { source_id, .. } => source_id,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

/// Every configured source failed in one refresh cycle
#[derive(Error, Debug, Clone, PartialEq)]
#[error("all sources failed: {}", .failed.join(", "))]
pub struct AllSourcesFailed {
    pub failed: Vec<String>,
}
