//! Error types for the Dataverse client.

use thiserror::Error;

/// Result type alias for Dataverse client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Dataverse client.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Web API Errors =====
    #[error("API error: {status} {status_text} - {message}")]
    Api {
        status: u16,
        status_text: String,
        message: String,
    },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Could not determine created record id from returned representation")]
    MissingRecordId,

    // ===== Authentication Errors =====
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Credentials not found: {0}")]
    CredentialsNotFound(String),

    // ===== Metadata Errors =====
    #[error("Table '{0}' not found.")]
    TableNotFound(String),

    #[error("Table '{0}' already exists. No update performed.")]
    TableAlreadyExists(String),

    #[error("Unsupported column type '{dtype}' for '{column}'.")]
    UnsupportedColumnType { column: String, dtype: String },

    // ===== Caller Errors =====
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // ===== I/O Errors =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // ===== HTTP Errors =====
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Timeout: operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

impl Error {
    /// Create an API error from HTTP response details.
    pub fn api(status: u16, status_text: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            status_text: status_text.into(),
            message: message.into(),
        }
    }

    /// HTTP status code, if this error came from a Web API response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if this error is retriable (transient failures).
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Api { status, .. } => {
                *status == 429 || *status == 499 || (*status >= 500 && *status < 600)
            }
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}
