//! Error types for the orders ETL pipeline
//!
//! Every error carries a coarse classification so the scheduler can decide
//! whether to reset the database connection before the next cycle. The
//! classification is derived from the typed error structure, never from
//! message text.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Coarse retry classification for a pipeline error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connectivity-shaped failure; a fresh connection may succeed next cycle
    Transient,
    /// Failure that will recur until something external changes (bad SQL,
    /// rejected request, broken configuration)
    Permanent,
    /// Source rows that do not match the expected shape
    Data,
}

/// Error type for the orders ETL pipeline
#[derive(Error, Debug)]
pub enum EtlError {
    /// Query or connection failure against the source database
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP-level failure talking to the search index
    #[error("Search index request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The search index answered but rejected the request
    #[error("Search index rejected request: {0}")]
    SearchRejected(String),

    /// File store I/O failure
    #[error("File store error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding failure
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Parquet encoding failure
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow record batch construction failure
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Source row content that violates the expected document shape
    #[error("Malformed source data: {0}")]
    Data(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EtlError {
    /// Create a malformed-data error
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a search-rejection error
    pub fn search_rejected(msg: impl Into<String>) -> Self {
        Self::SearchRejected(msg.into())
    }

    /// Classify this error for the scheduler's retry handling
    pub fn class(&self) -> ErrorClass {
        match self {
            EtlError::Database(err) => match err {
                sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::Protocol(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed => ErrorClass::Transient,
                sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => ErrorClass::Data,
                _ => ErrorClass::Permanent,
            },
            EtlError::Http(err) => {
                if err.is_connect() || err.is_timeout() {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Permanent
                }
            },
            EtlError::Io(_) => ErrorClass::Transient,
            EtlError::Data(_) | EtlError::Json(_) => ErrorClass::Data,
            EtlError::SearchRejected(_)
            | EtlError::Parquet(_)
            | EtlError::Arrow(_)
            | EtlError::Config(_) => ErrorClass::Permanent,
        }
    }
}
