//! Error taxonomy for the ingestion pipeline.
//!
//! Per-item normalization problems are not errors; they are counted and
//! skipped by the normalizer. Everything here is fatal to the current cycle.

use std::time::Duration;
use thiserror::Error;

/// Failure talking to the upstream odds provider
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed upstream payload: {0}")]
    Malformed(String),

    #[error("upstream circuit breaker '{0}' is open")]
    CircuitOpen(String),
}

/// Failure reading or writing the price store or alert log
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row {id}: {reason}")]
    CorruptRow { id: String, reason: String },
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    ///
    /// Connection-level failures and Postgres serialization failure (40001),
    /// deadlock (40P01), too many connections (53300) and admin shutdown
    /// (57P01) are transient.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Io(_))
            | Self::Database(sqlx::Error::PoolTimedOut)
            | Self::Database(sqlx::Error::Tls(_)) => true,
            Self::Database(sqlx::Error::Database(db)) => matches!(
                db.code().as_deref(),
                Some("40001") | Some("40P01") | Some("53300") | Some("57P01")
            ),
            Self::Database(_) => false,
            Self::Unavailable(_) => true,
            Self::CorruptRow { .. } => false,
        }
    }
}

/// Fatal failure of one ingestion cycle
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },
}

impl IngestError {
    /// Short label for logs and structured responses
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Upstream(_) => "upstream",
            Self::Store(_) => "store",
            Self::Timeout { .. } => "timeout",
        }
    }
}
