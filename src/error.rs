//! Store Error Types
//!
//! One error type for the whole storage core: relational, document, cache and
//! collaborator failures all funnel through [`StoreError`].

use thiserror::Error;

/// Storage error types
#[derive(Error, Debug)]
pub enum StoreError {
    // === Connectivity ===
    #[error("Connection pool unavailable: {0}")]
    PoolUnavailable(String),

    #[error("Document store error: {0}")]
    Document(String),

    // === Lookup ===
    #[error("Not found: {0}")]
    NotFound(String),

    // === Data ===
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Invalid write plan: {0}")]
    InvalidPlan(String),

    // === Collaborators ===
    #[error("Existence lookup failed: {0}")]
    Lookup(String),

    // === Startup ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Stable error code for logs and callers
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::PoolUnavailable(_) => "POOL_UNAVAILABLE",
            StoreError::Document(_) => "DOCUMENT_ERROR",
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::Decode(_) => "DECODE_ERROR",
            StoreError::Database(_) => "DATABASE_ERROR",
            StoreError::InvalidPlan(_) => "INVALID_PLAN",
            StoreError::Lookup(_) => "LOOKUP_ERROR",
            StoreError::Config(_) => "CONFIG_ERROR",
            StoreError::Io(_) => "IO_ERROR",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Pool or document connectivity failure
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            StoreError::PoolUnavailable(_) | StoreError::Document(_)
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::PoolUnavailable(e.to_string())
            }
            sqlx::Error::RowNotFound => StoreError::NotFound(e.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Decode(e.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(e: mongodb::error::Error) -> Self {
        StoreError::Document(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}
