use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Schema unavailable: {0}")]
    SchemaUnavailable(String),

    #[error("SQL generation failed: {0}")]
    GenerationFailed(String),

    #[error("Validation rejected: {0}")]
    ValidationRejected(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure signals from the text-generation service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("rate limited by {0}")]
    RateLimited(String),

    #[error("response blocked by content policy")]
    SafetyBlocked,

    #[error("generation call timed out after {0} ms")]
    Timeout(u64),

    #[error("{0}")]
    Other(String),
}

/// Failure signals from the relational store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store refused the statement by policy (e.g. a non-SELECT statement).
    #[error("{0}")]
    Rejected(String),

    /// The database accepted the statement but failed while running it.
    #[error("{0}")]
    Query(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) => StoreError::Query(db.message().to_string()),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnNotFound(_) => StoreError::Decode(e.to_string()),
            other => StoreError::Connection(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;
