//! Observability
//!
//! In-memory record of recently answered questions.

pub mod query_log;

pub use query_log::{QueryLog, QueryLogEntry, DEFAULT_QUERY_LOG_CAPACITY};
