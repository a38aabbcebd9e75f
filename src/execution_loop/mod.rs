//! Execution Loop
//!
//! Generate -> validate -> retry, bounded. Nothing leaves this module unless
//! the database planner accepted it.

pub mod generator;
pub mod retry;
pub mod validator;

pub use generator::{
    clean_generated_sql, CandidateQuery, GenerationAttempt, QueryGenerator, UNSUPPORTED_SENTINEL,
};
pub use retry::{AttemptError, Resolution, RetryController, NO_SQL_FEEDBACK};
pub use validator::{QueryValidator, ValidatedQuery, ValidationOutcome};
