//! Retry Controller
//!
//! Generating(n) -> Validating(n) -> Accepted, with every rejection feeding its
//! reason into Generating(n + 1) until the retry bound is reached.

use crate::error::{AssistantError, GenerationError};
use crate::execution_loop::generator::{CandidateQuery, GenerationAttempt, QueryGenerator};
use crate::execution_loop::validator::{QueryValidator, ValidatedQuery, ValidationOutcome};
use crate::schema::SchemaDescription;
use std::ops::ControlFlow;
use tracing::{info, warn};

/// Feedback carried into the next attempt when the model returned nothing usable.
pub const NO_SQL_FEEDBACK: &str = "LLM failed to generate SQL";

/// Why an attempt ended without an accepted query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// The model gave no usable candidate. Carries caller-safe text only.
    Generation(String),
    /// The planner (or the statement guard) rejected the candidate.
    Rejected(String),
}

impl AttemptError {
    pub fn message(&self) -> &str {
        match self {
            AttemptError::Generation(message) | AttemptError::Rejected(message) => message,
        }
    }

    pub fn into_assistant_error(self) -> AssistantError {
        match self {
            AttemptError::Generation(message) => AssistantError::GenerationFailed(message),
            AttemptError::Rejected(message) => AssistantError::ValidationRejected(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Accepted {
        query: ValidatedQuery,
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
        last_sql: Option<String>,
        last_error: AttemptError,
    },
}

impl Resolution {
    pub fn attempts(&self) -> u32 {
        match self {
            Resolution::Accepted { attempts, .. } | Resolution::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

enum State {
    Generating(GenerationAttempt),
    Validating {
        attempt: GenerationAttempt,
        candidate: CandidateQuery,
    },
}

pub struct RetryController {
    generator: QueryGenerator,
    validator: QueryValidator,
    max_retries: u32,
}

impl RetryController {
    pub fn new(generator: QueryGenerator, validator: QueryValidator, max_retries: u32) -> Self {
        Self {
            generator,
            validator,
            max_retries,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub async fn resolve(&self, question: &str, schema: &SchemaDescription) -> Resolution {
        let mut state = State::Generating(GenerationAttempt::first(question));
        let mut last_sql: Option<String> = None;

        loop {
            let step = match state {
                State::Generating(attempt) => {
                    match self.generator.generate(schema, &attempt).await {
                        Ok(Some(candidate)) => {
                            ControlFlow::Continue(State::Validating { attempt, candidate })
                        }
                        Ok(None) => {
                            let error = AttemptError::Generation(NO_SQL_FEEDBACK.to_string());
                            self.advance(attempt, None, error, &last_sql)
                        }
                        Err(e) => {
                            warn!(
                                attempt = attempt.attempt_index,
                                error = %e,
                                "Generation call failed"
                            );
                            let error = AttemptError::Generation(generation_feedback(&e));
                            self.advance(attempt, None, error, &last_sql)
                        }
                    }
                }
                State::Validating { attempt, candidate } => {
                    last_sql = Some(candidate.as_str().to_string());
                    match self.validator.validate(candidate.as_str()).await {
                        ValidationOutcome::Valid => {
                            let attempts = attempt.attempt_index + 1;
                            info!(attempts, "Candidate SQL accepted");
                            return Resolution::Accepted {
                                query: ValidatedQuery::accept(candidate),
                                attempts,
                            };
                        }
                        ValidationOutcome::Invalid { reason } => {
                            warn!(
                                attempt = attempt.attempt_index,
                                reason = %reason,
                                "Candidate SQL rejected"
                            );
                            let previous_sql = Some(candidate.into_string());
                            let error = AttemptError::Rejected(reason);
                            self.advance(attempt, previous_sql, error, &last_sql)
                        }
                    }
                }
            };

            state = match step {
                ControlFlow::Continue(next) => next,
                ControlFlow::Break(resolution) => return resolution,
            };
        }
    }

    /// Move to the next generation attempt, or stop once the bound is reached.
    fn advance(
        &self,
        attempt: GenerationAttempt,
        previous_sql: Option<String>,
        error: AttemptError,
        last_sql: &Option<String>,
    ) -> ControlFlow<Resolution, State> {
        if attempt.attempt_index >= self.max_retries {
            return ControlFlow::Break(Resolution::Exhausted {
                attempts: attempt.attempt_index + 1,
                last_sql: last_sql.clone(),
                last_error: error,
            });
        }
        let feedback = error.message().to_string();
        ControlFlow::Continue(State::Generating(attempt.retry(previous_sql, feedback)))
    }
}

/// Caller-safe text for a failed generation call. The raw provider message
/// is logged where the error is caught and never carried further.
fn generation_feedback(e: &GenerationError) -> String {
    match e {
        GenerationError::RateLimited(_) => format!("{} (rate limited)", NO_SQL_FEEDBACK),
        GenerationError::Timeout(_) => format!("{} (timed out)", NO_SQL_FEEDBACK),
        GenerationError::SafetyBlocked => {
            format!("{} (blocked by content policy)", NO_SQL_FEEDBACK)
        }
        GenerationError::Other(_) => NO_SQL_FEEDBACK.to_string(),
    }
}
