//! Query Validator
//!
//! Asks the database to parse and plan a candidate without running it. A
//! `Valid` outcome says the planner accepted the query, nothing about whether
//! it answers the question.

use crate::db::store::DatabaseStore;
use crate::execution_loop::generator::CandidateQuery;
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const COULD_NOT_VERIFY: &str = "could not verify syntax";
pub const UNEXPECTED_RESPONSE: &str = "unexpected validation response";
pub const SINGLE_SELECT_ONLY: &str = "only a single SELECT statement is allowed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid { reason: String },
}

impl ValidationOutcome {
    fn invalid(reason: impl Into<String>) -> Self {
        ValidationOutcome::Invalid { reason: reason.into() }
    }
}

/// A candidate the planner accepted. Only the retry controller can mint one,
/// so the executor cannot be handed unvalidated SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery(String);

impl ValidatedQuery {
    pub(crate) fn accept(candidate: CandidateQuery) -> Self {
        Self(candidate.into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub struct QueryValidator {
    store: Arc<dyn DatabaseStore>,
    timeout: Duration,
}

impl QueryValidator {
    pub fn new(store: Arc<dyn DatabaseStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn validate(&self, sql: &str) -> ValidationOutcome {
        if let Some(reason) = stacked_statement_violation(sql) {
            warn!(sql = %sql, "Candidate rejected before planning: {}", reason);
            return ValidationOutcome::invalid(reason);
        }

        match tokio::time::timeout(self.timeout, self.store.plan_only(sql)).await {
            Ok(Ok(response)) => interpret_plan_response(&response),
            Ok(Err(e)) => {
                warn!(error = %e, "Plan-only check failed");
                ValidationOutcome::invalid(COULD_NOT_VERIFY)
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Plan-only check timed out"
                );
                ValidationOutcome::invalid(COULD_NOT_VERIFY)
            }
        }
    }
}

/// Map the store's `{ok, message}` answer onto an outcome.
pub(crate) fn interpret_plan_response(response: &serde_json::Value) -> ValidationOutcome {
    match response.get("ok").and_then(|v| v.as_bool()) {
        Some(true) => ValidationOutcome::Valid,
        Some(false) => match response.get("message").and_then(|m| m.as_str()) {
            Some(message) if !message.trim().is_empty() => {
                debug!(message = %message, "Planner rejected candidate");
                ValidationOutcome::invalid(message.trim())
            }
            _ => ValidationOutcome::invalid(UNEXPECTED_RESPONSE),
        },
        None => ValidationOutcome::invalid(UNEXPECTED_RESPONSE),
    }
}

/// Reject stacked statements and non-query statements the parser can see.
/// Text the parser cannot handle is left for the database planner to judge.
fn stacked_statement_violation(sql: &str) -> Option<&'static str> {
    match Parser::parse_sql(&PostgreSqlDialect {}, sql) {
        Ok(statements) => match statements.as_slice() {
            [Statement::Query(_)] => None,
            _ => Some(SINGLE_SELECT_ONLY),
        },
        Err(e) => {
            debug!(error = %e, "sqlparser could not parse candidate, deferring to planner");
            None
        }
    }
}
