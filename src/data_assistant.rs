//! Data Assistant
//!
//! Public entry point: one question in, one `AssistantOutcome` out. Drives the
//! schema cache, the bounded generate/validate loop, the executor and the
//! summarizer in sequence. Only the summarizer is allowed to fail softly.

use crate::clock::{Clock, SystemClock};
use crate::config::AssistantConfig;
use crate::db::{init_pool, DatabaseStore, PgStore};
use crate::error::{AssistantError, Result};
use crate::execution_loop::{QueryGenerator, QueryValidator, Resolution, RetryController};
use crate::executor::{QueryExecutor, GENERIC_FAILURE_MESSAGE};
use crate::llm::{FailoverClient, OpenAiClient, TextGenerator};
use crate::observability::{QueryLog, QueryLogEntry};
use crate::schema::{SchemaCache, SchemaDescription};
use crate::summarizer::ResultSummarizer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

pub const NO_QUERY_PROVIDED: &str = "no query provided";
pub const SCHEMA_UNAVAILABLE_MESSAGE: &str =
    "The database structure could not be loaded right now. Please try again shortly.";

/// Terminal value of `answer`. Exactly one variant, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantOutcome {
    Success {
        sql: String,
        rows: Vec<serde_json::Value>,
        elapsed_seconds: f64,
        summary: String,
        original_question: String,
    },
    Failure {
        original_question: String,
        reason: String,
        last_attempted_sql: Option<String>,
    },
}

impl AssistantOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AssistantOutcome::Success { .. })
    }

    pub fn sql(&self) -> Option<&str> {
        match self {
            AssistantOutcome::Success { sql, .. } => Some(sql),
            AssistantOutcome::Failure { last_attempted_sql, .. } => last_attempted_sql.as_deref(),
        }
    }

    pub fn original_question(&self) -> &str {
        match self {
            AssistantOutcome::Success { original_question, .. }
            | AssistantOutcome::Failure { original_question, .. } => original_question,
        }
    }

    /// JSON shape returned to callers
    pub fn to_response(&self) -> AssistantResponse {
        match self {
            AssistantOutcome::Success {
                sql,
                rows,
                elapsed_seconds,
                summary,
                original_question,
            } => AssistantResponse {
                success: true,
                data: Some(rows.clone()),
                sql: Some(sql.clone()),
                summary: Some(summary.clone()),
                execution_time: Some(*elapsed_seconds),
                error: None,
                original_query: original_question.clone(),
            },
            AssistantOutcome::Failure {
                original_question,
                reason,
                last_attempted_sql,
            } => AssistantResponse {
                success: false,
                data: None,
                sql: last_attempted_sql.clone(),
                summary: None,
                execution_time: None,
                error: Some(reason.clone()),
                original_query: original_question.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantResponse {
    pub success: bool,
    pub data: Option<Vec<serde_json::Value>>,
    pub sql: Option<String>,
    pub summary: Option<String>,
    pub execution_time: Option<f64>,
    pub error: Option<String>,
    pub original_query: String,
}

pub struct DataAssistant {
    schema_cache: SchemaCache,
    retry: RetryController,
    executor: QueryExecutor,
    summarizer: ResultSummarizer,
    query_log: QueryLog,
    clock: Arc<dyn Clock>,
}

impl DataAssistant {
    /// Wire the pipeline over explicit collaborators.
    pub fn new(
        store: Arc<dyn DatabaseStore>,
        llm: Arc<dyn TextGenerator>,
        clock: Arc<dyn Clock>,
        config: &AssistantConfig,
    ) -> Self {
        let schema_cache =
            SchemaCache::new(store.clone(), clock.clone()).with_notes(config.schema_notes.clone());
        let retry = RetryController::new(
            QueryGenerator::new(llm.clone(), config.generation_timeout),
            QueryValidator::new(store.clone(), config.validation_timeout),
            config.max_retries,
        );
        Self {
            schema_cache,
            retry,
            executor: QueryExecutor::new(store),
            summarizer: ResultSummarizer::new(
                llm,
                config.summary_char_budget,
                config.generation_timeout,
            ),
            query_log: QueryLog::default(),
            clock,
        }
    }

    /// Connect to Postgres and the configured model backends.
    pub async fn connect(config: &AssistantConfig) -> Result<Self> {
        let database_url = config.require_database_url()?;
        let api_key = config.require_api_key()?;

        let pool = init_pool(database_url)
            .await
            .map_err(|e| {
                AssistantError::Config(format!("Failed to connect to database: {}", e))
            })?;
        let store: Arc<dyn DatabaseStore> = Arc::new(PgStore::new(
            pool,
            config.database_schema.clone(),
            config.statement_timeout,
        ));

        let http = OpenAiClient::build_http_client(config.generation_timeout)
            .map_err(|e| AssistantError::Config(e.to_string()))?;
        let primary = OpenAiClient::with_http_client(
            api_key.to_string(),
            config.primary_model.clone(),
            config.base_url.clone(),
            http.clone(),
        );
        let mut llm = FailoverClient::new(Arc::new(primary));
        if let Some(fallback) = &config.fallback_model {
            llm = llm.with_fallback(Arc::new(OpenAiClient::with_http_client(
                api_key.to_string(),
                fallback.clone(),
                config.base_url.clone(),
                http,
            )));
        }
        info!(
            backends = ?llm.backend_names(),
            schema = %config.database_schema,
            max_retries = config.max_retries,
            "Data assistant connected"
        );

        Ok(Self::new(store, Arc::new(llm), Arc::new(SystemClock), config))
    }

    pub fn query_log(&self) -> &QueryLog {
        &self.query_log
    }

    pub async fn schema_description(&self) -> Result<SchemaDescription> {
        self.schema_cache.get_schema_description().await
    }

    pub async fn answer(&self, question: &str) -> AssistantOutcome {
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("answer", request_id = %request_id);

        let (outcome, attempts) = self.run(question).instrument(span).await;
        self.record(&request_id, &outcome, attempts);
        outcome
    }

    async fn run(&self, question: &str) -> (AssistantOutcome, u32) {
        let question = question.trim();
        if question.is_empty() {
            return (failure(question, NO_QUERY_PROVIDED.to_string(), None), 0);
        }
        info!(question = %question, "Answering question");

        let schema = match self.schema_cache.get_schema_description().await {
            Ok(schema) => schema,
            Err(e) => {
                error!(error = %e, "Schema unavailable");
                return (failure(question, SCHEMA_UNAVAILABLE_MESSAGE.to_string(), None), 0);
            }
        };

        let (query, attempts) = match self.retry.resolve(question, &schema).await {
            Resolution::Accepted { query, attempts } => (query, attempts),
            Resolution::Exhausted {
                attempts,
                last_sql,
                last_error,
            } => {
                let error = last_error.into_assistant_error();
                warn!(attempts, error = %error, "No valid query produced");
                let reason = format!(
                    "Failed to generate a valid query after {} attempts. Last error: {}",
                    attempts, error
                );
                return (failure(question, reason, last_sql), attempts);
            }
        };

        let attempted_sql = Some(query.as_str().to_string());
        let result = match self.executor.execute(&query).await {
            Ok(result) => result,
            Err(AssistantError::ExecutionFailed(message)) => {
                return (failure(question, message, attempted_sql), attempts);
            }
            Err(e) => {
                error!(error = %e, "Unexpected executor error");
                let message = GENERIC_FAILURE_MESSAGE.to_string();
                return (failure(question, message, attempted_sql), attempts);
            }
        };

        let summary = self.summarizer.summarize(question, &result.rows, &schema).await;

        (
            AssistantOutcome::Success {
                sql: query.as_str().to_string(),
                rows: result.rows,
                elapsed_seconds: result.elapsed_seconds,
                summary,
                original_question: question.to_string(),
            },
            attempts,
        )
    }

    fn record(&self, request_id: &str, outcome: &AssistantOutcome, attempts: u32) {
        let (elapsed_seconds, error) = match outcome {
            AssistantOutcome::Success { elapsed_seconds, .. } => (Some(*elapsed_seconds), None),
            AssistantOutcome::Failure { reason, .. } => (None, Some(reason.clone())),
        };
        self.query_log.record(QueryLogEntry {
            timestamp: self.clock.now(),
            request_id: request_id.to_string(),
            question: outcome.original_question().to_string(),
            sql: outcome.sql().map(str::to_string),
            success: outcome.is_success(),
            attempts,
            elapsed_seconds,
            error,
        });
    }
}

fn failure(question: &str, reason: String, last_attempted_sql: Option<String>) -> AssistantOutcome {
    AssistantOutcome::Failure {
        original_question: question.to_string(),
        reason,
        last_attempted_sql,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_response_shape() {
        let outcome = AssistantOutcome::Success {
            sql: "SELECT 1".into(),
            rows: vec![json!({"n": 1})],
            elapsed_seconds: 0.25,
            summary: "One.".into(),
            original_question: "how many".into(),
        };
        let value = serde_json::to_value(outcome.to_response()).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["data"], json!([{"n": 1}]));
        assert_eq!(value["executionTime"], json!(0.25));
        assert_eq!(value["originalQuery"], json!("how many"));
        assert!(value["error"].is_null());
    }

    #[test]
    fn test_failure_response_keeps_attempted_sql() {
        let outcome = failure("q", "boom".into(), Some("SELECT x".into()));
        assert!(!outcome.is_success());
        let response = outcome.to_response();
        assert_eq!(response.error.as_deref(), Some("boom"));
        assert_eq!(response.sql.as_deref(), Some("SELECT x"));
        assert!(response.data.is_none());
        assert!(response.summary.is_none());
    }
}
