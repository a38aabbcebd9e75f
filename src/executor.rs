//! Query Executor
//!
//! Runs an accepted query through the store's read-only entry point and times
//! it. Database messages are logged for operators and replaced with
//! user-safe text before they leave this module.

use crate::db::store::DatabaseStore;
use crate::error::{AssistantError, Result, StoreError};
use crate::execution_loop::ValidatedQuery;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

pub const SELECT_ONLY_POLICY_MESSAGE: &str =
    "Only SELECT queries are allowed. The assistant can read data but cannot change it.";
pub const GENERIC_FAILURE_MESSAGE: &str =
    "The query failed to run. Please try again or rephrase your question.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub rows: Vec<serde_json::Value>,
    pub elapsed_seconds: f64,
}

pub struct QueryExecutor {
    store: Arc<dyn DatabaseStore>,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn DatabaseStore>) -> Self {
        Self { store }
    }

    /// Fails only with `AssistantError::ExecutionFailed` carrying a sanitized message.
    pub async fn execute(&self, query: &ValidatedQuery) -> Result<ExecutionResult> {
        let started = Instant::now();
        let outcome = self.store.execute_read_only(query.as_str()).await;
        let elapsed_seconds = started.elapsed().as_secs_f64();

        match outcome {
            Ok(value) => {
                let rows = into_rows(value);
                info!(rows = rows.len(), elapsed_seconds, "Query executed");
                Ok(ExecutionResult { rows, elapsed_seconds })
            }
            Err(e) => {
                error!(
                    error = %e,
                    sql = %query.as_str(),
                    elapsed_seconds,
                    "Query execution failed"
                );
                Err(AssistantError::ExecutionFailed(sanitize_store_error(&e).to_string()))
            }
        }
    }
}

/// A null result is an empty result; a lone object is a single row.
fn into_rows(value: serde_json::Value) -> Vec<serde_json::Value> {
    match value {
        serde_json::Value::Array(rows) => rows,
        serde_json::Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn sanitize_store_error(e: &StoreError) -> &'static str {
    let is_select_policy = match e {
        StoreError::Rejected(_) => true,
        other => other.to_string().to_lowercase().contains("only select statements are allowed"),
    };
    if is_select_policy {
        SELECT_ONLY_POLICY_MESSAGE
    } else {
        GENERIC_FAILURE_MESSAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::SchemaInfo;
    use crate::execution_loop::CandidateQuery;
    use async_trait::async_trait;
    use serde_json::json;

    struct ExecStore(std::result::Result<serde_json::Value, StoreError>);

    #[async_trait]
    impl DatabaseStore for ExecStore {
        async fn describe_schema(&self) -> std::result::Result<SchemaInfo, StoreError> {
            unreachable!()
        }

        async fn plan_only(&self, _: &str) -> std::result::Result<serde_json::Value, StoreError> {
            panic!("executor must not use the plan-only path");
        }

        async fn execute_read_only(
            &self,
            _: &str,
        ) -> std::result::Result<serde_json::Value, StoreError> {
            self.0.clone()
        }
    }

    fn query(sql: &str) -> ValidatedQuery {
        ValidatedQuery::accept(CandidateQuery::from_trusted(sql))
    }

    #[tokio::test]
    async fn test_rows_and_timing() {
        let rows = json!([{"rank": "white", "count": 4}]);
        let executor = QueryExecutor::new(Arc::new(ExecStore(Ok(rows))));
        let result = executor.execute(&query("SELECT 1")).await.unwrap();
        assert_eq!(result.rows.len(), 1);
        assert!(result.elapsed_seconds >= 0.0);
    }

    #[tokio::test]
    async fn test_empty_and_null_results_succeed() {
        let executor = QueryExecutor::new(Arc::new(ExecStore(Ok(json!([])))));
        assert!(executor.execute(&query("SELECT 1")).await.unwrap().rows.is_empty());

        let executor = QueryExecutor::new(Arc::new(ExecStore(Ok(serde_json::Value::Null))));
        assert!(executor.execute(&query("SELECT 1")).await.unwrap().rows.is_empty());
    }

    #[tokio::test]
    async fn test_select_policy_message() {
        let executor = QueryExecutor::new(Arc::new(ExecStore(Err(StoreError::Rejected(
            "Only SELECT statements are allowed".into(),
        )))));
        let err = executor.execute(&query("SELECT 1")).await.unwrap_err();
        assert_eq!(err.to_string(), format!("Execution failed: {}", SELECT_ONLY_POLICY_MESSAGE));
    }

    #[tokio::test]
    async fn test_database_internals_are_hidden() {
        let executor = QueryExecutor::new(Arc::new(ExecStore(Err(StoreError::Query(
            "relation \"pg_authid\" permission denied".into(),
        )))));
        match executor.execute(&query("SELECT 1")).await.unwrap_err() {
            AssistantError::ExecutionFailed(message) => {
                assert_eq!(message, GENERIC_FAILURE_MESSAGE);
                assert!(!message.contains("pg_authid"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
