//! Query Log
//!
//! Bounded, newest-last ring of answered questions. Oldest entries are dropped
//! once the capacity is reached. Nothing is written to disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

pub const DEFAULT_QUERY_LOG_CAPACITY: usize = 200;

/// One answered question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLogEntry {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub question: String,
    pub sql: Option<String>,
    pub success: bool,
    pub attempts: u32,
    pub elapsed_seconds: Option<f64>,
    pub error: Option<String>,
}

pub struct QueryLog {
    entries: Mutex<VecDeque<QueryLogEntry>>,
    capacity: usize,
}

impl QueryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_QUERY_LOG_CAPACITY))),
            capacity,
        }
    }

    pub fn record(&self, entry: QueryLogEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<QueryLogEntry> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QueryLog {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(question: &str) -> QueryLogEntry {
        QueryLogEntry {
            timestamp: Utc::now(),
            request_id: format!("req-{}", question),
            question: question.to_string(),
            sql: Some("SELECT 1".into()),
            success: true,
            attempts: 1,
            elapsed_seconds: Some(0.01),
            error: None,
        }
    }

    #[test]
    fn test_recent_is_newest_first() {
        let log = QueryLog::new(10);
        log.record(entry("a"));
        log.record(entry("b"));
        log.record(entry("c"));

        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].question, "c");
        assert_eq!(recent[1].question, "b");
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let log = QueryLog::new(2);
        log.record(entry("a"));
        log.record(entry("b"));
        log.record(entry("c"));

        assert_eq!(log.len(), 2);
        let questions: Vec<_> = log.recent(10).into_iter().map(|e| e.question).collect();
        assert_eq!(questions, vec!["c", "b"]);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let log = QueryLog::new(0);
        log.record(entry("a"));
        assert!(log.is_empty());
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let value = serde_json::to_value(entry("a")).unwrap();
        assert!(value.get("requestId").is_some());
        assert!(value.get("elapsedSeconds").is_some());
    }
}
