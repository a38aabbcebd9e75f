//! Query Generator
//!
//! Turns a question (and, on retries, the rejected SQL plus the reason it was
//! rejected) into a candidate SELECT statement.

use crate::error::GenerationError;
use crate::llm::{GenerationOptions, TextGenerator};
use crate::schema::SchemaDescription;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Token the model returns when the question cannot be answered with a query.
pub const UNSUPPORTED_SENTINEL: &str = "UNSUPPORTED";

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"```[A-Za-z]*").unwrap();
}

/// Input record for one generation call. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationAttempt {
    pub question: String,
    pub previous_sql: Option<String>,
    pub previous_error: Option<String>,
    pub attempt_index: u32,
}

impl GenerationAttempt {
    pub fn first(question: &str) -> Self {
        Self {
            question: question.to_string(),
            previous_sql: None,
            previous_error: None,
            attempt_index: 0,
        }
    }

    /// The next attempt, carrying the failed SQL (if any) and its error as feedback.
    pub fn retry(&self, previous_sql: Option<String>, previous_error: String) -> Self {
        Self {
            question: self.question.clone(),
            previous_sql,
            previous_error: Some(previous_error),
            attempt_index: self.attempt_index + 1,
        }
    }

    pub fn is_retry(&self) -> bool {
        self.previous_error.is_some()
    }
}

/// SQL proposed by the model that passed the textual SELECT check. Not yet trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuery(String);

impl CandidateQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[cfg(test)]
impl CandidateQuery {
    pub(crate) fn from_trusted(sql: &str) -> Self {
        Self(sql.to_string())
    }
}

pub struct QueryGenerator {
    client: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl QueryGenerator {
    pub fn new(client: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// `Ok(None)` means the model produced nothing usable this attempt.
    pub async fn generate(
        &self,
        schema: &SchemaDescription,
        attempt: &GenerationAttempt,
    ) -> std::result::Result<Option<CandidateQuery>, GenerationError> {
        let system_instruction = build_system_instruction(schema);
        let task = build_task_prompt(attempt);

        info!(
            attempt = attempt.attempt_index,
            retry = attempt.is_retry(),
            model = %self.client.name(),
            "Generating SQL"
        );

        let options = GenerationOptions::precise();
        let raw = tokio::time::timeout(
            self.timeout,
            self.client.generate(&system_instruction, &task, &options),
        )
        .await
        .map_err(|_| GenerationError::Timeout(self.timeout.as_millis() as u64))??;

        debug!(raw = %raw, "Raw generator output");

        match clean_generated_sql(&raw) {
            Some(sql) => Ok(Some(CandidateQuery(sql))),
            None => {
                warn!(
                    attempt = attempt.attempt_index,
                    "Generator output is not a usable SELECT query"
                );
                Ok(None)
            }
        }
    }
}

/// Strip code fences, `--` comments and a trailing terminator, then require a
/// leading SELECT. Returns `None` for the unsupported sentinel or anything else.
pub fn clean_generated_sql(raw: &str) -> Option<String> {
    let without_fences = CODE_FENCE.replace_all(raw, "");
    let without_comments = strip_line_comments(&without_fences);
    let cleaned = without_comments.trim().trim_end_matches(';').trim();

    if cleaned.eq_ignore_ascii_case(UNSUPPORTED_SENTINEL) {
        return None;
    }

    let has_select_prefix = cleaned
        .get(..6)
        .map(|head| head.eq_ignore_ascii_case("select"))
        .unwrap_or(false);
    if !has_select_prefix {
        return None;
    }

    Some(cleaned.to_string())
}

/// Drop `--` comments up to the end of the line. A `--` inside a single-quoted
/// literal is data and stays; a doubled `''` toggles the quote state twice.
fn strip_line_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_literal = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                out.push(c);
            }
            '-' if !in_literal && chars.peek() == Some(&'-') => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn build_system_instruction(schema: &SchemaDescription) -> String {
    format!(
        r#"You translate questions about a martial-arts school's administrative database into PostgreSQL queries.

{schema}

Rules:
- Return exactly one read-only SELECT statement and nothing else: no explanation, no markdown.
- Never write INSERT, UPDATE, DELETE, DROP, ALTER, TRUNCATE, GRANT or any statement that changes data.
- Use only the tables and columns listed above.
- Relative dates: use CURRENT_DATE and interval arithmetic (e.g. CURRENT_DATE - INTERVAL '30 days', date_trunc('month', CURRENT_DATE)).
- Enumerated columns: cast to text before comparing or grouping (rank::text = 'yellow').
- Text comparisons are case-insensitive: use ILIKE or lower() on both sides.
- Money is stored in integer cents: divide by 100.0 when returning currency amounts.
- Aggregates must be null-safe: COALESCE(SUM(x), 0), COUNT(column) vs COUNT(*) as appropriate.
- Qualify columns with table aliases whenever more than one table is involved.
- Give every output column a distinct name (s.name AS student_name, f.name AS family_name).
- If the question cannot be answered from this schema, return exactly {sentinel}"#,
        schema = schema.as_str(),
        sentinel = UNSUPPORTED_SENTINEL,
    )
}

fn build_task_prompt(attempt: &GenerationAttempt) -> String {
    match (&attempt.previous_sql, &attempt.previous_error) {
        (Some(sql), Some(error)) => format!(
            "Question: {question}\n\nThis query was rejected by the database:\n{sql}\n\n\
             Error: {error}\n\nFix this specific error and return the corrected SELECT query.",
            question = attempt.question,
            sql = sql,
            error = error,
        ),
        (None, Some(error)) => format!(
            "Question: {question}\n\nThe previous attempt did not produce a usable query \
             ({error}).\n\nReturn a single SELECT query that answers the question.",
            question = attempt.question,
            error = error,
        ),
        _ => format!(
            "Translate this question into a single PostgreSQL SELECT query.\n\nQuestion: {}",
            attempt.question
        ),
    }
}
