//! Result Summarizer
//!
//! Best-effort prose answer over a result set. Never fails: any problem is
//! logged and replaced by an apology that names summarization, not the query.

use crate::error::{AssistantError, GenerationError};
use crate::llm::{GenerationOptions, TextGenerator};
use crate::schema::SchemaDescription;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const SUMMARY_FALLBACK: &str = "The query ran successfully, but I couldn't summarize the \
    results. Please review the data below.";
pub const NO_RECORDS_SUMMARY: &str = "No matching records were found.";
pub const TRUNCATION_MARKER: &str = "\n... (results truncated)";

pub struct ResultSummarizer {
    client: Arc<dyn TextGenerator>,
    char_budget: usize,
    timeout: Duration,
}

impl ResultSummarizer {
    pub fn new(client: Arc<dyn TextGenerator>, char_budget: usize, timeout: Duration) -> Self {
        Self {
            client,
            char_budget,
            timeout,
        }
    }

    pub async fn summarize(
        &self,
        question: &str,
        rows: &[serde_json::Value],
        schema: &SchemaDescription,
    ) -> String {
        if rows.is_empty() {
            return NO_RECORDS_SUMMARY.to_string();
        }

        match self.try_summarize(question, rows, schema).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Falling back to apology summary");
                SUMMARY_FALLBACK.to_string()
            }
        }
    }

    async fn try_summarize(
        &self,
        question: &str,
        rows: &[serde_json::Value],
        schema: &SchemaDescription,
    ) -> crate::error::Result<String> {
        let data = serialize_rows(rows, self.char_budget)?;
        let system_instruction = build_system_instruction(schema);
        let prompt = format!(
            "Question: {}\n\nQuery results ({} rows):\n{}",
            question,
            rows.len(),
            data
        );

        let options = GenerationOptions::summary();
        let text = tokio::time::timeout(
            self.timeout,
            self.client.generate(&system_instruction, &prompt, &options),
        )
        .await
        .map_err(|_| GenerationError::Timeout(self.timeout.as_millis() as u64))
        .and_then(|r| r)
        .map_err(|e| AssistantError::SummarizationFailed(e.to_string()))?;

        let text = text.trim();
        if text.is_empty() {
            return Err(AssistantError::SummarizationFailed(
                "model returned empty text".into(),
            ));
        }
        debug!(chars = text.len(), "Summary generated");
        Ok(text.to_string())
    }
}

/// Pretty JSON cut at `budget` characters, with a marker when anything was dropped.
fn serialize_rows(rows: &[serde_json::Value], budget: usize) -> crate::error::Result<String> {
    let full = serde_json::to_string_pretty(rows)?;
    match full.char_indices().nth(budget) {
        Some((cut, _)) => Ok(format!("{}{}", &full[..cut], TRUNCATION_MARKER)),
        None => Ok(full),
    }
}

fn build_system_instruction(schema: &SchemaDescription) -> String {
    let mut instruction = String::from(
        "You answer questions about a martial-arts school's records using only the query \
         results provided.\n\n\
         Rules:\n\
         - Answer the original question directly from the given data; do not speculate beyond it.\n\
         - If the results are empty or every value is zero, say plainly that no matching \
         records were found. Do not suggest the data or capability is missing.\n\
         - Do not repeat raw values verbatim beyond what the answer needs.\n\
         - Reply in one or two sentences of plain text. No markdown, lists or tables.",
    );
    let notes = schema.notes();
    if !notes.is_empty() {
        instruction.push_str("\n\nData conventions:\n");
        instruction.push_str(notes);
    }
    instruction
}
