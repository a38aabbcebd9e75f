//! Natural-language query assistant for the school administration database.
//!
//! A question is turned into a read-only SQL query, checked by the database
//! planner, executed, and summarized in plain language.

pub mod clock;
pub mod config;
pub mod data_assistant;
pub mod db;
pub mod error;
pub mod execution_loop;
pub mod executor;
pub mod llm;
pub mod observability;
pub mod schema;
pub mod summarizer;

pub use data_assistant::{AssistantOutcome, AssistantResponse, DataAssistant};
pub use error::{AssistantError, Result};
