//! Text-generation collaborator
//!
//! `TextGenerator` is the capability the generator and summarizer depend on.
//! Backends implement it; `FailoverClient` chains several backends so callers
//! never know which provider or model answered.

pub mod failover;
pub mod openai;

pub use failover::FailoverClient;
pub use openai::OpenAiClient;

use crate::error::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-call sampling options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationOptions {
    /// Near-deterministic output for SQL
    pub fn precise() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 1024,
        }
    }

    /// Short prose answers
    pub fn summary() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 256,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::precise()
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Backend name used in logs (e.g. the model id)
    fn name(&self) -> &str;

    async fn generate(
        &self,
        system_instruction: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> std::result::Result<String, GenerationError>;
}
