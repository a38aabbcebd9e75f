//! Ordered fail-over across text-generation backends
//!
//! Backends are tried in order. Only a rate-limit signal moves on to the next
//! backend; any other failure is returned immediately.

use crate::error::GenerationError;
use crate::llm::{GenerationOptions, TextGenerator};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub struct FailoverClient {
    backends: Vec<Arc<dyn TextGenerator>>,
}

impl FailoverClient {
    pub fn new(primary: Arc<dyn TextGenerator>) -> Self {
        Self { backends: vec![primary] }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn TextGenerator>) -> Self {
        self.backends.push(fallback);
        self
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }
}

#[async_trait]
impl TextGenerator for FailoverClient {
    fn name(&self) -> &str {
        self.backends.first().map(|b| b.name()).unwrap_or("failover")
    }

    async fn generate(
        &self,
        system_instruction: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> std::result::Result<String, GenerationError> {
        let mut last_error = GenerationError::Other("no generation backend configured".to_string());

        for (index, backend) in self.backends.iter().enumerate() {
            match backend.generate(system_instruction, user_prompt, options).await {
                Err(GenerationError::RateLimited(model)) => {
                    if let Some(next) = self.backends.get(index + 1) {
                        warn!(
                            from = %model,
                            to = %next.name(),
                            "Rate limited, failing over to next model"
                        );
                    }
                    last_error = GenerationError::RateLimited(model);
                }
                other => return other,
            }
        }

        Err(last_error)
    }
}
