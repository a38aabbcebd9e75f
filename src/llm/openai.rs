//! OpenAI-compatible chat completions backend

use crate::error::GenerationError;
use crate::llm::{GenerationOptions, TextGenerator};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self::with_http_client(api_key, model, base_url, reqwest::Client::new())
    }

    /// Share one connection pool across several backends
    pub fn with_http_client(
        api_key: String,
        model: String,
        base_url: String,
        client: reqwest::Client,
    ) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
        }
    }

    pub fn build_http_client(
        timeout: Duration,
    ) -> std::result::Result<reqwest::Client, GenerationError> {
        reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GenerationError::Other(format!("Failed to create HTTP client: {}", e)))
    }

    fn request_body(
        &self,
        system_instruction: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_instruction},
                {"role": "user", "content": user_prompt}
            ],
        });

        // Reasoning models reject temperature and use max_completion_tokens
        let reasoning = ["o1", "o3", "gpt-5"];
        if reasoning.iter().any(|prefix| self.model.starts_with(prefix)) {
            body["max_completion_tokens"] = serde_json::json!(options.max_tokens.max(2000));
        } else {
            body["temperature"] = serde_json::json!(options.temperature);
            body["max_tokens"] = serde_json::json!(options.max_tokens);
        }
        body
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        system_instruction: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> std::result::Result<String, GenerationError> {
        let body = self.request_body(system_instruction, user_prompt, options);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Other(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(model = %self.model, "LLM API rate limited");
            return Err(GenerationError::RateLimited(self.model.clone()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Other(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Other(format!("Failed to parse LLM response: {}", e)))?;

        parse_completion(&response_json, &self.model)
    }
}

/// Pull the message text out of a chat completions response body.
pub(crate) fn parse_completion(
    response_json: &serde_json::Value,
    model: &str,
) -> std::result::Result<String, GenerationError> {
    if let Some(error) = response_json.get("error") {
        let code = error.get("code").and_then(|c| c.as_str()).unwrap_or_default();
        if code == "rate_limit_exceeded" {
            return Err(GenerationError::RateLimited(model.to_string()));
        }
        return Err(GenerationError::Other(format!("LLM API error: {}", error)));
    }

    let choice = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| GenerationError::Other("No choices in LLM response".to_string()))?;

    match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("content_filter") => return Err(GenerationError::SafetyBlocked),
        Some("length") => warn!(model = %model, "LLM response was truncated due to length limit"),
        _ => {}
    }

    let message = &choice["message"];
    if message.get("refusal").and_then(|r| r.as_str()).is_some() {
        return Err(GenerationError::SafetyBlocked);
    }

    let content = message["content"].as_str().unwrap_or_default();
    debug!(model = %model, chars = content.len(), "LLM response received");
    Ok(content.to_string())
}
