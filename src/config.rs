//! Assistant configuration
//!
//! Read from the process environment. Binaries call `dotenv::dotenv()` first
//! so a local `.env` file can supply the same variables.

use crate::error::{AssistantError, Result};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_PRIMARY_MODEL: &str = "gpt-4o";
pub const DEFAULT_FALLBACK_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_RETRIES: u32 = 1;
/// Upper limit on the retry bound; every retry costs a full model round trip.
pub const MAX_RETRIES_CEILING: u32 = 5;
pub const DEFAULT_SUMMARY_CHAR_BUDGET: usize = 8000;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub database_url: Option<String>,
    pub database_schema: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub primary_model: String,
    pub fallback_model: Option<String>,
    pub max_retries: u32,
    pub summary_char_budget: usize,
    pub generation_timeout: Duration,
    pub validation_timeout: Duration,
    pub statement_timeout: Duration,
    pub bind_addr: String,
    pub schema_notes: Vec<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_schema: "public".to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            primary_model: DEFAULT_PRIMARY_MODEL.to_string(),
            fallback_model: Some(DEFAULT_FALLBACK_MODEL.to_string()),
            max_retries: DEFAULT_MAX_RETRIES,
            summary_char_budget: DEFAULT_SUMMARY_CHAR_BUDGET,
            generation_timeout: Duration::from_secs(30),
            validation_timeout: Duration::from_secs(10),
            statement_timeout: Duration::from_secs(15),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            schema_notes: Vec::new(),
        }
    }
}

impl AssistantConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Build from an explicit variable map. Unset variables keep their defaults.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        config.database_url = get("DATABASE_URL").map(str::to_string);
        if let Some(schema) = get("DATABASE_SCHEMA") {
            config.database_schema = schema.to_string();
        }
        config.api_key = get("OPENAI_API_KEY").map(str::to_string);
        if let Some(url) = get("OPENAI_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get("ASSISTANT_PRIMARY_MODEL") {
            config.primary_model = model.to_string();
        }
        // "none" disables fail-over entirely
        if let Some(model) = get("ASSISTANT_FALLBACK_MODEL") {
            config.fallback_model = if model.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(model.to_string())
            };
        }
        if let Some(raw) = get("ASSISTANT_MAX_RETRIES") {
            let retries: u32 = parse_var("ASSISTANT_MAX_RETRIES", raw)?;
            if retries > MAX_RETRIES_CEILING {
                return Err(AssistantError::Config(format!(
                    "ASSISTANT_MAX_RETRIES must be at most {}, got {}",
                    MAX_RETRIES_CEILING, retries
                )));
            }
            config.max_retries = retries;
        }
        if let Some(raw) = get("ASSISTANT_SUMMARY_CHAR_BUDGET") {
            config.summary_char_budget = parse_var("ASSISTANT_SUMMARY_CHAR_BUDGET", raw)?;
        }
        if let Some(raw) = get("ASSISTANT_GENERATION_TIMEOUT_SECS") {
            config.generation_timeout =
                Duration::from_secs(parse_var("ASSISTANT_GENERATION_TIMEOUT_SECS", raw)?);
        }
        if let Some(raw) = get("ASSISTANT_VALIDATION_TIMEOUT_SECS") {
            config.validation_timeout =
                Duration::from_secs(parse_var("ASSISTANT_VALIDATION_TIMEOUT_SECS", raw)?);
        }
        if let Some(raw) = get("ASSISTANT_STATEMENT_TIMEOUT_SECS") {
            config.statement_timeout =
                Duration::from_secs(parse_var("ASSISTANT_STATEMENT_TIMEOUT_SECS", raw)?);
        }
        if let Some(addr) = get("ASSISTANT_BIND_ADDR") {
            config.bind_addr = addr.to_string();
        }
        if let Some(notes) = get("ASSISTANT_SCHEMA_NOTES") {
            config.schema_notes = notes
                .split(';')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(config)
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| AssistantError::Config("DATABASE_URL is not set".to_string()))
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AssistantError::Config("OPENAI_API_KEY is not set".to_string()))
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| {
        AssistantError::Config(format!("Invalid value for {}: '{}' ({})", key, raw, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AssistantConfig::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.summary_char_budget, 8000);
        assert_eq!(config.primary_model, DEFAULT_PRIMARY_MODEL);
        assert_eq!(config.fallback_model.as_deref(), Some(DEFAULT_FALLBACK_MODEL));
        assert!(config.require_database_url().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = AssistantConfig::from_vars(&vars(&[
            ("DATABASE_URL", "postgres://localhost/dojo"),
            ("OPENAI_BASE_URL", "http://localhost:11434/v1/"),
            ("ASSISTANT_MAX_RETRIES", "3"),
            ("ASSISTANT_FALLBACK_MODEL", "none"),
            ("ASSISTANT_SCHEMA_NOTES", "belts are ordered white to black; ; fees are monthly"),
        ]))
        .unwrap();
        assert_eq!(config.require_database_url().unwrap(), "postgres://localhost/dojo");
        assert_eq!(config.base_url, "http://localhost:11434/v1");
        assert_eq!(config.max_retries, 3);
        assert!(config.fallback_model.is_none());
        assert_eq!(config.schema_notes.len(), 2);
    }

    #[test]
    fn test_rejects_unbounded_retries() {
        let err =
            AssistantConfig::from_vars(&vars(&[("ASSISTANT_MAX_RETRIES", "50")])).unwrap_err();
        assert!(matches!(err, AssistantError::Config(_)));

        let err =
            AssistantConfig::from_vars(&vars(&[("ASSISTANT_MAX_RETRIES", "many")])).unwrap_err();
        assert!(err.to_string().contains("ASSISTANT_MAX_RETRIES"));
    }
}
