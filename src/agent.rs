//! LLM summarisation of the introduction text.
//!
//! Uses rstructor for the Gemini client.

use crate::config::{AgentConfig, ConfigError};
use async_trait::async_trait;
use rstructor::{GeminiClient, GeminiModel, LLMClient};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    #[error("failed to parse response: {0}")]
    ParseError(String),
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, AgentError>;
}

#[derive(Deserialize)]
struct SummaryResponse {
    summary: String,
}

pub struct GeminiSummarizer {
    api_key: String,
    model: String,
    persona: String,
}

impl GeminiSummarizer {
    pub fn new(config: &AgentConfig, api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: config.model.clone(),
            persona: config.persona.clone(),
        }
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, AgentError> {
        let client = GeminiClient::new(&self.api_key)
            .map_err(|e| AgentError::RequestFailed(e.to_string()))?
            .model(parse_gemini_model(&self.model));

        let prompt = format!(
            r#"{}

Summarise the following text about a country in two or three sentences.

You MUST respond with valid JSON matching this exact schema:
{{
  "summary": "string - the summary"
}}

Do not include any markdown formatting, code blocks, or explanations. Only output the raw JSON object.

---

{}"#,
            self.persona, text
        );

        let result = client
            .generate_with_metadata(&prompt)
            .await
            .map_err(|e| AgentError::RequestFailed(e.to_string()))?;

        parse_summary(&result.text)
    }
}

fn parse_summary(text: &str) -> Result<String, AgentError> {
    let cleaned = strip_markdown_json(text);
    let response: SummaryResponse = serde_json::from_str(&cleaned)
        .map_err(|e| AgentError::ParseError(format!("{}: {}", e, cleaned)))?;
    let summary = response.summary.trim();
    if summary.is_empty() {
        return Err(AgentError::ParseError("empty summary".to_string()));
    }
    Ok(summary.to_string())
}

/// Strip markdown code block wrappers from JSON response
fn strip_markdown_json(text: &str) -> String {
    let trimmed = text.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        let without_prefix = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end_idx) = without_prefix.rfind("```") {
            return without_prefix[..end_idx].trim().to_string();
        }
    }

    trimmed.to_string()
}

/// Parse a model string into a GeminiModel
fn parse_gemini_model(model: &str) -> GeminiModel {
    match model {
        "gemini-2.0-flash" => GeminiModel::Gemini20Flash,
        "gemini-2.5-flash" => GeminiModel::Gemini25Flash,
        "gemini-2.5-pro" => GeminiModel::Gemini25Pro,
        _ => GeminiModel::Gemini20Flash,
    }
}
