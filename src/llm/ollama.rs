//! Ollama text-generation adapter
//!
//! Endpoint: POST /api/generate, non-streaming. Connection failures and
//! non-success statuses surface as transient `TextBackend` errors so the
//! retry policy can take another attempt.

use crate::config::Config;
use crate::errors::{Result, SymphonyError};
use crate::llm::{PromptContext, RetryPolicy, TextGenerator};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

/// Ollama generation client
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl OllamaGenerator {
    /// Create client with explicit endpoint, model and request timeout
    pub fn with_config(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SymphonyError::HttpError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Create client from the `[llm]` configuration section
    pub fn from_config(config: &Config) -> Result<Self> {
        let generator = Self::with_config(
            &config.llm_url(),
            &config.llm.model,
            Duration::from_secs(config.llm.timeout_secs),
        )?;
        Ok(generator.with_retry(RetryPolicy::with_max_attempts(config.llm.max_retries)))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn generate_once(&self, prompt: &PromptContext) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model: &self.model,
            prompt: &prompt.user,
            system: (!prompt.system.is_empty()).then_some(prompt.system.as_str()),
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SymphonyError::TextBackend(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SymphonyError::TextBackend(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SymphonyError::TextBackend(format!("Malformed response: {}", e)))?;

        debug!(model = %self.model, chars = body.response.len(), "generation finished");
        Ok(body.response)
    }

    /// Check if Ollama is reachable
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/version", self.base_url);
        matches!(self.client.get(&url).send().await, Ok(r) if r.status().is_success())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn complete(&self, prompt: &PromptContext) -> Result<String> {
        self.retry
            .execute_with_retry(|| self.generate_once(prompt))
            .await
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}
