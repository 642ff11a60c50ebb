//! Executors backed by the text-generation backend
//!
//! Each capability gets a specialist prompt. A non-empty response counts
//! as success with a fixed confidence.

use crate::errors::Result;
use crate::executor::{Executor, Outcome};
use crate::llm::{PromptContext, TextGenerator};
use crate::types::Task;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Confidence reported for a non-empty generated answer
pub const GENERATIVE_CONFIDENCE: f64 = 0.8;

pub struct GenerativeExecutor {
    capability: String,
    generator: Arc<dyn TextGenerator>,
}

impl GenerativeExecutor {
    pub fn new(capability: impl Into<String>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            capability: capability.into(),
            generator,
        }
    }

    fn specialist_prompt(&self) -> String {
        let focus = match self.capability.as_str() {
            "research" => "thorough research and information gathering: collect facts, structure them and note sources",
            "code" => "programming: write, test and debug code, explaining the important decisions",
            "analysis" => "data analysis and pattern recognition: derive findings and state how certain they are",
            "creative" => "content generation and design: produce original, well-structured material",
            "security" => "security review and threat detection: list risks with severity and mitigations",
            "optimization" => "performance and cost optimization: identify bottlenecks and concrete improvements",
            "human_interface" => "communication with people: explain results clearly for a non-expert audience",
            _ => "the assigned subtask",
        };
        format!(
            "You are a {} specialist. You focus on {}.",
            self.capability.replace('_', " "),
            focus
        )
    }
}

#[async_trait]
impl Executor for GenerativeExecutor {
    fn capability(&self) -> &str {
        &self.capability
    }

    async fn invoke(&self, task: &Task, cancel: CancellationToken) -> Result<Outcome> {
        let context = serde_json::to_string(&task.context)?;
        let prompt = PromptContext::new(
            self.specialist_prompt(),
            format!("Task: {}\nContext: {}", task.description, context),
        );

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(Outcome::failure(self.capability.as_str(), "cancelled"));
            }
            response = self.generator.complete(&prompt) => response?,
        };

        if response.trim().is_empty() {
            return Ok(Outcome::failure(self.capability.as_str(), "empty response"));
        }

        Ok(Outcome::success(
            self.capability.as_str(),
            json!({
                "type": format!("{}_result", self.capability),
                "content": response,
                "capability": self.capability,
            }),
            GENERATIVE_CONFIDENCE,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl TextGenerator for Echo {
        async fn complete(&self, prompt: &PromptContext) -> Result<String> {
            Ok(prompt.user.clone())
        }
    }

    struct Silent;

    #[async_trait]
    impl TextGenerator for Silent {
        async fn complete(&self, _prompt: &PromptContext) -> Result<String> {
            Ok("  ".to_string())
        }
    }

    #[tokio::test]
    async fn test_non_empty_response_succeeds() {
        let executor = GenerativeExecutor::new("research", Arc::new(Echo));
        let outcome = executor
            .invoke(&Task::new("survey rust web frameworks"), CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.confidence, GENERATIVE_CONFIDENCE);
        let payload = outcome.payload.unwrap();
        assert_eq!(payload["type"], "research_result");
        assert!(payload["content"].as_str().unwrap().contains("survey rust web frameworks"));
    }

    #[tokio::test]
    async fn test_empty_response_fails() {
        let executor = GenerativeExecutor::new("code", Arc::new(Silent));
        let outcome = executor.invoke(&Task::new("x"), CancellationToken::new()).await.unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_cancelled_before_answer() {
        let executor = GenerativeExecutor::new("code", Arc::new(Echo));
        let token = CancellationToken::new();
        token.cancel();
        let outcome = executor.invoke(&Task::new("x"), token).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("cancelled"));
    }
}
