//! Text-generation backend
//!
//! The decomposer treats the backend as an opaque `text -> text` function.
//! No structural contract is placed on what comes back.

pub mod ollama;
pub mod retry;

pub use ollama::OllamaGenerator;
pub use retry::RetryPolicy;

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Prompt handed to a text generator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptContext {
    /// Role or framing instructions
    pub system: String,
    /// The request itself
    pub user: String,
}

impl PromptContext {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Flatten into a single prompt for backends without a system slot
    pub fn render(&self) -> String {
        if self.system.is_empty() {
            self.user.clone()
        } else {
            format!("{}\n\n{}", self.system, self.user)
        }
    }
}

/// Opaque text-generation function; may fail transiently
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &PromptContext) -> Result<String>;

    /// Backend identifier for logs
    fn name(&self) -> &str {
        "generator"
    }
}
