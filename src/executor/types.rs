//! Executor outcome

use crate::types::decision::clamp_unit;
use serde::{Deserialize, Serialize};

/// Structured result of one executor invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub capability: String,
    pub success: bool,
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Self-reported confidence in [0, 1]
    pub confidence: f64,
}

impl Outcome {
    pub fn success(capability: impl Into<String>, payload: serde_json::Value, confidence: f64) -> Self {
        Self {
            capability: capability.into(),
            success: true,
            payload: Some(payload),
            error: None,
            confidence: clamp_unit(confidence),
        }
    }

    pub fn failure(capability: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            success: false,
            payload: None,
            error: Some(error.into()),
            confidence: 0.0,
        }
    }
}
