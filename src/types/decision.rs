//! Orchestration decisions
//!
//! One decision is recorded per subtask selection. Its outcome is written
//! exactly once, after which the decision is immutable.

use crate::errors::{Result, SymphonyError};
use crate::types::{CapabilitySet, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observed outcome of a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOutcome {
    Success,
    Failure,
    Partial,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Success => "success",
            DecisionOutcome::Failure => "failure",
            DecisionOutcome::Partial => "partial",
        }
    }
}

/// A candidate strategy that was ranked but not chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeStrategy {
    pub capabilities: CapabilitySet,
    pub score: f64,
    pub samples: u64,
    /// Where the score came from ("ledger" or "memory")
    pub source: String,
}

/// Documents one capability selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationDecision {
    pub id: String,
    pub task_id: TaskId,
    pub capabilities: CapabilitySet,
    pub reasoning: String,

    /// Always within [0.0, 1.0]
    pub confidence: f64,

    pub alternatives: Vec<AlternativeStrategy>,
    pub timestamp: DateTime<Utc>,

    /// None until the outcome is known
    pub outcome: Option<DecisionOutcome>,
    pub learning_feedback: Option<String>,
}

impl OrchestrationDecision {
    pub fn new(
        task_id: TaskId,
        capabilities: CapabilitySet,
        reasoning: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id,
            capabilities,
            reasoning: reasoning.into(),
            confidence: clamp_unit(confidence),
            alternatives: Vec::new(),
            timestamp: Utc::now(),
            outcome: None,
            learning_feedback: None,
        }
    }

    pub fn with_alternatives(mut self, alternatives: Vec<AlternativeStrategy>) -> Self {
        self.alternatives = alternatives;
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    /// Write the outcome; a second call is rejected
    pub fn record_outcome(
        &mut self,
        outcome: DecisionOutcome,
        feedback: impl Into<String>,
    ) -> Result<()> {
        if self.outcome.is_some() {
            return Err(SymphonyError::DecisionAlreadyResolved(self.id.clone()));
        }
        self.outcome = Some(outcome);
        self.learning_feedback = Some(feedback.into());
        Ok(())
    }
}

/// Clamp into [0, 1], mapping NaN to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
