//! Bounded executor pool
//!
//! A semaphore caps the number of subtasks in flight. Each subtask runs all
//! executors of its capability set in order inside one slot, under a single
//! timeout. On timeout the invocation token is cancelled, the slot is
//! released and the subtask is reported as failed.

use crate::errors::{Result, SymphonyError};
use crate::executor::{ExecutorRegistry, Outcome};
use crate::types::{CapabilitySet, DecisionOutcome, Task};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Aggregated result of running one capability set against one subtask
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub capabilities: CapabilitySet,
    /// Success if all capabilities succeeded, partial if some did
    pub status: DecisionOutcome,
    /// Mean confidence of the successful invocations
    pub confidence: f64,
    /// Payloads in capability order
    pub payloads: Vec<serde_json::Value>,
    pub errors: Vec<String>,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ExecutionReport {
    fn from_outcomes(capabilities: &CapabilitySet, outcomes: Vec<Outcome>, elapsed: Duration) -> Self {
        let succeeded: Vec<&Outcome> = outcomes.iter().filter(|o| o.success).collect();

        let status = if outcomes.is_empty() || succeeded.is_empty() {
            DecisionOutcome::Failure
        } else if succeeded.len() == outcomes.len() {
            DecisionOutcome::Success
        } else {
            DecisionOutcome::Partial
        };

        let confidence = if succeeded.is_empty() {
            0.0
        } else {
            succeeded.iter().map(|o| o.confidence).sum::<f64>() / succeeded.len() as f64
        };

        let errors = outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| format!("{}: {}", o.capability, e)))
            .collect();

        Self {
            capabilities: capabilities.clone(),
            status,
            confidence,
            payloads: outcomes.into_iter().filter_map(|o| o.payload).collect(),
            errors,
            timed_out: false,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    fn timeout(capabilities: &CapabilitySet, limit: Duration) -> Self {
        let error = SymphonyError::ExecutorTimeout {
            duration_ms: limit.as_millis() as u64,
        };
        Self {
            capabilities: capabilities.clone(),
            status: DecisionOutcome::Failure,
            confidence: 0.0,
            payloads: Vec::new(),
            errors: vec![error.to_string()],
            timed_out: true,
            duration_ms: limit.as_millis() as u64,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DecisionOutcome::Success
    }

    /// Single payload as-is, several as an ordered array
    pub fn result_value(&self) -> serde_json::Value {
        match self.payloads.as_slice() {
            [] => serde_json::Value::Null,
            [single] => single.clone(),
            many => serde_json::Value::Array(many.to_vec()),
        }
    }

    pub fn error_message(&self) -> Option<String> {
        (!self.errors.is_empty()).then(|| self.errors.join("; "))
    }
}

/// Semaphore-bounded pool over an executor registry
pub struct ExecutorPool {
    registry: Arc<ExecutorRegistry>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    timeout: Duration,
}

impl ExecutorPool {
    pub fn new(registry: Arc<ExecutorRegistry>, max_concurrent: usize, timeout: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            registry,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            timeout,
        }
    }

    /// Wait for a free slot; the slot is released when the permit drops
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SymphonyError::Generic(format!("Executor pool closed: {}", e)))
    }

    /// Run every capability of `capabilities` against `task`, in order
    ///
    /// Never returns an error: executor errors, missing executors and
    /// timeouts all become failed outcomes.
    pub async fn execute(&self, task: &Task, capabilities: &CapabilitySet) -> ExecutionReport {
        let token = CancellationToken::new();
        let started = Instant::now();

        match timeout(self.timeout, self.invoke_all(task, capabilities, &token)).await {
            Ok(outcomes) => {
                let report = ExecutionReport::from_outcomes(capabilities, outcomes, started.elapsed());
                debug!(
                    task_id = %task.id,
                    capabilities = %capabilities,
                    status = report.status.as_str(),
                    confidence = report.confidence,
                    "subtask executed"
                );
                report
            }
            Err(_) => {
                token.cancel();
                warn!(
                    task_id = %task.id,
                    capabilities = %capabilities,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "executor timed out"
                );
                ExecutionReport::timeout(capabilities, self.timeout)
            }
        }
    }

    async fn invoke_all(
        &self,
        task: &Task,
        capabilities: &CapabilitySet,
        token: &CancellationToken,
    ) -> Vec<Outcome> {
        let mut outcomes = Vec::with_capacity(capabilities.len());

        for capability in capabilities.iter() {
            let outcome = match self.registry.get(capability) {
                None => Outcome::failure(capability.as_str(), "no executor registered"),
                Some(executor) => match executor.invoke(task, token.clone()).await {
                    Ok(outcome) => outcome,
                    Err(e) => Outcome::failure(capability.as_str(), e.to_string()),
                },
            };
            outcomes.push(outcome);
        }

        outcomes
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }
}
