//! Decomposer: objective -> ordered subtasks
//!
//! The backend call is bounded by a timeout. Backend failures are surfaced
//! as typed errors; unparsable output is not an error and degrades to a
//! single-step plan.

use crate::catalogue::CapabilityCatalogue;
use crate::errors::{Result, SymphonyError};
use crate::llm::{PromptContext, TextGenerator};
use crate::planning::parser::{ParsedPlan, PlanParser};
use crate::types::{CapabilitySet, Task};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

pub struct Decomposer {
    generator: Arc<dyn TextGenerator>,
    catalogue: Arc<CapabilityCatalogue>,
    timeout: Duration,
}

impl Decomposer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        catalogue: Arc<CapabilityCatalogue>,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            catalogue,
            timeout,
        }
    }

    /// Split `task` into one or more subtasks
    ///
    /// Subtasks inherit the parent id and context; dependencies reference
    /// sibling ids and always point at earlier siblings.
    pub async fn decompose(&self, task: &Task) -> Result<Vec<Task>> {
        if task.description.trim().is_empty() {
            return Err(SymphonyError::InvalidTask(
                "Task description must not be empty".to_string(),
            ));
        }

        info!(task_id = %task.id, description = %task.description, "decomposing task");

        let prompt = self.build_prompt(task);
        let raw = match timeout(self.timeout, self.generator.complete(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(SymphonyError::DecompositionTimeout { duration_ms })) => {
                return Err(SymphonyError::DecompositionTimeout { duration_ms })
            }
            Ok(Err(e)) => {
                warn!(task_id = %task.id, error = %e, "text backend failed");
                return Err(SymphonyError::Decomposition(format!(
                    "{}: {}",
                    self.generator.name(),
                    e
                )));
            }
            Err(_) => {
                let duration_ms = self.timeout.as_millis() as u64;
                warn!(task_id = %task.id, duration_ms, "text backend timed out");
                return Err(SymphonyError::DecompositionTimeout { duration_ms });
            }
        };

        let plan = PlanParser::new(&self.catalogue).parse(&raw, &task.description);
        let fallback = plan.is_fallback();
        let subtasks = self.materialize(task, plan);

        info!(
            task_id = %task.id,
            subtasks = subtasks.len(),
            fallback,
            "task decomposed"
        );
        Ok(subtasks)
    }

    /// Turn already generated text into subtasks without calling the backend
    pub fn decompose_text(&self, task: &Task, raw: &str) -> Vec<Task> {
        let plan = PlanParser::new(&self.catalogue).parse(raw, &task.description);
        self.materialize(task, plan)
    }

    fn materialize(&self, parent: &Task, plan: ParsedPlan) -> Vec<Task> {
        let mut subtasks: Vec<Task> = Vec::with_capacity(plan.len());

        for step in plan.into_steps() {
            let mut subtask = Task::subtask_of(parent, step.description).with_priority(step.priority);
            if let Some(capability) = step.capability {
                subtask = subtask.with_capabilities(CapabilitySet::single(&capability));
            }
            subtask.context = parent.context.clone();
            subtask.dependencies = step
                .depends_on
                .iter()
                .filter_map(|index| subtasks.get(*index).map(|s| s.id.clone()))
                .collect();
            subtasks.push(subtask);
        }

        subtasks
    }

    fn build_prompt(&self, task: &Task) -> PromptContext {
        let capabilities = self.catalogue.capabilities().join(", ");
        let system = format!(
            "You are a meta-orchestrator that splits complex objectives into logical, \
             executable steps.\n\
             Available capabilities: {}.\n\
             Answer with a JSON array. Each element has: \"description\", \
             \"capability\" (one of the capabilities), \"priority\" \
             (low, medium, high or critical) and \"depends_on\" (1-based numbers of \
             earlier steps).",
            capabilities
        );

        let context = if task.context.is_empty() {
            "none".to_string()
        } else {
            serde_json::to_string(&task.context).unwrap_or_else(|_| "none".to_string())
        };

        PromptContext::new(
            system,
            format!("Objective: {}\nContext: {}", task.description, context),
        )
    }
}
