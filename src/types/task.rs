//! Tasks and their lifecycle
//!
//! Status transitions are monotone:
//! Pending → InProgress → {Completed, Failed, Cancelled}, plus
//! Pending → Cancelled for work that never started.

use crate::errors::{Result, SymphonyError};
use crate::types::CapabilitySet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Unique identifier for tasks
pub type TaskId = String;

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    /// Base weight used by episode importance scoring
    pub fn weight(&self) -> f64 {
        match self {
            TaskPriority::Low => 0.3,
            TaskPriority::Medium => 0.5,
            TaskPriority::High => 0.7,
            TaskPriority::Critical => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Critical => "critical",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = SymphonyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            "critical" => Ok(TaskPriority::Critical),
            other => Err(SymphonyError::InvalidTask(format!(
                "Unknown priority: {}",
                other
            ))),
        }
    }
}

/// Task status tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether `next` is reachable in one step from this status
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work: either a top-level objective or one of its subtasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,

    /// Capability set pre-assigned by the decomposer, if any
    pub capabilities: Option<CapabilitySet>,

    pub parent_id: Option<TaskId>,

    /// Ordered subtask identifiers (top-level tasks only)
    pub subtasks: Vec<TaskId>,

    /// Sibling subtasks that must reach a terminal state first
    pub dependencies: Vec<TaskId>,

    pub context: HashMap<String, serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.into(),
            priority: TaskPriority::Medium,
            status: TaskStatus::Pending,
            capabilities: None,
            parent_id: None,
            subtasks: Vec::new(),
            dependencies: Vec::new(),
            context: HashMap::new(),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Create a subtask inheriting the parent id
    pub fn subtask_of(parent: &Task, description: impl Into<String>) -> Self {
        let mut task = Self::new(description);
        task.parent_id = Some(parent.id.clone());
        task
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Move to a new status, enforcing monotone transitions
    pub fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SymphonyError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
                reason: format!("Task {} cannot move backwards or skip states", self.id),
            });
        }

        let now = Utc::now();
        match next {
            TaskStatus::InProgress => self.started_at = Some(now),
            s if s.is_terminal() => self.completed_at = Some(now),
            _ => {}
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(TaskStatus::InProgress)
    }

    pub fn complete(&mut self, result: serde_json::Value) -> Result<()> {
        self.transition(TaskStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(TaskStatus::Cancelled)?;
        self.error = Some(reason.into());
        Ok(())
    }

    /// Resolve a parent task from the final state of its subtasks
    ///
    /// Fails while any subtask is still unresolved. Any failure makes the
    /// parent Failed; otherwise any cancellation makes it Cancelled.
    pub fn finalize(&mut self, subtasks: &[Task], result: serde_json::Value) -> Result<TaskStatus> {
        if let Some(open) = subtasks.iter().find(|s| !s.status.is_terminal()) {
            return Err(SymphonyError::InvalidTransition {
                from: self.status.to_string(),
                to: TaskStatus::Completed.to_string(),
                reason: format!("Subtask {} is still {}", open.id, open.status),
            });
        }

        let failed = subtasks.iter().filter(|s| s.status == TaskStatus::Failed).count();
        let cancelled = subtasks.iter().filter(|s| s.status == TaskStatus::Cancelled).count();

        if self.status == TaskStatus::Pending {
            self.start()?;
        }

        if failed > 0 {
            self.fail(format!("{} of {} subtasks failed", failed, subtasks.len()))?;
        } else if cancelled > 0 {
            self.cancel(format!("{} of {} subtasks cancelled", cancelled, subtasks.len()))?;
        } else {
            self.transition(TaskStatus::Completed)?;
        }
        self.result = Some(result);
        Ok(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_monotone_transitions() {
        let mut task = Task::new("classify documents");
        assert!(task.start().is_ok());
        assert!(task.started_at.is_some());
        assert!(task.complete(json!("done")).is_ok());
        assert!(task.completed_at.is_some());

        // Terminal states never move again
        assert!(task.start().is_err());
        assert!(task.fail("late").is_err());
    }

    #[test]
    fn test_pending_can_be_cancelled_directly() {
        let mut task = Task::new("never started");
        assert!(task.cancel("parent cancelled").is_ok());
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task.started_at.is_none());
    }

    #[test]
    fn test_pending_cannot_complete() {
        let mut task = Task::new("skip ahead");
        let err = task.complete(json!(null)).unwrap_err();
        assert!(err.to_string().contains("pending"));
    }

    #[test]
    fn test_finalize_rejects_unresolved_subtasks() {
        let mut parent = Task::new("parent");
        let child = Task::subtask_of(&parent, "child");
        assert!(parent.finalize(&[child], json!(null)).is_err());
        assert_eq!(parent.status, TaskStatus::Pending);
    }

    #[test]
    fn test_finalize_with_failure() {
        let mut parent = Task::new("parent");
        let mut ok = Task::subtask_of(&parent, "ok");
        ok.start().unwrap();
        ok.complete(json!(1)).unwrap();
        let mut bad = Task::subtask_of(&parent, "bad");
        bad.start().unwrap();
        bad.fail("timeout").unwrap();

        let status = parent.finalize(&[ok, bad], json!({})).unwrap();
        assert_eq!(status, TaskStatus::Failed);
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!("HIGH".parse::<TaskPriority>().unwrap(), TaskPriority::High);
        assert!("urgent".parse::<TaskPriority>().is_err());
        assert!((TaskPriority::Critical.weight() - 1.0).abs() < f64::EPSILON);
    }
}
