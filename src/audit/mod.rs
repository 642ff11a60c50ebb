//! Append-only audit trail
//!
//! Decisions, their outcomes, memory entries and executor interactions are
//! written as one JSON record per line. A report view gathers every record
//! of one top-level task into a chronological timeline.

pub mod in_memory;
pub mod jsonl;

pub use in_memory::InMemoryAuditLog;
pub use jsonl::JsonlAuditLog;

use crate::errors::Result;
use crate::memory::MemoryEntry;
use crate::types::{OrchestrationDecision, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Maximum characters of an interaction result kept in the trail
pub const INTERACTION_RESULT_CHARS: usize = 500;

/// Record category; also the file prefix of the JSONL log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditKind {
    Decision,
    Outcome,
    Memory,
    Interaction,
}

impl AuditKind {
    pub const ALL: [AuditKind; 4] = [
        AuditKind::Decision,
        AuditKind::Outcome,
        AuditKind::Memory,
        AuditKind::Interaction,
    ];

    pub fn file_prefix(&self) -> &'static str {
        match self {
            AuditKind::Decision => "decisions",
            AuditKind::Outcome => "outcomes",
            AuditKind::Memory => "memory",
            AuditKind::Interaction => "interactions",
        }
    }
}

/// One line of the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    /// Top-level task the record belongs to, if any
    pub root_task_id: Option<TaskId>,
    pub payload: serde_json::Value,
}

impl AuditRecord {
    pub fn new(kind: AuditKind, root_task_id: Option<TaskId>, payload: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            root_task_id,
            payload,
        }
    }

    /// Decision as selected, before its outcome is known
    pub fn decision(root_task_id: &str, decision: &OrchestrationDecision) -> Result<Self> {
        Ok(Self::new(
            AuditKind::Decision,
            Some(root_task_id.to_string()),
            serde_json::to_value(decision)?,
        ))
    }

    /// Decision after its outcome was written
    pub fn outcome(root_task_id: &str, decision: &OrchestrationDecision) -> Self {
        Self::new(
            AuditKind::Outcome,
            Some(root_task_id.to_string()),
            json!({
                "decision_id": decision.id,
                "task_id": decision.task_id,
                "capabilities": decision.capabilities,
                "outcome": decision.outcome,
                "learning_feedback": decision.learning_feedback,
            }),
        )
    }

    pub fn memory(root_task_id: Option<&str>, entry: &MemoryEntry) -> Result<Self> {
        Ok(Self::new(
            AuditKind::Memory,
            root_task_id.map(str::to_string),
            serde_json::to_value(entry)?,
        ))
    }

    /// Executor invocation; the result text is truncated
    pub fn interaction(
        root_task_id: &str,
        task_id: &str,
        capability: &str,
        result: &str,
        success: bool,
    ) -> Self {
        let truncated: String = result.chars().take(INTERACTION_RESULT_CHARS).collect();
        Self::new(
            AuditKind::Interaction,
            Some(root_task_id.to_string()),
            json!({
                "task_id": task_id,
                "capability": capability,
                "result": truncated,
                "success": success,
            }),
        )
    }
}

/// Aggregated view of one top-level task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyReport {
    pub task_id: TaskId,
    pub generated_at: DateTime<Utc>,
    pub decision_count: usize,
    pub outcome_count: usize,
    pub interaction_count: usize,
    pub memory_count: usize,
    /// Records sorted by timestamp
    pub timeline: Vec<AuditRecord>,
}

impl TransparencyReport {
    pub fn from_records(task_id: &str, mut records: Vec<AuditRecord>) -> Self {
        records.sort_by_key(|r| r.timestamp);
        let count = |kind: AuditKind| records.iter().filter(|r| r.kind == kind).count();

        Self {
            task_id: task_id.to_string(),
            generated_at: Utc::now(),
            decision_count: count(AuditKind::Decision),
            outcome_count: count(AuditKind::Outcome),
            interaction_count: count(AuditKind::Interaction),
            memory_count: count(AuditKind::Memory),
            timeline: records,
        }
    }
}

/// Append-only audit sink
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &AuditRecord) -> Result<()>;

    /// All records tagged with `root_task_id`
    fn records_for(&self, root_task_id: &str) -> Result<Vec<AuditRecord>>;

    fn report(&self, root_task_id: &str) -> Result<TransparencyReport> {
        Ok(TransparencyReport::from_records(
            root_task_id,
            self.records_for(root_task_id)?,
        ))
    }
}
