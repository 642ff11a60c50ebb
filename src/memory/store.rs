//! Tri-layer memory store
//!
//! Each layer and each index sits behind its own lock. Locks are held only
//! for the duration of a single in-memory update, never across an await.

use crate::audit::{AuditRecord, AuditSink};
use crate::memory::retention::RetentionPolicy;
use crate::memory::types::{
    MemoryEntry, MemoryLayer, MemoryMetrics, PerformanceHistory, PerformanceRecord, PERFORMANCE_KEY,
};
use crate::types::{DecisionOutcome, OrchestrationDecision, Task, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cap on the decision-count contribution to episode importance
const DECISION_FACTOR_CAP: f64 = 0.3;

/// Mean confidence assumed for an episode without decisions
const NEUTRAL_CONFIDENCE: f64 = 0.5;

/// Episode importance:
/// priority weight + min(0.1 * decisions, 0.3) + 0.2 * mean confidence
/// (0.5 without decisions)
/// + 0.2 when the task completed, clamped to [0, 1]
pub fn episode_importance(task: &Task, decisions: &[OrchestrationDecision]) -> f64 {
    let base = task.priority.weight();
    let decision_factor = (0.1 * decisions.len() as f64).min(DECISION_FACTOR_CAP);
    let mean_confidence = if decisions.is_empty() {
        NEUTRAL_CONFIDENCE
    } else {
        decisions.iter().map(|d| d.confidence).sum::<f64>() / decisions.len() as f64
    };
    let outcome_factor = if task.status == TaskStatus::Completed { 0.2 } else { 0.0 };

    (base + decision_factor + 0.2 * mean_confidence + outcome_factor).clamp(0.0, 1.0)
}

pub struct MemoryStore {
    episodic: RwLock<Vec<MemoryEntry>>,
    semantic: RwLock<Vec<MemoryEntry>>,
    procedural: RwLock<Vec<MemoryEntry>>,
    /// Top-level task id -> episodic entry ids
    task_index: RwLock<HashMap<TaskId, Vec<String>>>,
    performance: RwLock<PerformanceHistory>,
    retention: RetentionPolicy,
    audit: Option<Arc<dyn AuditSink>>,
}

impl MemoryStore {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            episodic: RwLock::new(Vec::new()),
            semantic: RwLock::new(Vec::new()),
            procedural: RwLock::new(Vec::new()),
            task_index: RwLock::new(HashMap::new()),
            performance: RwLock::new(PerformanceHistory::default()),
            retention,
            audit: None,
        }
    }

    /// Emit a memory record to `sink` for every stored entry
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Record one finished top-level task, update the success index, then sweep
    pub fn store_episode(
        &self,
        task: &Task,
        subtasks: &[Task],
        decisions: &[OrchestrationDecision],
    ) -> MemoryEntry {
        let importance = episode_importance(task, decisions);
        let entry = MemoryEntry::new(
            MemoryLayer::Episodic,
            json!({
                "task": task,
                "subtasks": subtasks,
                "decisions": decisions,
                "outcome": task.status,
            }),
            importance,
            ["episode".to_string(), task.status.to_string()],
        );

        self.episodic.write().push(entry.clone());
        self.task_index
            .write()
            .entry(task.id.clone())
            .or_default()
            .push(entry.id.clone());
        self.update_performance(decisions);

        info!(
            task_id = %task.id,
            entry_id = %entry.id,
            importance = entry.importance,
            "episode stored"
        );
        self.emit(Some(&task.id), &entry);

        self.evict();
        entry
    }

    fn update_performance(&self, decisions: &[OrchestrationDecision]) {
        let mut history = self.performance.write();
        for decision in decisions {
            let Some(outcome) = decision.outcome else {
                continue;
            };

            let bump = |record: &mut PerformanceRecord| {
                record.total += 1;
                match outcome {
                    DecisionOutcome::Success => record.successful += 1,
                    DecisionOutcome::Partial => record.partial += 1,
                    DecisionOutcome::Failure => record.failed += 1,
                }
            };

            bump(history.by_set.entry(decision.capabilities.key()).or_default());
            for capability in decision.capabilities.iter() {
                bump(history.by_capability.entry(capability.clone()).or_default());
            }
        }
    }

    /// Append a semantic entry
    pub fn store_knowledge(
        &self,
        knowledge: serde_json::Value,
        tags: Vec<String>,
        importance: f64,
    ) -> MemoryEntry {
        let entry = MemoryEntry::new(MemoryLayer::Semantic, knowledge, importance, tags);
        self.semantic.write().push(entry.clone());
        debug!(entry_id = %entry.id, tags = ?entry.tags, "knowledge stored");
        self.emit(None, &entry);
        entry
    }

    /// Append a procedural entry; importance equals performance
    pub fn store_workflow(
        &self,
        workflow: serde_json::Value,
        performance: f64,
        tags: Vec<String>,
    ) -> MemoryEntry {
        let entry = MemoryEntry::new(MemoryLayer::Procedural, workflow, performance, tags)
            .with_metadata(PERFORMANCE_KEY, json!(performance));
        self.procedural.write().push(entry.clone());
        debug!(entry_id = %entry.id, performance, "workflow stored");
        self.emit(None, &entry);
        entry
    }

    /// Episodes by (importance, recency), optionally matching `query`
    /// in their content or tags
    pub fn recall_episodes(&self, query: Option<&str>, limit: usize) -> Vec<MemoryEntry> {
        let query = query.map(str::to_lowercase);
        let mut episodes: Vec<MemoryEntry> = self
            .episodic
            .read()
            .iter()
            .filter(|e| match &query {
                None => true,
                Some(q) => {
                    e.content.to_string().to_lowercase().contains(q)
                        || e.tags.iter().any(|t| t.to_lowercase().contains(q))
                }
            })
            .cloned()
            .collect();

        sort_by_rank(&mut episodes);
        episodes.truncate(limit);
        episodes
    }

    /// Semantic entries carrying any of `tags` (all entries if empty)
    ///
    /// Returned entries have their access count bumped.
    pub fn recall_knowledge(&self, tags: &[String], limit: usize) -> Vec<MemoryEntry> {
        recall_and_touch(&self.semantic, limit, |e| {
            tags.is_empty() || e.has_any_tag(tags)
        })
    }

    /// Procedural entries with performance at least `min_performance`
    pub fn recall_workflows(&self, min_performance: f64, limit: usize) -> Vec<MemoryEntry> {
        recall_and_touch(&self.procedural, limit, |e| {
            e.performance().unwrap_or(0.0) >= min_performance
        })
    }

    pub fn performance_history(&self) -> PerformanceHistory {
        self.performance.read().clone()
    }

    /// Sweep with the current time; returns the number of entries removed
    pub fn evict(&self) -> usize {
        self.evict_at(Utc::now())
    }

    pub fn evict_at(&self, now: DateTime<Utc>) -> usize {
        let removed_episodes = {
            let mut episodic = self.episodic.write();
            let before = episodic.len();
            *episodic = self.retention.evict_at(&episodic, now);
            before - episodic.len()
        };

        let removed_knowledge = {
            let mut semantic = self.semantic.write();
            let before = semantic.len();
            *semantic = self.retention.evict_at(&semantic, now);
            before - semantic.len()
        };

        if removed_episodes > 0 {
            let live: Vec<String> = self.episodic.read().iter().map(|e| e.id.clone()).collect();
            let mut index = self.task_index.write();
            index.retain(|_, ids| {
                ids.retain(|id| live.contains(id));
                !ids.is_empty()
            });
        }

        let removed = removed_episodes + removed_knowledge;
        if removed > 0 {
            info!(removed_episodes, removed_knowledge, "memory eviction");
        }
        removed
    }

    /// Episodic entries recorded for `task_id`
    pub fn episodes_for(&self, task_id: &str) -> Vec<MemoryEntry> {
        let ids = self.task_index.read().get(task_id).cloned().unwrap_or_default();
        self.episodic
            .read()
            .iter()
            .filter(|e| ids.contains(&e.id))
            .cloned()
            .collect()
    }

    pub fn metrics(&self) -> MemoryMetrics {
        let performance = self.performance.read();
        MemoryMetrics {
            episodic_size: self.episodic.read().len(),
            semantic_size: self.semantic.read().len(),
            procedural_size: self.procedural.read().len(),
            tasks_tracked: self.task_index.read().len(),
            capabilities_tracked: performance.by_capability.len(),
            strategies_tracked: performance.by_set.len(),
        }
    }

    fn emit(&self, root_task_id: Option<&str>, entry: &MemoryEntry) {
        let Some(sink) = &self.audit else {
            return;
        };
        let result = AuditRecord::memory(root_task_id, entry).and_then(|r| sink.append(&r));
        if let Err(e) = result {
            warn!(entry_id = %entry.id, error = %e, "failed to audit memory entry");
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

fn sort_by_rank(entries: &mut [MemoryEntry]) {
    entries.sort_by(|a, b| {
        b.importance
            .total_cmp(&a.importance)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

fn recall_and_touch<F>(layer: &RwLock<Vec<MemoryEntry>>, limit: usize, filter: F) -> Vec<MemoryEntry>
where
    F: Fn(&MemoryEntry) -> bool,
{
    let now = Utc::now();
    let mut entries = layer.write();

    let mut ranked: Vec<usize> = (0..entries.len()).filter(|i| filter(&entries[*i])).collect();
    ranked.sort_by(|a, b| {
        let (a, b) = (&entries[*a], &entries[*b]);
        b.importance
            .total_cmp(&a.importance)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    ranked.truncate(limit);

    ranked
        .into_iter()
        .map(|i| {
            entries[i].touch(now);
            entries[i].clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditLog;
    use crate::types::{CapabilitySet, TaskPriority};
    use chrono::Duration;

    fn resolved(task: &Task, caps: &[&str], confidence: f64, outcome: DecisionOutcome) -> OrchestrationDecision {
        let mut d = OrchestrationDecision::new(task.id.clone(), CapabilitySet::new(caps), "test", confidence);
        d.record_outcome(outcome, "").unwrap();
        d
    }

    fn finished(priority: TaskPriority, completed: bool) -> Task {
        let mut task = Task::new("parent").with_priority(priority);
        task.start().unwrap();
        if completed {
            task.complete(json!(null)).unwrap();
        } else {
            task.fail("x").unwrap();
        }
        task
    }

    #[test]
    fn test_importance_formula() {
        let task = finished(TaskPriority::Low, true);
        let decisions = vec![
            resolved(&task, &["research"], 0.5, DecisionOutcome::Success),
            resolved(&task, &["code"], 0.5, DecisionOutcome::Success),
        ];
        // 0.3 + 0.2 + 0.2 * 0.5 + 0.2
        assert!((episode_importance(&task, &decisions) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_importance_clamped_and_capped() {
        let task = finished(TaskPriority::Critical, true);
        let decisions: Vec<_> = (0..6)
            .map(|_| resolved(&task, &["code"], 1.0, DecisionOutcome::Success))
            .collect();
        assert_eq!(episode_importance(&task, &decisions), 1.0);
    }

    #[test]
    fn test_importance_without_decisions_uses_neutral_confidence() {
        let failed = finished(TaskPriority::Medium, false);
        // 0.5 + 0 + 0.2 * 0.5 + 0
        assert!((episode_importance(&failed, &[]) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_store_episode_updates_index() {
        let store = MemoryStore::default();
        let task = finished(TaskPriority::Medium, true);
        let decisions = vec![
            resolved(&task, &["research", "analysis"], 0.9, DecisionOutcome::Success),
            resolved(&task, &["research"], 0.0, DecisionOutcome::Failure),
        ];
        store.store_episode(&task, &[], &decisions);

        let history = store.performance_history();
        let research = history.capability("research").unwrap();
        assert_eq!(research.total, 2);
        assert!((research.success_rate() - 0.5).abs() < 1e-9);
        assert_eq!(history.set("research+analysis").unwrap().successful, 1);

        let metrics = store.metrics();
        assert_eq!(metrics.episodic_size, 1);
        assert_eq!(metrics.tasks_tracked, 1);
        assert_eq!(metrics.capabilities_tracked, 2);
        assert_eq!(store.episodes_for(&task.id).len(), 1);
    }

    #[test]
    fn test_recall_episodes_query_and_order() {
        let store = MemoryStore::default();
        let ok = finished(TaskPriority::High, true);
        let bad = finished(TaskPriority::Low, false);
        store.store_episode(&bad, &[], &[]);
        store.store_episode(&ok, &[], &[]);

        let all = store.recall_episodes(None, 10);
        assert_eq!(all.len(), 2);
        assert!(all[0].importance >= all[1].importance);

        let failed = store.recall_episodes(Some("FAILED"), 10);
        assert_eq!(failed.len(), 1);
        assert_eq!(store.recall_episodes(None, 1).len(), 1);
    }

    #[test]
    fn test_recall_knowledge_bumps_access() {
        let store = MemoryStore::default();
        store.store_knowledge(json!({"fact": 1}), vec!["rust".into()], 0.4);
        store.store_knowledge(json!({"fact": 2}), vec!["python".into()], 0.9);

        let hits = store.recall_knowledge(&["rust".to_string()], 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].access_count, 1);

        let all = store.recall_knowledge(&[], 10);
        assert_eq!(all[0].content, json!({"fact": 2}));
    }

    #[test]
    fn test_recall_workflows_min_performance() {
        let store = MemoryStore::default();
        store.store_workflow(json!({"caps": ["code"]}), 0.4, vec!["evolved".into()]);
        store.store_workflow(json!({"caps": ["research"]}), 0.9, vec!["evolved".into()]);

        let good = store.recall_workflows(0.5, 10);
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].performance(), Some(0.9));
    }

    #[test]
    fn test_eviction_sweep() {
        let store = MemoryStore::new(RetentionPolicy::new(90));
        let kept = store.store_knowledge(json!("important"), vec![], 0.9);
        store.store_knowledge(json!("trivia"), vec![], 0.1);

        let later = Utc::now() + Duration::days(1);
        assert_eq!(store.evict_at(later), 1);
        assert_eq!(store.evict_at(later), 0);

        let left = store.recall_knowledge(&[], 10);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, kept.id);
    }

    #[test]
    fn test_entries_are_audited() {
        let sink = Arc::new(InMemoryAuditLog::new());
        let store = MemoryStore::default().with_audit(sink.clone());
        let task = finished(TaskPriority::Medium, true);
        store.store_episode(&task, &[], &[]);

        let records = sink.records_for(&task.id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, crate::audit::AuditKind::Memory);
    }
}
