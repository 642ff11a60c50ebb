//! Strategy ranking over the catalogue actions
//!
//! Each action is scored by its moving-average ledger score when one exists,
//! otherwise by the mean per-capability success rate from memory, provided
//! every capability in the set has samples. Actions with neither are not
//! informative and are skipped.

use crate::catalogue::CapabilityCatalogue;
use crate::learning::StrategyLedger;
use crate::memory::PerformanceHistory;
use crate::types::{AlternativeStrategy, CapabilitySet, OrchestrationDecision, Task};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Confidence reported for capabilities assigned during decomposition
pub const PRE_ASSIGNED_CONFIDENCE: f64 = 0.8;

/// Confidence reported when no history informs the choice
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

const SOURCE_LEDGER: &str = "ledger";
const SOURCE_MEMORY: &str = "memory";

/// One ranked catalogue action
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub capabilities: CapabilitySet,
    pub score: f64,
    pub samples: u64,
    pub source: &'static str,
}

impl Candidate {
    /// Higher score first, then more samples, then capability names
    fn rank(&self, other: &Candidate) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.samples.cmp(&self.samples))
            .then_with(|| self.capabilities.cmp(&other.capabilities))
    }

    fn into_alternative(self) -> AlternativeStrategy {
        AlternativeStrategy {
            capabilities: self.capabilities,
            score: self.score,
            samples: self.samples,
            source: self.source.to_string(),
        }
    }
}

pub struct CapabilitySelector {
    ledger: Arc<StrategyLedger>,
    catalogue: Arc<CapabilityCatalogue>,
}

impl CapabilitySelector {
    pub fn new(ledger: Arc<StrategyLedger>, catalogue: Arc<CapabilityCatalogue>) -> Self {
        Self { ledger, catalogue }
    }

    /// Choose a capability set for `subtask` and document the choice
    pub fn select(
        &self,
        subtask: &Task,
        history: &PerformanceHistory,
    ) -> (CapabilitySet, OrchestrationDecision) {
        if let Some(assigned) = subtask.capabilities.as_ref().filter(|c| !c.is_empty()) {
            let decision = OrchestrationDecision::new(
                subtask.id.clone(),
                assigned.clone(),
                "pre-assigned",
                PRE_ASSIGNED_CONFIDENCE,
            );
            return (assigned.clone(), decision);
        }

        let mut ranked = self.rank(history);
        if ranked.is_empty() {
            let fallback = self.catalogue.default_set().clone();
            debug!(task_id = %subtask.id, capabilities = %fallback, "no history, using default capability");
            let decision = OrchestrationDecision::new(
                subtask.id.clone(),
                fallback.clone(),
                format!("no history; default capability {}", fallback),
                FALLBACK_CONFIDENCE,
            );
            return (fallback, decision);
        }

        let best = ranked.remove(0);
        let reasoning = format!(
            "{} score {:.3} over {} samples, {} alternatives",
            best.source,
            best.score,
            best.samples,
            ranked.len()
        );
        debug!(
            task_id = %subtask.id,
            capabilities = %best.capabilities,
            score = best.score,
            source = best.source,
            "capabilities selected"
        );

        let decision = OrchestrationDecision::new(
            subtask.id.clone(),
            best.capabilities.clone(),
            reasoning,
            best.score,
        )
        .with_alternatives(ranked.into_iter().map(Candidate::into_alternative).collect());

        (best.capabilities, decision)
    }

    /// Informative catalogue actions, best first
    pub fn rank(&self, history: &PerformanceHistory) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .catalogue
            .actions()
            .iter()
            .filter_map(|action| self.score(action, history))
            .collect();
        candidates.sort_by(|a, b| a.rank(b));
        candidates
    }

    fn score(&self, action: &CapabilitySet, history: &PerformanceHistory) -> Option<Candidate> {
        if let Some(record) = self.ledger.get(action) {
            return Some(Candidate {
                capabilities: action.clone(),
                score: record.score,
                samples: record.samples,
                source: SOURCE_LEDGER,
            });
        }

        let records: Vec<_> = action
            .iter()
            .map(|c| history.capability(c).filter(|r| r.total > 0))
            .collect::<Option<Vec<_>>>()?;
        if records.is_empty() {
            return None;
        }

        let score = records.iter().map(|r| r.success_rate()).sum::<f64>() / records.len() as f64;
        Some(Candidate {
            capabilities: action.clone(),
            score,
            samples: records.iter().map(|r| r.total).sum(),
            source: SOURCE_MEMORY,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PerformanceRecord;

    fn selector() -> (CapabilitySelector, Arc<StrategyLedger>) {
        let ledger = Arc::new(StrategyLedger::new());
        let selector = CapabilitySelector::new(ledger.clone(), Arc::new(CapabilityCatalogue::default()));
        (selector, ledger)
    }

    fn record(total: u64, successful: u64) -> PerformanceRecord {
        PerformanceRecord {
            total,
            successful,
            partial: 0,
            failed: total - successful,
        }
    }

    #[test]
    fn test_pre_assigned_short_circuits() {
        let (selector, ledger) = selector();
        ledger.update(&CapabilitySet::single("research"), 1.0, 0.3).unwrap();

        let task = Task::new("write code").with_capabilities(CapabilitySet::single("code"));
        let (caps, decision) = selector.select(&task, &PerformanceHistory::default());

        assert_eq!(caps.key(), "code");
        assert_eq!(decision.reasoning, "pre-assigned");
        assert!((decision.confidence - PRE_ASSIGNED_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fallback_without_history() {
        let (selector, _) = selector();
        let task = Task::new("anything");
        let (caps, decision) = selector.select(&task, &PerformanceHistory::default());

        assert_eq!(caps.key(), "research");
        assert!((decision.confidence - FALLBACK_CONFIDENCE).abs() < f64::EPSILON);
        assert!(decision.alternatives.is_empty());
        assert!(!decision.is_resolved());
    }

    #[test]
    fn test_ledger_score_wins() {
        let (selector, ledger) = selector();
        ledger.update(&CapabilitySet::single("code"), 0.4, 0.3).unwrap();
        ledger.update(&CapabilitySet::new(["code", "security"]), 0.9, 0.3).unwrap();

        let (caps, decision) = selector.select(&Task::new("t"), &PerformanceHistory::default());
        assert_eq!(caps.key(), "code+security");
        assert!((decision.confidence - 0.9).abs() < 1e-9);
        assert_eq!(decision.alternatives.len(), 1);
        assert_eq!(decision.alternatives[0].source, "ledger");
    }

    #[test]
    fn test_memory_needs_every_capability() {
        let (selector, _) = selector();
        let mut history = PerformanceHistory::default();
        history.by_capability.insert("analysis".to_string(), record(4, 3));

        let ranked = selector.rank(&history);
        // [analysis] qualifies; [research, analysis] lacks research samples
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].capabilities.key(), "analysis");
        assert!((ranked[0].score - 0.75).abs() < 1e-9);
        assert_eq!(ranked[0].source, "memory");
    }

    #[test]
    fn test_tie_break_samples_then_names() {
        let (selector, _) = selector();
        let mut history = PerformanceHistory::default();
        history.by_capability.insert("research".to_string(), record(2, 1));
        history.by_capability.insert("code".to_string(), record(2, 1));
        history.by_capability.insert("analysis".to_string(), record(4, 2));

        let ranked = selector.rank(&history);
        let keys: Vec<String> = ranked.iter().map(|c| c.capabilities.key()).collect();
        // all score 0.5: research+analysis has 6 samples, analysis 4, then code < research
        assert_eq!(keys, vec!["research+analysis", "analysis", "code", "research"]);
    }

    #[test]
    fn test_confidence_within_unit() {
        let (selector, _) = selector();
        let mut history = PerformanceHistory::default();
        history.by_capability.insert("code".to_string(), record(10, 10));
        let (_, decision) = selector.select(&Task::new("t"), &history);
        assert!((0.0..=1.0).contains(&decision.confidence));
    }
}
