//! Learning engine: post-execution feedback
//!
//! After every subtask outcome four mechanisms run independently: the
//! moving-average ledger, value learning, A/B sampling and population
//! intake. A failure in one is logged and does not stop the others. Every
//! `evolution_interval` completed top-level tasks an evolutionary cycle runs.

use crate::catalogue::CapabilityCatalogue;
use crate::config::LearningConfig;
use crate::errors::{Result, SymphonyError};
use crate::executor::ExecutionReport;
use crate::learning::ab_test::{AbTestRegistry, AbThresholds, AbWinner};
use crate::learning::evolution::{OptimizationResult, StrategyPopulation};
use crate::learning::ledger::StrategyLedger;
use crate::learning::value_table::ValueTable;
use crate::planning::{classify, state_key};
use crate::types::{CapabilitySet, DecisionOutcome, OrchestrationDecision, Task};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one subtask outcome changed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningReport {
    pub ledger_score: Option<f64>,
    /// (old, new) value-table cell
    pub value_update: Option<(f64, f64)>,
    pub ab_winner: Option<AbWinner>,
    pub population_observed: bool,
    /// Recoverable failures, one per mechanism that could not apply
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningMetrics {
    pub strategies_tracked: usize,
    pub ab_experiments: usize,
    pub ab_winners: usize,
    pub value_table_size: usize,
    pub generation: u64,
    pub population_size: usize,
    pub pending_observations: usize,
    pub optimizations_performed: usize,
    pub average_improvement: f64,
    pub tasks_completed: u64,
}

pub struct LearningEngine {
    config: LearningConfig,
    catalogue: Arc<CapabilityCatalogue>,
    ledger: Arc<StrategyLedger>,
    values: ValueTable,
    population: Mutex<StrategyPopulation>,
    experiments: Mutex<AbTestRegistry>,
    history: Mutex<Vec<OptimizationResult>>,
    completed_tasks: AtomicU64,
    rng: Mutex<StdRng>,
}

impl LearningEngine {
    pub fn new(
        config: LearningConfig,
        catalogue: Arc<CapabilityCatalogue>,
        ledger: Arc<StrategyLedger>,
    ) -> Self {
        let values = ValueTable::new(config.learning_rate, config.discount_factor, config.epsilon);
        let population = StrategyPopulation::new(
            config.population_cap,
            config.max_strategy_size,
            config.mutation_rate,
        );
        let experiments = AbTestRegistry::new(AbThresholds {
            min_control_samples: config.ab_min_control_samples,
            min_variant_samples: config.ab_min_variant_samples,
            improvement: config.ab_improvement,
        });

        Self {
            config,
            catalogue,
            ledger,
            values,
            population: Mutex::new(population),
            experiments: Mutex::new(experiments),
            history: Mutex::new(Vec::new()),
            completed_tasks: AtomicU64::new(0),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the random source, e.g. with a seeded one
    pub fn with_rng(self, rng: StdRng) -> Self {
        *self.rng.lock() = rng;
        self
    }

    pub fn ledger(&self) -> &Arc<StrategyLedger> {
        &self.ledger
    }

    /// Moving-average reward: outcome confidence, halved for partial
    /// success, zero for failure
    pub fn outcome_reward(report: &ExecutionReport) -> f64 {
        match report.status {
            DecisionOutcome::Success => report.confidence,
            DecisionOutcome::Partial => report.confidence * 0.5,
            DecisionOutcome::Failure => 0.0,
        }
    }

    /// Feed one resolved subtask decision into every mechanism
    pub fn observe_subtask(
        &self,
        subtask: &Task,
        decision: &OrchestrationDecision,
        report: &ExecutionReport,
    ) -> LearningReport {
        let mut learned = LearningReport::default();
        let reward = Self::outcome_reward(report);

        match self
            .ledger
            .update(&decision.capabilities, reward, self.config.ema_alpha)
        {
            Ok(score) => learned.ledger_score = Some(score),
            Err(e) => recoverable(&mut learned, e),
        }

        if self.config.enable_value_learning {
            match self.update_value(subtask, decision) {
                Ok(update) => learned.value_update = Some(update),
                Err(e) => recoverable(&mut learned, e),
            }
        }

        if self.config.enable_ab_testing {
            match self.record_ab(subtask, decision, reward) {
                Ok(winner) => learned.ab_winner = winner,
                Err(e) => recoverable(&mut learned, e),
            }
        }

        if self.evolution_enabled() {
            match self.observe_population(decision) {
                Ok(()) => learned.population_observed = true,
                Err(e) => recoverable(&mut learned, e),
            }
        }

        debug!(
            task_id = %subtask.id,
            capabilities = %decision.capabilities,
            reward,
            ledger_score = ?learned.ledger_score,
            "learning update applied"
        );
        learned
    }

    fn update_value(&self, subtask: &Task, decision: &OrchestrationDecision) -> Result<(f64, f64)> {
        let outcome = decision.outcome.ok_or_else(|| SymphonyError::LearningUpdate {
            mechanism: "value_learning".to_string(),
            reason: format!("decision {} has no outcome", decision.id),
        })?;

        let reward = if outcome == DecisionOutcome::Success {
            decision.confidence
        } else {
            self.config.failure_penalty
        };

        let state = state_key(subtask);
        let (old, new) = self.values.update(
            &state,
            &decision.capabilities,
            reward,
            self.catalogue.actions(),
        )?;
        debug!(state = %state, action = %decision.capabilities.sorted_key(), old, new, "value updated");
        Ok((old, new))
    }

    fn record_ab(
        &self,
        subtask: &Task,
        decision: &OrchestrationDecision,
        reward: f64,
    ) -> Result<Option<AbWinner>> {
        if !reward.is_finite() {
            return Err(SymphonyError::LearningUpdate {
                mechanism: "ab_testing".to_string(),
                reason: format!("reward {} is not finite", reward),
            });
        }

        let class = classify(&subtask.description);
        let strategy = decision.capabilities.sorted_key();
        let winner = self.experiments.lock().record(class.as_str(), &strategy, reward);

        if let Some(w) = &winner {
            info!(
                task_class = %w.task_class,
                strategy = %w.strategy,
                variant_mean = w.variant_mean,
                control_mean = w.control_mean,
                "A/B winner found"
            );
        }
        Ok(winner)
    }

    fn observe_population(&self, decision: &OrchestrationDecision) -> Result<()> {
        if decision.capabilities.is_empty() {
            return Err(SymphonyError::LearningUpdate {
                mechanism: "evolution".to_string(),
                reason: "empty capability set".to_string(),
            });
        }
        self.population
            .lock()
            .observe(decision.capabilities.clone(), decision.confidence);
        Ok(())
    }

    /// An interval of 0 turns population intake and cycles off
    fn evolution_enabled(&self) -> bool {
        self.config.evolution_interval > 0
    }

    /// Count a finished top-level task; runs a cycle every `evolution_interval`
    pub fn on_task_completed(&self) -> Option<OptimizationResult> {
        let completed = self.completed_tasks.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.evolution_enabled() || completed % self.config.evolution_interval as u64 != 0 {
            return None;
        }
        self.evolve()
    }

    /// Run one evolutionary cycle now
    pub fn evolve(&self) -> Option<OptimizationResult> {
        let result = {
            let mut population = self.population.lock();
            let mut rng = self.rng.lock();
            population.cycle(&self.catalogue, &mut *rng)
        };

        match &result {
            Some(r) => {
                info!(
                    generation = r.generation,
                    improvement = r.improvement,
                    best = %r.best_capabilities,
                    "strategy population evolved"
                );
                self.history.lock().push(r.clone());
            }
            None => debug!("strategy population seeded"),
        }
        result
    }

    /// ε-greedy catalogue action for `task`
    pub fn recommend(&self, task: &Task) -> CapabilitySet {
        let mut rng = self.rng.lock();
        self.recommend_with(task, &mut *rng)
    }

    pub fn recommend_with<R: Rng + ?Sized>(&self, task: &Task, rng: &mut R) -> CapabilitySet {
        let state = state_key(task);
        self.values.select(&state, &self.catalogue, rng).clone()
    }

    /// Value-table cell for `task`'s state and `action`
    pub fn value_of(&self, task: &Task, action: &CapabilitySet) -> f64 {
        self.values.value(&state_key(task), action)
    }

    pub fn optimization_history(&self) -> Vec<OptimizationResult> {
        self.history.lock().clone()
    }

    pub fn ab_winners(&self) -> Vec<AbWinner> {
        self.experiments.lock().winners()
    }

    pub fn metrics(&self) -> LearningMetrics {
        let history = self.history.lock();
        let average_improvement = if history.is_empty() {
            0.0
        } else {
            history.iter().map(|r| r.improvement).sum::<f64>() / history.len() as f64
        };
        let (generation, population_size, pending_observations) = {
            let population = self.population.lock();
            (population.generation(), population.len(), population.pending_len())
        };
        let experiments = self.experiments.lock();

        LearningMetrics {
            strategies_tracked: self.ledger.len(),
            ab_experiments: experiments.len(),
            ab_winners: experiments.winners().len(),
            value_table_size: self.values.len(),
            generation,
            population_size,
            pending_observations,
            optimizations_performed: history.len(),
            average_improvement,
            tasks_completed: self.completed_tasks.load(Ordering::SeqCst),
        }
    }
}

fn recoverable(learned: &mut LearningReport, error: SymphonyError) {
    warn!(error = %error, "learning update skipped");
    learned.errors.push(error.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskPriority;

    fn engine(config: LearningConfig) -> LearningEngine {
        LearningEngine::new(
            config,
            Arc::new(CapabilityCatalogue::default()),
            Arc::new(StrategyLedger::new()),
        )
        .with_rng(StdRng::seed_from_u64(11))
    }

    fn report(caps: &CapabilitySet, status: DecisionOutcome, confidence: f64) -> ExecutionReport {
        ExecutionReport {
            capabilities: caps.clone(),
            status,
            confidence,
            payloads: Vec::new(),
            errors: Vec::new(),
            timed_out: false,
            duration_ms: 1,
        }
    }

    fn decision(task: &Task, caps: &CapabilitySet, confidence: f64, outcome: Option<DecisionOutcome>) -> OrchestrationDecision {
        let mut d = OrchestrationDecision::new(task.id.clone(), caps.clone(), "test", confidence);
        if let Some(o) = outcome {
            d.record_outcome(o, "").unwrap();
        }
        d
    }

    #[test]
    fn test_success_updates_all_mechanisms() {
        let engine = engine(LearningConfig::default());
        let task = Task::new("research the market").with_priority(TaskPriority::High);
        let caps = CapabilitySet::single("research");
        let d = decision(&task, &caps, 0.5, Some(DecisionOutcome::Success));

        let learned = engine.observe_subtask(&task, &d, &report(&caps, DecisionOutcome::Success, 0.9));

        assert!(learned.errors.is_empty());
        assert_eq!(learned.ledger_score, Some(0.9));
        let (_, new) = learned.value_update.unwrap();
        assert!((new - 0.05).abs() < 1e-9);
        assert!(learned.population_observed);
        assert!((engine.value_of(&task, &caps) - 0.05).abs() < 1e-9);
        assert_eq!(engine.metrics().ab_experiments, 1);
    }

    #[test]
    fn test_failure_uses_penalty() {
        let engine = engine(LearningConfig::default());
        let task = Task::new("write code");
        let caps = CapabilitySet::single("code");
        let d = decision(&task, &caps, 0.8, Some(DecisionOutcome::Failure));

        let learned = engine.observe_subtask(&task, &d, &report(&caps, DecisionOutcome::Failure, 0.0));
        assert_eq!(learned.ledger_score, Some(0.0));
        let (_, new) = learned.value_update.unwrap();
        assert!((new + 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_mechanisms_isolated() {
        let engine = engine(LearningConfig::default());
        let task = Task::new("general work");
        let caps = CapabilitySet::single("analysis");
        // unresolved decision: value learning fails, the rest still run
        let d = decision(&task, &caps, 0.6, None);

        let learned = engine.observe_subtask(&task, &d, &report(&caps, DecisionOutcome::Success, 0.7));
        assert_eq!(learned.errors.len(), 1);
        assert!(learned.errors[0].contains("value_learning"));
        assert_eq!(learned.ledger_score, Some(0.7));
        assert!(learned.population_observed);
        assert_eq!(engine.metrics().ab_experiments, 1);
    }

    #[test]
    fn test_evolution_every_interval() {
        let config = LearningConfig {
            evolution_interval: 2,
            ..LearningConfig::default()
        };
        let engine = engine(config);
        let task = Task::new("t");
        for (caps, conf) in [(CapabilitySet::single("code"), 0.9), (CapabilitySet::single("research"), 0.4)] {
            let d = decision(&task, &caps, conf, Some(DecisionOutcome::Success));
            engine.observe_subtask(&task, &d, &report(&caps, DecisionOutcome::Success, conf));
        }

        assert!(engine.on_task_completed().is_none());
        // second completion seeds the population
        assert!(engine.on_task_completed().is_none());
        assert_eq!(engine.metrics().population_size, 2);
        assert!(engine.on_task_completed().is_none());
        let result = engine.on_task_completed().unwrap();
        assert_eq!(result.generation, 2);
        assert_eq!(engine.metrics().optimizations_performed, 1);
        assert_eq!(engine.optimization_history(), vec![result]);
    }

    #[test]
    fn test_zero_interval_disables_population_intake() {
        let config = LearningConfig {
            evolution_interval: 0,
            ..LearningConfig::default()
        };
        let engine = engine(config);
        let task = Task::new("t");
        let caps = CapabilitySet::single("code");
        for _ in 0..5 {
            let d = decision(&task, &caps, 0.9, Some(DecisionOutcome::Success));
            let learned = engine.observe_subtask(&task, &d, &report(&caps, DecisionOutcome::Success, 0.9));
            assert!(!learned.population_observed);
            assert!(learned.errors.is_empty());
            assert!(engine.on_task_completed().is_none());
        }

        let metrics = engine.metrics();
        assert_eq!(metrics.pending_observations, 0);
        assert_eq!(metrics.generation, 0);
        assert_eq!(metrics.tasks_completed, 5);
        // the other mechanisms still learned
        assert_eq!(metrics.strategies_tracked, 1);
    }

    #[test]
    fn test_recommend_stays_in_catalogue() {
        let engine = engine(LearningConfig::default());
        let catalogue = CapabilityCatalogue::default();
        let task = Task::new("develop an api");
        for _ in 0..50 {
            let action = engine.recommend(&task);
            assert!(catalogue.actions().contains(&action));
        }
    }

    #[test]
    fn test_recommend_greedy_prefers_learned_action() {
        let config = LearningConfig {
            epsilon: 0.0,
            ..LearningConfig::default()
        };
        let engine = engine(config);
        let task = Task::new("develop an api");
        let caps = CapabilitySet::new(["code", "security"]);
        let d = decision(&task, &caps, 0.9, Some(DecisionOutcome::Success));
        engine.observe_subtask(&task, &d, &report(&caps, DecisionOutcome::Success, 0.9));

        assert_eq!(engine.recommend(&task), caps);
    }
}
