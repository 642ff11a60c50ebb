//! Orchestration engine
//!
//! `solve` decomposes a top-level task once, then drives its subtasks as a
//! DAG: a subtask is dispatched only when every dependency is terminal.
//! Per subtask the selector picks capabilities, the pool runs them under a
//! timeout, the decision outcome is written, and learning is applied
//! before any dependent subtask may start. Failures stay isolated to their
//! subtask and are aggregated at the end.

use crate::audit::{AuditRecord, AuditSink, JsonlAuditLog, TransparencyReport};
use crate::catalogue::CapabilityCatalogue;
use crate::config::Config;
use crate::errors::{Result, SymphonyError};
use crate::executor::{ExecutionReport, ExecutorPool, ExecutorRegistry, GenerativeExecutor};
use crate::learning::{
    AbWinner, LearningEngine, LearningMetrics, OptimizationResult, StrategyLedger, StrategyRecord,
};
use crate::llm::{OllamaGenerator, TextGenerator};
use crate::memory::{MemoryEntry, MemoryMetrics, MemoryStore, RetentionPolicy};
use crate::orchestrator::state::{OrchestrationEvent, OrchestrationState};
use crate::planning::Decomposer;
use crate::selection::CapabilitySelector;
use crate::types::{CapabilitySet, DecisionOutcome, OrchestrationDecision, Task, TaskId, TaskStatus};
use futures_util::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One line of the aggregated summary, in decomposition order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskSummary {
    pub task_id: TaskId,
    pub description: String,
    pub status: TaskStatus,
    pub capabilities: Option<CapabilitySet>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub status: OrchestrationState,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub results: Vec<SubtaskSummary>,
    /// Problems hit while aggregating; the summary is still usable
    pub warnings: Vec<String>,
}

impl Summary {
    fn aggregate(subtasks: &[Task], warnings: Vec<String>) -> Self {
        let count = |status: TaskStatus| subtasks.iter().filter(|s| s.status == status).count();
        let completed = count(TaskStatus::Completed);

        let status = if completed == subtasks.len() {
            OrchestrationState::Done
        } else {
            OrchestrationState::DoneWithFailures
        };

        Self {
            status,
            total: subtasks.len(),
            completed,
            failed: count(TaskStatus::Failed),
            cancelled: count(TaskStatus::Cancelled),
            results: subtasks
                .iter()
                .map(|s| SubtaskSummary {
                    task_id: s.id.clone(),
                    description: s.description.clone(),
                    status: s.status,
                    capabilities: s.capabilities.clone(),
                    result: s.result.clone(),
                    error: s.error.clone(),
                })
                .collect(),
            warnings,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == OrchestrationState::Done
    }
}

/// Everything `solve` produced for one top-level task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveResult {
    pub task: Task,
    pub state: OrchestrationState,
    pub summary: Summary,
    pub subtasks: Vec<Task>,
    pub decisions: Vec<OrchestrationDecision>,
    pub episode: Option<MemoryEntry>,
    pub optimization: Option<OptimizationResult>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorMetrics {
    pub total_decisions: usize,
    pub successful_decisions: usize,
    pub success_rate: f64,
    pub average_confidence: f64,
    pub strategy_scores: Vec<StrategyRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceAnalysis {
    pub orchestrator: OrchestratorMetrics,
    pub memory: MemoryMetrics,
    pub learning: LearningMetrics,
    pub ab_winners: Vec<AbWinner>,
}

/// Result of driving one subtask
struct SubtaskRun {
    index: usize,
    task: Task,
    decision: Option<OrchestrationDecision>,
}

pub struct Symphony {
    config: Config,
    catalogue: Arc<CapabilityCatalogue>,
    decomposer: Decomposer,
    selector: CapabilitySelector,
    pool: ExecutorPool,
    learning: Arc<LearningEngine>,
    memory: Arc<MemoryStore>,
    audit: Option<Arc<dyn AuditSink>>,
    decisions: Mutex<Vec<OrchestrationDecision>>,
}

impl Symphony {
    pub fn builder(config: Config) -> SymphonyBuilder {
        SymphonyBuilder::new(config)
    }

    /// Generative executors over `generator` and, when transparency is on,
    /// a JSONL audit trail under `audit.log_dir`
    pub fn from_config(config: Config, generator: Arc<dyn TextGenerator>) -> Result<Self> {
        let mut builder = SymphonyBuilder::new(config.clone()).generator(generator);
        if config.orchestrator.enable_transparency {
            builder = builder.audit(Arc::new(JsonlAuditLog::new(config.audit_dir())?));
        }
        builder.build()
    }

    /// Run `task` end to end
    ///
    /// Errors only when decomposition fails. Every other problem is folded
    /// into the returned summary.
    pub async fn solve(&self, mut task: Task, cancel: CancellationToken) -> Result<SolveResult> {
        let started = Instant::now();
        let mut state = OrchestrationState::Created;
        if let Err(e) = task.start() {
            warn!(task_id = %task.id, error = %e, "task was not pending");
        }

        let mut subtasks = match self.decomposer.decompose(&task).await {
            Ok(subtasks) => subtasks,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "decomposition failed");
                if let Err(transition) = task.fail(e.to_string()) {
                    warn!(task_id = %task.id, error = %transition, "could not mark task failed");
                }
                return Err(e);
            }
        };
        task.subtasks = subtasks.iter().map(|s| s.id.clone()).collect();
        state = state.transition(OrchestrationEvent::DecompositionComplete)?;

        state = state.transition(OrchestrationEvent::DispatchStarted)?;
        info!(task_id = %task.id, subtasks = subtasks.len(), state = %state, "dispatching subtasks");

        let (decisions, mut warnings) = self.run_dag(&task.id, &mut subtasks, &cancel).await;
        state = state.transition(OrchestrationEvent::AllSubtasksTerminal)?;

        let mut summary = Summary::aggregate(&subtasks, Vec::new());
        let summary_value = serde_json::to_value(&summary).unwrap_or_else(|e| {
            warnings.push(format!("summary not serializable: {}", e));
            serde_json::Value::Null
        });
        if let Err(e) = task.finalize(&subtasks, summary_value) {
            warn!(task_id = %task.id, error = %e, "could not finalize task");
            warnings.push(e.to_string());
        }
        summary.warnings = warnings;

        state = state.transition(if summary.is_done() {
            OrchestrationEvent::AllCompleted
        } else {
            OrchestrationEvent::FailuresPresent
        })?;

        let episode = Some(self.memory.store_episode(&task, &subtasks, &decisions));
        let optimization = self.after_task();

        info!(
            task_id = %task.id,
            state = %state,
            completed = summary.completed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "task finished"
        );

        Ok(SolveResult {
            task,
            state,
            summary,
            subtasks,
            decisions,
            episode,
            optimization,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Dispatch ready subtasks until every one is terminal
    async fn run_dag(
        &self,
        root_id: &str,
        subtasks: &mut [Task],
        cancel: &CancellationToken,
    ) -> (Vec<OrchestrationDecision>, Vec<String>) {
        let index_of: HashMap<TaskId, usize> = subtasks
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        let dependencies: Vec<Vec<usize>> = subtasks
            .iter()
            .map(|s| {
                s.dependencies
                    .iter()
                    .filter_map(|id| index_of.get(id).copied())
                    .collect()
            })
            .collect();

        let count = subtasks.len();
        let mut dispatched = vec![false; count];
        let mut terminal = vec![false; count];
        let mut decisions = Vec::with_capacity(count);
        let mut warnings = Vec::new();
        let mut in_flight = FuturesUnordered::new();

        loop {
            // Cancelled subtasks become terminal at once and may unblock others
            let mut progressed = true;
            while progressed {
                progressed = false;
                for i in 0..count {
                    if dispatched[i] || !dependencies[i].iter().all(|d| terminal[*d]) {
                        continue;
                    }
                    dispatched[i] = true;

                    if cancel.is_cancelled() {
                        cancel_subtask(&mut subtasks[i], "parent task cancelled");
                        terminal[i] = true;
                        progressed = true;
                        continue;
                    }

                    debug!(task_id = %subtasks[i].id, "subtask ready");
                    in_flight.push(self.run_subtask(i, subtasks[i].clone(), root_id, cancel));
                }
            }

            match in_flight.next().await {
                Some(run) => {
                    let SubtaskRun { index, task, decision } = run;
                    subtasks[index] = task;
                    terminal[index] = true;
                    if let Some(decision) = decision {
                        decisions.push(decision);
                    }
                }
                None => break,
            }
        }

        // Only reachable with a dependency outside the plan's order
        for (i, subtask) in subtasks.iter_mut().enumerate() {
            if !terminal[i] {
                warnings.push(format!("subtask {} has unresolvable dependencies", subtask.id));
                cancel_subtask(subtask, "unresolvable dependencies");
            }
        }

        (decisions, warnings)
    }

    async fn run_subtask(
        &self,
        index: usize,
        mut subtask: Task,
        root_id: &str,
        cancel: &CancellationToken,
    ) -> SubtaskRun {
        let _permit = match self.pool.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                cancel_subtask(&mut subtask, e.to_string());
                return SubtaskRun { index, task: subtask, decision: None };
            }
        };

        if cancel.is_cancelled() {
            cancel_subtask(&mut subtask, "parent task cancelled");
            return SubtaskRun { index, task: subtask, decision: None };
        }

        if let Err(e) = subtask.start() {
            warn!(task_id = %subtask.id, error = %e, "subtask was not pending");
        }

        let history = self.memory.performance_history();
        let (capabilities, mut decision) = self.selector.select(&subtask, &history);
        subtask.capabilities = Some(capabilities.clone());
        info!(
            task_id = %subtask.id,
            capabilities = %capabilities,
            confidence = decision.confidence,
            reasoning = %decision.reasoning,
            "capabilities selected"
        );
        self.emit(AuditRecord::decision(root_id, &decision));

        let report = self.pool.execute(&subtask, &capabilities).await;
        self.record_result(&mut subtask, &report);

        let feedback = match report.error_message() {
            Some(error) => format!("confidence {:.2}; {}", report.confidence, error),
            None => format!("confidence {:.2}", report.confidence),
        };
        if let Err(e) = decision.record_outcome(report.status, feedback) {
            warn!(decision_id = %decision.id, error = %e, "decision outcome not recorded");
        }
        self.decisions.lock().push(decision.clone());

        if self.config.orchestrator.enable_learning {
            self.learning.observe_subtask(&subtask, &decision, &report);
        }

        let interaction = match report.error_message() {
            Some(error) if !report.is_success() => error,
            _ => report.result_value().to_string(),
        };
        self.emit(Ok(AuditRecord::interaction(
            root_id,
            &subtask.id,
            &capabilities.key(),
            &interaction,
            report.is_success(),
        )));
        self.emit(Ok(AuditRecord::outcome(root_id, &decision)));

        SubtaskRun {
            index,
            task: subtask,
            decision: Some(decision),
        }
    }

    /// Partial success still completes the subtask with whatever was produced
    fn record_result(&self, subtask: &mut Task, report: &ExecutionReport) {
        let transition = match report.status {
            DecisionOutcome::Success | DecisionOutcome::Partial => {
                subtask.complete(report.result_value())
            }
            DecisionOutcome::Failure => subtask.fail(
                report
                    .error_message()
                    .unwrap_or_else(|| "executor failed".to_string()),
            ),
        };
        if let Err(e) = transition {
            warn!(task_id = %subtask.id, error = %e, "subtask transition rejected");
        }
    }

    /// Count the finished task and keep the best evolved strategy
    fn after_task(&self) -> Option<OptimizationResult> {
        if !self.config.orchestrator.enable_learning {
            return None;
        }

        let result = self.learning.on_task_completed()?;
        self.memory.store_workflow(
            json!({
                "strategy_name": result.strategy_name,
                "capabilities": result.best_capabilities,
                "generation": result.generation,
                "improvement": result.improvement,
            }),
            result.performance_after,
            vec!["evolved".to_string(), format!("gen_{}", result.generation)],
        );
        Some(result)
    }

    fn emit(&self, record: Result<AuditRecord>) {
        let Some(sink) = &self.audit else {
            return;
        };
        if let Err(e) = record.and_then(|r| sink.append(&r)) {
            warn!(error = %e, "audit append failed");
        }
    }

    /// Transparency report for a top-level task
    pub fn report(&self, task_id: &str) -> Result<TransparencyReport> {
        match &self.audit {
            Some(sink) => sink.report(task_id),
            None => Err(SymphonyError::Audit("transparency is disabled".to_string())),
        }
    }

    pub fn analyze_performance(&self) -> PerformanceAnalysis {
        let orchestrator = {
            let decisions = self.decisions.lock();
            let total = decisions.len();
            let successful = decisions
                .iter()
                .filter(|d| d.outcome == Some(DecisionOutcome::Success))
                .count();
            let (success_rate, average_confidence) = if total == 0 {
                (0.0, 0.0)
            } else {
                (
                    successful as f64 / total as f64,
                    decisions.iter().map(|d| d.confidence).sum::<f64>() / total as f64,
                )
            };
            OrchestratorMetrics {
                total_decisions: total,
                successful_decisions: successful,
                success_rate,
                average_confidence,
                strategy_scores: self.learning.ledger().snapshot(),
            }
        };

        PerformanceAnalysis {
            orchestrator,
            memory: self.memory.metrics(),
            learning: self.learning.metrics(),
            ab_winners: self.learning.ab_winners(),
        }
    }

    /// All decisions recorded so far, in completion order
    pub fn decisions(&self) -> Vec<OrchestrationDecision> {
        self.decisions.lock().clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalogue(&self) -> &Arc<CapabilityCatalogue> {
        &self.catalogue
    }

    pub fn learning(&self) -> &Arc<LearningEngine> {
        &self.learning
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn ledger(&self) -> &Arc<StrategyLedger> {
        self.learning.ledger()
    }
}

fn cancel_subtask(subtask: &mut Task, reason: impl Into<String>) {
    let reason = reason.into();
    if let Err(e) = subtask.cancel(reason.clone()) {
        warn!(task_id = %subtask.id, error = %e, "subtask could not be cancelled");
    } else {
        debug!(task_id = %subtask.id, reason = %reason, "subtask cancelled");
    }
}

/// Wires the engine's collaborators; anything not supplied comes from config
pub struct SymphonyBuilder {
    config: Config,
    generator: Option<Arc<dyn TextGenerator>>,
    registry: Option<ExecutorRegistry>,
    audit: Option<Arc<dyn AuditSink>>,
    rng: Option<StdRng>,
    executor_timeout: Option<Duration>,
}

impl SymphonyBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            generator: None,
            registry: None,
            audit: None,
            rng: None,
            executor_timeout: None,
        }
    }

    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn registry(mut self, registry: ExecutorRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Seed exploration and evolution
    pub fn rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    /// Override the per-subtask timeout from `orchestrator.task_timeout_secs`
    pub fn executor_timeout(mut self, timeout: Duration) -> Self {
        self.executor_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Symphony> {
        let config = self.config;
        config.validate()?;

        let catalogue = Arc::new(CapabilityCatalogue::from_config(&config.catalogue)?);
        let generator: Arc<dyn TextGenerator> = match self.generator {
            Some(generator) => generator,
            None => Arc::new(OllamaGenerator::from_config(&config)?),
        };

        let registry = match self.registry {
            Some(registry) => registry,
            None => catalogue
                .capabilities()
                .iter()
                .fold(ExecutorRegistry::new(), |registry, capability| {
                    registry.with(Arc::new(GenerativeExecutor::new(
                        capability.clone(),
                        generator.clone(),
                    )))
                }),
        };
        for capability in catalogue.capabilities() {
            if !registry.contains(capability) {
                warn!(capability = %capability, "no executor registered for capability");
            }
        }

        let ledger = Arc::new(StrategyLedger::new());
        let mut learning = LearningEngine::new(config.learning.clone(), catalogue.clone(), ledger.clone());
        if let Some(rng) = self.rng {
            learning = learning.with_rng(rng);
        }

        let mut memory = MemoryStore::new(RetentionPolicy::new(config.memory.retention_days));
        if let Some(sink) = &self.audit {
            memory = memory.with_audit(sink.clone());
        }

        let timeout = self.executor_timeout.unwrap_or_else(|| config.task_timeout());
        let pool = ExecutorPool::new(
            Arc::new(registry),
            config.orchestrator.max_concurrent_executors,
            timeout,
        );

        info!(
            capabilities = catalogue.capabilities().len(),
            actions = catalogue.actions().len(),
            catalogue_version = catalogue.version(),
            max_concurrent = pool.max_concurrent(),
            "symphony initialized"
        );

        Ok(Symphony {
            decomposer: Decomposer::new(generator, catalogue.clone(), config.task_timeout()),
            selector: CapabilitySelector::new(ledger, catalogue.clone()),
            pool,
            learning: Arc::new(learning),
            memory: Arc::new(memory),
            audit: self.audit,
            decisions: Mutex::new(Vec::new()),
            catalogue,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditLog;
    use crate::executor::{FnExecutor, Outcome};
    use crate::llm::PromptContext;
    use async_trait::async_trait;
    use rand::SeedableRng;

    struct Canned(&'static str);

    #[async_trait]
    impl TextGenerator for Canned {
        async fn complete(&self, _prompt: &PromptContext) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Down;

    #[async_trait]
    impl TextGenerator for Down {
        async fn complete(&self, _prompt: &PromptContext) -> Result<String> {
            Err(SymphonyError::TextBackend("connection refused".into()))
        }
    }

    fn registry(confidence: f64) -> ExecutorRegistry {
        ["research", "code", "analysis"]
            .into_iter()
            .fold(ExecutorRegistry::new(), |registry, capability| {
                registry.with(Arc::new(FnExecutor::new(capability, move |task: Task, _| async move {
                    Ok(Outcome::success(capability, json!(task.description), confidence))
                })))
            })
    }

    fn engine(generator: Arc<dyn TextGenerator>, audit: Option<Arc<dyn AuditSink>>) -> Symphony {
        let mut builder = Symphony::builder(Config::default())
            .generator(generator)
            .registry(registry(0.9))
            .rng(StdRng::seed_from_u64(3));
        if let Some(sink) = audit {
            builder = builder.audit(sink);
        }
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_single_step_fallback_runs() {
        let engine = engine(Arc::new(Canned("just do it")), None);
        let result = engine
            .solve(Task::new("do something"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.state, OrchestrationState::Done);
        assert_eq!(result.summary.total, 1);
        assert_eq!(result.summary.results[0].description, "just do it");
        assert_eq!(result.task.status, TaskStatus::Completed);
        assert_eq!(result.task.subtasks.len(), 1);
        assert!(result.episode.is_some());
    }

    #[tokio::test]
    async fn test_decomposition_failure_is_an_error() {
        let engine = engine(Arc::new(Down), None);
        let err = engine
            .solve(Task::new("do something"), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SymphonyError::Decomposition(_)));
        assert!(engine.decisions().is_empty());
        assert_eq!(engine.memory().metrics().episodic_size, 0);
    }

    #[tokio::test]
    async fn test_missing_executor_fails_subtask_only() {
        let engine = engine(
            Arc::new(Canned("Step 1: security review\nStep 2: research prior art")),
            None,
        );
        let result = engine
            .solve(Task::new("audit"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.state, OrchestrationState::DoneWithFailures);
        assert_eq!(result.summary.failed, 1);
        assert_eq!(result.summary.completed, 1);
        let failed = &result.summary.results[0];
        assert!(failed.error.as_deref().unwrap().contains("no executor registered"));
        assert_eq!(result.task.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_audit_trail_and_report() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let engine = engine(Arc::new(Canned("Step 1: research the topic")), Some(audit.clone()));
        let result = engine
            .solve(Task::new("learn"), CancellationToken::new())
            .await
            .unwrap();

        let report = engine.report(&result.task.id).unwrap();
        assert_eq!(report.decision_count, 1);
        assert_eq!(report.outcome_count, 1);
        assert_eq!(report.interaction_count, 1);
        assert_eq!(report.memory_count, 1);
        assert!(report
            .timeline
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_report_requires_audit() {
        let engine = engine(Arc::new(Canned("x")), None);
        assert!(matches!(engine.report("t"), Err(SymphonyError::Audit(_))));
    }

    #[tokio::test]
    async fn test_analyze_performance() {
        let engine = engine(Arc::new(Canned("Step 1: code it\nStep 2: analysis of it")), None);
        engine
            .solve(Task::new("build"), CancellationToken::new())
            .await
            .unwrap();

        let analysis = engine.analyze_performance();
        assert_eq!(analysis.orchestrator.total_decisions, 2);
        assert_eq!(analysis.orchestrator.successful_decisions, 2);
        assert!((analysis.orchestrator.success_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(analysis.memory.episodic_size, 1);
        assert_eq!(analysis.learning.tasks_completed, 1);
        assert_eq!(analysis.orchestrator.strategy_scores.len(), 2);
    }

    #[tokio::test]
    async fn test_from_config_writes_jsonl_audit() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.audit.log_dir = temp.path().to_string_lossy().to_string();

        let engine = Symphony::from_config(config, Arc::new(Canned("Step 1: research it"))).unwrap();
        let result = engine
            .solve(Task::new("research it"), CancellationToken::new())
            .await
            .unwrap();

        let report = engine.report(&result.task.id).unwrap();
        assert_eq!(report.decision_count, 1);
        assert!(std::fs::read_dir(temp.path()).unwrap().count() >= 3);
    }
}
