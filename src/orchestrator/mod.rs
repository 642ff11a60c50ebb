//! Top-level orchestration: decomposition, DAG dispatch, aggregation

pub mod engine;
pub mod state;

pub use engine::{
    OrchestratorMetrics, PerformanceAnalysis, SolveResult, SubtaskSummary, Summary, Symphony,
    SymphonyBuilder,
};
pub use state::{OrchestrationEvent, OrchestrationState};
