//! Type definitions module
//!
//! Core data model shared by the decomposer, selector, orchestrator and
//! learning components.

pub mod capability;
pub mod decision;
pub mod task;

// Re-export commonly used types
pub use capability::CapabilitySet;
pub use decision::{AlternativeStrategy, DecisionOutcome, OrchestrationDecision};
pub use task::{Task, TaskId, TaskPriority, TaskStatus};
