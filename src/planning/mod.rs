//! Task decomposition
//!
//! Turns a top-level objective into an ordered, acyclic set of subtasks.
//! Extraction from generated text is best-effort and always degrades to a
//! single-step plan instead of failing.

pub mod classify;
pub mod decomposer;
pub mod parser;

pub use classify::{classify, state_key, TaskClass};
pub use decomposer::Decomposer;
pub use parser::{ParsedPlan, PlanParser, PlannedStep, FALLBACK_PREFIX_CHARS, MAX_SUBTASKS};
