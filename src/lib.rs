//! Symphony - adaptive task orchestration
//!
//! Decomposes an objective into dependency-bearing subtasks, assigns each to
//! capability-tagged executors chosen from learned strategy scores, and feeds
//! every outcome back into the learning engine and the memory store.
//!
//! # Architecture
//!
//! - **Planning**: decomposition through an opaque text generator, with a
//!   structured parser that always degrades to a single-step plan
//! - **Selection**: ledger and memory driven capability ranking
//! - **Orchestration**: bounded, timeout-wrapped DAG execution
//! - **Learning**: moving averages, value learning, evolutionary search, A/B
//! - **Memory**: episodic, semantic and procedural layers with retention

pub mod errors;
pub mod types;
pub mod config;
pub mod catalogue;

pub mod llm;
pub mod planning;
pub mod executor;
pub mod selection;
pub mod learning;
pub mod memory;
pub mod audit;
pub mod orchestrator;

pub mod cli;

pub use errors::{Result, SymphonyError};
pub use orchestrator::{SolveResult, Summary, Symphony};
