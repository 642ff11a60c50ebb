//! Memory store
//!
//! Three layers:
//! - Episodic: one entry per finished top-level task
//! - Semantic: knowledge appended by learning or external collaborators
//! - Procedural: workflows, including evolved strategies
//!
//! The store also keeps the per-capability success index the selector
//! reads, and applies the retention policy after every episode.

pub mod retention;
pub mod store;
pub mod types;

pub use retention::RetentionPolicy;
pub use store::{episode_importance, MemoryStore};
pub use types::{
    MemoryEntry, MemoryLayer, MemoryMetrics, PerformanceHistory, PerformanceRecord,
};
