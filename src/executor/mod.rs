//! Capability executors
//!
//! Executors are the workers that actually perform a subtask. The engine
//! only needs their capability name, an async invocation that honours a
//! cancellation token, and a structured outcome.

pub mod generative;
pub mod pool;
pub mod registry;
pub mod types;

pub use generative::GenerativeExecutor;
pub use pool::{ExecutionReport, ExecutorPool};
pub use registry::{ExecutorRegistry, FnExecutor};
pub use types::Outcome;

use crate::errors::Result;
use crate::types::Task;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A capability-providing worker
#[async_trait]
pub trait Executor: Send + Sync {
    /// Capability name this executor provides
    fn capability(&self) -> &str;

    /// Perform `task`; implementations should stop early once `cancel` fires
    async fn invoke(&self, task: &Task, cancel: CancellationToken) -> Result<Outcome>;
}
