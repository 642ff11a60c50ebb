//! Executor registry and closure-backed executors

use crate::errors::Result;
use crate::executor::{Executor, Outcome};
use crate::types::Task;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Capability name -> executor
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under its capability, replacing any previous one
    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        let capability = executor.capability().trim().to_lowercase();
        self.executors.insert(capability, executor);
    }

    pub fn with(mut self, executor: Arc<dyn Executor>) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, capability: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(capability).cloned()
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.executors.contains_key(capability)
    }

    /// Registered capabilities, sorted
    pub fn capabilities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

type BoxedInvoke =
    dyn Fn(Task, CancellationToken) -> Pin<Box<dyn Future<Output = Result<Outcome>> + Send>> + Send + Sync;

/// Executor backed by an async closure
pub struct FnExecutor {
    capability: String,
    func: Box<BoxedInvoke>,
}

impl FnExecutor {
    pub fn new<F, Fut>(capability: impl Into<String>, func: F) -> Self
    where
        F: Fn(Task, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outcome>> + Send + 'static,
    {
        Self {
            capability: capability.into(),
            func: Box::new(move |task, cancel| Box::pin(func(task, cancel))),
        }
    }
}

#[async_trait]
impl Executor for FnExecutor {
    fn capability(&self) -> &str {
        &self.capability
    }

    async fn invoke(&self, task: &Task, cancel: CancellationToken) -> Result<Outcome> {
        (self.func)(task.clone(), cancel).await
    }
}
