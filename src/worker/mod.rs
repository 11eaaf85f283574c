//! Worker pool: pulls jobs from the queue and routes them to handlers by
//! job type.

pub mod pool;
pub mod transmutation;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

pub use pool::{Disposition, PoolConfig, WorkerPool};
pub use transmutation::{Resolution, Roll, TransmutationHandler};

/// What a handler did with a job it processed without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The job's effect was applied.
    Applied,
    /// A previous delivery already applied it; nothing changed.
    AlreadyResolved,
}

/// Processes jobs of one type.
///
/// Jobs are delivered at least once, so `handle` must be safe to run
/// repeatedly for the same payload. Return a permanent error (see
/// [`crate::error::Error::is_permanent`]) for jobs that can never succeed.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: &serde_json::Value) -> Result<HandlerOutcome>;
}

/// Registry of handlers, indexed by job type.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `job_type`, replacing any previous one.
    pub fn register(mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(job_type.into(), handler);
        self
    }

    /// Look up the handler for a job type.
    pub fn get(&self, job_type: &str) -> Option<&Arc<dyn JobHandler>> {
        self.handlers.get(job_type)
    }
}
