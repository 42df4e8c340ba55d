mod memory_queue;
#[cfg(feature = "postgres")]
mod postgres_queue;

pub use memory_queue::MemoryQueue;
#[cfg(feature = "postgres")]
pub use postgres_queue::PostgresQueue;

use std::time::Duration;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::jobs::{Job, QueueName};

#[derive(Debug, Display, Clone, PartialEq)]
pub enum QueueError {
    #[display("queue not connected")]
    NotConnected,
    /// Unknown job names and malformed payloads
    #[display("{_0}")]
    SchemaViolation(String),
    #[display("{_0}")]
    Unknown(String),
}

impl std::error::Error for QueueError {}

/// A job claimed by a worker. `attempts` counts this attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedJob {
    pub id: Uuid,
    pub queue: QueueName,
    pub job: Job,
    pub attempts: u32,
}

/// A job parked after its last attempt
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedJob {
    pub id: Uuid,
    pub queue: QueueName,
    pub name: String,
    pub payload: Value,
    pub attempts: u32,
    pub reason: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    pub waiting: u64,
    pub active: u64,
    pub failed: u64,
}

/// Named job queues shared by every worker. Jobs are taken at least once:
/// a job is only gone after [`Queue::complete`], and a claimed job whose
/// worker vanished becomes takeable again.
#[async_trait::async_trait]
pub trait Queue: Send + Sync {
    async fn add(&self, job: Job, delay: Duration) -> Result<Uuid, QueueError>;

    /// Claims the next due job of `queue`, counting an attempt
    async fn take(&self, queue: QueueName) -> Result<Option<QueuedJob>, QueueError>;
    async fn complete(&self, id: Uuid) -> Result<(), QueueError>;
    async fn retry(&self, id: Uuid, delay: Duration, reason: &str) -> Result<(), QueueError>;
    async fn fail(&self, id: Uuid, reason: &str) -> Result<(), QueueError>;

    async fn depth(&self, queue: QueueName) -> Result<QueueDepth, QueueError>;
    async fn failed(&self, limit: usize) -> Result<Vec<FailedJob>, QueueError>;
    async fn remove_failed(&self, ids: &[Uuid]) -> Result<(), QueueError>;

    /// Adds a job given by name, the way external producers submit them
    async fn add_named(
        &self,
        name: &str,
        payload: Value,
        delay: Duration,
    ) -> Result<Uuid, QueueError> {
        let job = Job::from_parts(name, payload).map_err(QueueError::SchemaViolation)?;

        self.add(job, delay).await
    }
}
