use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::{FailedJob, Queue, QueueDepth, QueueError, QueuedJob};
use crate::jobs::{Job, QueueName};

#[derive(Clone, Copy, Debug, PartialEq)]
enum Status {
    Waiting,
    Active,
    Failed,
}

struct Entry {
    id: Uuid,
    job: Job,
    attempts: u32,
    run_at: Instant,
    status: Status,
    reason: Option<String>,
}

/// A single-process queue held in memory
#[derive(Default)]
pub struct MemoryQueue {
    entries: Mutex<Vec<Entry>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs not yet claimed, in submission order
    pub async fn waiting(&self) -> Vec<Job> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|entry| entry.status == Status::Waiting)
            .map(|entry| entry.job.clone())
            .collect()
    }

    pub async fn waiting_named(&self, name: &str) -> Vec<Job> {
        self.waiting()
            .await
            .into_iter()
            .filter(|job| job.name() == name)
            .collect()
    }

    /// Drops every waiting job, handing them back
    pub async fn drain(&self) -> Vec<Job> {
        let mut entries = self.entries.lock().await;
        let (waiting, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut *entries)
            .into_iter()
            .partition(|entry| entry.status == Status::Waiting);
        *entries = rest;

        waiting.into_iter().map(|entry| entry.job).collect()
    }

    async fn update(&self, id: Uuid, update: impl FnOnce(&mut Entry)) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| QueueError::Unknown(format!("no job {id}")))?;

        update(entry);

        Ok(())
    }
}

#[async_trait::async_trait]
impl Queue for MemoryQueue {
    async fn add(&self, job: Job, delay: Duration) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();

        self.entries.lock().await.push(Entry {
            id,
            job,
            attempts: 0,
            run_at: Instant::now() + delay,
            status: Status::Waiting,
            reason: None,
        });

        Ok(id)
    }

    async fn take(&self, queue: QueueName) -> Result<Option<QueuedJob>, QueueError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let Some(entry) = entries.iter_mut().find(|entry| {
            entry.status == Status::Waiting && entry.run_at <= now && entry.job.queue() == queue
        }) else {
            return Ok(None);
        };

        entry.status = Status::Active;
        entry.attempts += 1;

        Ok(Some(QueuedJob {
            id: entry.id,
            queue,
            job: entry.job.clone(),
            attempts: entry.attempts,
        }))
    }

    async fn complete(&self, id: Uuid) -> Result<(), QueueError> {
        self.entries.lock().await.retain(|entry| entry.id != id);

        Ok(())
    }

    async fn retry(&self, id: Uuid, delay: Duration, reason: &str) -> Result<(), QueueError> {
        self.update(id, |entry| {
            entry.status = Status::Waiting;
            entry.run_at = Instant::now() + delay;
            entry.reason = Some(reason.to_string());
        })
        .await
    }

    async fn fail(&self, id: Uuid, reason: &str) -> Result<(), QueueError> {
        self.update(id, |entry| {
            entry.status = Status::Failed;
            entry.reason = Some(reason.to_string());
        })
        .await
    }

    async fn depth(&self, queue: QueueName) -> Result<QueueDepth, QueueError> {
        let entries = self.entries.lock().await;

        Ok(entries
            .iter()
            .filter(|entry| entry.job.queue() == queue)
            .fold(QueueDepth::default(), |mut depth, entry| {
                match entry.status {
                    Status::Waiting => depth.waiting += 1,
                    Status::Active => depth.active += 1,
                    Status::Failed => depth.failed += 1,
                }
                depth
            }))
    }

    async fn failed(&self, limit: usize) -> Result<Vec<FailedJob>, QueueError> {
        let entries = self.entries.lock().await;

        entries
            .iter()
            .filter(|entry| entry.status == Status::Failed)
            .take(limit)
            .map(|entry| {
                let (name, payload) = entry
                    .job
                    .to_parts()
                    .map_err(|error| QueueError::Unknown(error.to_string()))?;

                Ok(FailedJob {
                    id: entry.id,
                    queue: entry.job.queue(),
                    name: name.to_string(),
                    payload,
                    attempts: entry.attempts,
                    reason: entry.reason.clone().unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn remove_failed(&self, ids: &[Uuid]) -> Result<(), QueueError> {
        self.entries
            .lock()
            .await
            .retain(|entry| !(entry.status == Status::Failed && ids.contains(&entry.id)));

        Ok(())
    }
}
