use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use super::{FailedJob, Queue, QueueDepth, QueueError, QueuedJob};
use crate::jobs::{Job, QueueName};
use crate::repos::{connect_raw_query_client, migrate_queue, PostgresRepoRawQueryClient, RepoError};

/// How long a claimed job stays invisible to other workers
pub const DEFAULT_LEASE: Duration = Duration::from_secs(300);

impl From<tokio_postgres::Error> for QueueError {
    fn from(error: tokio_postgres::Error) -> Self {
        if error.is_closed() {
            QueueError::NotConnected
        } else {
            QueueError::Unknown(error.to_string())
        }
    }
}

impl From<RepoError> for QueueError {
    fn from(error: RepoError) -> Self {
        match error {
            RepoError::NotConnected => QueueError::NotConnected,
            RepoError::Unknown(message) => QueueError::Unknown(message),
        }
    }
}

/// A durable queue in the `kong_jobs` table, shared by every process
/// pointed at the same database. Workers claim rows with
/// `FOR UPDATE SKIP LOCKED`; a claim lapses after the lease.
#[derive(Clone)]
pub struct PostgresQueue {
    client: Arc<PostgresRepoRawQueryClient>,
    lease: Duration,
}

impl PostgresQueue {
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let client = connect_raw_query_client(url).await?;

        Ok(Self {
            client: Arc::new(client),
            lease: DEFAULT_LEASE,
        })
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;

        self
    }

    pub async fn migrate(&self) -> Result<(), QueueError> {
        Ok(migrate_queue(&self.client).await?)
    }
}

#[async_trait::async_trait]
impl Queue for PostgresQueue {
    async fn add(&self, job: Job, delay: Duration) -> Result<Uuid, QueueError> {
        let (name, payload) = job
            .to_parts()
            .map_err(|error| QueueError::SchemaViolation(error.to_string()))?;
        let id = Uuid::new_v4();

        self.client
            .execute(
                "INSERT INTO kong_jobs (id, queue, name, payload, run_at)
                VALUES ($1, $2, $3, $4, NOW() + make_interval(secs => $5::float8))",
                &[&id, &job.queue().as_str(), &name, &payload, &delay.as_secs_f64()],
            )
            .await?;

        Ok(id)
    }

    async fn take(&self, queue: QueueName) -> Result<Option<QueuedJob>, QueueError> {
        loop {
            let rows = self
                .client
                .query(
                    "UPDATE kong_jobs SET
                        status = 'active',
                        attempts = attempts + 1,
                        locked_until = NOW() + make_interval(secs => $2::float8),
                        updated_at = NOW()
                    WHERE id = (
                        SELECT id FROM kong_jobs
                        WHERE queue = $1
                        AND (
                            (status = 'waiting' AND run_at <= NOW())
                            OR (status = 'active' AND locked_until < NOW())
                        )
                        ORDER BY run_at
                        LIMIT 1
                        FOR UPDATE SKIP LOCKED
                    )
                    RETURNING id, name, payload, attempts",
                    &[&queue.as_str(), &self.lease.as_secs_f64()],
                )
                .await?;

            let Some(row) = rows.first() else {
                return Ok(None);
            };

            let id: Uuid = row.try_get(0)?;
            let name: String = row.try_get(1)?;
            let attempts: i32 = row.try_get(3)?;

            match Job::from_parts(&name, row.try_get(2)?) {
                Ok(job) => {
                    return Ok(Some(QueuedJob {
                        id,
                        queue,
                        job,
                        attempts: attempts.max(0) as u32,
                    }))
                }
                Err(reason) => {
                    warn!(%id, %name, %reason, "Rejecting malformed job");
                    self.fail(id, &reason).await?;
                }
            }
        }
    }

    async fn complete(&self, id: Uuid) -> Result<(), QueueError> {
        self.client
            .execute("DELETE FROM kong_jobs WHERE id = $1", &[&id])
            .await?;

        Ok(())
    }

    async fn retry(&self, id: Uuid, delay: Duration, reason: &str) -> Result<(), QueueError> {
        self.client
            .execute(
                "UPDATE kong_jobs SET
                    status = 'waiting',
                    run_at = NOW() + make_interval(secs => $2::float8),
                    locked_until = NULL,
                    reason = $3,
                    updated_at = NOW()
                WHERE id = $1",
                &[&id, &delay.as_secs_f64(), &reason],
            )
            .await?;

        Ok(())
    }

    async fn fail(&self, id: Uuid, reason: &str) -> Result<(), QueueError> {
        self.client
            .execute(
                "UPDATE kong_jobs SET status = 'failed', locked_until = NULL, reason = $2, updated_at = NOW()
                WHERE id = $1",
                &[&id, &reason],
            )
            .await?;

        Ok(())
    }

    async fn depth(&self, queue: QueueName) -> Result<QueueDepth, QueueError> {
        let rows = self
            .client
            .query(
                "SELECT status, COUNT(*) FROM kong_jobs WHERE queue = $1 GROUP BY status",
                &[&queue.as_str()],
            )
            .await?;

        let mut depth = QueueDepth::default();
        for row in rows {
            let status: String = row.try_get(0)?;
            let count = row.try_get::<_, i64>(1)?.max(0) as u64;

            match status.as_str() {
                "waiting" => depth.waiting = count,
                "active" => depth.active = count,
                "failed" => depth.failed = count,
                _ => {}
            }
        }

        Ok(depth)
    }

    async fn failed(&self, limit: usize) -> Result<Vec<FailedJob>, QueueError> {
        let rows = self
            .client
            .query(
                "SELECT id, queue, name, payload, attempts, COALESCE(reason, '')
                FROM kong_jobs WHERE status = 'failed'
                ORDER BY updated_at LIMIT $1",
                &[&(limit as i64)],
            )
            .await?;

        rows.iter()
            .map(|row| {
                let queue: String = row.try_get(1)?;
                let attempts: i32 = row.try_get(4)?;

                Ok(FailedJob {
                    id: row.try_get(0)?,
                    queue: queue.parse().map_err(QueueError::Unknown)?,
                    name: row.try_get(2)?,
                    payload: row.try_get(3)?,
                    attempts: attempts.max(0) as u32,
                    reason: row.try_get(5)?,
                })
            })
            .collect()
    }

    async fn remove_failed(&self, ids: &[Uuid]) -> Result<(), QueueError> {
        let ids = ids.to_vec();

        self.client
            .execute(
                "DELETE FROM kong_jobs WHERE status = 'failed' AND id = ANY($1)",
                &[&ids],
            )
            .await?;

        Ok(())
    }
}
