//! The job pipeline. Every [`Job`] is dispatched by [`process`]; [`handle`]
//! turns its outcome into a queue transition:
//!
//! `waiting -> active -> { done | waiting (retry, backed off) | failed }`
//!
//! Jobs are retried while their error is retryable and attempts remain.
//! Extraction below a chain's Multicall3 activation is logged and counted as
//! done.

mod compute;
mod extract;
mod fanout;
mod load;
mod monitor;
mod probe;
mod schedules;
mod worker;

pub use extract::VAULT_FIELDS;
pub use fanout::{series_times, sources};
pub use monitor::{digest, FailedJobSummary, Summarizer, MONITOR_BATCH};
pub use probe::Probe;
pub use schedules::Schedules;
pub use worker::QueueWorker;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::computers::ComputeKind;
use crate::context::Context;
use crate::jobs::{Job, QueueName};
use crate::pools::{PoolError, WorkerPool};
use crate::queues::{QueueError, QueuedJob};
use crate::JobError;

pub async fn process(ctx: &Context, job: Job) -> Result<(), JobError> {
    match job {
        Job::FanoutAbis {} => fanout::abis(ctx).await,
        Job::FanoutEvents(source) => fanout::events(ctx, &source).await,
        Job::FanoutTimeseries(source) => fanout::timeseries(ctx, &source).await,

        Job::ExtractVault(target) => extract::vault(ctx, &target).await,
        Job::ExtractStrategy(target) => extract::strategy(ctx, &target).await,
        Job::ExtractEvmLogs(target) => extract::evmlogs(ctx, &target).await,
        Job::ExtractSnapshot(target) => extract::snapshot(ctx, &target).await,
        Job::ExtractWebhook(target) => extract::webhook(ctx, &target).await,

        Job::ComputeTvl(target) => compute::compute(ctx, ComputeKind::Tvl, &target).await,
        Job::ComputeApy(target) => compute::compute(ctx, ComputeKind::Apy, &target).await,
        Job::ComputeHarvestApr(target) => {
            compute::compute(ctx, ComputeKind::HarvestApr, &target).await
        }

        Job::LoadVault(thing)
        | Job::LoadErc20(thing)
        | Job::LoadStrategy(thing)
        | Job::LoadThing(thing) => load::things(ctx, vec![thing]).await,
        Job::LoadWithdrawalQueue(queue) => load::withdrawal_queue(ctx, &queue).await,
        Job::LoadSnapshot(snapshot) => load::snapshot(ctx, &snapshot).await,
        Job::LoadEvmLog(batch) => load::evmlogs(ctx, &batch.batch).await,
        Job::LoadOutput(batch) => load::outputs(ctx, batch.batch).await,

        Job::Probe {} => probe::probe(ctx).await,
        Job::MonitorFailed {} => monitor::monitor(ctx).await,
    }
}

/// Runs a claimed job and settles it with the queue
pub async fn handle(ctx: &Context, queued: QueuedJob) -> Result<(), QueueError> {
    let QueuedJob {
        id,
        queue,
        job,
        attempts,
    } = queued;
    let name = job.name();

    match process(ctx, job).await {
        Ok(()) => ctx.queue.complete(id).await,
        Err(error @ JobError::BatchUnsupportedAtHeight { .. }) => {
            warn!(%id, %queue, job = name, %error, "Skipping extraction");
            ctx.queue.complete(id).await
        }
        Err(error) if error.is_retryable() && attempts < ctx.config.max_attempts => {
            let delay = backoff(ctx.config.backoff_base_ms, attempts);
            warn!(%id, %queue, job = name, attempts, ?delay, %error, "Retrying job");
            ctx.queue.retry(id, delay, &error.to_string()).await
        }
        Err(error) => {
            error!(%id, %queue, job = name, attempts, %error, "Job failed");
            ctx.queue.fail(id, &error.to_string()).await
        }
    }
}

/// `base * 2^(attempts - 1)`
pub fn backoff(base_ms: u64, attempts: u32) -> Duration {
    let exponent = attempts.saturating_sub(1).min(16);

    Duration::from_millis(base_ms.saturating_mul(1 << exponent))
}

/// Claims and handles one job; false when the queue had nothing due
pub async fn work_once(ctx: &Context, queue: QueueName) -> Result<bool, QueueError> {
    match ctx.queue.take(queue).await? {
        Some(queued) => {
            handle(ctx, queued).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Works `queues` in order until none has a job due. Returns how many jobs
/// were handled.
pub async fn drain(ctx: &Context, queues: &[QueueName]) -> Result<usize, QueueError> {
    let mut handled = 0;

    loop {
        let mut progressed = false;

        for queue in queues {
            while work_once(ctx, *queue).await? {
                handled += 1;
                progressed = true;
            }
        }

        if !progressed {
            return Ok(handled);
        }
    }
}

/// Worker pools for the queues this process serves, plus the periodic
/// schedules when enabled
pub struct Pipeline {
    ctx: Arc<Context>,
    workers: Vec<WorkerPool<QueueWorker>>,
    schedules_enabled: bool,
    schedules: Mutex<Option<Schedules>>,
}

impl Pipeline {
    pub fn new(ctx: Arc<Context>, queues: &[QueueName]) -> Self {
        let recycle_interval = Duration::from_millis(ctx.config.recycle_interval_ms);

        let workers = queues
            .iter()
            .map(|queue| {
                let queue = *queue;
                let worker_ctx = ctx.clone();

                WorkerPool::new(
                    &format!("worker-{queue}"),
                    ctx.config.concurrency(queue),
                    recycle_interval,
                    move |sequence| Ok(QueueWorker::new(sequence, queue, worker_ctx.clone())),
                )
            })
            .collect();

        Self {
            ctx,
            workers,
            schedules_enabled: true,
            schedules: Mutex::new(None),
        }
    }

    pub fn with_schedules(mut self, enabled: bool) -> Self {
        self.schedules_enabled = enabled;

        self
    }

    pub async fn up(&self) -> Result<(), PoolError> {
        for pool in &self.workers {
            pool.up().await?;
        }

        if self.schedules_enabled {
            *self.schedules.lock().await = Some(Schedules::start(self.ctx.clone()));
        }

        info!(pools = self.workers.len(), schedules = self.schedules_enabled, "Pipeline up");

        Ok(())
    }

    pub async fn down(&self) -> Result<(), PoolError> {
        if let Some(schedules) = self.schedules.lock().await.take() {
            schedules.stop();
        }

        for pool in &self.workers {
            pool.down().await?;
        }

        info!("Pipeline down");

        Ok(())
    }
}
