use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tracing::error;

use crate::context::Context;
use crate::jobs::Job;

/// The periodic jobs: fanout, probe and the failed-job monitor
pub struct Schedules {
    tasks: Vec<JoinHandle<()>>,
}

impl Schedules {
    pub fn start(ctx: Arc<Context>) -> Self {
        let config = &ctx.config;

        Self {
            tasks: vec![
                every(ctx.clone(), config.fanout_interval_ms, Job::FanoutAbis {}),
                every(ctx.clone(), config.probe_interval_ms, Job::Probe {}),
                every(ctx.clone(), config.monitor_interval_ms, Job::MonitorFailed {}),
            ],
        }
    }

    pub fn stop(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn every(ctx: Arc<Context>, period_ms: u64, job: Job) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_millis(period_ms.max(1)));

        loop {
            interval.tick().await;

            if let Err(error) = ctx.enqueue(job.clone()).await {
                error!(job = job.name(), %error, "Could not schedule job");
            }
        }
    })
}
