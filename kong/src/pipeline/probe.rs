use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::Context;
use crate::jobs::QueueName;
use crate::queues::QueueDepth;
use crate::repos::RepoStats;
use crate::JobError;

/// A health sample for the dashboard
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    pub pid: u32,
    pub uptime_secs: u64,
    pub queues: BTreeMap<QueueName, QueueDepth>,
    pub repo: RepoStats,
}

pub async fn probe(ctx: &Context) -> Result<(), JobError> {
    let mut queues = BTreeMap::new();
    for queue in QueueName::ALL {
        queues.insert(queue, ctx.queue.depth(queue).await?);
    }

    let probe = Probe {
        pid: std::process::id(),
        uptime_secs: ctx.uptime().as_secs(),
        queues,
        repo: ctx.repo.stats().await?,
    };

    info!(
        pid = probe.pid,
        uptime_secs = probe.uptime_secs,
        waiting = probe.queues.values().map(|depth| depth.waiting).sum::<u64>(),
        failed = probe.queues.values().map(|depth| depth.failed).sum::<u64>(),
        "Probe"
    );

    ctx.repo.insert_probe(&probe).await?;

    Ok(())
}
