use tracing::debug;

use crate::context::Context;
use crate::evmlogs::EvmLog;
use crate::outputs::{self, Output};
use crate::snapshots::Snapshot;
use crate::things::{self, Thing, WithdrawalQueue};
use crate::JobError;

pub async fn things(ctx: &Context, things: Vec<Thing>) -> Result<(), JobError> {
    let things = things::coalesce(things);
    ctx.repo.upsert_things(&things).await?;

    debug!(things = things.len(), "Loaded things");

    Ok(())
}

pub async fn withdrawal_queue(ctx: &Context, queue: &WithdrawalQueue) -> Result<(), JobError> {
    ctx.repo.upsert_withdrawal_queue(queue).await?;

    Ok(())
}

pub async fn snapshot(ctx: &Context, snapshot: &Snapshot) -> Result<(), JobError> {
    ctx.repo.upsert_snapshot(snapshot).await?;

    Ok(())
}

pub async fn evmlogs(ctx: &Context, logs: &[EvmLog]) -> Result<(), JobError> {
    ctx.repo.insert_evmlogs(logs).await?;

    debug!(logs = logs.len(), "Loaded evmlogs");

    Ok(())
}

pub async fn outputs(ctx: &Context, outputs: Vec<Output>) -> Result<(), JobError> {
    let outputs = outputs::dedup(outputs);
    ctx.repo.upsert_outputs(&outputs).await?;

    debug!(outputs = outputs.len(), "Loaded outputs");

    Ok(())
}
