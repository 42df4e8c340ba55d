use tracing::debug;

use crate::computers::{ComputeInput, ComputeKind};
use crate::context::Context;
use crate::jobs::{Batch, ComputeTarget, Job};
use crate::JobError;

/// Resolves the bucket's block, runs the kind's computer and queues what it
/// returns for loading
pub async fn compute(ctx: &Context, kind: ComputeKind, target: &ComputeTarget) -> Result<(), JobError> {
    let Some(computer) = ctx.computers.get(kind) else {
        debug!(%kind, "No computer registered");
        return Ok(());
    };

    let block_number = ctx.estimate_height(target.chain_id, target.time).await?;
    let block = ctx.block(target.chain_id, block_number).await?;

    let input = ComputeInput {
        kind,
        chain_id: target.chain_id,
        address: target.address,
        series_time: target.time,
        block_number: block.number,
        block_time: block.timestamp,
    };

    let outputs = computer.compute(&input, ctx).await?;

    debug!(
        %kind,
        chain_id = target.chain_id,
        address = ?target.address,
        block_number,
        outputs = outputs.len(),
        "Computed"
    );

    if !outputs.is_empty() {
        ctx.enqueue(Job::LoadOutput(Batch::new(outputs))).await?;
    }

    Ok(())
}
