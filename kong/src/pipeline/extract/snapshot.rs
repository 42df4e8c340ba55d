use tracing::debug;

use super::fields;
use crate::context::Context;
use crate::jobs::{Job, SnapshotTarget};
use crate::multicall::{self, Call};
use crate::snapshots::Snapshot;
use crate::JobError;

/// Reads every zero-argument view of the source's abi in one batch and hands
/// the fields to its decoder
pub async fn snapshot(ctx: &Context, target: &SnapshotTarget) -> Result<(), JobError> {
    let Some(decoder) = ctx.decoders.get(&target.abi_path) else {
        debug!(abi_path = %target.abi_path, "No decoder, no snapshot");
        return Ok(());
    };

    let head = ctx.head(target.chain_id).await?;
    ctx.gate.ensure_batch(target.chain_id, head.number)?;

    let calls: Vec<Call> = decoder
        .views()
        .into_iter()
        .map(|function| Call::new(target.address, function))
        .collect();

    let snapshot_fields = if calls.is_empty() {
        Default::default()
    } else {
        let provider = ctx.provider(target.chain_id).await?;
        let results = multicall::aggregate(provider.as_ref(), &calls, Some(head.number)).await?;

        fields(&calls, &results)
    };

    let hook = decoder
        .snapshot(target.chain_id, target.address, &snapshot_fields)
        .await?;

    debug!(
        chain_id = target.chain_id,
        address = ?target.address,
        views = calls.len(),
        fields = snapshot_fields.len(),
        discovered = hook.things.len(),
        "Extracted snapshot"
    );

    let mut jobs = vec![Job::LoadSnapshot(Snapshot {
        chain_id: target.chain_id,
        address: target.address,
        block_number: head.number,
        block_time: head.timestamp,
        snapshot: snapshot_fields,
        hook: hook.output,
    })];
    jobs.extend(hook.things.into_iter().map(Job::LoadThing));

    ctx.enqueue_all(jobs).await?;

    Ok(())
}
