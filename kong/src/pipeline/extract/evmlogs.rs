use ethers::types::{Filter, U64};
use tracing::{debug, warn};

use crate::context::Context;
use crate::evmlogs::{DecodeLogError, EvmLog};
use crate::jobs::{Batch, EvmLogsTarget, Job};
use crate::strides::Stride;
use crate::things;
use crate::JobError;

/// Fetches one stride of logs, queues the decoded logs and whatever they
/// reveal, then marks the stride covered
pub async fn evmlogs(ctx: &Context, target: &EvmLogsTarget) -> Result<(), JobError> {
    let decoder = ctx.decoders.get(&target.handler).ok_or_else(|| {
        JobError::SchemaViolation(format!("no decoder for {}", target.handler))
    })?;
    let provider = ctx.provider(target.chain_id).await?;

    let filter = Filter::new()
        .address(target.address)
        .topic0(target.events.clone())
        .from_block(target.from)
        .to_block(target.to);
    let logs = provider.get_logs(&filter).await?;

    let block_numbers: Vec<U64> = logs.iter().filter_map(|log| log.block_number).collect();
    let blocks = provider.get_blocks_by_number(&block_numbers).await?;

    let mut evmlogs = Vec::with_capacity(logs.len());
    for log in &logs {
        let block_time = log
            .block_number
            .and_then(|number| blocks.get(&number))
            .map(|block| block.timestamp.as_u64())
            .unwrap_or_default();

        match EvmLog::decode(target.chain_id, decoder.abi(), log, block_time) {
            Ok(evmlog) => evmlogs.push(evmlog),
            Err(DecodeLogError::UnknownEvent) | Err(DecodeLogError::Pending) => {}
            Err(DecodeLogError::Malformed(error)) => {
                warn!(
                    chain_id = target.chain_id,
                    transaction_hash = ?log.transaction_hash,
                    %error,
                    "Skipping malformed log"
                );
            }
        }
    }

    let discovered = things::coalesce(evmlogs.iter().flat_map(|log| decoder.discover(log)).collect());

    debug!(
        chain_id = target.chain_id,
        address = ?target.address,
        from = target.from,
        to = target.to,
        logs = evmlogs.len(),
        discovered = discovered.len(),
        "Extracted evmlogs"
    );

    let mut jobs = vec![];
    if !evmlogs.is_empty() {
        jobs.push(Job::LoadEvmLog(Batch::new(evmlogs)));
    }
    jobs.extend(discovered.into_iter().map(Job::LoadThing));
    ctx.enqueue_all(jobs).await?;

    ctx.repo
        .extend_strides(target.chain_id, target.address, Stride::new(target.from, target.to))
        .await?;

    Ok(())
}
