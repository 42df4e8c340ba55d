//! Timestamp to block number, without an indexer.

use crate::chains::DEFAULT_AVERAGE_BLOCK_TIME;
use crate::provider::{fetch_block, fetch_head, BlockRef, Provider, ProviderError};
use crate::Chain;

/// Close enough, in blocks
pub const TOLERANCE_BLOCKS: f64 = 2.0;
pub const MAX_ITERATIONS: usize = 12;

/// Estimates the block produced at `target` (unix seconds) on `chain`.
///
/// Starts from the head and the chain's average block time, then samples the
/// block at each estimate and corrects along the secant through the last two
/// samples. The result is clamped to `[chain.genesis_block, head]`; a target
/// at or after the head's timestamp is the head.
pub async fn estimate_height(
    provider: &dyn Provider,
    chain: &Chain,
    target: u64,
) -> Result<u64, ProviderError> {
    let head = fetch_head(provider).await?;

    if target >= head.timestamp {
        return Ok(head.number);
    }

    let floor = chain.genesis_block.min(head.number);
    let clamp = |estimate: f64| estimate.round().clamp(floor as f64, head.number as f64) as u64;

    let average_block_time = if chain.average_block_time > 0.0 {
        chain.average_block_time
    } else {
        DEFAULT_AVERAGE_BLOCK_TIME
    };

    let mut previous = head;
    let mut estimate =
        clamp(head.number as f64 - (head.timestamp - target) as f64 / average_block_time);

    for _ in 0..MAX_ITERATIONS {
        let sample = fetch_block(provider, estimate).await?;
        let blocks_off = blocks_off(&previous, &sample, target, average_block_time);

        if blocks_off.abs() <= TOLERANCE_BLOCKS {
            return Ok(clamp(sample.number as f64 - blocks_off));
        }

        let next = clamp(sample.number as f64 - blocks_off);
        if next == sample.number {
            // pinned against a bound
            return Ok(next);
        }

        previous = sample;
        estimate = next;
    }

    Ok(estimate)
}

fn blocks_off(previous: &BlockRef, sample: &BlockRef, target: u64, fallback: f64) -> f64 {
    let seconds_off = sample.timestamp as f64 - target as f64;

    let seconds_per_block = if previous.number != sample.number {
        (previous.timestamp as f64 - sample.timestamp as f64)
            / (previous.number as f64 - sample.number as f64)
    } else {
        fallback
    };

    if seconds_per_block > 0.0 {
        seconds_off / seconds_per_block
    } else {
        seconds_off / fallback
    }
}
