use tracing::debug;

use super::{fields, functions, human_abi};
use crate::context::Context;
use crate::jobs::{Job, StrategyTarget};
use crate::multicall::{self, Call};
use crate::things::{Thing, STRATEGY_LABEL};
use crate::{Hashes, JobError};

const STRATEGY_ABI: [&str; 7] = [
    "function name() view returns (string)",
    "function apiVersion() view returns (string)",
    "function vault() view returns (address)",
    "function want() view returns (address)",
    "function keeper() view returns (address)",
    "function strategist() view returns (address)",
    "function estimatedTotalAssets() view returns (uint256)",
];

const STRATEGY_FIELDS: [&str; 7] = [
    "name",
    "apiVersion",
    "vault",
    "want",
    "keeper",
    "strategist",
    "estimatedTotalAssets",
];

pub async fn strategy(ctx: &Context, target: &StrategyTarget) -> Result<(), JobError> {
    let head = ctx.head(target.chain_id).await?;
    ctx.gate.ensure_batch(target.chain_id, head.number)?;

    let provider = ctx.provider(target.chain_id).await?;
    let abi = human_abi(&STRATEGY_ABI)?;

    let calls: Vec<Call> = functions(&abi, &STRATEGY_FIELDS)?
        .into_iter()
        .map(|function| Call::new(target.address, function))
        .collect();
    let results = multicall::aggregate(provider.as_ref(), &calls, Some(head.number)).await?;

    let mut strategy_fields = fields(&calls, &results);
    strategy_fields
        .entry("vault")
        .or_insert_with(|| Hashes::h160_to_string(&target.vault_address).into());

    debug!(
        chain_id = target.chain_id,
        address = ?target.address,
        fields = strategy_fields.len(),
        "Extracted strategy"
    );

    ctx.enqueue(Job::LoadStrategy(
        Thing::new(target.chain_id, target.address, STRATEGY_LABEL)
            .with_defaults(strategy_fields)
            .as_of(head.number, head.timestamp),
    ))
    .await?;

    Ok(())
}
