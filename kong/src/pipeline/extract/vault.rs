use ethers::abi::Token;
use ethers::types::{Address, U256};
use tracing::info;

use super::{address_of, erc20s, fields, functions, human_abi};
use crate::context::Context;
use crate::jobs::{Job, StrategyTarget, VaultTarget};
use crate::multicall::{self, Call};
use crate::things::{Thing, WithdrawalQueue, VAULT_LABEL};
use crate::JobError;

/// Longest withdrawal queue a vault can hold
const MAX_WITHDRAWAL_QUEUE: usize = 20;

const VAULT_ABI: [&str; 9] = [
    "function name() view returns (string)",
    "function symbol() view returns (string)",
    "function decimals() view returns (uint256)",
    "function token() view returns (address)",
    "function totalAssets() view returns (uint256)",
    "function apiVersion() view returns (string)",
    "function governance() view returns (address)",
    "function management() view returns (address)",
    "function withdrawalQueue(uint256) view returns (address)",
];

pub const VAULT_FIELDS: [&str; 8] = [
    "name",
    "symbol",
    "decimals",
    "token",
    "totalAssets",
    "apiVersion",
    "governance",
    "management",
];

/// Reads the vault's fields in one batch, then its share and asset tokens and
/// its withdrawal queue. Emits the erc20s, the vault, the queue and one
/// `extract.strategy` per queued strategy.
pub async fn vault(ctx: &Context, target: &VaultTarget) -> Result<(), JobError> {
    let head = ctx.head(target.chain_id).await?;
    ctx.gate.ensure_batch(target.chain_id, head.number)?;

    let provider = ctx.provider(target.chain_id).await?;
    let abi = human_abi(&VAULT_ABI)?;

    let calls: Vec<Call> = functions(&abi, &VAULT_FIELDS)?
        .into_iter()
        .map(|function| Call::new(target.address, function))
        .collect();
    let results = multicall::aggregate(provider.as_ref(), &calls, Some(head.number)).await?;
    let vault_fields = fields(&calls, &results);

    let mut tokens = vec![target.address];
    if let Some(asset) = address_of(results.get(3)) {
        tokens.push(asset);
    }
    let erc20s = erc20s(provider.as_ref(), target.chain_id, &tokens, head).await?;

    let withdrawal_queue = abi
        .function("withdrawalQueue")
        .map_err(|error| JobError::SchemaViolation(error.to_string()))?;
    let calls: Vec<Call> = (0..MAX_WITHDRAWAL_QUEUE)
        .map(|index| {
            Call::new(target.address, withdrawal_queue).with_args(vec![Token::Uint(U256::from(index))])
        })
        .collect();
    let results = multicall::aggregate(provider.as_ref(), &calls, Some(head.number)).await?;
    let strategies: Vec<Address> = results
        .iter()
        .map_while(|result| address_of(Some(result)))
        .collect();

    info!(
        chain_id = target.chain_id,
        address = ?target.address,
        block_number = head.number,
        fields = vault_fields.len(),
        strategies = strategies.len(),
        "Extracted vault"
    );

    let mut jobs: Vec<Job> = erc20s.into_iter().map(Job::LoadErc20).collect();
    jobs.push(Job::LoadVault(
        Thing::new(target.chain_id, target.address, VAULT_LABEL)
            .with_defaults(vault_fields)
            .as_of(head.number, head.timestamp),
    ));
    jobs.push(Job::LoadWithdrawalQueue(WithdrawalQueue {
        chain_id: target.chain_id,
        vault: target.address,
        strategies: strategies.clone(),
        as_of_block: head.number,
    }));
    jobs.extend(strategies.into_iter().map(|strategy| {
        Job::ExtractStrategy(StrategyTarget {
            chain_id: target.chain_id,
            address: strategy,
            vault_address: target.address,
        })
    }));

    ctx.enqueue_all(jobs).await?;

    Ok(())
}
