//! Extract stages: batched reads and log queries that turn into load jobs.

mod evmlogs;
mod snapshot;
mod strategy;
mod vault;

pub use evmlogs::evmlogs;
pub use snapshot::snapshot;
pub use strategy::strategy;
pub use vault::{vault, VAULT_FIELDS};

use ethers::abi::{parse_abi, Abi, Function, Token};
use ethers::types::Address;
use serde_json::{Map, Value};

use crate::context::Context;
use crate::decoders::outputs_to_json;
use crate::jobs::{Batch, Job, WebhookTarget};
use crate::multicall::{self, Call, CallResult};
use crate::provider::{BlockRef, Provider};
use crate::things::{Thing, ERC20_LABEL};
use crate::webhooks;
use crate::{ChainId, JobError};

const ERC20_ABI: [&str; 3] = [
    "function name() view returns (string)",
    "function symbol() view returns (string)",
    "function decimals() view returns (uint8)",
];

pub async fn webhook(ctx: &Context, target: &WebhookTarget) -> Result<(), JobError> {
    let key = ctx
        .config
        .webhook_keys
        .get(&target.subscription.id)
        .map(String::as_str);

    let outputs = webhooks::deliver(&ctx.http, target, key).await?;

    if !outputs.is_empty() {
        ctx.enqueue(Job::LoadOutput(Batch::new(outputs))).await?;
    }

    Ok(())
}

fn human_abi(signatures: &[&str]) -> Result<Abi, JobError> {
    parse_abi(signatures).map_err(|error| JobError::SchemaViolation(error.to_string()))
}

fn functions<'a>(abi: &'a Abi, names: &[&str]) -> Result<Vec<&'a Function>, JobError> {
    names
        .iter()
        .map(|name| {
            abi.function(name)
                .map_err(|error| JobError::SchemaViolation(error.to_string()))
        })
        .collect()
}

/// Successful results keyed by function name; failed calls are left out
fn fields(calls: &[Call], results: &[CallResult]) -> Map<String, Value> {
    calls
        .iter()
        .zip(results)
        .filter_map(|(call, result)| {
            let tokens = result.as_ref().ok()?;

            Some((call.function.name.clone(), outputs_to_json(&call.function, tokens)))
        })
        .collect()
}

fn address_of(result: Option<&CallResult>) -> Option<Address> {
    match result?.as_ref().ok()?.first()? {
        Token::Address(address) if !address.is_zero() => Some(*address),
        _ => None,
    }
}

/// Name, symbol and decimals of every token in one batch
async fn erc20s(
    provider: &dyn Provider,
    chain_id: ChainId,
    tokens: &[Address],
    block: BlockRef,
) -> Result<Vec<Thing>, JobError> {
    let abi = human_abi(&ERC20_ABI)?;
    let erc20_functions = functions(&abi, &["name", "symbol", "decimals"])?;

    let calls: Vec<Call> = tokens
        .iter()
        .flat_map(|token| {
            erc20_functions
                .iter()
                .map(move |function| Call::new(*token, function))
        })
        .collect();
    let results = multicall::aggregate(provider, &calls, Some(block.number)).await?;

    Ok(tokens
        .iter()
        .zip(calls.chunks(erc20_functions.len()).zip(results.chunks(erc20_functions.len())))
        .map(|(token, (calls, results))| {
            Thing::new(chain_id, *token, ERC20_LABEL)
                .with_defaults(fields(calls, results))
                .as_of(block.number, block.timestamp)
        })
        .collect())
}
