//! Derived timeseries. Formulas are pluggable: a [`Computer`] per
//! [`ComputeKind`] is registered in [`Computers`].

use std::collections::HashMap;
use std::sync::Arc;

use derive_more::Display;
use ethers::abi::{parse_abi, Token};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::jobs::{ComputeTarget, Job};
use crate::multicall::{self, Call};
use crate::outputs::Output;
use crate::{ChainId, JobError};

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComputeKind {
    #[display("tvl")]
    Tvl,
    #[display("apy")]
    Apy,
    #[display("harvestApr")]
    HarvestApr,
}

impl ComputeKind {
    pub const ALL: [ComputeKind; 3] = [ComputeKind::Tvl, ComputeKind::Apy, ComputeKind::HarvestApr];

    /// Output label the computed series is stored under
    pub fn label(&self) -> &'static str {
        match self {
            ComputeKind::Tvl => "tvl",
            ComputeKind::Apy => "apy",
            ComputeKind::HarvestApr => "harvestApr",
        }
    }

    pub fn job(&self, target: ComputeTarget) -> Job {
        match self {
            ComputeKind::Tvl => Job::ComputeTvl(target),
            ComputeKind::Apy => Job::ComputeApy(target),
            ComputeKind::HarvestApr => Job::ComputeHarvestApr(target),
        }
    }
}

/// One time bucket of one address, resolved to the block closest to it
#[derive(Clone, Debug, PartialEq)]
pub struct ComputeInput {
    pub kind: ComputeKind,
    pub chain_id: ChainId,
    pub address: Address,
    pub series_time: u64,
    pub block_number: u64,
    pub block_time: u64,
}

impl ComputeInput {
    pub fn output(&self, component: &str, value: Option<f64>) -> Output {
        Output {
            chain_id: self.chain_id,
            address: self.address,
            label: self.kind.label().to_string(),
            component: Some(component.to_string()),
            value,
            block_number: self.block_number,
            block_time: self.block_time,
            series_time: self.series_time,
        }
    }
}

#[async_trait::async_trait]
pub trait Computer: Send + Sync {
    fn kind(&self) -> ComputeKind;
    async fn compute(&self, input: &ComputeInput, ctx: &Context) -> Result<Vec<Output>, JobError>;
}

#[derive(Clone, Default)]
pub struct Computers {
    computers: HashMap<ComputeKind, Arc<dyn Computer>>,
}

impl Computers {
    pub fn new() -> Self {
        Self::default()
    }

    /// The computers shipped with the pipeline
    pub fn builtin() -> Self {
        let mut computers = Self::new();
        computers.register(Arc::new(TvlComputer));

        computers
    }

    pub fn register(&mut self, computer: Arc<dyn Computer>) {
        self.computers.insert(computer.kind(), computer);
    }

    pub fn get(&self, kind: ComputeKind) -> Option<Arc<dyn Computer>> {
        self.computers.get(&kind).cloned()
    }
}

/// Total assets held, in units of the underlying token
pub struct TvlComputer;

#[async_trait::async_trait]
impl Computer for TvlComputer {
    fn kind(&self) -> ComputeKind {
        ComputeKind::Tvl
    }

    async fn compute(&self, input: &ComputeInput, ctx: &Context) -> Result<Vec<Output>, JobError> {
        ctx.gate.ensure_batch(input.chain_id, input.block_number)?;

        let abi = parse_abi(&[
            "function totalAssets() view returns (uint256)",
            "function decimals() view returns (uint8)",
        ])
        .map_err(|error| JobError::SchemaViolation(error.to_string()))?;
        let calls = ["totalAssets", "decimals"]
            .iter()
            .map(|name| Ok(Call::new(input.address, abi.function(name)?)))
            .collect::<Result<Vec<_>, ethers::abi::Error>>()
            .map_err(|error| JobError::SchemaViolation(error.to_string()))?;

        let provider = ctx.provider(input.chain_id).await?;
        let results = multicall::aggregate(provider.as_ref(), &calls, Some(input.block_number)).await?;

        let uint = |index: usize| match results.get(index) {
            Some(Ok(tokens)) => match tokens.first() {
                Some(Token::Uint(value)) => Some(*value),
                _ => None,
            },
            _ => None,
        };

        let value = match (uint(0), uint(1)) {
            (Some(total_assets), Some(decimals)) => scale(total_assets, decimals),
            _ => None,
        };

        Ok(vec![input.output("totalAssets", value)])
    }
}

/// `amount / 10^decimals` as a float
pub fn scale(amount: U256, decimals: U256) -> Option<f64> {
    if decimals > U256::from(77) {
        return None;
    }

    let amount: f64 = amount.to_string().parse().ok()?;

    Some(amount / 10f64.powi(decimals.as_u32() as i32))
}
