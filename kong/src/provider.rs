use std::collections::HashMap;

use ethers::prelude::Middleware;
use ethers::providers::{Http, Provider as EthersProvider, ProviderError as EthersProviderError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Block, BlockId, BlockNumber, Bytes, Filter, Log, TransactionRequest, TxHash, U64,
};
use futures_util::future::try_join_all;

pub type ProviderError = EthersProviderError;

/// The slice of JSON-RPC the pipeline needs from a chain
#[async_trait::async_trait]
pub trait Provider: Sync + Send {
    async fn get_block_number(&self) -> Result<U64, ProviderError>;
    async fn get_block(&self, block_number: U64) -> Result<Option<Block<TxHash>>, ProviderError>;
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ProviderError>;
    /// `eth_call` against `to`, at `block_number` or latest
    async fn call(
        &self,
        to: Address,
        data: Bytes,
        block_number: Option<U64>,
    ) -> Result<Bytes, ProviderError>;

    async fn get_blocks_by_number(
        &self,
        block_numbers: &[U64],
    ) -> Result<HashMap<U64, Block<TxHash>>, ProviderError> {
        let mut block_numbers = block_numbers.to_vec();
        block_numbers.sort();
        block_numbers.dedup();

        const CHUNK_SIZE: usize = 4;

        let mut blocks_by_number = HashMap::new();
        for chunk in block_numbers.chunks(CHUNK_SIZE) {
            let blocks = try_join_all(chunk.iter().map(|n| self.get_block(*n))).await?;

            for (number, block) in chunk.iter().zip(blocks) {
                let block = block.ok_or_else(|| missing_block(*number))?;
                blocks_by_number.insert(*number, block);
            }
        }

        Ok(blocks_by_number)
    }
}

#[async_trait::async_trait]
impl Provider for EthersProvider<Http> {
    async fn get_block_number(&self) -> Result<U64, ProviderError> {
        Middleware::get_block_number(self).await
    }

    async fn get_block(&self, block_number: U64) -> Result<Option<Block<TxHash>>, ProviderError> {
        Middleware::get_block(self, block_number).await
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ProviderError> {
        Middleware::get_logs(self, filter).await
    }

    async fn call(
        &self,
        to: Address,
        data: Bytes,
        block_number: Option<U64>,
    ) -> Result<Bytes, ProviderError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        let block = block_number.map(|n| BlockId::Number(BlockNumber::Number(n)));

        Middleware::call(self, &tx, block).await
    }
}

/// A block's number and timestamp (seconds)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRef {
    pub number: u64,
    pub timestamp: u64,
}

impl BlockRef {
    pub fn from_block(block: &Block<TxHash>, fallback_number: u64) -> Self {
        Self {
            number: block.number.map(|n| n.as_u64()).unwrap_or(fallback_number),
            timestamp: block.timestamp.as_u64(),
        }
    }
}

pub async fn fetch_block(provider: &dyn Provider, block_number: u64) -> Result<BlockRef, ProviderError> {
    let number = U64::from(block_number);

    match provider.get_block(number).await? {
        Some(block) => Ok(BlockRef::from_block(&block, block_number)),
        None => Err(missing_block(number)),
    }
}

pub async fn fetch_head(provider: &dyn Provider) -> Result<BlockRef, ProviderError> {
    let number = provider.get_block_number().await?;

    fetch_block(provider, number.as_u64()).await
}

fn missing_block(block_number: U64) -> ProviderError {
    ProviderError::CustomError(format!("block {block_number} not found"))
}
