mod connection_pool;
mod lifecycle;
mod worker_pool;

pub use connection_pool::{ConnectionPool, Connector, HttpConnector, RpcConnection};
pub use lifecycle::Lifecycle;
pub use worker_pool::WorkerPool;

use derive_more::Display;

use crate::ChainId;

pub const DEFAULT_POOL_SIZE: usize = 2;
pub const DEFAULT_RECYCLE_INTERVAL_MS: u64 = 600_000;

#[derive(Clone, Debug, Display, PartialEq)]
pub enum PoolError {
    #[display("unsupported chain {_0}")]
    UnsupportedChain(ChainId),
    #[display("pool is not up")]
    NotUp,
    #[display("pooled unit failed: {_0}")]
    Unit(String),
}

impl std::error::Error for PoolError {}
