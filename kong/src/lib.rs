pub mod chains;
pub mod computers;
pub mod config;
pub mod context;
pub mod decoders;
#[cfg(feature = "postgres")]
mod diesels;
mod error;
pub mod evmlogs;
mod hashes;
pub mod height;
pub mod jobs;
pub mod multicall;
pub mod outputs;
pub mod pipeline;
pub mod pools;
pub mod provider;
pub mod queues;
pub mod repos;
mod serde_utils;
pub mod snapshots;
pub mod sources;
pub mod strides;
pub mod things;
pub mod webhooks;

pub use chains::{Chain, ChainId};
pub use config::{Config, ConfigError};
pub use context::Context;
pub use error::JobError;
pub use hashes::Hashes;
pub use jobs::{Job, QueueName};
pub use pipeline::Pipeline;
pub use queues::{MemoryQueue, Queue, QueueError};
pub use repos::{Repo, RepoError};
pub use sources::Source;

#[cfg(feature = "postgres")]
pub use queues::PostgresQueue;
#[cfg(feature = "postgres")]
pub use repos::PostgresRepo;

pub use ethers::types::{Address, U256};

use derive_more::Display;

use pools::PoolError;

/// Why the process could not start or stop cleanly
#[derive(Debug, Display)]
pub enum KongError {
    #[display("config error: {_0}")]
    Config(ConfigError),
    #[display("pool error: {_0}")]
    Pool(PoolError),
    #[display("repo error: {_0}")]
    Repo(RepoError),
    #[display("queue error: {_0}")]
    Queue(QueueError),
}

impl std::error::Error for KongError {}

impl From<ConfigError> for KongError {
    fn from(error: ConfigError) -> Self {
        KongError::Config(error)
    }
}

impl From<PoolError> for KongError {
    fn from(error: PoolError) -> Self {
        KongError::Pool(error)
    }
}

impl From<RepoError> for KongError {
    fn from(error: RepoError) -> Self {
        KongError::Repo(error)
    }
}

impl From<QueueError> for KongError {
    fn from(error: QueueError) -> Self {
        KongError::Queue(error)
    }
}
