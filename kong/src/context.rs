use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time;
use uuid::Uuid;

use crate::computers::{Computer, Computers};
use crate::config::{Config, ConfigError};
use crate::decoders::{Decoder, Decoders};
use crate::height;
use crate::jobs::Job;
use crate::multicall::BatchCallGate;
use crate::pipeline::Summarizer;
use crate::pools::{ConnectionPool, Connector, PoolError};
use crate::provider::{self, BlockRef, Provider};
use crate::queues::Queue;
use crate::repos::Repo;
use crate::{Chain, ChainId, JobError};

/// Everything a stage needs, built once at startup and shared by every
/// worker.
pub struct Context {
    pub config: Config,
    pub connections: ConnectionPool,
    pub gate: BatchCallGate,
    pub queue: Arc<dyn Queue>,
    pub repo: Arc<dyn Repo>,
    pub decoders: Decoders,
    pub computers: Computers,
    pub summarizer: Option<Arc<dyn Summarizer>>,
    pub http: reqwest::Client,
    started_at: Instant,
}

impl Context {
    pub fn new(
        config: Config,
        connector: Arc<dyn Connector>,
        queue: Arc<dyn Queue>,
        repo: Arc<dyn Repo>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let connections = ConnectionPool::new(
            &config.chains,
            config.connections_per_chain,
            Duration::from_millis(config.recycle_interval_ms),
            connector,
        );

        Ok(Self {
            gate: BatchCallGate::new(&config.chains),
            decoders: Decoders::from_config(&config.abis)?,
            computers: Computers::builtin(),
            summarizer: None,
            http: reqwest::Client::new(),
            started_at: Instant::now(),
            connections,
            queue,
            repo,
            config,
        })
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoders.register(decoder);

        self
    }

    pub fn with_computer(mut self, computer: Arc<dyn Computer>) -> Self {
        self.computers.register(computer);

        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);

        self
    }

    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;

        self
    }

    pub async fn up(&self) -> Result<(), PoolError> {
        self.connections.up().await
    }

    pub async fn down(&self) -> Result<(), PoolError> {
        self.connections.down().await
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn chain(&self, chain_id: ChainId) -> Result<&Chain, JobError> {
        self.config
            .chain(chain_id)
            .ok_or(JobError::UnsupportedChain(chain_id))
    }

    pub async fn provider(&self, chain_id: ChainId) -> Result<Arc<dyn Provider>, JobError> {
        Ok(self.connections.provider(chain_id).await?)
    }

    pub async fn head(&self, chain_id: ChainId) -> Result<BlockRef, JobError> {
        let provider = self.provider(chain_id).await?;

        Ok(provider::fetch_head(provider.as_ref()).await?)
    }

    pub async fn block(&self, chain_id: ChainId, block_number: u64) -> Result<BlockRef, JobError> {
        let provider = self.provider(chain_id).await?;

        Ok(provider::fetch_block(provider.as_ref(), block_number).await?)
    }

    pub async fn estimate_height(&self, chain_id: ChainId, timestamp: u64) -> Result<u64, JobError> {
        let chain = self.chain(chain_id)?;
        let provider = self.provider(chain_id).await?;

        Ok(height::estimate_height(provider.as_ref(), chain, timestamp).await?)
    }

    pub async fn enqueue(&self, job: Job) -> Result<Uuid, JobError> {
        Ok(self.queue.add(job, Duration::ZERO).await?)
    }

    /// Submits in order with the configured pause between submissions
    pub async fn enqueue_all(&self, jobs: Vec<Job>) -> Result<usize, JobError> {
        let delay = Duration::from_millis(self.config.submission_delay_ms);
        let count = jobs.len();

        for (index, job) in jobs.into_iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                time::sleep(delay).await;
            }

            self.queue.add(job, Duration::ZERO).await?;
        }

        Ok(count)
    }
}
