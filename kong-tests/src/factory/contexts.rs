use std::sync::Arc;

use kong::pipeline;
use kong::{Chain, ChainId, Config, Context, MemoryQueue, QueueName};

use super::{MemoryRepo, MockConnector};

pub const MAINNET: ChainId = 1;
pub const MAINNET_MULTICALL3_ACTIVATION: u64 = 14_353_601;

pub fn mainnet() -> Chain {
    Chain::new(MAINNET, "http://localhost:8545")
        .with_multicall3_activation_block(MAINNET_MULTICALL3_ACTIVATION)
}

/// Mainnet only, with no pauses between submissions and immediate retries
pub fn test_config() -> Config {
    Config::new()
        .add_chain(mainnet())
        .with_submission_delay_ms(0)
        .with_backoff_base_ms(0)
        .with_poll_interval_ms(10)
}

/// A context over an in-memory queue and repo
pub struct TestKit {
    pub ctx: Arc<Context>,
    pub queue: Arc<MemoryQueue>,
    pub repo: Arc<MemoryRepo>,
}

impl TestKit {
    pub async fn new(config: Config, connector: MockConnector) -> Self {
        Self::with(config, connector, |ctx| ctx).await
    }

    pub async fn with(
        config: Config,
        connector: MockConnector,
        customize: impl FnOnce(Context) -> Context,
    ) -> Self {
        let queue = Arc::new(MemoryQueue::new());
        let repo = Arc::new(MemoryRepo::new());

        let ctx = Context::new(config, Arc::new(connector), queue.clone(), repo.clone()).unwrap();
        let ctx = Arc::new(customize(ctx));
        ctx.up().await.unwrap();

        Self { ctx, queue, repo }
    }

    /// Works every queue until nothing is due
    pub async fn drain(&self) -> usize {
        pipeline::drain(&self.ctx, &QueueName::ALL).await.unwrap()
    }

    pub async fn drain_queue(&self, queue: QueueName) -> usize {
        pipeline::drain(&self.ctx, &[queue]).await.unwrap()
    }
}
