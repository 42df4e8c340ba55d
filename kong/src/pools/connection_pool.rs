use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethers::providers::{Http, Provider as EthersProvider};
use futures_util::future::try_join_all;
use tracing::debug;

use super::{Lifecycle, PoolError, WorkerPool};
use crate::provider::Provider;
use crate::{Chain, ChainId};

/// Opens a provider for one of a chain's endpoints
pub trait Connector: Send + Sync {
    fn connect(&self, chain: &Chain, url: &str) -> Result<Arc<dyn Provider>, PoolError>;
}

pub struct HttpConnector;

impl Connector for HttpConnector {
    fn connect(&self, _chain: &Chain, url: &str) -> Result<Arc<dyn Provider>, PoolError> {
        let provider = EthersProvider::<Http>::try_from(url)
            .map_err(|error| PoolError::Unit(format!("{url}: {error}")))?;

        Ok(Arc::new(provider))
    }
}

/// One live connection to a chain's RPC endpoint
pub struct RpcConnection {
    id: usize,
    chain_id: ChainId,
    url: String,
    provider: Arc<dyn Provider>,
    live: AtomicBool,
}

impl RpcConnection {
    pub fn new(id: usize, chain_id: ChainId, url: &str, provider: Arc<dyn Provider>) -> Self {
        Self {
            id,
            chain_id,
            url: url.to_string(),
            provider,
            live: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn provider(&self) -> Arc<dyn Provider> {
        self.provider.clone()
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Lifecycle for RpcConnection {
    async fn up(&self) -> Result<(), PoolError> {
        self.live.store(true, Ordering::SeqCst);
        debug!(chain_id = self.chain_id, id = self.id, "RPC connection up");

        Ok(())
    }

    async fn down(&self) -> Result<(), PoolError> {
        self.live.store(false, Ordering::SeqCst);
        debug!(chain_id = self.chain_id, id = self.id, "RPC connection down");

        Ok(())
    }
}

/// A [`WorkerPool`] of RPC connections per chain
pub struct ConnectionPool {
    pools: HashMap<ChainId, WorkerPool<RpcConnection>>,
}

impl ConnectionPool {
    pub fn new(
        chains: &[Chain],
        size: usize,
        recycle_interval: Duration,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let pools = chains
            .iter()
            .map(|chain| {
                let chain_id = chain.id;
                let chain = chain.clone();
                let connector = connector.clone();
                let name = format!("rpc-{}", chain.id);

                let pool = WorkerPool::new(&name, size, recycle_interval, move |sequence| {
                    if chain.json_rpc_urls.is_empty() {
                        return Err(PoolError::Unit(format!("chain {} has no endpoints", chain.id)));
                    }

                    // successive connections walk the chain's endpoints
                    let url = &chain.json_rpc_urls[sequence % chain.json_rpc_urls.len()];
                    let provider = connector.connect(&chain, url)?;

                    Ok(RpcConnection::new(sequence, chain.id, url, provider))
                });

                (chain_id, pool)
            })
            .collect();

        Self { pools }
    }

    pub async fn up(&self) -> Result<(), PoolError> {
        if let Err(error) = try_join_all(self.pools.values().map(|pool| pool.up())).await {
            self.down().await?;
            return Err(error);
        }

        Ok(())
    }

    pub async fn down(&self) -> Result<(), PoolError> {
        for pool in self.pools.values() {
            pool.down().await?;
        }

        Ok(())
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        let mut chain_ids: Vec<_> = self.pools.keys().copied().collect();
        chain_ids.sort();

        chain_ids
    }

    pub fn pool(&self, chain_id: ChainId) -> Result<&WorkerPool<RpcConnection>, PoolError> {
        self.pools
            .get(&chain_id)
            .ok_or(PoolError::UnsupportedChain(chain_id))
    }

    pub async fn next(&self, chain_id: ChainId) -> Result<Arc<RpcConnection>, PoolError> {
        self.pool(chain_id)?.next().await
    }

    pub async fn provider(&self, chain_id: ChainId) -> Result<Arc<dyn Provider>, PoolError> {
        Ok(self.next(chain_id).await?.provider())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chains() -> Vec<Chain> {
        vec![
            Chain::new(1, "http://localhost:8545").add_json_rpc_url("http://localhost:8546"),
            Chain::new(137, "http://localhost:9545"),
        ]
    }

    fn pool() -> ConnectionPool {
        ConnectionPool::new(&chains(), 2, Duration::from_secs(600), Arc::new(HttpConnector))
    }

    #[tokio::test]
    async fn rejects_unknown_chains() {
        let pool = pool();
        pool.up().await.unwrap();

        assert_eq!(pool.next(10).await.err(), Some(PoolError::UnsupportedChain(10)));
    }

    #[tokio::test]
    async fn rotates_through_endpoints() {
        let pool = pool();
        pool.up().await.unwrap();

        let first = pool.next(1).await.unwrap();
        let second = pool.next(1).await.unwrap();

        assert_ne!(first.url(), second.url());
        assert!(first.is_live() && second.is_live());
        assert_eq!(pool.chain_ids(), vec![1, 137]);
        pool.down().await.unwrap();
    }

    #[tokio::test]
    async fn keeps_size_through_recycling() {
        let pool = pool();
        pool.up().await.unwrap();
        let chain_pool = pool.pool(137).unwrap();

        chain_pool.recycle().await.unwrap();

        assert_eq!(chain_pool.units().await.len(), 2);
        assert!(chain_pool.units().await.iter().all(|c| c.chain_id() == 137));
    }

    #[tokio::test]
    async fn fails_to_come_up_without_endpoints() {
        let chain = Chain::new(5, "http://localhost:8545").with_json_rpc_urls(vec![]);
        let pool = ConnectionPool::new(&[chain], 1, Duration::from_secs(600), Arc::new(HttpConnector));

        assert!(matches!(pool.up().await, Err(PoolError::Unit(_))));
    }
}
