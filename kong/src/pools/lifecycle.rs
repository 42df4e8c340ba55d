use super::PoolError;

/// Anything a [`WorkerPool`](super::WorkerPool) can start and stop.
///
/// Both sides take `&self`: a unit handed out by the pool may still be in use
/// elsewhere when the pool brings it down.
#[async_trait::async_trait]
pub trait Lifecycle: Send + Sync {
    async fn up(&self) -> Result<(), PoolError>;
    async fn down(&self) -> Result<(), PoolError>;
}
