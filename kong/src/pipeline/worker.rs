use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error};

use super::work_once;
use crate::context::Context;
use crate::jobs::QueueName;
use crate::pools::{Lifecycle, PoolError};

/// Polls one queue and handles what it claims, one job at a time. Going down
/// lets the job in hand finish.
pub struct QueueWorker {
    id: usize,
    queue: QueueName,
    ctx: Arc<Context>,
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl QueueWorker {
    pub fn new(id: usize, queue: QueueName, ctx: Arc<Context>) -> Self {
        let (stop, _) = watch::channel(false);

        Self {
            id,
            queue,
            ctx,
            stop,
            task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn queue(&self) -> QueueName {
        self.queue
    }
}

#[async_trait::async_trait]
impl Lifecycle for QueueWorker {
    async fn up(&self) -> Result<(), PoolError> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        let ctx = self.ctx.clone();
        let (id, queue) = (self.id, self.queue);
        let poll_interval = Duration::from_millis(ctx.config.poll_interval_ms.max(1));
        let mut stop = self.stop.subscribe();

        *task = Some(tokio::spawn(async move {
            debug!(id, %queue, "Worker up");

            while !*stop.borrow() {
                let idle = match work_once(&ctx, queue).await {
                    Ok(handled) => !handled,
                    Err(error) => {
                        error!(id, %queue, %error, "Queue unavailable");
                        true
                    }
                };

                if idle {
                    tokio::select! {
                        _ = time::sleep(poll_interval) => {}
                        changed = stop.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }

            debug!(id, %queue, "Worker down");
        }));

        Ok(())
    }

    async fn down(&self) -> Result<(), PoolError> {
        self.stop.send_replace(true);

        if let Some(task) = self.task.lock().await.take() {
            task.await
                .map_err(|error| PoolError::Unit(format!("worker {}: {error}", self.id)))?;
        }

        Ok(())
    }
}
