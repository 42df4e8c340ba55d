use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use super::{Lifecycle, PoolError};

type Factory<T> = Arc<dyn Fn(usize) -> Result<T, PoolError> + Send + Sync>;

struct Units<T> {
    units: Vec<Arc<T>>,
    next: usize,
    next_to_recycle: usize,
}

/// Keeps `size` units alive, hands them out round-robin and, when there are at
/// least two, replaces one every `recycle_interval / size`.
///
/// The factory receives a sequence number that is unique for the life of the
/// pool, so replacements are distinguishable from the units they replace.
pub struct WorkerPool<T: Lifecycle + 'static> {
    name: String,
    size: usize,
    recycle_interval: Duration,
    factory: Factory<T>,
    sequence: Arc<AtomicUsize>,
    state: Arc<Mutex<Units<T>>>,
    recycler: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Lifecycle + 'static> WorkerPool<T> {
    pub fn new<F>(name: &str, size: usize, recycle_interval: Duration, factory: F) -> Self
    where
        F: Fn(usize) -> Result<T, PoolError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            size: size.max(1),
            recycle_interval,
            factory: Arc::new(factory),
            sequence: Arc::new(AtomicUsize::new(0)),
            state: Arc::new(Mutex::new(Units {
                units: vec![],
                next: 0,
                next_to_recycle: 0,
            })),
            recycler: Mutex::new(None),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Brings every unit up, or none: when one fails, those already up are
    /// taken down again. Calling it on a pool that is up does nothing.
    pub async fn up(&self) -> Result<(), PoolError> {
        if !self.state.lock().await.units.is_empty() {
            debug!(pool = %self.name, "Pool already up");
            return Ok(());
        }

        let results =
            join_all((0..self.size).map(|_| bring_up(self.factory.clone(), self.sequence.clone())))
                .await;

        let mut units = Vec::with_capacity(self.size);
        let mut failure = None;
        for result in results {
            match result {
                Ok(unit) => units.push(unit),
                Err(error) => {
                    failure.get_or_insert(error);
                }
            }
        }

        if let Some(error) = failure {
            for unit in units {
                if let Err(down_error) = unit.down().await {
                    warn!(pool = %self.name, error = %down_error, "Could not take unit down");
                }
            }

            return Err(error);
        }

        {
            let mut state = self.state.lock().await;
            state.units = units;
            state.next = 0;
            state.next_to_recycle = 0;
        }

        if self.size >= 2 {
            self.start_recycling().await;
        }

        debug!(pool = %self.name, size = self.size, "Pool up");

        Ok(())
    }

    fn recycle_period(&self) -> Duration {
        (self.recycle_interval / self.size as u32).max(Duration::from_millis(1))
    }

    async fn start_recycling(&self) {
        let period = self.recycle_period();
        let name = self.name.clone();
        let factory = self.factory.clone();
        let sequence = self.sequence.clone();
        let state = self.state.clone();

        let recycler = tokio::spawn(async move {
            let mut interval = time::interval(period);
            // the first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                if let Err(error) = recycle_one(&factory, &sequence, &state).await {
                    warn!(pool = %name, %error, "Recycle failed, keeping current unit");
                }
            }
        });

        if let Some(previous) = self.recycler.lock().await.replace(recycler) {
            previous.abort();
        }
    }

    pub async fn is_recycling(&self) -> bool {
        self.recycler.lock().await.is_some()
    }

    /// The next unit in round-robin order
    pub async fn next(&self) -> Result<Arc<T>, PoolError> {
        let mut state = self.state.lock().await;

        if state.units.is_empty() {
            return Err(PoolError::NotUp);
        }

        let index = state.next % state.units.len();
        state.next = (index + 1) % state.units.len();

        Ok(state.units[index].clone())
    }

    /// Replaces one unit now, as a recycler tick would
    pub async fn recycle(&self) -> Result<(), PoolError> {
        recycle_one(&self.factory, &self.sequence, &self.state).await
    }

    pub async fn units(&self) -> Vec<Arc<T>> {
        self.state.lock().await.units.clone()
    }

    pub async fn down(&self) -> Result<(), PoolError> {
        if let Some(recycler) = self.recycler.lock().await.take() {
            recycler.abort();
        }

        let units = std::mem::take(&mut self.state.lock().await.units);
        for unit in units {
            unit.down().await?;
        }

        debug!(pool = %self.name, "Pool down");

        Ok(())
    }
}

async fn bring_up<T: Lifecycle>(
    factory: Factory<T>,
    sequence: Arc<AtomicUsize>,
) -> Result<Arc<T>, PoolError> {
    let unit = factory(sequence.fetch_add(1, Ordering::SeqCst))?;
    unit.up().await?;

    Ok(Arc::new(unit))
}

/// The replacement is up before the old unit leaves the rotation, and only
/// the old unit goes down, so at most one unit per pool is ever offline.
async fn recycle_one<T: Lifecycle>(
    factory: &Factory<T>,
    sequence: &Arc<AtomicUsize>,
    state: &Arc<Mutex<Units<T>>>,
) -> Result<(), PoolError> {
    let fresh = bring_up(factory.clone(), sequence.clone()).await?;

    let retired = {
        let mut state = state.lock().await;

        if state.units.is_empty() {
            None
        } else {
            let index = state.next_to_recycle % state.units.len();
            state.next_to_recycle = (index + 1) % state.units.len();

            Some(std::mem::replace(&mut state.units[index], fresh.clone()))
        }
    };

    match retired {
        Some(retired) => retired.down().await,
        // the pool went down while the replacement was coming up
        None => fresh.down().await,
    }
}
