use std::collections::HashMap;

use ethers::types::{Address, H256};
use kong::evmlogs::EvmLog;
use kong::outputs::Output;
use kong::pipeline::{FailedJobSummary, Probe};
use kong::repos::RepoStats;
use kong::snapshots::Snapshot;
use kong::strides::{self, Stride};
use kong::things::{Thing, WithdrawalQueue};
use kong::{ChainId, Repo, RepoError};
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    things: Vec<Thing>,
    withdrawal_queues: HashMap<(ChainId, Address), WithdrawalQueue>,
    snapshots: HashMap<(ChainId, Address), Snapshot>,
    outputs: Vec<Output>,
    evmlogs: Vec<EvmLog>,
    strides: HashMap<(ChainId, Address), Vec<Stride>>,
    probes: Vec<Probe>,
    failed_summaries: Vec<FailedJobSummary>,
}

/// Keeps every table in memory with the same upsert rules as the database
#[derive(Default)]
pub struct MemoryRepo {
    tables: Mutex<Tables>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn things(&self) -> Vec<Thing> {
        self.tables.lock().await.things.clone()
    }

    pub async fn outputs(&self) -> Vec<Output> {
        self.tables.lock().await.outputs.clone()
    }

    pub async fn evmlogs(&self) -> Vec<EvmLog> {
        self.tables.lock().await.evmlogs.clone()
    }

    pub async fn probes(&self) -> Vec<Probe> {
        self.tables.lock().await.probes.clone()
    }

    pub async fn failed_summaries(&self) -> Vec<FailedJobSummary> {
        self.tables.lock().await.failed_summaries.clone()
    }
}

fn evmlog_key(log: &EvmLog) -> (ChainId, Address, u64, u64, H256) {
    (
        log.chain_id,
        log.address,
        log.block_number,
        log.log_index,
        log.transaction_hash,
    )
}

#[async_trait::async_trait]
impl Repo for MemoryRepo {
    async fn migrate(&self) -> Result<(), RepoError> {
        Ok(())
    }

    async fn upsert_things(&self, things: &[Thing]) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;

        for thing in things {
            match tables.things.iter_mut().find(|t| t.key() == thing.key()) {
                Some(existing) => existing.merge(thing.clone()),
                None => tables.things.push(thing.clone()),
            }
        }

        Ok(())
    }

    async fn load_things(&self, label: &str, chain_ids: &[ChainId]) -> Result<Vec<Thing>, RepoError> {
        Ok(self
            .tables
            .lock()
            .await
            .things
            .iter()
            .filter(|thing| thing.label == label && chain_ids.contains(&thing.chain_id))
            .cloned()
            .collect())
    }

    async fn upsert_withdrawal_queue(&self, queue: &WithdrawalQueue) -> Result<(), RepoError> {
        self.tables
            .lock()
            .await
            .withdrawal_queues
            .insert((queue.chain_id, queue.vault), queue.clone());

        Ok(())
    }

    async fn load_withdrawal_queue(
        &self,
        chain_id: ChainId,
        vault: Address,
    ) -> Result<Option<WithdrawalQueue>, RepoError> {
        Ok(self
            .tables
            .lock()
            .await
            .withdrawal_queues
            .get(&(chain_id, vault))
            .cloned())
    }

    async fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<(), RepoError> {
        self.tables
            .lock()
            .await
            .snapshots
            .insert((snapshot.chain_id, snapshot.address), snapshot.clone());

        Ok(())
    }

    async fn load_snapshot(
        &self,
        chain_id: ChainId,
        address: Address,
    ) -> Result<Option<Snapshot>, RepoError> {
        Ok(self.tables.lock().await.snapshots.get(&(chain_id, address)).cloned())
    }

    async fn upsert_outputs(&self, outputs: &[Output]) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;

        for output in outputs {
            match tables.outputs.iter_mut().find(|o| o.key() == output.key()) {
                Some(existing) => *existing = output.clone(),
                None => tables.outputs.push(output.clone()),
            }
        }

        Ok(())
    }

    async fn load_outputs(
        &self,
        chain_id: ChainId,
        address: Address,
        label: &str,
    ) -> Result<Vec<Output>, RepoError> {
        let mut outputs: Vec<Output> = self
            .tables
            .lock()
            .await
            .outputs
            .iter()
            .filter(|o| o.chain_id == chain_id && o.address == address && o.label == label)
            .cloned()
            .collect();
        outputs.sort_by_key(|output| output.series_time);

        Ok(outputs)
    }

    async fn load_latest_series_time(
        &self,
        chain_id: ChainId,
        address: Address,
        label: &str,
    ) -> Result<Option<u64>, RepoError> {
        Ok(self
            .load_outputs(chain_id, address, label)
            .await?
            .iter()
            .map(|output| output.series_time)
            .max())
    }

    async fn insert_evmlogs(&self, logs: &[EvmLog]) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;

        for log in logs {
            if !tables.evmlogs.iter().any(|l| evmlog_key(l) == evmlog_key(log)) {
                tables.evmlogs.push(log.clone());
            }
        }

        Ok(())
    }

    async fn load_evmlogs(
        &self,
        chain_id: ChainId,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EvmLog>, RepoError> {
        Ok(self
            .tables
            .lock()
            .await
            .evmlogs
            .iter()
            .filter(|log| {
                log.chain_id == chain_id
                    && log.address == address
                    && (from_block..=to_block).contains(&log.block_number)
            })
            .cloned()
            .collect())
    }

    async fn load_strides(&self, chain_id: ChainId, address: Address) -> Result<Vec<Stride>, RepoError> {
        Ok(self
            .tables
            .lock()
            .await
            .strides
            .get(&(chain_id, address))
            .cloned()
            .unwrap_or_default())
    }

    async fn extend_strides(
        &self,
        chain_id: ChainId,
        address: Address,
        stride: Stride,
    ) -> Result<Vec<Stride>, RepoError> {
        let mut tables = self.tables.lock().await;
        let current = tables.strides.entry((chain_id, address)).or_default();
        *current = strides::extend(current, stride);

        Ok(current.clone())
    }

    async fn rollback(
        &self,
        chain_id: ChainId,
        block_number: u64,
        address: Option<Address>,
    ) -> Result<u64, RepoError> {
        let mut tables = self.tables.lock().await;
        let in_scope = |c: ChainId, a: Address| c == chain_id && address.map_or(true, |x| x == a);

        let mut touched = 0;
        for ((c, a), set) in tables.strides.iter_mut() {
            if in_scope(*c, *a) {
                *set = strides::rollback(set, block_number);
                touched += 1;
            }
        }

        tables
            .evmlogs
            .retain(|log| !(in_scope(log.chain_id, log.address) && log.block_number > block_number));

        Ok(touched)
    }

    async fn insert_probe(&self, probe: &Probe) -> Result<(), RepoError> {
        self.tables.lock().await.probes.push(probe.clone());

        Ok(())
    }

    async fn insert_failed_summary(&self, summary: &FailedJobSummary) -> Result<(), RepoError> {
        self.tables.lock().await.failed_summaries.push(summary.clone());

        Ok(())
    }

    async fn stats(&self) -> Result<RepoStats, RepoError> {
        let tables = self.tables.lock().await;

        Ok(RepoStats::from([
            ("things".to_string(), tables.things.len() as i64),
            ("outputs".to_string(), tables.outputs.len() as i64),
            ("evmlogs".to_string(), tables.evmlogs.len() as i64),
            ("snapshots".to_string(), tables.snapshots.len() as i64),
        ]))
    }
}
