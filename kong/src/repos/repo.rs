use std::collections::BTreeMap;

use derive_more::Display;
use ethers::types::Address;

use crate::evmlogs::EvmLog;
use crate::outputs::Output;
use crate::pipeline::{FailedJobSummary, Probe};
use crate::snapshots::Snapshot;
use crate::strides::Stride;
use crate::things::{Thing, WithdrawalQueue};
use crate::ChainId;

#[derive(Debug, Display, Clone, PartialEq)]
pub enum RepoError {
    #[display("repo not connected")]
    NotConnected,
    #[display("{_0}")]
    Unknown(String),
}

impl std::error::Error for RepoError {}

/// Row counts per table
pub type RepoStats = BTreeMap<String, i64>;

/// Everything the pipeline persists. Writes are idempotent upserts so a
/// retried job can write again.
#[async_trait::async_trait]
pub trait Repo: Sync + Send {
    async fn migrate(&self) -> Result<(), RepoError>;

    /// Merges defaults key by key into existing things
    async fn upsert_things(&self, things: &[Thing]) -> Result<(), RepoError>;
    async fn load_things(&self, label: &str, chain_ids: &[ChainId]) -> Result<Vec<Thing>, RepoError>;

    /// Replaces the vault's whole queue
    async fn upsert_withdrawal_queue(&self, queue: &WithdrawalQueue) -> Result<(), RepoError>;
    async fn load_withdrawal_queue(
        &self,
        chain_id: ChainId,
        vault: Address,
    ) -> Result<Option<WithdrawalQueue>, RepoError>;

    async fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<(), RepoError>;
    async fn load_snapshot(
        &self,
        chain_id: ChainId,
        address: Address,
    ) -> Result<Option<Snapshot>, RepoError>;

    async fn upsert_outputs(&self, outputs: &[Output]) -> Result<(), RepoError>;
    async fn load_outputs(
        &self,
        chain_id: ChainId,
        address: Address,
        label: &str,
    ) -> Result<Vec<Output>, RepoError>;
    async fn load_latest_series_time(
        &self,
        chain_id: ChainId,
        address: Address,
        label: &str,
    ) -> Result<Option<u64>, RepoError>;

    /// Ignores logs already stored
    async fn insert_evmlogs(&self, logs: &[EvmLog]) -> Result<(), RepoError>;
    async fn load_evmlogs(
        &self,
        chain_id: ChainId,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EvmLog>, RepoError>;

    async fn load_strides(&self, chain_id: ChainId, address: Address) -> Result<Vec<Stride>, RepoError>;
    /// Merges `stride` into the persisted set, atomically with respect to
    /// concurrent extensions, and returns the new set
    async fn extend_strides(
        &self,
        chain_id: ChainId,
        address: Address,
        stride: Stride,
    ) -> Result<Vec<Stride>, RepoError>;

    /// Forgets everything above `block_number` on a chain, or for one address
    /// of it: strides are truncated and stored logs deleted. Returns the
    /// number of stride sets touched.
    async fn rollback(
        &self,
        chain_id: ChainId,
        block_number: u64,
        address: Option<Address>,
    ) -> Result<u64, RepoError>;

    async fn insert_probe(&self, probe: &Probe) -> Result<(), RepoError>;
    async fn insert_failed_summary(&self, summary: &FailedJobSummary) -> Result<(), RepoError>;
    async fn stats(&self) -> Result<RepoStats, RepoError>;
}

pub struct SQLikeMigrations;

impl SQLikeMigrations {
    pub fn create_things() -> &'static [&'static str] {
        &[
            "CREATE TABLE IF NOT EXISTS kong_things (
                chain_id BIGINT NOT NULL,
                address VARCHAR NOT NULL,
                label VARCHAR NOT NULL,
                defaults JSONB NOT NULL DEFAULT '{}'::jsonb,
                as_of_block BIGINT NOT NULL,
                as_of_time BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (chain_id, address, label)
            )",
            "CREATE INDEX IF NOT EXISTS kong_things_label_chain_index
            ON kong_things(label, chain_id)",
        ]
    }

    pub fn create_withdrawal_queues() -> &'static [&'static str] {
        &["CREATE TABLE IF NOT EXISTS kong_withdrawal_queues (
                chain_id BIGINT NOT NULL,
                vault VARCHAR NOT NULL,
                position INTEGER NOT NULL,
                strategy VARCHAR NOT NULL,
                as_of_block BIGINT NOT NULL,
                PRIMARY KEY (chain_id, vault, position)
            )"]
    }

    pub fn create_snapshots() -> &'static [&'static str] {
        &["CREATE TABLE IF NOT EXISTS kong_snapshots (
                chain_id BIGINT NOT NULL,
                address VARCHAR NOT NULL,
                block_number BIGINT NOT NULL,
                block_time BIGINT NOT NULL,
                snapshot JSONB NOT NULL,
                hook JSONB NOT NULL,
                PRIMARY KEY (chain_id, address)
            )"]
    }

    pub fn create_outputs() -> &'static [&'static str] {
        &[
            "CREATE TABLE IF NOT EXISTS kong_outputs (
                chain_id BIGINT NOT NULL,
                address VARCHAR NOT NULL,
                label VARCHAR NOT NULL,
                component VARCHAR NOT NULL DEFAULT '',
                value DOUBLE PRECISION,
                block_number BIGINT NOT NULL,
                block_time BIGINT NOT NULL,
                series_time BIGINT NOT NULL,
                PRIMARY KEY (chain_id, address, label, component, series_time)
            )",
            "CREATE INDEX IF NOT EXISTS kong_outputs_series_index
            ON kong_outputs(chain_id, address, label, series_time)",
        ]
    }

    pub fn create_evmlogs() -> &'static [&'static str] {
        &[
            "CREATE TABLE IF NOT EXISTS kong_evmlogs (
                chain_id BIGINT NOT NULL,
                address VARCHAR NOT NULL,
                event_name VARCHAR NOT NULL,
                signature VARCHAR NOT NULL,
                args JSONB NOT NULL,
                block_number BIGINT NOT NULL,
                block_hash VARCHAR NOT NULL,
                block_time BIGINT NOT NULL,
                log_index BIGINT NOT NULL,
                transaction_hash VARCHAR NOT NULL,
                transaction_index BIGINT NOT NULL,
                inserted_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (chain_id, address, block_number, log_index, transaction_hash)
            )",
            "CREATE INDEX IF NOT EXISTS kong_evmlogs_chain_block_index
            ON kong_evmlogs(chain_id, block_number)",
        ]
    }

    pub fn create_strides() -> &'static [&'static str] {
        &["CREATE TABLE IF NOT EXISTS kong_strides (
                chain_id BIGINT NOT NULL,
                address VARCHAR NOT NULL,
                strides TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (chain_id, address)
            )"]
    }

    pub fn create_probes() -> &'static [&'static str] {
        &["CREATE TABLE IF NOT EXISTS kong_probes (
                id BIGSERIAL PRIMARY KEY,
                pid BIGINT NOT NULL,
                uptime_secs BIGINT NOT NULL,
                queues JSONB NOT NULL,
                repo JSONB NOT NULL,
                inserted_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"]
    }

    pub fn create_failed_summaries() -> &'static [&'static str] {
        &["CREATE TABLE IF NOT EXISTS kong_failed_summaries (
                id BIGSERIAL PRIMARY KEY,
                queue VARCHAR NOT NULL,
                job_name VARCHAR NOT NULL,
                count BIGINT NOT NULL,
                summary TEXT NOT NULL,
                inserted_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"]
    }

    pub fn create_jobs() -> &'static [&'static str] {
        &[
            "CREATE TABLE IF NOT EXISTS kong_jobs (
                id uuid PRIMARY KEY,
                queue VARCHAR NOT NULL,
                name VARCHAR NOT NULL,
                payload JSONB NOT NULL,
                status VARCHAR NOT NULL DEFAULT 'waiting',
                attempts INTEGER NOT NULL DEFAULT 0,
                run_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                locked_until TIMESTAMPTZ,
                reason TEXT,
                inserted_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            "CREATE INDEX IF NOT EXISTS kong_jobs_queue_status_run_at_index
            ON kong_jobs(queue, status, run_at)",
        ]
    }

    pub fn all() -> Vec<&'static str> {
        [
            Self::create_things(),
            Self::create_withdrawal_queues(),
            Self::create_snapshots(),
            Self::create_outputs(),
            Self::create_evmlogs(),
            Self::create_strides(),
            Self::create_probes(),
            Self::create_failed_summaries(),
        ]
        .concat()
    }
}
