mod migrations;
mod raw_queries;

pub use migrations::migrate_queue;
pub use raw_queries::{connect as connect_raw_query_client, RawQueryClient};

use std::collections::BTreeMap;
use std::sync::Arc;

use diesel::sql_types::{BigInt, Nullable, Text};
use diesel::{sql_query, upsert::excluded, ExpressionMethods, Insertable, QueryDsl, QueryableByName};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{
    pooled_connection::AsyncDieselConnectionManager, AsyncConnection, AsyncPgConnection,
    RunQueryDsl,
};
use ethers::types::Address;
use serde::Deserialize;
use serde_json::Value;

use super::repo::{Repo, RepoError, RepoStats};
use crate::diesels::schema::{kong_evmlogs, kong_outputs, kong_snapshots, kong_withdrawal_queues};
use crate::evmlogs::EvmLog;
use crate::outputs::{self, Output};
use crate::pipeline::{FailedJobSummary, Probe};
use crate::snapshots::Snapshot;
use crate::strides::{self, Stride};
use crate::things::{self, Thing, WithdrawalQueue};
use crate::{ChainId, Hashes};

pub type Conn<'a> = bb8::PooledConnection<'a, AsyncDieselConnectionManager<AsyncPgConnection>>;
pub type Pool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

impl From<diesel::result::Error> for RepoError {
    fn from(error: diesel::result::Error) -> Self {
        RepoError::Unknown(error.to_string())
    }
}

/// Typed writes go through diesel-async over a bb8 pool; migrations, JSON
/// loads and jsonb merges through a raw tokio-postgres client.
#[derive(Clone)]
pub struct PostgresRepo {
    pool: Pool,
    raw_query_client: Arc<RawQueryClient>,
}

impl PostgresRepo {
    pub async fn connect(url: &str) -> Result<Self, RepoError> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(url);
        let pool = bb8::Pool::builder()
            .build(manager)
            .await
            .map_err(|error| RepoError::Unknown(error.to_string()))?;
        let raw_query_client = raw_queries::connect(url).await?;

        Ok(Self {
            pool,
            raw_query_client: Arc::new(raw_query_client),
        })
    }

    pub fn get_pool(&self) -> Pool {
        self.pool.clone()
    }

    pub fn raw_query_client(&self) -> &RawQueryClient {
        &self.raw_query_client
    }

    async fn get_conn(&self) -> Result<Conn<'_>, RepoError> {
        self.pool.get().await.map_err(|_| RepoError::NotConnected)
    }
}

fn chain_id_param(chain_id: ChainId) -> i64 {
    chain_id as i64
}

#[derive(Insertable)]
#[diesel(table_name = kong_outputs)]
struct OutputRow {
    chain_id: i64,
    address: String,
    label: String,
    component: String,
    value: Option<f64>,
    block_number: i64,
    block_time: i64,
    series_time: i64,
}

impl From<&Output> for OutputRow {
    fn from(output: &Output) -> Self {
        Self {
            chain_id: chain_id_param(output.chain_id),
            address: Hashes::h160_to_string(&output.address),
            label: output.label.clone(),
            component: output.component.clone().unwrap_or_default(),
            value: output.value.filter(|value| value.is_finite()),
            block_number: output.block_number as i64,
            block_time: output.block_time as i64,
            series_time: output.series_time as i64,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = kong_evmlogs)]
struct EvmLogRow {
    chain_id: i64,
    address: String,
    event_name: String,
    signature: String,
    args: Value,
    block_number: i64,
    block_hash: String,
    block_time: i64,
    log_index: i64,
    transaction_hash: String,
    transaction_index: i64,
}

impl From<&EvmLog> for EvmLogRow {
    fn from(log: &EvmLog) -> Self {
        Self {
            chain_id: chain_id_param(log.chain_id),
            address: Hashes::h160_to_string(&log.address),
            event_name: log.event_name.clone(),
            signature: Hashes::h256_to_string(&log.signature),
            args: Value::Object(log.args.clone()),
            block_number: log.block_number as i64,
            block_hash: Hashes::h256_to_string(&log.block_hash),
            block_time: log.block_time as i64,
            log_index: log.log_index as i64,
            transaction_hash: Hashes::h256_to_string(&log.transaction_hash),
            transaction_index: log.transaction_index as i64,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = kong_snapshots)]
struct SnapshotRow {
    chain_id: i64,
    address: String,
    block_number: i64,
    block_time: i64,
    snapshot: Value,
    hook: Value,
}

#[derive(Insertable)]
#[diesel(table_name = kong_withdrawal_queues)]
struct WithdrawalQueueRow {
    chain_id: i64,
    vault: String,
    position: i32,
    strategy: String,
    as_of_block: i64,
}

#[derive(QueryableByName)]
struct StrideSetRow {
    #[diesel(sql_type = Text)]
    address: String,
    #[diesel(sql_type = Text)]
    strides: String,
}

#[derive(Deserialize)]
struct QueuedStrategy {
    strategy: Address,
    as_of_block: u64,
}

fn corrupt_strides(error: serde_json::Error) -> diesel::result::Error {
    diesel::result::Error::DeserializationError(Box::new(error))
}

#[async_trait::async_trait]
impl Repo for PostgresRepo {
    async fn migrate(&self) -> Result<(), RepoError> {
        migrations::migrate_repo(&self.raw_query_client).await
    }

    async fn upsert_things(&self, things: &[Thing]) -> Result<(), RepoError> {
        for thing in things::coalesce(things.to_vec()) {
            raw_queries::execute(
                &self.raw_query_client,
                "INSERT INTO kong_things (chain_id, address, label, defaults, as_of_block, as_of_time)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (chain_id, address, label) DO UPDATE SET
                    defaults = kong_things.defaults || EXCLUDED.defaults,
                    as_of_block = EXCLUDED.as_of_block,
                    as_of_time = EXCLUDED.as_of_time,
                    updated_at = NOW()",
                &[
                    &chain_id_param(thing.chain_id),
                    &Hashes::h160_to_string(&thing.address),
                    &thing.label,
                    &Value::Object(thing.defaults.clone()),
                    &(thing.as_of_block as i64),
                    &(thing.as_of_time as i64),
                ],
            )
            .await?;
        }

        Ok(())
    }

    async fn load_things(&self, label: &str, chain_ids: &[ChainId]) -> Result<Vec<Thing>, RepoError> {
        let chain_ids: Vec<i64> = chain_ids.iter().copied().map(chain_id_param).collect();

        raw_queries::load_data_list(
            &self.raw_query_client,
            r#"SELECT chain_id AS "chainId", address, label, defaults,
                as_of_block AS "asOfBlock", as_of_time AS "asOfTime"
            FROM kong_things WHERE label = $1 AND chain_id = ANY($2)
            ORDER BY chain_id, address"#,
            &[&label, &chain_ids],
        )
        .await
    }

    async fn upsert_withdrawal_queue(&self, queue: &WithdrawalQueue) -> Result<(), RepoError> {
        use kong_withdrawal_queues::dsl;

        let chain_id = chain_id_param(queue.chain_id);
        let vault = Hashes::h160_to_string(&queue.vault);
        let rows: Vec<_> = queue
            .strategies
            .iter()
            .enumerate()
            .map(|(position, strategy)| WithdrawalQueueRow {
                chain_id,
                vault: vault.clone(),
                position: position as i32,
                strategy: Hashes::h160_to_string(strategy),
                as_of_block: queue.as_of_block as i64,
            })
            .collect();

        let mut conn = self.get_conn().await?;
        conn.transaction::<(), diesel::result::Error, _>(move |conn| {
            async move {
                diesel::delete(
                    dsl::kong_withdrawal_queues
                        .filter(dsl::chain_id.eq(chain_id))
                        .filter(dsl::vault.eq(vault)),
                )
                .execute(conn)
                .await?;

                if !rows.is_empty() {
                    diesel::insert_into(dsl::kong_withdrawal_queues)
                        .values(&rows)
                        .execute(conn)
                        .await?;
                }

                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        Ok(())
    }

    async fn load_withdrawal_queue(
        &self,
        chain_id: ChainId,
        vault: Address,
    ) -> Result<Option<WithdrawalQueue>, RepoError> {
        let strategies: Vec<QueuedStrategy> = raw_queries::load_data_list(
            &self.raw_query_client,
            "SELECT strategy, as_of_block FROM kong_withdrawal_queues
            WHERE chain_id = $1 AND vault = $2 ORDER BY position",
            &[&chain_id_param(chain_id), &Hashes::h160_to_string(&vault)],
        )
        .await?;

        let Some(as_of_block) = strategies.as_slice().first().map(|s| s.as_of_block) else {
            return Ok(None);
        };

        Ok(Some(WithdrawalQueue {
            chain_id,
            vault,
            strategies: strategies.into_iter().map(|s| s.strategy).collect(),
            as_of_block,
        }))
    }

    async fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<(), RepoError> {
        use kong_snapshots::dsl;

        let row = SnapshotRow {
            chain_id: chain_id_param(snapshot.chain_id),
            address: Hashes::h160_to_string(&snapshot.address),
            block_number: snapshot.block_number as i64,
            block_time: snapshot.block_time as i64,
            snapshot: Value::Object(snapshot.snapshot.clone()),
            hook: Value::Object(snapshot.hook.clone()),
        };

        let mut conn = self.get_conn().await?;
        diesel::insert_into(dsl::kong_snapshots)
            .values(&row)
            .on_conflict((dsl::chain_id, dsl::address))
            .do_update()
            .set((
                dsl::block_number.eq(excluded(dsl::block_number)),
                dsl::block_time.eq(excluded(dsl::block_time)),
                dsl::snapshot.eq(excluded(dsl::snapshot)),
                dsl::hook.eq(excluded(dsl::hook)),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn load_snapshot(
        &self,
        chain_id: ChainId,
        address: Address,
    ) -> Result<Option<Snapshot>, RepoError> {
        raw_queries::load_data(
            &self.raw_query_client,
            r#"SELECT chain_id AS "chainId", address, block_number AS "blockNumber",
                block_time AS "blockTime", snapshot, hook
            FROM kong_snapshots WHERE chain_id = $1 AND address = $2"#,
            &[&chain_id_param(chain_id), &Hashes::h160_to_string(&address)],
        )
        .await
    }

    async fn upsert_outputs(&self, outputs: &[Output]) -> Result<(), RepoError> {
        use kong_outputs::dsl;

        let rows: Vec<OutputRow> = outputs::dedup(outputs.to_vec())
            .iter()
            .map(OutputRow::from)
            .collect();
        if rows.is_empty() {
            return Ok(());
        }

        let mut conn = self.get_conn().await?;
        diesel::insert_into(dsl::kong_outputs)
            .values(&rows)
            .on_conflict((
                dsl::chain_id,
                dsl::address,
                dsl::label,
                dsl::component,
                dsl::series_time,
            ))
            .do_update()
            .set((
                dsl::value.eq(excluded(dsl::value)),
                dsl::block_number.eq(excluded(dsl::block_number)),
                dsl::block_time.eq(excluded(dsl::block_time)),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn load_outputs(
        &self,
        chain_id: ChainId,
        address: Address,
        label: &str,
    ) -> Result<Vec<Output>, RepoError> {
        raw_queries::load_data_list(
            &self.raw_query_client,
            r#"SELECT chain_id AS "chainId", address, label, NULLIF(component, '') AS component,
                value, block_number AS "blockNumber", block_time AS "blockTime",
                series_time AS "seriesTime"
            FROM kong_outputs WHERE chain_id = $1 AND address = $2 AND label = $3
            ORDER BY series_time, component"#,
            &[&chain_id_param(chain_id), &Hashes::h160_to_string(&address), &label],
        )
        .await
    }

    async fn load_latest_series_time(
        &self,
        chain_id: ChainId,
        address: Address,
        label: &str,
    ) -> Result<Option<u64>, RepoError> {
        let row = self
            .raw_query_client
            .query_one(
                "SELECT MAX(series_time) FROM kong_outputs
                WHERE chain_id = $1 AND address = $2 AND label = $3",
                &[&chain_id_param(chain_id), &Hashes::h160_to_string(&address), &label],
            )
            .await?;
        let latest: Option<i64> = row.try_get(0)?;

        Ok(latest.map(|series_time| series_time as u64))
    }

    async fn insert_evmlogs(&self, logs: &[EvmLog]) -> Result<(), RepoError> {
        use kong_evmlogs::dsl;

        if logs.is_empty() {
            return Ok(());
        }
        let rows: Vec<EvmLogRow> = logs.iter().map(EvmLogRow::from).collect();

        let mut conn = self.get_conn().await?;
        diesel::insert_into(dsl::kong_evmlogs)
            .values(&rows)
            .on_conflict((
                dsl::chain_id,
                dsl::address,
                dsl::block_number,
                dsl::log_index,
                dsl::transaction_hash,
            ))
            .do_nothing()
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn load_evmlogs(
        &self,
        chain_id: ChainId,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EvmLog>, RepoError> {
        raw_queries::load_data_list(
            &self.raw_query_client,
            r#"SELECT chain_id AS "chainId", address, event_name AS "eventName", signature, args,
                block_number AS "blockNumber", block_hash AS "blockHash", block_time AS "blockTime",
                log_index AS "logIndex", transaction_hash AS "transactionHash",
                transaction_index AS "transactionIndex"
            FROM kong_evmlogs
            WHERE chain_id = $1 AND address = $2 AND block_number BETWEEN $3 AND $4
            ORDER BY block_number, log_index"#,
            &[
                &chain_id_param(chain_id),
                &Hashes::h160_to_string(&address),
                &(from_block as i64),
                &(to_block as i64),
            ],
        )
        .await
    }

    async fn load_strides(&self, chain_id: ChainId, address: Address) -> Result<Vec<Stride>, RepoError> {
        let rows = self
            .raw_query_client
            .query(
                "SELECT strides FROM kong_strides WHERE chain_id = $1 AND address = $2",
                &[&chain_id_param(chain_id), &Hashes::h160_to_string(&address)],
            )
            .await?;

        match rows.as_slice().first() {
            Some(row) => {
                let json: String = row.try_get(0)?;
                strides::parse(&json).map_err(|error| RepoError::Unknown(error.to_string()))
            }
            None => Ok(vec![]),
        }
    }

    async fn extend_strides(
        &self,
        chain_id: ChainId,
        address: Address,
        stride: Stride,
    ) -> Result<Vec<Stride>, RepoError> {
        let chain_id = chain_id_param(chain_id);
        let address = Hashes::h160_to_string(&address);

        let mut conn = self.get_conn().await?;
        let extended = conn
            .transaction::<Vec<Stride>, diesel::result::Error, _>(move |conn| {
                async move {
                    sql_query(
                        "INSERT INTO kong_strides (chain_id, address, strides) VALUES ($1, $2, '[]')
                        ON CONFLICT (chain_id, address) DO NOTHING",
                    )
                    .bind::<BigInt, _>(chain_id)
                    .bind::<Text, _>(address.clone())
                    .execute(conn)
                    .await?;

                    let row: StrideSetRow = sql_query(
                        "SELECT address, strides FROM kong_strides
                        WHERE chain_id = $1 AND address = $2 FOR UPDATE",
                    )
                    .bind::<BigInt, _>(chain_id)
                    .bind::<Text, _>(address.clone())
                    .get_result(conn)
                    .await?;

                    let current = strides::parse(&row.strides).map_err(corrupt_strides)?;
                    let extended = strides::extend(&current, stride);
                    let json = strides::to_json(&extended).map_err(corrupt_strides)?;

                    sql_query("UPDATE kong_strides SET strides = $3 WHERE chain_id = $1 AND address = $2")
                        .bind::<BigInt, _>(chain_id)
                        .bind::<Text, _>(row.address)
                        .bind::<Text, _>(json)
                        .execute(conn)
                        .await?;

                    Ok(extended)
                }
                .scope_boxed()
            })
            .await?;

        Ok(extended)
    }

    async fn rollback(
        &self,
        chain_id: ChainId,
        block_number: u64,
        address: Option<Address>,
    ) -> Result<u64, RepoError> {
        let chain_id = chain_id_param(chain_id);
        let block_number = block_number as i64;
        let address = address.map(|address| Hashes::h160_to_string(&address));

        let mut conn = self.get_conn().await?;
        let touched = conn
            .transaction::<u64, diesel::result::Error, _>(move |conn| {
                async move {
                    let rows: Vec<StrideSetRow> = sql_query(
                        "SELECT address, strides FROM kong_strides
                        WHERE chain_id = $1 AND ($2::varchar IS NULL OR address = $2)
                        FOR UPDATE",
                    )
                    .bind::<BigInt, _>(chain_id)
                    .bind::<Nullable<Text>, _>(address.clone())
                    .load(conn)
                    .await?;

                    for row in &rows {
                        let current = strides::parse(&row.strides).map_err(corrupt_strides)?;
                        let json = strides::to_json(&strides::rollback(&current, block_number as u64))
                            .map_err(corrupt_strides)?;

                        sql_query("UPDATE kong_strides SET strides = $3 WHERE chain_id = $1 AND address = $2")
                            .bind::<BigInt, _>(chain_id)
                            .bind::<Text, _>(row.address.clone())
                            .bind::<Text, _>(json)
                            .execute(conn)
                            .await?;
                    }

                    sql_query(
                        "DELETE FROM kong_evmlogs
                        WHERE chain_id = $1 AND block_number > $2
                        AND ($3::varchar IS NULL OR address = $3)",
                    )
                    .bind::<BigInt, _>(chain_id)
                    .bind::<BigInt, _>(block_number)
                    .bind::<Nullable<Text>, _>(address)
                    .execute(conn)
                    .await?;

                    Ok(rows.len() as u64)
                }
                .scope_boxed()
            })
            .await?;

        Ok(touched)
    }

    async fn insert_probe(&self, probe: &Probe) -> Result<(), RepoError> {
        let queues = serde_json::to_value(&probe.queues)
            .map_err(|error| RepoError::Unknown(error.to_string()))?;
        let repo = serde_json::to_value(&probe.repo)
            .map_err(|error| RepoError::Unknown(error.to_string()))?;

        raw_queries::execute(
            &self.raw_query_client,
            "INSERT INTO kong_probes (pid, uptime_secs, queues, repo) VALUES ($1, $2, $3, $4)",
            &[&(probe.pid as i64), &(probe.uptime_secs as i64), &queues, &repo],
        )
        .await?;

        Ok(())
    }

    async fn insert_failed_summary(&self, summary: &FailedJobSummary) -> Result<(), RepoError> {
        raw_queries::execute(
            &self.raw_query_client,
            "INSERT INTO kong_failed_summaries (queue, job_name, count, summary) VALUES ($1, $2, $3, $4)",
            &[
                &summary.queue.as_str(),
                &summary.job_name,
                &(summary.count as i64),
                &summary.summary,
            ],
        )
        .await?;

        Ok(())
    }

    async fn stats(&self) -> Result<RepoStats, RepoError> {
        let rows = self
            .raw_query_client
            .query(
                "SELECT 'things', COUNT(*) FROM kong_things
                UNION ALL SELECT 'snapshots', COUNT(*) FROM kong_snapshots
                UNION ALL SELECT 'outputs', COUNT(*) FROM kong_outputs
                UNION ALL SELECT 'evmlogs', COUNT(*) FROM kong_evmlogs
                UNION ALL SELECT 'strides', COUNT(*) FROM kong_strides",
                &[],
            )
            .await?;

        let mut stats = BTreeMap::new();
        for row in rows {
            stats.insert(row.try_get::<_, String>(0)?, row.try_get::<_, i64>(1)?);
        }

        Ok(stats)
    }
}
