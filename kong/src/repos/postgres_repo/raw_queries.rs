use serde::de::DeserializeOwned;
use tokio_postgres::{types::ToSql, Client, NoTls};
use tracing::error;

use crate::repos::RepoError;

pub type RawQueryClient = Client;
pub type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

impl From<tokio_postgres::Error> for RepoError {
    fn from(error: tokio_postgres::Error) -> Self {
        if error.is_closed() {
            RepoError::NotConnected
        } else {
            RepoError::Unknown(error.to_string())
        }
    }
}

pub async fn connect(url: &str) -> Result<RawQueryClient, RepoError> {
    let (client, conn) = tokio_postgres::connect(url, NoTls).await?;

    tokio::spawn(async move {
        if let Err(error) = conn.await {
            error!(%error, "Postgres connection error");
        }
    });

    Ok(client)
}

pub async fn execute(client: &RawQueryClient, query: &str, params: Params<'_>) -> Result<u64, RepoError> {
    Ok(client.execute(query, params).await?)
}

pub async fn load_data<Data: DeserializeOwned>(
    client: &RawQueryClient,
    query: &str,
    params: Params<'_>,
) -> Result<Option<Data>, RepoError> {
    let mut data_list: Vec<Data> = load_data_list(client, query, params).await?;

    if data_list.len() > 1 {
        return Err(RepoError::Unknown(format!(
            "expected at most one row, got {}",
            data_list.len()
        )));
    }

    Ok(data_list.pop())
}

/// Loads rows as JSON objects keyed by column name (or alias)
pub async fn load_data_list<Data: DeserializeOwned>(
    client: &RawQueryClient,
    query: &str,
    params: Params<'_>,
) -> Result<Vec<Data>, RepoError> {
    let json_aggregate = get_json_aggregate(client, query, params).await?;

    if json_aggregate.is_array() {
        serde_json::from_value(json_aggregate).map_err(|error| RepoError::Unknown(error.to_string()))
    } else {
        Ok(vec![])
    }
}

async fn get_json_aggregate(
    client: &RawQueryClient,
    query: &str,
    params: Params<'_>,
) -> Result<serde_json::Value, RepoError> {
    let row = client.query_one(json_aggregate_query(query).as_str(), params).await?;

    Ok(row.try_get(0)?)
}

fn json_aggregate_query(query: &str) -> String {
    format!("WITH result AS ({query}) SELECT COALESCE(json_agg(result), '[]'::json) FROM result")
}
