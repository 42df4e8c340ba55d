use super::raw_queries::{self, RawQueryClient};
use crate::repos::{RepoError, SQLikeMigrations};

/// Runs each statement in order; every statement is `IF NOT EXISTS`
pub async fn migrate(
    client: &RawQueryClient,
    migrations: Vec<impl AsRef<str> + Send + Sync>,
) -> Result<(), RepoError> {
    for migration in migrations {
        raw_queries::execute(client, migration.as_ref(), &[]).await?;
    }

    Ok(())
}

pub async fn migrate_repo(client: &RawQueryClient) -> Result<(), RepoError> {
    migrate(client, SQLikeMigrations::all()).await
}

pub async fn migrate_queue(client: &RawQueryClient) -> Result<(), RepoError> {
    migrate(client, SQLikeMigrations::create_jobs().to_vec()).await
}
