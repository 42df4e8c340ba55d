#[cfg(feature = "postgres")]
mod postgres_repo;
mod repo;

#[cfg(feature = "postgres")]
pub use postgres_repo::{
    connect_raw_query_client, migrate_queue, Conn as PostgresRepoConn, Pool as PostgresRepoPool,
    PostgresRepo, RawQueryClient as PostgresRepoRawQueryClient,
};
pub use repo::{Repo, RepoError, RepoStats, SQLikeMigrations};
