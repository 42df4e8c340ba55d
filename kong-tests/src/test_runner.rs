use std::env;
use std::future::Future;

use dotenvy::dotenv;
use kong::{ChainId, PostgresRepo, Repo};
use rand::Rng;

use crate::db;

/// Hands `test_fn` a migrated repo on the test database. Tests share the
/// database, so each should scope its rows with [`unique_chain_id`].
pub async fn run_test<TestFn, Fut>(test_fn: TestFn)
where
    TestFn: FnOnce(PostgresRepo) -> Fut,
    Fut: Future<Output = ()>,
{
    if should_setup_test_db() {
        db::setup();
    }

    let repo = PostgresRepo::connect(&db::database_url()).await.unwrap();
    repo.migrate().await.unwrap();

    test_fn(repo).await;
}

pub fn unique_chain_id() -> ChainId {
    rand::thread_rng().gen_range(1_000_000..u32::MAX as u64)
}

fn should_setup_test_db() -> bool {
    dotenv().ok();

    env::var("SETUP_TEST_DB").is_ok()
}
