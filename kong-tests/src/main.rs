use kong::{PostgresQueue, PostgresRepo, Repo};
use kong_tests::db;

/// Creates the test database and its tables so `#[ignore]`d tests can run
#[tokio::main]
async fn main() {
    db::setup();

    let database_url = db::database_url();

    let repo = PostgresRepo::connect(&database_url).await.unwrap();
    repo.migrate().await.unwrap();

    let queue = PostgresQueue::connect(&database_url).await.unwrap();
    queue.migrate().await.unwrap();
}
