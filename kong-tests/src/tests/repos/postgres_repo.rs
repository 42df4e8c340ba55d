#[cfg(test)]
mod things {
    use ethers::types::Address;
    use kong::things::{Thing, WithdrawalQueue, VAULT_LABEL};
    use kong::Repo;
    use serde_json::json;

    use crate::test_runner::{self, unique_chain_id};

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    pub async fn merges_defaults_on_upsert() {
        test_runner::run_test(|repo| async move {
            let chain_id = unique_chain_id();
            let address = Address::repeat_byte(0x01);

            repo.upsert_things(&[Thing::new(chain_id, address, VAULT_LABEL)
                .with_default("name", "yvDAI")
                .with_default("inceptBlock", 100)
                .as_of(100, 1_000)])
                .await
                .unwrap();
            repo.upsert_things(&[Thing::new(chain_id, address, VAULT_LABEL)
                .with_default("name", "yvDAI 2")
                .as_of(200, 2_000)])
                .await
                .unwrap();

            let things = repo.load_things(VAULT_LABEL, &[chain_id]).await.unwrap();

            assert_eq!(things.len(), 1);
            assert_eq!(things[0].defaults["name"], json!("yvDAI 2"));
            assert_eq!(things[0].incept_block(), Some(100));
            assert_eq!(things[0].as_of_block, 200);
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    pub async fn replaces_withdrawal_queues() {
        test_runner::run_test(|repo| async move {
            let chain_id = unique_chain_id();
            let vault = Address::repeat_byte(0x05);

            assert_eq!(repo.load_withdrawal_queue(chain_id, vault).await.unwrap(), None);

            let first = WithdrawalQueue {
                chain_id,
                vault,
                strategies: vec![Address::repeat_byte(0x11), Address::repeat_byte(0x12)],
                as_of_block: 100,
            };
            repo.upsert_withdrawal_queue(&first).await.unwrap();
            let second = WithdrawalQueue {
                strategies: vec![Address::repeat_byte(0x13)],
                as_of_block: 200,
                ..first
            };
            repo.upsert_withdrawal_queue(&second).await.unwrap();

            assert_eq!(
                repo.load_withdrawal_queue(chain_id, vault).await.unwrap(),
                Some(second)
            );
        })
        .await;
    }
}

#[cfg(test)]
mod outputs {
    use ethers::types::Address;
    use kong::outputs::Output;
    use kong::Repo;

    use crate::test_runner::{self, unique_chain_id};

    fn output(chain_id: u64, series_time: u64, value: f64) -> Output {
        Output {
            chain_id,
            address: Address::repeat_byte(0x02),
            label: "tvl".to_string(),
            component: Some("totalAssets".to_string()),
            value: Some(value),
            block_number: 19_000_000,
            block_time: series_time + 10,
            series_time,
        }
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    pub async fn overwrites_points_sharing_a_key() {
        test_runner::run_test(|repo| async move {
            let chain_id = unique_chain_id();

            repo.upsert_outputs(&[output(chain_id, 86_400, 1.0), output(chain_id, 172_800, 2.0)])
                .await
                .unwrap();
            repo.upsert_outputs(&[output(chain_id, 86_400, 3.0)]).await.unwrap();

            let outputs = repo
                .load_outputs(chain_id, Address::repeat_byte(0x02), "tvl")
                .await
                .unwrap();

            assert_eq!(outputs.len(), 2);
            assert_eq!(outputs[0].value, Some(3.0));
            assert_eq!(
                repo.load_latest_series_time(chain_id, Address::repeat_byte(0x02), "tvl")
                    .await
                    .unwrap(),
                Some(172_800)
            );
        })
        .await;
    }
}

#[cfg(test)]
mod strides {
    use ethers::types::Address;
    use kong::strides::Stride;
    use kong::Repo;

    use crate::test_runner::{self, unique_chain_id};

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    pub async fn merges_concurrent_extensions() {
        test_runner::run_test(|repo| async move {
            let chain_id = unique_chain_id();
            let address = Address::repeat_byte(0x03);

            let extensions = (0..10u64).map(|n| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.extend_strides(chain_id, address, Stride::new(n * 100, n * 100 + 99))
                        .await
                        .unwrap()
                })
            });
            for extension in extensions.collect::<Vec<_>>() {
                extension.await.unwrap();
            }

            assert_eq!(
                repo.load_strides(chain_id, address).await.unwrap(),
                vec![Stride::new(0, 999)]
            );
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    pub async fn rolls_back_above_a_block() {
        test_runner::run_test(|repo| async move {
            let chain_id = unique_chain_id();
            let address = Address::repeat_byte(0x04);
            repo.extend_strides(chain_id, address, Stride::new(100, 500)).await.unwrap();
            repo.extend_strides(chain_id, address, Stride::new(800, 900)).await.unwrap();

            let touched = repo.rollback(chain_id, 300, Some(address)).await.unwrap();

            assert_eq!(touched, 1);
            assert_eq!(
                repo.load_strides(chain_id, address).await.unwrap(),
                vec![Stride::new(100, 300)]
            );
        })
        .await;
    }
}

#[cfg(test)]
mod queue {
    use std::time::Duration;

    use ethers::types::Address;
    use kong::jobs::{Job, QueueName, VaultTarget};
    use kong::{PostgresQueue, Queue};

    use crate::db;
    use crate::test_runner::unique_chain_id;

    async fn queue() -> PostgresQueue {
        let queue = PostgresQueue::connect(&db::database_url()).await.unwrap();
        queue.migrate().await.unwrap();

        queue
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    pub async fn parks_jobs_after_failing() {
        let queue = queue().await;
        let job = Job::ExtractVault(VaultTarget {
            chain_id: unique_chain_id(),
            address: Address::repeat_byte(0x05),
        });
        let id = queue.add(job.clone(), Duration::ZERO).await.unwrap();

        let mut claimed = None;
        while let Some(queued) = queue.take(QueueName::Extract).await.unwrap() {
            if queued.id == id {
                claimed = Some(queued);
                break;
            }
            queue.retry(queued.id, Duration::from_secs(60), "not this test").await.unwrap();
        }
        let claimed = claimed.unwrap();
        assert_eq!(claimed.job, job);
        assert_eq!(claimed.attempts, 1);

        queue.fail(id, "schema violation: nope").await.unwrap();

        let failed = queue.failed(10_000).await.unwrap();
        let parked = failed.iter().find(|failed| failed.id == id).unwrap();
        assert_eq!(parked.name, "extract.vault");
        assert_eq!(parked.reason, "schema violation: nope");

        queue.remove_failed(&[id]).await.unwrap();
        assert!(queue.failed(10_000).await.unwrap().iter().all(|failed| failed.id != id));
    }
}
