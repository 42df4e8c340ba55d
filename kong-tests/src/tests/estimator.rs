#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kong::height::estimate_height;

    use crate::factory::{
        mainnet, mainnet_block_time, test_config, MockConnector, MockProvider, TestKit, MAINNET,
        MAINNET_TRUTH_BLOCK, MAINNET_TRUTH_TIME,
    };

    #[tokio::test]
    pub async fn estimates_a_known_mainnet_block() {
        let provider = MockProvider::new(MAINNET_TRUTH_BLOCK + 5_000);

        let estimate = estimate_height(&provider, &mainnet(), MAINNET_TRUTH_TIME).await.unwrap();

        assert!(
            (MAINNET_TRUTH_BLOCK - 2..=MAINNET_TRUTH_BLOCK + 2).contains(&estimate),
            "estimated {estimate}"
        );
    }

    #[tokio::test]
    pub async fn estimates_through_the_context() {
        let provider = Arc::new(MockProvider::new(MAINNET_TRUTH_BLOCK + 5_000));
        let kit = TestKit::new(test_config(), MockConnector::new().with(MAINNET, provider)).await;

        let estimate = kit.ctx.estimate_height(MAINNET, MAINNET_TRUTH_TIME).await.unwrap();

        assert!((MAINNET_TRUTH_BLOCK - 2..=MAINNET_TRUTH_BLOCK + 2).contains(&estimate));
    }

    #[tokio::test]
    pub async fn answers_the_head_for_future_targets() {
        let head = MAINNET_TRUTH_BLOCK + 5_000;
        let provider = MockProvider::new(head);

        let estimate = estimate_height(&provider, &mainnet(), mainnet_block_time(head) + 3_600)
            .await
            .unwrap();

        assert_eq!(estimate, head);
    }

    #[tokio::test]
    pub async fn never_reaches_below_genesis() {
        let provider = MockProvider::new(MAINNET_TRUTH_BLOCK);
        let chain = mainnet().with_genesis_block(1_000);

        let estimate = estimate_height(&provider, &chain, 0).await.unwrap();

        assert_eq!(estimate, 1_000);
    }

    #[tokio::test]
    pub async fn rejects_unconfigured_chains() {
        let provider = Arc::new(MockProvider::new(MAINNET_TRUTH_BLOCK));
        let kit = TestKit::new(test_config(), MockConnector::new().with(MAINNET, provider)).await;

        assert!(kit.ctx.estimate_height(10, MAINNET_TRUTH_TIME).await.is_err());
    }
}
