#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ethers::abi::parse_abi;
    use ethers::types::Address;
    use kong::decoders::{AbiDecoder, Decoder};
    use kong::jobs::{EvmLogsTarget, Job};
    use kong::pipeline;
    use kong::sources::DiscoveryRule;
    use kong::strides::Stride;
    use kong::{QueueName, Repo};
    use serde_json::json;

    use crate::factory::{
        mainnet_block_time, test_config, transfer_log, transfer_recipient, MockConnector,
        MockProvider, TestKit, BAYC_CONTRACT_ADDRESS, MAINNET,
    };

    const HEAD: u64 = 18_200_000;
    const LOG_BLOCK: u64 = 18_115_958;
    const NFT_ABI: &str = "erc721";

    fn bayc() -> Address {
        BAYC_CONTRACT_ADDRESS.parse().unwrap()
    }

    fn nft_decoder() -> Arc<AbiDecoder> {
        let abi = parse_abi(&[
            "event Transfer(address indexed from, address indexed to, uint256 indexed tokenId)",
        ])
        .unwrap();

        Arc::new(AbiDecoder::new(NFT_ABI, abi).with_discovery(vec![DiscoveryRule {
            event: "Transfer".to_string(),
            arg: "to".to_string(),
            label: "holder".to_string(),
        }]))
    }

    fn extract(from: u64, to: u64) -> Job {
        Job::ExtractEvmLogs(EvmLogsTarget {
            chain_id: MAINNET,
            address: bayc(),
            events: nft_decoder().events(),
            from,
            to,
            handler: NFT_ABI.to_string(),
        })
    }

    async fn kit() -> (TestKit, Arc<MockProvider>) {
        let provider = Arc::new(
            MockProvider::new(HEAD).with_logs(vec![transfer_log(BAYC_CONTRACT_ADDRESS, LOG_BLOCK)]),
        );
        let kit = TestKit::with(
            test_config(),
            MockConnector::new().with(MAINNET, provider.clone()),
            |ctx| ctx.with_decoder(nft_decoder()),
        )
        .await;

        (kit, provider)
    }

    #[tokio::test]
    pub async fn extracts_decodes_and_loads_a_stride() {
        let (kit, provider) = kit().await;

        pipeline::process(&kit.ctx, extract(18_110_000, 18_119_999)).await.unwrap();

        assert_eq!(provider.filters().len(), 1);
        assert_eq!(kit.queue.waiting_named("load.evmlog").await.len(), 1);
        assert_eq!(kit.queue.waiting_named("load.thing").await.len(), 1);
        assert_eq!(
            kit.repo.load_strides(MAINNET, bayc()).await.unwrap(),
            vec![Stride::new(18_110_000, 18_119_999)]
        );

        kit.drain_queue(QueueName::Load).await;

        let logs = kit.repo.evmlogs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event_name, "Transfer");
        assert_eq!(logs[0].block_number, LOG_BLOCK);
        assert_eq!(logs[0].block_time, mainnet_block_time(LOG_BLOCK));
        assert_eq!(logs[0].args["tokenId"], json!("1661"));

        let holders = kit.repo.load_things("holder", &[MAINNET]).await.unwrap();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].address, transfer_recipient());
        assert_eq!(holders[0].incept_block(), Some(LOG_BLOCK));
    }

    #[tokio::test]
    pub async fn covers_empty_strides_too() {
        let (kit, _provider) = kit().await;

        pipeline::process(&kit.ctx, extract(18_000_000, 18_009_999)).await.unwrap();

        assert!(kit.queue.waiting().await.is_empty());
        assert_eq!(
            kit.repo.load_strides(MAINNET, bayc()).await.unwrap(),
            vec![Stride::new(18_000_000, 18_009_999)]
        );
    }

    #[tokio::test]
    pub async fn merges_strides_completed_out_of_order() {
        let (kit, _provider) = kit().await;

        pipeline::process(&kit.ctx, extract(18_120_000, 18_129_999)).await.unwrap();
        pipeline::process(&kit.ctx, extract(18_100_000, 18_109_999)).await.unwrap();
        pipeline::process(&kit.ctx, extract(18_110_000, 18_119_999)).await.unwrap();

        assert_eq!(
            kit.repo.load_strides(MAINNET, bayc()).await.unwrap(),
            vec![Stride::new(18_100_000, 18_129_999)]
        );
    }

    #[tokio::test]
    pub async fn stores_a_log_once_when_its_stride_is_extracted_twice() {
        let (kit, _provider) = kit().await;

        pipeline::process(&kit.ctx, extract(18_110_000, 18_119_999)).await.unwrap();
        pipeline::process(&kit.ctx, extract(18_110_000, 18_119_999)).await.unwrap();
        kit.drain().await;

        assert_eq!(kit.repo.evmlogs().await.len(), 1);
        assert_eq!(
            kit.repo.load_strides(MAINNET, bayc()).await.unwrap(),
            vec![Stride::new(18_110_000, 18_119_999)]
        );
    }

    #[tokio::test]
    pub async fn rolls_back_above_a_block() {
        let (kit, _provider) = kit().await;
        pipeline::process(&kit.ctx, extract(18_110_000, 18_119_999)).await.unwrap();
        kit.drain().await;

        let touched = kit.repo.rollback(MAINNET, 18_115_000, None).await.unwrap();

        assert_eq!(touched, 1);
        assert_eq!(
            kit.repo.load_strides(MAINNET, bayc()).await.unwrap(),
            vec![Stride::new(18_110_000, 18_115_000)]
        );
        assert!(kit.repo.evmlogs().await.is_empty());
    }

    #[tokio::test]
    pub async fn fails_strides_without_a_decoder() {
        let (kit, _provider) = kit().await;
        let job = Job::ExtractEvmLogs(EvmLogsTarget {
            chain_id: MAINNET,
            address: bayc(),
            events: vec![],
            from: 1,
            to: 2,
            handler: "unknown".to_string(),
        });

        let error = pipeline::process(&kit.ctx, job).await.unwrap_err();

        assert!(!error.is_retryable());
    }
}
