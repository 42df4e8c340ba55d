use std::collections::HashMap;

use serde::Deserialize;

use super::{Config, ConfigError};
use crate::jobs::QueueName;
use crate::sources::AbiConfig;
use crate::webhooks::Subscription;
use crate::Chain;

/// The shape of `kong.toml`. Every tunable is optional and falls back to
/// [`Config::new`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub chains: Vec<Chain>,
    #[serde(default)]
    pub abis: Vec<AbiConfig>,
    #[serde(default)]
    pub webhooks: Vec<Subscription>,
    pub log_stride: Option<u64>,
    pub connections_per_chain: Option<usize>,
    pub recycle_interval_ms: Option<u64>,
    pub fanout_interval_ms: Option<u64>,
    pub probe_interval_ms: Option<u64>,
    pub monitor_interval_ms: Option<u64>,
    pub submission_delay_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub timeseries_window_days: Option<u64>,
    pub max_attempts: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    #[serde(default)]
    pub concurrency: HashMap<String, usize>,
}

impl ConfigFile {
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let defaults = Config::new();

        let mut concurrency = HashMap::new();
        for (queue, workers) in self.concurrency {
            let queue: QueueName = queue
                .parse()
                .map_err(|error: String| ConfigError::InvalidValue(format!("concurrency: {error}")))?;
            concurrency.insert(queue, workers);
        }

        Ok(Config {
            chains: self.chains,
            abis: self.abis,
            webhooks: self.webhooks,
            webhook_keys: HashMap::new(),
            log_stride: self.log_stride.unwrap_or(defaults.log_stride),
            connections_per_chain: self
                .connections_per_chain
                .unwrap_or(defaults.connections_per_chain),
            recycle_interval_ms: self
                .recycle_interval_ms
                .unwrap_or(defaults.recycle_interval_ms),
            fanout_interval_ms: self.fanout_interval_ms.unwrap_or(defaults.fanout_interval_ms),
            probe_interval_ms: self.probe_interval_ms.unwrap_or(defaults.probe_interval_ms),
            monitor_interval_ms: self
                .monitor_interval_ms
                .unwrap_or(defaults.monitor_interval_ms),
            submission_delay_ms: self
                .submission_delay_ms
                .unwrap_or(defaults.submission_delay_ms),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
            timeseries_window_days: self
                .timeseries_window_days
                .unwrap_or(defaults.timeseries_window_days),
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            backoff_base_ms: self.backoff_base_ms.unwrap_or(defaults.backoff_base_ms),
            concurrency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computers::ComputeKind;
    use crate::sources::AbiKind;

    const KONG_TOML: &str = r#"
logStride = 5000
submissionDelayMs = 0

[concurrency]
extract = 12

[[chains]]
id = 1
jsonRpcUrls = ["https://eth.llamarpc.com"]
multicall3ActivationBlock = 14353601
genesisBlock = 1

[[chains]]
id = 137
jsonRpcUrls = ["https://polygon-rpc.com"]
multicall3ActivationBlock = 25770160
averageBlockTime = 2.0

[[abis]]
abiPath = "yearn/3/vault"
kind = "vault"
things = ["vault"]
timeseries = ["tvl", "apy"]

[[abis.sources]]
chainId = 1
address = "0x028ec7330ff87667b6dfb0d94b954c820195336c"
inceptBlock = 18530014

[[webhooks]]
id = "sub-1"
url = "https://hooks.example/kong"
abiPath = "yearn/3/vault"
type = "timeseries"
label = "apy-bwd-delta-pps"
chainIds = [1]
"#;

    #[test]
    fn reads_a_full_file() {
        let config = Config::from_toml(KONG_TOML).unwrap();

        assert_eq!(config.log_stride, 5_000);
        assert_eq!(config.submission_delay_ms, 0);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.concurrency(QueueName::Extract), 12);

        assert_eq!(config.chain_ids(), vec![1, 137]);
        assert_eq!(config.chain(137).unwrap().average_block_time, 2.0);
        assert_eq!(config.chain(1).unwrap().average_block_time, 12.0);
        assert_eq!(config.chain(1).unwrap().multicall3_activation_block, 14_353_601);

        let abi = config.abi("yearn/3/vault").unwrap();
        assert_eq!(abi.kind, AbiKind::Vault);
        assert_eq!(abi.timeseries, vec![ComputeKind::Tvl, ComputeKind::Apy]);
        assert_eq!(abi.static_sources()[0].incept_block, 18_530_014);

        assert_eq!(config.webhooks[0].kind, "timeseries");
        assert_eq!(config.webhooks[0].chain_ids, Some(vec![1]));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn rejects_unknown_queues_and_keys() {
        assert!(Config::from_toml("[concurrency]\nmempool = 1").is_err());
        assert!(Config::from_toml("blocksPerBatch = 1").is_err());
    }
}
