mod file;

pub use file::ConfigFile;

use std::collections::HashMap;
use std::path::Path;

use derive_more::Display;
use url::Url;

use crate::jobs::QueueName;
use crate::pools::{DEFAULT_POOL_SIZE, DEFAULT_RECYCLE_INTERVAL_MS};
use crate::sources::AbiConfig;
use crate::strides::DEFAULT_LOG_STRIDE;
use crate::webhooks::Subscription;
use crate::{Chain, ChainId};

#[derive(Clone, Debug, Display, PartialEq)]
pub enum ConfigError {
    #[display("at least one chain is required")]
    NoChain,
    #[display("chain {_0} has no rpc endpoint")]
    NoRpcEndpoint(ChainId),
    #[display("invalid url {_0}")]
    InvalidUrl(String),
    #[display("invalid abi {_0}")]
    InvalidAbi(String),
    #[display("invalid value for {_0}")]
    InvalidValue(String),
    #[display("config file: {_0}")]
    File(String),
}

impl std::error::Error for ConfigError {}

#[derive(Clone, Debug)]
pub struct Config {
    pub chains: Vec<Chain>,
    pub abis: Vec<AbiConfig>,
    pub webhooks: Vec<Subscription>,
    /// Expected `Kong-Api-Key` per subscription id
    pub webhook_keys: HashMap<String, String>,
    pub log_stride: u64,
    pub connections_per_chain: usize,
    pub recycle_interval_ms: u64,
    pub fanout_interval_ms: u64,
    pub probe_interval_ms: u64,
    pub monitor_interval_ms: u64,
    /// Pause between successive submissions of one fanout
    pub submission_delay_ms: u64,
    /// How long an idle worker waits before asking its queue again
    pub poll_interval_ms: u64,
    pub timeseries_window_days: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub concurrency: HashMap<QueueName, usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            chains: vec![],
            abis: vec![],
            webhooks: vec![],
            webhook_keys: HashMap::new(),
            log_stride: DEFAULT_LOG_STRIDE,
            connections_per_chain: DEFAULT_POOL_SIZE,
            recycle_interval_ms: DEFAULT_RECYCLE_INTERVAL_MS,
            fanout_interval_ms: 900_000,
            probe_interval_ms: 60_000,
            monitor_interval_ms: 600_000,
            submission_delay_ms: 16,
            poll_interval_ms: 1_000,
            timeseries_window_days: 7,
            max_attempts: 3,
            backoff_base_ms: 1_000,
            concurrency: HashMap::new(),
        }
    }

    /// Reads a TOML file; environment overrides are applied separately
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let toml = std::fs::read_to_string(path)
            .map_err(|error| ConfigError::File(format!("{}: {error}", path.display())))?;

        Self::from_toml(&toml)
    }

    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(toml).map_err(|error| ConfigError::File(error.to_string()))?;

        file.into_config()
    }

    pub fn add_chain(mut self, chain: Chain) -> Self {
        self.chains.push(chain);

        self
    }

    pub fn add_abi(mut self, abi: AbiConfig) -> Self {
        self.abis.push(abi);

        self
    }

    pub fn add_webhook(mut self, subscription: Subscription) -> Self {
        self.webhooks.push(subscription);

        self
    }

    pub fn with_webhook_key(mut self, subscription_id: &str, key: &str) -> Self {
        self.webhook_keys
            .insert(subscription_id.to_string(), key.to_string());

        self
    }

    pub fn with_log_stride(mut self, log_stride: u64) -> Self {
        self.log_stride = log_stride;

        self
    }

    pub fn with_connections_per_chain(mut self, connections_per_chain: usize) -> Self {
        self.connections_per_chain = connections_per_chain;

        self
    }

    pub fn with_recycle_interval_ms(mut self, recycle_interval_ms: u64) -> Self {
        self.recycle_interval_ms = recycle_interval_ms;

        self
    }

    pub fn with_fanout_interval_ms(mut self, fanout_interval_ms: u64) -> Self {
        self.fanout_interval_ms = fanout_interval_ms;

        self
    }

    pub fn with_probe_interval_ms(mut self, probe_interval_ms: u64) -> Self {
        self.probe_interval_ms = probe_interval_ms;

        self
    }

    pub fn with_monitor_interval_ms(mut self, monitor_interval_ms: u64) -> Self {
        self.monitor_interval_ms = monitor_interval_ms;

        self
    }

    pub fn with_submission_delay_ms(mut self, submission_delay_ms: u64) -> Self {
        self.submission_delay_ms = submission_delay_ms;

        self
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;

        self
    }

    pub fn with_timeseries_window_days(mut self, days: u64) -> Self {
        self.timeseries_window_days = days;

        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;

        self
    }

    pub fn with_backoff_base_ms(mut self, backoff_base_ms: u64) -> Self {
        self.backoff_base_ms = backoff_base_ms;

        self
    }

    pub fn with_concurrency(mut self, queue: QueueName, workers: usize) -> Self {
        self.concurrency.insert(queue, workers);

        self
    }

    pub fn concurrency(&self, queue: QueueName) -> usize {
        self.concurrency
            .get(&queue)
            .copied()
            .unwrap_or(match queue {
                QueueName::Fanout | QueueName::Probe => 1,
                QueueName::Compute => 4,
                QueueName::Extract | QueueName::Load => 8,
            })
            .max(1)
    }

    pub fn chain(&self, chain_id: ChainId) -> Option<&Chain> {
        self.chains.iter().find(|chain| chain.id == chain_id)
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.chains.iter().map(|chain| chain.id).collect()
    }

    pub fn abi(&self, abi_path: &str) -> Option<&AbiConfig> {
        self.abis.iter().find(|abi| abi.abi_path == abi_path)
    }

    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Applies `RPC_FULL_NODE_<chainId>`, `LOG_STRIDE`, `RECYCLE_INTERVAL_MS`
    /// and `WEBHOOK_SUBSCRIBERS` as read by `lookup`
    pub fn apply_env_with(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        for chain in self.chains.iter_mut() {
            if let Some(urls) = lookup(&format!("RPC_FULL_NODE_{}", chain.id)) {
                let urls: Vec<String> = split_list(&urls).map(str::to_string).collect();

                if !urls.is_empty() {
                    chain.json_rpc_urls = urls;
                }
            }
        }

        if let Some(log_stride) = lookup("LOG_STRIDE") {
            self.log_stride = parse_number("LOG_STRIDE", &log_stride)?;
        }

        if let Some(recycle_interval_ms) = lookup("RECYCLE_INTERVAL_MS") {
            self.recycle_interval_ms = parse_number("RECYCLE_INTERVAL_MS", &recycle_interval_ms)?;
        }

        if let Some(subscribers) = lookup("WEBHOOK_SUBSCRIBERS") {
            self.webhook_keys.extend(parse_webhook_subscribers(&subscribers)?);
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chains.is_empty() {
            return Err(ConfigError::NoChain);
        }

        for chain in &self.chains {
            if chain.json_rpc_urls.is_empty() {
                return Err(ConfigError::NoRpcEndpoint(chain.id));
            }

            for json_rpc_url in &chain.json_rpc_urls {
                validate_url(json_rpc_url)?;
            }
        }

        if self.log_stride == 0 {
            return Err(ConfigError::InvalidValue("logStride".to_string()));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue("maxAttempts".to_string()));
        }

        Ok(())
    }
}

/// `id|key,id2|key2`
pub fn parse_webhook_subscribers(value: &str) -> Result<HashMap<String, String>, ConfigError> {
    split_list(value)
        .map(|entry| match entry.split_once('|') {
            Some((id, key)) if !id.trim().is_empty() && !key.trim().is_empty() => {
                Ok((id.trim().to_string(), key.trim().to_string()))
            }
            _ => Err(ConfigError::InvalidValue(format!("WEBHOOK_SUBSCRIBERS entry {entry:?}"))),
        })
        .collect()
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|entry| !entry.is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{name}={value}")))
}

fn validate_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl(value.to_string()))?;

    match url.scheme() {
        "http" | "https" | "ws" | "wss" => Ok(url),
        _ => Err(ConfigError::InvalidUrl(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        move |name| vars.get(name).cloned()
    }

    #[test]
    fn requires_a_chain_with_an_endpoint() {
        assert_eq!(Config::new().validate(), Err(ConfigError::NoChain));

        let config = Config::new().add_chain(Chain::new(1, "http://localhost:8545").with_json_rpc_urls(vec![]));
        assert_eq!(config.validate(), Err(ConfigError::NoRpcEndpoint(1)));

        let config = Config::new().add_chain(Chain::new(1, "localhost"));
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidUrl("localhost".to_string()))
        );

        let config = Config::new().add_chain(Chain::new(1, "https://eth.llamarpc.com"));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn applies_environment_overrides() {
        let config = Config::new()
            .add_chain(Chain::new(1, "http://localhost:8545"))
            .add_chain(Chain::new(10, "http://localhost:9545"))
            .apply_env_with(env(&[
                ("RPC_FULL_NODE_1", "https://a.example, https://b.example"),
                ("LOG_STRIDE", "2500"),
                ("RECYCLE_INTERVAL_MS", "60000"),
                ("WEBHOOK_SUBSCRIBERS", "sub-1|secret-1,sub-2|secret-2"),
            ]))
            .unwrap();

        assert_eq!(
            config.chain(1).unwrap().json_rpc_urls,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.chain(10).unwrap().json_rpc_urls, vec!["http://localhost:9545"]);
        assert_eq!(config.log_stride, 2_500);
        assert_eq!(config.recycle_interval_ms, 60_000);
        assert_eq!(config.webhook_keys.get("sub-2"), Some(&"secret-2".to_string()));
    }

    #[test]
    fn rejects_malformed_environment() {
        let result = Config::new().apply_env_with(env(&[("LOG_STRIDE", "lots")]));
        assert_eq!(
            result.err(),
            Some(ConfigError::InvalidValue("LOG_STRIDE=lots".to_string()))
        );

        assert!(parse_webhook_subscribers("sub-1").is_err());
        assert!(parse_webhook_subscribers("sub-1|").is_err());
        assert_eq!(parse_webhook_subscribers("").unwrap().len(), 0);
    }

    #[test]
    fn defaults_concurrency_per_queue() {
        let config = Config::new().with_concurrency(QueueName::Extract, 20);

        assert_eq!(config.concurrency(QueueName::Extract), 20);
        assert_eq!(config.concurrency(QueueName::Fanout), 1);
        assert_eq!(config.with_concurrency(QueueName::Load, 0).concurrency(QueueName::Load), 1);
    }
}
