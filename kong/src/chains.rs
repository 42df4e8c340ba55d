use serde::{Deserialize, Serialize};

/// Represents the numeric network ID of an EVM Chain
/// For example, `1` for Ethereum mainnet, `137` for Polygon, etc.
pub type ChainId = u64;

pub const DEFAULT_AVERAGE_BLOCK_TIME: f64 = 12.0;

/// Represents an EVM chain network
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub id: ChainId,
    #[serde(default)]
    pub json_rpc_urls: Vec<String>,
    /// First block at which the Multicall3 aggregator is deployed
    #[serde(default)]
    pub multicall3_activation_block: u64,
    /// In seconds
    #[serde(default = "default_average_block_time")]
    pub average_block_time: f64,
    #[serde(default)]
    pub genesis_block: u64,
}

fn default_average_block_time() -> f64 {
    DEFAULT_AVERAGE_BLOCK_TIME
}

impl Chain {
    /// Builds the chain network
    ///
    ///
    /// # Example
    /// ```
    /// use kong::Chain;
    ///
    /// Chain::new(1, "https://eth-mainnet.g.alchemy.com/v2/...")
    ///     .with_multicall3_activation_block(14_353_601)
    ///     .with_average_block_time(12.0);
    /// ```
    pub fn new(id: ChainId, json_rpc_url: &str) -> Self {
        Self {
            id,
            json_rpc_urls: vec![json_rpc_url.to_string()],
            multicall3_activation_block: 0,
            average_block_time: DEFAULT_AVERAGE_BLOCK_TIME,
            genesis_block: 0,
        }
    }

    pub fn add_json_rpc_url(mut self, json_rpc_url: &str) -> Self {
        self.json_rpc_urls.push(json_rpc_url.to_string());

        self
    }

    pub fn with_json_rpc_urls(mut self, json_rpc_urls: Vec<String>) -> Self {
        self.json_rpc_urls = json_rpc_urls;

        self
    }

    pub fn with_multicall3_activation_block(mut self, block_number: u64) -> Self {
        self.multicall3_activation_block = block_number;

        self
    }

    pub fn with_average_block_time(mut self, seconds: f64) -> Self {
        self.average_block_time = seconds;

        self
    }

    pub fn with_genesis_block(mut self, block_number: u64) -> Self {
        self.genesis_block = block_number;

        self
    }
}
