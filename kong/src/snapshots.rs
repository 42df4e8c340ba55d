use ethers::types::Address;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ChainId;

/// Every view field of a contract read at one block, plus what its decoder
/// made of them. Superseded by the next snapshot for the same address.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub chain_id: ChainId,
    pub address: Address,
    pub block_number: u64,
    pub block_time: u64,
    #[serde(default)]
    pub snapshot: Map<String, Value>,
    #[serde(default)]
    pub hook: Map<String, Value>,
}
