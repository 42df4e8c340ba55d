use ethers::types::Address;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::serde_utils::value_to_u64;
use crate::ChainId;

pub const VAULT_LABEL: &str = "vault";
pub const ERC20_LABEL: &str = "erc20";
pub const STRATEGY_LABEL: &str = "strategy";

/// A generic extracted entity, keyed by `(chain_id, address, label)`.
/// `defaults` is an open attribute map; upserts merge it key by key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thing {
    pub chain_id: ChainId,
    pub address: Address,
    pub label: String,
    #[serde(default)]
    pub defaults: Map<String, Value>,
    #[serde(default)]
    pub as_of_block: u64,
    #[serde(default)]
    pub as_of_time: u64,
}

impl Thing {
    pub fn new(chain_id: ChainId, address: Address, label: &str) -> Self {
        Self {
            chain_id,
            address,
            label: label.to_string(),
            defaults: Map::new(),
            as_of_block: 0,
            as_of_time: 0,
        }
    }

    pub fn with_defaults(mut self, defaults: Map<String, Value>) -> Self {
        self.defaults.extend(defaults);

        self
    }

    pub fn with_default(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.to_string(), value.into());

        self
    }

    pub fn as_of(mut self, block_number: u64, block_time: u64) -> Self {
        self.as_of_block = block_number;
        self.as_of_time = block_time;

        self
    }

    pub fn incept_block(&self) -> Option<u64> {
        self.defaults.get("inceptBlock").and_then(value_to_u64)
    }

    pub fn incept_time(&self) -> Option<u64> {
        self.defaults.get("inceptTime").and_then(value_to_u64)
    }

    pub fn key(&self) -> (ChainId, Address, &str) {
        (self.chain_id, self.address, self.label.as_str())
    }

    /// Folds `newer` into `self`: newer default keys win, the rest survive
    pub fn merge(&mut self, newer: Thing) {
        self.defaults.extend(newer.defaults);
        self.as_of_block = newer.as_of_block;
        self.as_of_time = newer.as_of_time;
    }
}

/// Collapses things sharing a key into one, in arrival order
pub fn coalesce(things: Vec<Thing>) -> Vec<Thing> {
    let mut coalesced: Vec<Thing> = Vec::with_capacity(things.len());

    for thing in things {
        match coalesced.iter_mut().find(|t| t.key() == thing.key()) {
            Some(existing) => existing.merge(thing),
            None => coalesced.push(thing),
        }
    }

    coalesced
}

/// A vault's ordered strategy list
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalQueue {
    pub chain_id: ChainId,
    pub vault: Address,
    pub strategies: Vec<Address>,
    pub as_of_block: u64,
}
