use std::path::PathBuf;

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::computers::ComputeKind;
use crate::things::Thing;
use crate::ChainId;

/// A monitored contract instance, identified by `(chain_id, address)`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub chain_id: ChainId,
    pub address: Address,
    #[serde(default)]
    pub incept_block: u64,
    #[serde(default)]
    pub incept_time: u64,
    pub abi_path: String,
}

impl Source {
    pub fn new(chain_id: ChainId, address: Address, abi_path: &str) -> Self {
        Self {
            chain_id,
            address,
            incept_block: 0,
            incept_time: 0,
            abi_path: abi_path.to_string(),
        }
    }

    pub fn incepted(mut self, block_number: u64, block_time: u64) -> Self {
        self.incept_block = block_number;
        self.incept_time = block_time;

        self
    }

    /// Sources from discovered things carry the incept block they were found at
    pub fn from_thing(thing: &Thing, abi_path: &str) -> Self {
        Self::new(thing.chain_id, thing.address, abi_path).incepted(
            thing.incept_block().unwrap_or_default(),
            thing.incept_time().unwrap_or_default(),
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AbiKind {
    #[default]
    Generic,
    /// Also extracted as a vault with its assets and strategies
    Vault,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticSource {
    pub chain_id: ChainId,
    pub address: Address,
    #[serde(default)]
    pub incept_block: u64,
    #[serde(default)]
    pub incept_time: u64,
}

/// Turns a decoded event into a discovered thing: the address held by the
/// `arg` argument of `event` is labelled `label`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRule {
    pub event: String,
    pub arg: String,
    pub label: String,
}

/// Everything indexed through one contract ABI
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiConfig {
    pub abi_path: String,
    #[serde(default)]
    pub kind: AbiKind,
    /// JSON ABI; without one the abi has no views or events to index
    #[serde(default)]
    pub abi_file: Option<PathBuf>,
    #[serde(default)]
    pub sources: Vec<StaticSource>,
    /// Labels of discovered things indexed as sources of this abi
    #[serde(default)]
    pub things: Vec<String>,
    #[serde(default)]
    pub discover: Vec<DiscoveryRule>,
    #[serde(default)]
    pub timeseries: Vec<ComputeKind>,
}

impl AbiConfig {
    pub fn new(abi_path: &str) -> Self {
        Self {
            abi_path: abi_path.to_string(),
            kind: AbiKind::Generic,
            abi_file: None,
            sources: vec![],
            things: vec![],
            discover: vec![],
            timeseries: vec![],
        }
    }

    pub fn with_kind(mut self, kind: AbiKind) -> Self {
        self.kind = kind;

        self
    }

    pub fn with_abi_file(mut self, abi_file: impl Into<PathBuf>) -> Self {
        self.abi_file = Some(abi_file.into());

        self
    }

    pub fn add_source(mut self, chain_id: ChainId, address: Address, incept_block: u64) -> Self {
        self.sources.push(StaticSource {
            chain_id,
            address,
            incept_block,
            incept_time: 0,
        });

        self
    }

    pub fn add_thing_label(mut self, label: &str) -> Self {
        self.things.push(label.to_string());

        self
    }

    pub fn add_discovery(mut self, event: &str, arg: &str, label: &str) -> Self {
        self.discover.push(DiscoveryRule {
            event: event.to_string(),
            arg: arg.to_string(),
            label: label.to_string(),
        });

        self
    }

    pub fn add_timeseries(mut self, kind: ComputeKind) -> Self {
        self.timeseries.push(kind);

        self
    }

    pub fn static_sources(&self) -> Vec<Source> {
        self.sources
            .iter()
            .map(|s| {
                Source::new(s.chain_id, s.address, &self.abi_path)
                    .incepted(s.incept_block, s.incept_time)
            })
            .collect()
    }
}
