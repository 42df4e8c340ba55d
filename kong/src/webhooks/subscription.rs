use ethers::types::Address;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::sources::Source;
use crate::ChainId;

/// Someone who wants outputs for an abi's sources. `chain_ids` and
/// `addresses` narrow the sources when present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub url: Url,
    pub abi_path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_ids: Option<Vec<ChainId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<Address>>,
}

impl Subscription {
    pub fn new(id: &str, url: Url, abi_path: &str, kind: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            url,
            abi_path: abi_path.to_string(),
            kind: kind.to_string(),
            label: label.to_string(),
            chain_ids: None,
            addresses: None,
        }
    }

    pub fn with_chain_ids(mut self, chain_ids: Vec<ChainId>) -> Self {
        self.chain_ids = Some(chain_ids);

        self
    }

    pub fn with_addresses(mut self, addresses: Vec<Address>) -> Self {
        self.addresses = Some(addresses);

        self
    }

    pub fn matches(&self, source: &Source) -> bool {
        self.abi_path == source.abi_path
            && self
                .chain_ids
                .as_ref()
                .map_or(true, |chain_ids| chain_ids.contains(&source.chain_id))
            && self
                .addresses
                .as_ref()
                .map_or(true, |addresses| addresses.contains(&source.address))
    }
}
