use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::serde_utils::{lenient_option_f64, lenient_u64};
use crate::ChainId;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// A timeseries point. `(chain_id, address, label, component, series_time)`
/// is unique; writing the same key again overwrites the value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    #[serde(deserialize_with = "lenient_u64::deserialize")]
    pub chain_id: ChainId,
    pub address: Address,
    pub label: String,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default, deserialize_with = "lenient_option_f64::deserialize")]
    pub value: Option<f64>,
    #[serde(deserialize_with = "lenient_u64::deserialize")]
    pub block_number: u64,
    #[serde(deserialize_with = "lenient_u64::deserialize")]
    pub block_time: u64,
    #[serde(default, deserialize_with = "lenient_u64::deserialize")]
    pub series_time: u64,
}

impl Output {
    pub fn key(&self) -> (ChainId, Address, &str, &str, u64) {
        (
            self.chain_id,
            self.address,
            self.label.as_str(),
            self.component.as_deref().unwrap_or_default(),
            self.series_time,
        )
    }
}

/// Last write wins among outputs sharing a key
pub fn dedup(outputs: Vec<Output>) -> Vec<Output> {
    let mut deduped: Vec<Output> = Vec::with_capacity(outputs.len());

    for output in outputs {
        match deduped.iter_mut().find(|o| o.key() == output.key()) {
            Some(existing) => *existing = output,
            None => deduped.push(output),
        }
    }

    deduped
}

/// Start of the UTC day containing `timestamp`
pub fn floor_day(timestamp: u64) -> u64 {
    timestamp - timestamp % SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_numbers_sent_as_strings() {
        let output: Output = serde_json::from_value(json!({
            "chainId": "1",
            "address": "0x0000000000000000000000000000000000000001",
            "label": "tvl",
            "component": "tvl",
            "value": "1234.5",
            "blockNumber": "100",
            "blockTime": 1_700_000_000u64,
        }))
        .unwrap();

        assert_eq!(output.chain_id, 1);
        assert_eq!(output.value, Some(1234.5));
        assert_eq!(output.block_number, 100);
        assert_eq!(output.series_time, 0);
    }

    #[test]
    fn floors_to_utc_days() {
        assert_eq!(floor_day(1_716_356_553), 1_716_336_000);
        assert_eq!(floor_day(1_716_336_000), 1_716_336_000);
    }
}
