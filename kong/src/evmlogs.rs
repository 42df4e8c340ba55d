use ethers::abi::{Abi, RawLog};
use ethers::types::{Address, Log, H256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decoders::token_to_json;
use crate::ChainId;

/// A decoded event log. `(chain_id, address, block_number, log_index,
/// transaction_hash)` identifies it; storing it twice is a no-op.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmLog {
    pub chain_id: ChainId,
    pub address: Address,
    pub event_name: String,
    pub signature: H256,
    #[serde(default)]
    pub args: Map<String, Value>,
    pub block_number: u64,
    pub block_hash: H256,
    #[serde(default)]
    pub block_time: u64,
    pub log_index: u64,
    pub transaction_hash: H256,
    pub transaction_index: u64,
}

#[derive(Debug, PartialEq)]
pub enum DecodeLogError {
    /// No event in the abi has the log's first topic
    UnknownEvent,
    Pending,
    Malformed(String),
}

impl EvmLog {
    pub fn decode(
        chain_id: ChainId,
        abi: &Abi,
        log: &Log,
        block_time: u64,
    ) -> Result<Self, DecodeLogError> {
        let signature = *log.topics.first().ok_or(DecodeLogError::UnknownEvent)?;
        let event = abi
            .events()
            .find(|event| event.signature() == signature)
            .ok_or(DecodeLogError::UnknownEvent)?;

        let parsed = event
            .parse_log(RawLog {
                topics: log.topics.clone(),
                data: log.data.to_vec(),
            })
            .map_err(|error| DecodeLogError::Malformed(error.to_string()))?;

        let args = parsed
            .params
            .iter()
            .map(|param| (param.name.clone(), token_to_json(&param.value)))
            .collect();

        Ok(Self {
            chain_id,
            address: log.address,
            event_name: event.name.clone(),
            signature,
            args,
            block_number: log.block_number.ok_or(DecodeLogError::Pending)?.as_u64(),
            block_hash: log.block_hash.ok_or(DecodeLogError::Pending)?,
            block_time,
            log_index: log.log_index.ok_or(DecodeLogError::Pending)?.as_u64(),
            transaction_hash: log.transaction_hash.ok_or(DecodeLogError::Pending)?,
            transaction_index: log.transaction_index.ok_or(DecodeLogError::Pending)?.as_u64(),
        })
    }

    pub fn arg_address(&self, name: &str) -> Option<Address> {
        self.args.get(name)?.as_str()?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::parse_abi;
    use ethers::types::Bytes;
    use serde_json::json;
    use std::str::FromStr;

    fn h256(hex: &str) -> H256 {
        H256::from_str(hex).unwrap()
    }

    fn transfer_log() -> Log {
        Log {
            address: Address::from_str("0xBC4CA0EdA7647A8aB7C2061c2E118A18a936f13D").unwrap(),
            topics: vec![
                h256("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"),
                h256("0x000000000000000000000000b518b3136e491101f22b77f385fe22269c515188"),
                h256("0x0000000000000000000000007dfd6013cf8d92b751e63d481b51fe0e4c5abf5e"),
            ],
            data: Bytes::from(
                h256("0x000000000000000000000000000000000000000000000000000000000000067d")
                    .as_bytes()
                    .to_vec(),
            ),
            block_hash: Some(h256(
                "0x8fd4ca304a2e81854059bc3e42f32064cca8b6b453f6286f95060edc6382c6f8",
            )),
            block_number: Some(18_115_958.into()),
            transaction_hash: Some(h256(
                "0x83d751998ff98cd609bc9b18bb36bdef8659cde2f74d6d7a1b0fef2c2bf8f839",
            )),
            transaction_index: Some(89.into()),
            log_index: Some(7.into()),
            ..Default::default()
        }
    }

    fn erc20() -> Abi {
        parse_abi(&["event Transfer(address indexed from, address indexed to, uint256 value)"])
            .unwrap()
    }

    #[test]
    fn decodes_known_events() {
        let log = EvmLog::decode(1, &erc20(), &transfer_log(), 1_694_000_000).unwrap();

        assert_eq!(log.event_name, "Transfer");
        assert_eq!(log.args["value"], json!("1661"));
        assert_eq!(log.args["to"], json!("0x7dfd6013cf8d92b751e63d481b51fe0e4c5abf5e"));
        assert_eq!(log.block_number, 18_115_958);
        assert_eq!(log.log_index, 7);
        assert_eq!(
            log.arg_address("from"),
            Address::from_str("0xb518b3136e491101f22b77f385fe22269c515188").ok()
        );
    }

    #[test]
    fn rejects_events_outside_the_abi() {
        let abi = parse_abi(&["event Deposit(address indexed owner, uint256 assets)"]).unwrap();

        assert_eq!(
            EvmLog::decode(1, &abi, &transfer_log(), 0).err(),
            Some(DecodeLogError::UnknownEvent)
        );
    }

    #[test]
    fn rejects_pending_logs() {
        let log = Log {
            block_number: None,
            ..transfer_log()
        };

        assert_eq!(
            EvmLog::decode(1, &erc20(), &log, 0).err(),
            Some(DecodeLogError::Pending)
        );
    }
}
