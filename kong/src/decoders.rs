//! Per-abi decoding: which views a snapshot reads, which events are
//! watched, and what gets discovered along the way.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use ethers::abi::{Abi, Function, StateMutability, Token};
use ethers::types::{Address, H256, I256};
use serde_json::{Map, Value};

use crate::config::ConfigError;
use crate::evmlogs::EvmLog;
use crate::sources::{AbiConfig, DiscoveryRule};
use crate::things::Thing;
use crate::{ChainId, Hashes, JobError};

/// What a decoder made of a snapshot's raw fields
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hook {
    pub output: Map<String, Value>,
    pub things: Vec<Thing>,
}

#[async_trait::async_trait]
pub trait Decoder: Send + Sync {
    fn abi_path(&self) -> &str;
    fn abi(&self) -> &Abi;

    /// Post-processes a snapshot. Defaults to passing the fields through.
    async fn snapshot(
        &self,
        _chain_id: ChainId,
        _address: Address,
        fields: &Map<String, Value>,
    ) -> Result<Hook, JobError> {
        Ok(Hook {
            output: fields.clone(),
            things: vec![],
        })
    }

    /// Things referenced by a decoded log
    fn discover(&self, _log: &EvmLog) -> Vec<Thing> {
        vec![]
    }

    fn events(&self) -> Vec<H256> {
        self.abi().events().map(|event| event.signature()).collect()
    }

    fn views(&self) -> Vec<&Function> {
        view_functions(self.abi())
    }
}

/// Decodes straight from a JSON ABI, discovering things by [`DiscoveryRule`]
pub struct AbiDecoder {
    abi_path: String,
    abi: Abi,
    discover: Vec<DiscoveryRule>,
}

impl AbiDecoder {
    pub fn new(abi_path: &str, abi: Abi) -> Self {
        Self {
            abi_path: abi_path.to_string(),
            abi,
            discover: vec![],
        }
    }

    pub fn with_discovery(mut self, rules: Vec<DiscoveryRule>) -> Self {
        self.discover = rules;

        self
    }

    pub fn from_json(abi_path: &str, json: &str) -> Result<Self, ConfigError> {
        let abi: Abi = serde_json::from_str(json)
            .map_err(|error| ConfigError::InvalidAbi(format!("{abi_path}: {error}")))?;

        Ok(Self::new(abi_path, abi))
    }
}

#[async_trait::async_trait]
impl Decoder for AbiDecoder {
    fn abi_path(&self) -> &str {
        &self.abi_path
    }

    fn abi(&self) -> &Abi {
        &self.abi
    }

    fn discover(&self, log: &EvmLog) -> Vec<Thing> {
        self.discover
            .iter()
            .filter(|rule| rule.event == log.event_name)
            .filter_map(|rule| {
                let address = log.arg_address(&rule.arg)?;

                Some(
                    Thing::new(log.chain_id, address, &rule.label)
                        .with_defaults(log.args.clone())
                        .with_default("inceptBlock", log.block_number)
                        .with_default("inceptTime", log.block_time)
                        .as_of(log.block_number, log.block_time),
                )
            })
            .collect()
    }
}

/// Decoders by abi path
#[derive(Clone, Default)]
pub struct Decoders {
    decoders: HashMap<String, Arc<dyn Decoder>>,
}

impl Decoders {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`AbiDecoder`] per abi that names an abi file
    pub fn from_config(abis: &[AbiConfig]) -> Result<Self, ConfigError> {
        let mut decoders = Self::new();

        for abi in abis {
            let Some(abi_file) = &abi.abi_file else {
                continue;
            };

            let json = fs::read_to_string(abi_file)
                .map_err(|error| ConfigError::InvalidAbi(format!("{}: {error}", abi_file.display())))?;
            let decoder =
                AbiDecoder::from_json(&abi.abi_path, &json)?.with_discovery(abi.discover.clone());

            decoders.register(Arc::new(decoder));
        }

        Ok(decoders)
    }

    pub fn register(&mut self, decoder: Arc<dyn Decoder>) {
        self.decoders.insert(decoder.abi_path().to_string(), decoder);
    }

    pub fn get(&self, abi_path: &str) -> Option<Arc<dyn Decoder>> {
        self.decoders.get(abi_path).cloned()
    }
}

/// Zero-argument view and pure functions that return something
pub fn view_functions(abi: &Abi) -> Vec<&Function> {
    let mut views: Vec<&Function> = abi
        .functions()
        .filter(|function| {
            function.inputs.is_empty()
                && !function.outputs.is_empty()
                && matches!(
                    function.state_mutability,
                    StateMutability::View | StateMutability::Pure
                )
        })
        .collect();
    views.sort_by(|a, b| a.name.cmp(&b.name));
    views.dedup_by(|a, b| a.name == b.name);

    views
}

/// JSON rendering of an abi value. Integers become decimal strings so no
/// precision is lost.
pub fn token_to_json(token: &Token) -> Value {
    match token {
        Token::Address(address) => Value::String(Hashes::h160_to_string(address)),
        Token::Uint(uint) => Value::String(uint.to_string()),
        Token::Int(int) => Value::String(I256::from_raw(*int).to_string()),
        Token::Bool(flag) => Value::Bool(*flag),
        Token::String(string) => Value::String(string.clone()),
        Token::Bytes(bytes) | Token::FixedBytes(bytes) => {
            Value::String(format!("0x{}", hex::encode(bytes)))
        }
        Token::Array(tokens) | Token::FixedArray(tokens) | Token::Tuple(tokens) => {
            Value::Array(tokens.iter().map(token_to_json).collect())
        }
    }
}

/// A single return value as itself, several as an object keyed by output name
pub fn outputs_to_json(function: &Function, tokens: &[Token]) -> Value {
    match tokens {
        [token] => token_to_json(token),
        tokens => Value::Object(
            tokens
                .iter()
                .enumerate()
                .map(|(index, token)| {
                    let name = function
                        .outputs
                        .get(index)
                        .map(|param| param.name.clone())
                        .filter(|name| !name.is_empty())
                        .unwrap_or_else(|| index.to_string());

                    (name, token_to_json(token))
                })
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::parse_abi;
    use ethers::types::U256;
    use serde_json::json;

    #[test]
    fn renders_tokens_without_losing_precision() {
        assert_eq!(
            token_to_json(&Token::Uint(U256::MAX)),
            json!(U256::MAX.to_string())
        );
        assert_eq!(
            token_to_json(&Token::Int(I256::from(-5).into_raw())),
            json!("-5")
        );
        assert_eq!(token_to_json(&Token::Bytes(vec![0xde, 0xad])), json!("0xdead"));
        assert_eq!(
            token_to_json(&Token::Tuple(vec![Token::Bool(true), Token::String("a".into())])),
            json!([true, "a"])
        );
    }

    #[test]
    fn finds_zero_argument_views() {
        let abi = parse_abi(&[
            "function name() view returns (string)",
            "function balanceOf(address) view returns (uint256)",
            "function deposit(uint256) returns (uint256)",
            "function decimals() pure returns (uint8)",
        ])
        .unwrap();

        let names: Vec<_> = view_functions(&abi).iter().map(|f| f.name.clone()).collect();

        assert_eq!(names, vec!["decimals", "name"]);
    }

    #[test]
    fn names_multiple_outputs() {
        let abi = parse_abi(&["function reserves() view returns (uint112 a, uint112 b)"]).unwrap();
        let function = abi.function("reserves").unwrap();

        let json = outputs_to_json(
            function,
            &[Token::Uint(U256::from(1)), Token::Uint(U256::from(2))],
        );

        assert_eq!(json, json!({"a": "1", "b": "2"}));
    }

    #[test]
    fn discovers_things_by_rule() {
        let decoder = AbiDecoder::new("yearn/3/registry", Abi::default()).with_discovery(vec![
            DiscoveryRule {
                event: "NewVault".to_string(),
                arg: "vault".to_string(),
                label: "vault".to_string(),
            },
        ]);
        let log = EvmLog {
            chain_id: 1,
            address: Address::repeat_byte(9),
            event_name: "NewVault".to_string(),
            signature: H256::zero(),
            args: json!({"vault": "0x0101010101010101010101010101010101010101"})
                .as_object()
                .cloned()
                .unwrap(),
            block_number: 100,
            block_hash: H256::zero(),
            block_time: 1_000,
            log_index: 0,
            transaction_hash: H256::zero(),
            transaction_index: 0,
        };

        let things = decoder.discover(&log);

        assert_eq!(things.len(), 1);
        assert_eq!(things[0].address, Address::repeat_byte(1));
        assert_eq!(things[0].incept_block(), Some(100));
    }
}
