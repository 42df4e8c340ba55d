//! Batched reads through the Multicall3 aggregator and the gate deciding
//! where they are available.

use std::collections::HashMap;

use derive_more::Display;
use ethers::abi::{self, Function, Param, ParamType, StateMutability, Token};
use ethers::types::{Address, H160, U64};

use crate::provider::{Provider, ProviderError};
use crate::{Chain, ChainId, JobError};

/// 0xcA11bde05977b3631167028862bE2a173976CA11, at the same address on every chain
pub const MULTICALL3: Address = H160([
    0xca, 0x11, 0xbd, 0xe0, 0x59, 0x77, 0xb3, 0x63, 0x11, 0x67, 0x02, 0x88, 0x62, 0xbe, 0x2a, 0x17,
    0x39, 0x76, 0xca, 0x11,
]);

/// Knows from which block each chain can serve batched reads
#[derive(Clone, Debug, Default)]
pub struct BatchCallGate {
    activations: HashMap<ChainId, u64>,
}

impl BatchCallGate {
    pub fn new(chains: &[Chain]) -> Self {
        Self {
            activations: chains
                .iter()
                .map(|chain| (chain.id, chain.multicall3_activation_block))
                .collect(),
        }
    }

    pub fn supports_batch(&self, chain_id: ChainId, block_number: u64) -> bool {
        self.activations
            .get(&chain_id)
            .is_some_and(|activation| block_number >= *activation)
    }

    pub fn get_activation(&self, chain_id: ChainId) -> Result<u64, JobError> {
        self.activations
            .get(&chain_id)
            .copied()
            .ok_or(JobError::UnsupportedChain(chain_id))
    }

    pub fn ensure_batch(&self, chain_id: ChainId, block_number: u64) -> Result<(), JobError> {
        self.get_activation(chain_id)?;

        if self.supports_batch(chain_id, block_number) {
            Ok(())
        } else {
            Err(JobError::BatchUnsupportedAtHeight {
                chain_id,
                block_number,
            })
        }
    }
}

/// One read inside a batch
#[derive(Clone, Debug)]
pub struct Call {
    pub target: Address,
    pub function: Function,
    pub args: Vec<Token>,
}

impl Call {
    pub fn new(target: Address, function: &Function) -> Self {
        Self {
            target,
            function: function.clone(),
            args: vec![],
        }
    }

    pub fn with_args(mut self, args: Vec<Token>) -> Self {
        self.args = args;

        self
    }
}

/// Why a single call in a batch produced nothing. Batches tolerate these:
/// the field is treated as missing.
#[derive(Clone, Debug, Display, PartialEq)]
pub enum CallFailure {
    #[display("call reverted")]
    Reverted,
    #[display("undecodable return data: {_0}")]
    Undecodable(String),
    #[display("unencodable arguments: {_0}")]
    Unencodable(String),
}

pub type CallResult = Result<Vec<Token>, CallFailure>;

#[allow(deprecated)]
fn aggregate3() -> Function {
    Function {
        name: "aggregate3".to_string(),
        inputs: vec![Param {
            name: "calls".to_string(),
            kind: ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Address,
                ParamType::Bool,
                ParamType::Bytes,
            ]))),
            internal_type: None,
        }],
        outputs: vec![Param {
            name: "returnData".to_string(),
            kind: ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Bool,
                ParamType::Bytes,
            ]))),
            internal_type: None,
        }],
        constant: None,
        state_mutability: StateMutability::Payable,
    }
}

/// Encodes `calls` as one `aggregate3` with `allowFailure` set on each call
pub fn encode_aggregate3(calls: &[(Address, Vec<u8>)]) -> Result<Vec<u8>, abi::Error> {
    let calls = calls
        .iter()
        .map(|(target, data)| {
            Token::Tuple(vec![
                Token::Address(*target),
                Token::Bool(true),
                Token::Bytes(data.clone()),
            ])
        })
        .collect();

    aggregate3().encode_input(&[Token::Array(calls)])
}

/// Decodes the `(success, returnData)` pairs of an `aggregate3` response
pub fn decode_aggregate3(data: &[u8]) -> Result<Vec<(bool, Vec<u8>)>, abi::Error> {
    let mut tokens = aggregate3().decode_output(data)?.into_iter();

    let Some(Token::Array(results)) = tokens.next() else {
        return Err(abi::Error::InvalidData);
    };

    results
        .into_iter()
        .map(|result| match result {
            Token::Tuple(fields) => match fields.as_slice() {
                [Token::Bool(success), Token::Bytes(data)] => Ok((*success, data.clone())),
                _ => Err(abi::Error::InvalidData),
            },
            _ => Err(abi::Error::InvalidData),
        })
        .collect()
}

/// Runs `calls` as one `eth_call` against Multicall3 and returns one result
/// per call, in order. Only transport failures fail the whole batch.
pub async fn aggregate(
    provider: &dyn Provider,
    calls: &[Call],
    block_number: Option<u64>,
) -> Result<Vec<CallResult>, ProviderError> {
    let mut results: Vec<Option<CallResult>> = vec![None; calls.len()];
    let mut encoded = vec![];
    let mut positions = vec![];

    for (position, call) in calls.iter().enumerate() {
        match call.function.encode_input(&call.args) {
            Ok(data) => {
                encoded.push((call.target, data));
                positions.push(position);
            }
            Err(error) => results[position] = Some(Err(CallFailure::Unencodable(error.to_string()))),
        }
    }

    if !encoded.is_empty() {
        let data = encode_aggregate3(&encoded)
            .map_err(|error| ProviderError::CustomError(error.to_string()))?;
        let response = provider
            .call(MULTICALL3, data.into(), block_number.map(U64::from))
            .await?;
        let returns = decode_aggregate3(&response)
            .map_err(|error| ProviderError::CustomError(format!("aggregate3 response: {error}")))?;

        if returns.len() != positions.len() {
            return Err(ProviderError::CustomError(format!(
                "aggregate3 returned {} results for {} calls",
                returns.len(),
                positions.len()
            )));
        }

        for (position, (success, data)) in positions.into_iter().zip(returns) {
            let result = if success {
                calls[position]
                    .function
                    .decode_output(&data)
                    .map_err(|error| CallFailure::Undecodable(error.to_string()))
            } else {
                Err(CallFailure::Reverted)
            };

            results[position] = Some(result);
        }
    }

    Ok(results
        .into_iter()
        .map(|result| result.unwrap_or(Err(CallFailure::Reverted)))
        .collect())
}
