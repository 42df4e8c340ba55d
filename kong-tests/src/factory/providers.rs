use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ethers::abi::{self, parse_abi, Function, ParamType, Token};
use ethers::providers::ProviderError;
use ethers::types::{Address, Block, Bytes, Filter, Log, TxHash, H160, H256, U256, U64};
use kong::multicall::MULTICALL3;
use kong::pools::{Connector, PoolError};
use kong::provider::Provider;
use kong::{Chain, ChainId};
use rand::seq::SliceRandom;

pub const BAYC_CONTRACT_ADDRESS: &str = "0xBC4CA0EdA7647A8aB7C2061c2E118A18a936f13D";

/// A known mainnet block and its timestamp
pub const MAINNET_TRUTH_BLOCK: u64 = 19_923_412;
pub const MAINNET_TRUTH_TIME: u64 = 1_716_356_553;

/// Mainnet-like timestamps: 12s blocks up to the known block, 13s after
pub fn mainnet_block_time(block_number: u64) -> u64 {
    if block_number <= MAINNET_TRUTH_BLOCK {
        MAINNET_TRUTH_TIME - 12 * (MAINNET_TRUTH_BLOCK - block_number)
    } else {
        MAINNET_TRUTH_TIME + 13 * (block_number - MAINNET_TRUTH_BLOCK)
    }
}

type BlockTimes = Box<dyn Fn(u64) -> u64 + Send + Sync>;

/// A chain held in memory. Answers Multicall3 `aggregate3` batches from the
/// responses registered with [`MockProvider::respond`]; unregistered calls
/// revert.
pub struct MockProvider {
    head: u64,
    block_times: BlockTimes,
    logs: Vec<Log>,
    responses: HashMap<(Address, Vec<u8>), Vec<u8>>,
    unreachable: AtomicBool,
    batches: Mutex<Vec<usize>>,
    filters: Mutex<Vec<Filter>>,
}

impl MockProvider {
    pub fn new(head: u64) -> Self {
        Self {
            head,
            block_times: Box::new(mainnet_block_time),
            logs: vec![],
            responses: HashMap::new(),
            unreachable: AtomicBool::new(false),
            batches: Mutex::new(vec![]),
            filters: Mutex::new(vec![]),
        }
    }

    pub fn with_block_times(mut self, block_times: impl Fn(u64) -> u64 + Send + Sync + 'static) -> Self {
        self.block_times = Box::new(block_times);

        self
    }

    pub fn with_logs(mut self, logs: Vec<Log>) -> Self {
        self.logs = logs;

        self
    }

    /// Answers `function(args)` on `target` with `output`
    pub fn respond(mut self, target: Address, function: &Function, args: &[Token], output: &[Token]) -> Self {
        let calldata = function.encode_input(args).unwrap();
        self.responses.insert((target, calldata), abi::encode(output));

        self
    }

    /// Every request fails from now on
    pub fn go_down(&self) {
        self.unreachable.store(true, Ordering::SeqCst);
    }

    /// Sizes of the `aggregate3` batches answered so far
    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    pub fn filters(&self) -> Vec<Filter> {
        self.filters.lock().unwrap().clone()
    }

    fn check_reachable(&self) -> Result<(), ProviderError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(ProviderError::CustomError("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn aggregate3(&self, data: &[u8]) -> Result<Bytes, ProviderError> {
        let calls = abi::decode(
            &[ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Address,
                ParamType::Bool,
                ParamType::Bytes,
            ])))],
            &data[4..],
        )
        .map_err(|error| ProviderError::CustomError(error.to_string()))?;

        let Some(Token::Array(calls)) = calls.into_iter().next() else {
            return Err(ProviderError::CustomError("not an aggregate3 call".to_string()));
        };

        self.batches.lock().unwrap().push(calls.len());

        let results = calls
            .into_iter()
            .map(|call| {
                let response = match call {
                    Token::Tuple(fields) => match fields.as_slice() {
                        [Token::Address(target), _, Token::Bytes(calldata)] => {
                            self.responses.get(&(*target, calldata.clone())).cloned()
                        }
                        _ => None,
                    },
                    _ => None,
                };

                match response {
                    Some(data) => Token::Tuple(vec![Token::Bool(true), Token::Bytes(data)]),
                    None => Token::Tuple(vec![Token::Bool(false), Token::Bytes(vec![])]),
                }
            })
            .collect();

        Ok(abi::encode(&[Token::Array(results)]).into())
    }
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    async fn get_block_number(&self) -> Result<U64, ProviderError> {
        self.check_reachable()?;

        Ok(U64::from(self.head))
    }

    async fn get_block(&self, block_number: U64) -> Result<Option<Block<TxHash>>, ProviderError> {
        self.check_reachable()?;

        let block_number = block_number.as_u64();
        if block_number > self.head {
            return Ok(None);
        }

        Ok(Some(Block {
            number: Some(U64::from(block_number)),
            timestamp: U256::from((self.block_times)(block_number)),
            ..Default::default()
        }))
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ProviderError> {
        self.check_reachable()?;
        self.filters.lock().unwrap().push(filter.clone());

        let from = filter.get_from_block().unwrap_or_default();
        let to = filter.get_to_block().unwrap_or(U64::from(self.head));

        Ok(self
            .logs
            .iter()
            .filter(|log| log.block_number.is_some_and(|n| n >= from && n <= to))
            .cloned()
            .collect())
    }

    async fn call(
        &self,
        to: Address,
        data: Bytes,
        _block_number: Option<U64>,
    ) -> Result<Bytes, ProviderError> {
        self.check_reachable()?;

        if to == MULTICALL3 {
            return self.aggregate3(&data);
        }

        Ok(self
            .responses
            .get(&(to, data.to_vec()))
            .cloned()
            .unwrap_or_default()
            .into())
    }
}

/// Hands out the same mock provider for every connection to a chain
#[derive(Default)]
pub struct MockConnector {
    providers: HashMap<ChainId, Arc<MockProvider>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, chain_id: ChainId, provider: Arc<MockProvider>) -> Self {
        self.providers.insert(chain_id, provider);

        self
    }
}

impl Connector for MockConnector {
    fn connect(&self, chain: &Chain, _url: &str) -> Result<Arc<dyn Provider>, PoolError> {
        self.providers
            .get(&chain.id)
            .map(|provider| provider.clone() as Arc<dyn Provider>)
            .ok_or(PoolError::UnsupportedChain(chain.id))
    }
}

pub fn function(signature: &str) -> Function {
    parse_abi(&[signature])
        .unwrap()
        .functions()
        .next()
        .unwrap()
        .clone()
}

pub fn transfer_log(contract_address: &str, block_number: u64) -> Log {
    let log_index = *(1..800).collect::<Vec<_>>().choose(&mut rand::thread_rng()).unwrap();

    Log {
        address: H160::from_str(contract_address).unwrap(),
        topics: vec![
            h256("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"),
            h256("0x000000000000000000000000b518b3136e491101f22b77f385fe22269c515188"),
            h256("0x0000000000000000000000007dfd6013cf8d92b751e63d481b51fe0e4c5abf5e"),
            h256("0x000000000000000000000000000000000000000000000000000000000000067d"),
        ],
        data: Bytes::default(),
        block_hash: Some(h256(
            "0x8fd4ca304a2e81854059bc3e42f32064cca8b6b453f6286f95060edc6382c6f8",
        )),
        block_number: Some(block_number.into()),
        transaction_hash: Some(h256(
            "0x83d751998ff98cd609bc9b18bb36bdef8659cde2f74d6d7a1b0fef2c2bf8f839",
        )),
        transaction_index: Some(89.into()),
        log_index: Some(log_index.into()),
        transaction_log_index: None,
        log_type: None,
        removed: Some(false),
    }
}

pub fn transfer_recipient() -> Address {
    Address::from_str("0x7dfd6013cf8d92b751e63d481b51fe0e4c5abf5e").unwrap()
}

fn h256(str: &str) -> H256 {
    H256::from_str(str).unwrap()
}
