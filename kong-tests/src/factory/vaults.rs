use std::str::FromStr;

use ethers::abi::Token;
use ethers::types::{Address, U256};

use super::{function, MockProvider};

/// yvUSDC 0.4.3
pub const VAULT_ADDRESS: &str = "0xa354F35829Ae975e850e23e9615b11Da1B3dC4DE";
pub const USDC_ADDRESS: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

pub fn vault_address() -> Address {
    Address::from_str(VAULT_ADDRESS).unwrap()
}

pub fn usdc_address() -> Address {
    Address::from_str(USDC_ADDRESS).unwrap()
}

pub fn strategy_addresses(count: u8) -> Vec<Address> {
    (1..=count).map(|n| Address::repeat_byte(0x10 + n)).collect()
}

fn string(value: &str) -> Vec<Token> {
    vec![Token::String(value.to_string())]
}

fn uint(value: u64) -> Vec<Token> {
    vec![Token::Uint(U256::from(value))]
}

fn address(value: Address) -> Vec<Token> {
    vec![Token::Address(value)]
}

fn erc20(provider: MockProvider, token: Address, name: &str, symbol: &str, decimals: u64) -> MockProvider {
    provider
        .respond(token, &function("function name() view returns (string)"), &[], &string(name))
        .respond(token, &function("function symbol() view returns (string)"), &[], &string(symbol))
        .respond(token, &function("function decimals() view returns (uint8)"), &[], &uint(decimals))
}

/// Answers every read a vault extraction makes: the vault's fields, its share
/// and asset tokens, and a withdrawal queue holding `strategies`
pub fn vault_provider(head: u64, strategies: &[Address]) -> MockProvider {
    let vault = vault_address();
    let usdc = usdc_address();

    let mut provider = MockProvider::new(head)
        .respond(vault, &function("function token() view returns (address)"), &[], &address(usdc))
        .respond(
            vault,
            &function("function totalAssets() view returns (uint256)"),
            &[],
            &uint(125_000_000_000),
        )
        .respond(vault, &function("function apiVersion() view returns (string)"), &[], &string("0.4.3"))
        .respond(
            vault,
            &function("function governance() view returns (address)"),
            &[],
            &address(Address::repeat_byte(0xfe)),
        )
        .respond(
            vault,
            &function("function management() view returns (address)"),
            &[],
            &address(Address::repeat_byte(0xfd)),
        );

    provider = erc20(provider, vault, "USDC yVault", "yvUSDC", 6);
    provider = erc20(provider, usdc, "USD Coin", "USDC", 6);

    let withdrawal_queue = function("function withdrawalQueue(uint256) view returns (address)");
    let queued = strategies.iter().copied().chain(std::iter::once(Address::zero()));
    for (index, strategy) in queued.enumerate() {
        provider = provider.respond(vault, &withdrawal_queue, &uint(index as u64), &address(strategy));
    }

    provider
}

/// Adds the reads of one strategy extraction
pub fn with_strategy(provider: MockProvider, strategy: Address, name: &str) -> MockProvider {
    provider
        .respond(strategy, &function("function name() view returns (string)"), &[], &string(name))
        .respond(strategy, &function("function apiVersion() view returns (string)"), &[], &string("0.4.3"))
        .respond(strategy, &function("function vault() view returns (address)"), &[], &address(vault_address()))
        .respond(strategy, &function("function want() view returns (address)"), &[], &address(usdc_address()))
        .respond(
            strategy,
            &function("function estimatedTotalAssets() view returns (uint256)"),
            &[],
            &uint(41_000_000_000),
        )
}
