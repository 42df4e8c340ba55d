use ethers::types::{H160, H256};

pub struct Hashes;

impl Hashes {
    /// Full lowercase `0x`-prefixed hex, the form addresses are keyed by in storage
    pub fn h160_to_string(h160: &H160) -> String {
        format!("{h160:?}")
    }

    pub fn h256_to_string(h256: &H256) -> String {
        format!("{h256:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn renders_full_lowercase_hex() {
        let address = H160::from_str("0xBC4CA0EdA7647A8aB7C2061c2E118A18a936f13D").unwrap();

        assert_eq!(
            Hashes::h160_to_string(&address),
            "0xbc4ca0eda7647a8ab7c2061c2e118a18a936f13d"
        );
    }
}
