use std::time::{SystemTime, UNIX_EPOCH};

use derive_more::Display;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Kong-Signature";
/// Largest accepted distance between the signed timestamp and now
pub const SIGNATURE_TOLERANCE_SECS: u64 = 300;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum SignatureError {
    #[display("malformed signature header")]
    Malformed,
    #[display("signature timestamp outside tolerance")]
    Stale,
    #[display("signature mismatch")]
    Mismatch,
}

impl std::error::Error for SignatureError {}

/// `t=<timestamp>,v1=<hex hmac-sha256 of "{timestamp}.{body}">`
pub fn sign(secret: &str, body: &[u8], timestamp: u64) -> Result<String, SignatureError> {
    let digest = mac(secret, body, timestamp)?.finalize().into_bytes();

    Ok(format!("t={timestamp},v1={}", hex::encode(digest)))
}

pub fn verify(secret: &str, header: &str, body: &[u8]) -> Result<(), SignatureError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default();

    verify_at(secret, header, body, now)
}

pub fn verify_at(secret: &str, header: &str, body: &[u8], now: u64) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<u64>().ok(),
            Some(("v1", value)) if signature.is_none() => signature = hex::decode(value).ok(),
            _ => {}
        }
    }

    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return Err(SignatureError::Malformed);
    };

    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Stale);
    }

    mac(secret, body, timestamp)?
        .verify_slice(&signature)
        .map_err(|_| SignatureError::Mismatch)
}

fn mac(secret: &str, body: &[u8], timestamp: u64) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);

    Ok(mac)
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_kong";
    const BODY: &[u8] = br#"[{"chainId":1}]"#;

    #[test]
    fn verifies_what_it_signs() {
        let header = sign(SECRET, BODY, 1_716_356_553).unwrap();

        assert!(header.starts_with("t=1716356553,v1="));
        assert_eq!(verify_at(SECRET, &header, BODY, 1_716_356_600), Ok(()));
    }

    #[test]
    fn rejects_stale_tampered_and_malformed() {
        let header = sign(SECRET, BODY, 1_716_356_553).unwrap();

        assert_eq!(
            verify_at(SECRET, &header, BODY, 1_716_356_553 + 301),
            Err(SignatureError::Stale)
        );
        assert_eq!(
            verify_at(SECRET, &header, br#"[{"chainId":10}]"#, 1_716_356_553),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_at("another", &header, BODY, 1_716_356_553),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_at(SECRET, "v1=abcd", BODY, 1_716_356_553),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_at(SECRET, "t=1716356553,v1=zz", BODY, 1_716_356_553),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn compares_keys_in_constant_time() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secrets"));
    }
}
