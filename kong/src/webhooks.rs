//! Outbound webhook jobs: subscriptions, per-fanout batching, delivery and
//! signatures.

mod collector;
mod delivery;
mod signature;
mod subscription;

pub use collector::WebhookCollector;
pub use delivery::{deliver, API_KEY_HEADER};
pub use signature::{sign, verify, verify_at, SignatureError, SIGNATURE_HEADER, SIGNATURE_TOLERANCE_SECS};
pub use subscription::Subscription;
