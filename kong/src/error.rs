use derive_more::Display;

use crate::pools::PoolError;
use crate::provider::ProviderError;
use crate::queues::QueueError;
use crate::repos::RepoError;
use crate::ChainId;

/// Why a job did not finish. [`JobError::is_retryable`] decides whether the
/// queue sees it again.
#[derive(Debug, Display)]
pub enum JobError {
    #[display("unsupported chain {_0}")]
    UnsupportedChain(ChainId),
    #[display("batched reads unsupported on chain {chain_id} at block {block_number}")]
    BatchUnsupportedAtHeight { chain_id: ChainId, block_number: u64 },
    #[display("transport failure: {_0}")]
    TransportFailure(String),
    #[display("authentication failure: {_0}")]
    AuthenticationFailure(String),
    #[display("schema violation: {_0}")]
    SchemaViolation(String),
    #[display("repo failure: {_0}")]
    Repo(RepoError),
    #[display("queue failure: {_0}")]
    Queue(QueueError),
}

impl std::error::Error for JobError {}

impl JobError {
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::TransportFailure(_) | JobError::Repo(_) | JobError::Queue(_) => true,
            JobError::UnsupportedChain(_)
            | JobError::BatchUnsupportedAtHeight { .. }
            | JobError::AuthenticationFailure(_)
            | JobError::SchemaViolation(_) => false,
        }
    }
}

impl From<ProviderError> for JobError {
    fn from(error: ProviderError) -> Self {
        JobError::TransportFailure(error.to_string())
    }
}

impl From<PoolError> for JobError {
    fn from(error: PoolError) -> Self {
        match error {
            PoolError::UnsupportedChain(chain_id) => JobError::UnsupportedChain(chain_id),
            error => JobError::TransportFailure(error.to_string()),
        }
    }
}

impl From<RepoError> for JobError {
    fn from(error: RepoError) -> Self {
        JobError::Repo(error)
    }
}

impl From<QueueError> for JobError {
    fn from(error: QueueError) -> Self {
        match error {
            QueueError::SchemaViolation(message) => JobError::SchemaViolation(message),
            error => JobError::Queue(error),
        }
    }
}

impl From<reqwest::Error> for JobError {
    fn from(error: reqwest::Error) -> Self {
        JobError::TransportFailure(error.to_string())
    }
}

impl From<serde_json::Error> for JobError {
    fn from(error: serde_json::Error) -> Self {
        JobError::SchemaViolation(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_retryable_errors() {
        assert!(JobError::TransportFailure("timeout".to_string()).is_retryable());
        assert!(JobError::Repo(RepoError::NotConnected).is_retryable());
        assert!(!JobError::AuthenticationFailure("key".to_string()).is_retryable());
        assert!(!JobError::SchemaViolation("shape".to_string()).is_retryable());
        assert!(!JobError::UnsupportedChain(10).is_retryable());
    }

    #[test]
    fn keeps_queue_schema_violations_terminal() {
        let error = JobError::from(QueueError::SchemaViolation("unknown job".to_string()));

        assert!(matches!(error, JobError::SchemaViolation(_)));
        assert!(!error.is_retryable());
    }

    #[test]
    fn surfaces_unknown_chains_from_the_pool() {
        let error = JobError::from(PoolError::UnsupportedChain(250));

        assert_eq!(error.to_string(), "unsupported chain 250");
    }
}
