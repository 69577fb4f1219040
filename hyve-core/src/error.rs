use thiserror::Error;

use hyve_rpc::RpcError;

use crate::store::StoreError;

/// Backoff used when an explorer block fetch 404s — "not yet indexed".
pub const NOT_FOUND_RETRY_SECS: u64 = 10;
/// Backoff used for any other RPC failure while making a block.
pub const RPC_FAILURE_RETRY_SECS: u64 = 30;
/// Backoff used when the fetched payload fails to deserialise.
pub const DESERIALIZE_FAILURE_RETRY_SECS: u64 = 60;
/// Backoff used after a validation failure (malformed address, mismatched
/// `(height, hash)`).
pub const VALIDATION_RETRY_SECS: u64 = 60;

/// The five error kinds from spec §7.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("transient RPC failure: {0}")]
    TransientRpc(#[from] RpcError),

    #[error("explorer has not yet indexed this block: {0}")]
    NotFoundOnExplorer(String),

    #[error("storage integrity failure, retrying MakeBlock: {0}")]
    Integrity(#[source] StoreError),

    #[error("validation failure: {0}")]
    Validation(String),

    #[error("fatal error, process must exit: {0}")]
    Fatal(String),
}

impl IndexerError {
    /// The fixed backoff to sleep before retrying this failure, or `None`
    /// if the failure is not retried at all (`Fatal`).
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            IndexerError::TransientRpc(RpcError::NotFoundOnExplorer { .. }) => {
                Some(NOT_FOUND_RETRY_SECS)
            }
            IndexerError::TransientRpc(RpcError::Decode { .. }) => Some(DESERIALIZE_FAILURE_RETRY_SECS),
            IndexerError::TransientRpc(_) => Some(RPC_FAILURE_RETRY_SECS),
            IndexerError::NotFoundOnExplorer(_) => Some(NOT_FOUND_RETRY_SECS),
            IndexerError::Integrity(_) => Some(0),
            IndexerError::Validation(_) => Some(VALIDATION_RETRY_SECS),
            IndexerError::Fatal(_) => None,
        }
    }
}

impl From<StoreError> for IndexerError {
    fn from(err: StoreError) -> Self {
        IndexerError::Integrity(err)
    }
}
