use thiserror::Error;

/// Error surface for both the node RPC client and the explorer HTTP
/// client. Callers classify failures per spec §7: `Transient`/`NotFound`
/// are retried locally with backoff, `Fatal` surfaces to the operator.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transient RPC failure calling {method}: {source}")]
    Transient {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} returned HTTP {status}: {body}")]
    Status {
        method: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    /// Explorer 404 on a block fetch: the block is not yet indexed, a
    /// recoverable signal distinct from any other status error.
    #[error("explorer has not yet indexed {what}")]
    NotFoundOnExplorer { what: String },

    #[error("failed to decode response from {method}: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("node returned an RPC error for {method}: {code} {message}")]
    NodeError {
        method: &'static str,
        code: i64,
        message: String,
    },

    /// Authentication or configuration failure — not retried.
    #[error("fatal RPC configuration error: {0}")]
    Fatal(String),
}

impl RpcError {
    /// Whether this failure is recoverable by local retry per spec §7's
    /// `TransientRPC`/`NotFoundOnExplorer` classification.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RpcError::Fatal(_))
    }
}
