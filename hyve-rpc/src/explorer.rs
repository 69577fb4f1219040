use async_trait::async_trait;
use serde_json::Value;

use crate::error::RpcError;

/// Typed façade over the explorer HTTP API, spec §4.1. A 404 on a block
/// fetch is deliberately distinguished ([`RpcError::NotFoundOnExplorer`])
/// from every other failure: it means "not yet indexed", a recoverable
/// condition the ingestion pipeline retries rather than treating as an
/// error.
#[async_trait]
pub trait ExplorerClient: Send + Sync {
    /// Fetches the enriched block view by height or hash.
    async fn get_block(&self, height_or_hash: &str) -> Result<Value, RpcError>;
    async fn get_tx(&self, txid: &str) -> Result<Value, RpcError>;
    /// Fetches the enriched address record backing `UpdateInfo` (spec §4.2).
    async fn get_address(&self, hy: &str) -> Result<Value, RpcError>;
    /// `tokenURI(tokenId)` lookup used to enrich retained NFT balance
    /// entries during `UpdateInfo`.
    async fn get_token_uri(&self, contract_hx: &str, token_index: u64) -> Result<String, RpcError>;
}

pub struct HttpExplorerClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpExplorerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn get(&self, method: &'static str, path: String) -> Result<Value, RpcError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .map_err(|source| RpcError::Transient { method, source })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RpcError::NotFoundOnExplorer { what: path });
        }

        let text = response
            .text()
            .await
            .map_err(|source| RpcError::Transient { method, source })?;

        if !status.is_success() {
            return Err(RpcError::Status {
                method,
                status,
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|source| RpcError::Decode { method, source })
    }
}

#[async_trait]
impl ExplorerClient for HttpExplorerClient {
    async fn get_block(&self, height_or_hash: &str) -> Result<Value, RpcError> {
        self.get("explorer.get_block", format!("/block/{height_or_hash}"))
            .await
    }

    async fn get_tx(&self, txid: &str) -> Result<Value, RpcError> {
        self.get("explorer.get_tx", format!("/tx/{txid}")).await
    }

    async fn get_address(&self, hy: &str) -> Result<Value, RpcError> {
        self.get("explorer.get_address", format!("/address/{hy}")).await
    }

    async fn get_token_uri(&self, contract_hx: &str, token_index: u64) -> Result<String, RpcError> {
        let value = self
            .get("explorer.get_token_uri", format!("/address/{contract_hx}/qrc721-token-uri/{token_index}"))
            .await?;
        Ok(value.get("uri").and_then(Value::as_str).unwrap_or_default().to_string())
    }
}
