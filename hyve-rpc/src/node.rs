use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcError;

/// Confirmation depth as reported by `getBlockHeader`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct BlockHeader {
    pub confirmations: u32,
}

/// Result of `executionResult` inside a `callContract` response.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ExecutionResult {
    pub excepted: String,
    pub output: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ContractCallResult {
    #[serde(rename = "executionResult")]
    pub execution_result: ExecutionResult,
}

impl ExecutionResult {
    /// Whether the call excepted, i.e. reverted or ran out of gas — the
    /// node reports this as anything other than `"None"`.
    pub fn excepted(&self) -> bool {
        self.excepted != "None"
    }
}

/// Minimal typed façade over the Hydra node RPC, spec §4.1.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn get_block_count(&self) -> Result<u64, RpcError>;
    async fn get_block_hash(&self, height: u64) -> Result<String, RpcError>;
    async fn get_block_header(&self, hash: &str) -> Result<BlockHeader, RpcError>;
    async fn get_block(&self, hash: &str, verbose: bool) -> Result<Value, RpcError>;
    async fn get_raw_transaction(&self, txid: &str) -> Result<Value, RpcError>;
    async fn decode_raw_transaction(&self, raw: &str) -> Result<Value, RpcError>;
    async fn search_logs(&self, from: u64, to: u64) -> Result<Value, RpcError>;
    async fn call_contract(&self, addr: &str, data: &str) -> Result<ContractCallResult, RpcError>;
    async fn validate_address(&self, addr: &str) -> Result<bool, RpcError>;
    async fn get_hex_address(&self, addr: &str) -> Result<String, RpcError>;
    async fn from_hex_address(&self, hex_addr: &str) -> Result<String, RpcError>;
}

/// `reqwest`-backed JSON-RPC implementation of [`NodeClient`].
pub struct HttpNodeClient {
    client: reqwest::Client,
    url: String,
}

impl HttpNodeClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    async fn call(&self, method: &'static str, params: Value) -> Result<Value, RpcError> {
        let body = serde_json::json!({
            "jsonrpc": "1.0",
            "id": "hyve",
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|source| RpcError::Transient { method, source })?;

        let status = response.status();
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

        let envelope: RpcEnvelope =
            serde_json::from_str(&text).map_err(|source| RpcError::Decode { method, source })?;

        if let Some(error) = envelope.error {
            return Err(RpcError::NodeError {
                method,
                code: error.code,
                message: error.message,
            });
        }

        envelope
            .result
            .ok_or_else(|| RpcError::NodeError {
                method,
                code: 0,
                message: "missing result".to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<Value>,
    error: Option<RpcEnvelopeError>,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelopeError {
    code: i64,
    message: String,
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn get_block_count(&self) -> Result<u64, RpcError> {
        let value = self.call("getblockcount", serde_json::json!([])).await?;
        value.as_u64().ok_or_else(|| RpcError::NodeError {
            method: "getblockcount",
            code: 0,
            message: format!("expected a numeric height, got {value}"),
        })
    }

    async fn get_block_hash(&self, height: u64) -> Result<String, RpcError> {
        let value = self.call("getblockhash", serde_json::json!([height])).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeader, RpcError> {
        let value = self
            .call("getblockheader", serde_json::json!([hash]))
            .await?;
        serde_json::from_value(value).map_err(|source| RpcError::Decode {
            method: "getblockheader",
            source,
        })
    }

    async fn get_block(&self, hash: &str, verbose: bool) -> Result<Value, RpcError> {
        self.call("getblock", serde_json::json!([hash, verbose])).await
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<Value, RpcError> {
        self.call("getrawtransaction", serde_json::json!([txid, true]))
            .await
    }

    async fn decode_raw_transaction(&self, raw: &str) -> Result<Value, RpcError> {
        self.call("decoderawtransaction", serde_json::json!([raw])).await
    }

    async fn search_logs(&self, from: u64, to: u64) -> Result<Value, RpcError> {
        self.call(
            "searchlogs",
            serde_json::json!([{"fromBlock": from, "toBlock": to}]),
        )
        .await
    }

    async fn call_contract(&self, addr: &str, data: &str) -> Result<ContractCallResult, RpcError> {
        let value = self
            .call("callcontract", serde_json::json!([addr, data]))
            .await?;
        serde_json::from_value(value).map_err(|source| RpcError::Decode {
            method: "callcontract",
            source,
        })
    }

    async fn validate_address(&self, addr: &str) -> Result<bool, RpcError> {
        let value = self
            .call("validateaddress", serde_json::json!([addr]))
            .await?;
        Ok(value.get("isvalid").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn get_hex_address(&self, addr: &str) -> Result<String, RpcError> {
        let value = self
            .call("gethexaddress", serde_json::json!([addr]))
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn from_hex_address(&self, hex_addr: &str) -> Result<String, RpcError> {
        let value = self
            .call("fromhexaddress", serde_json::json!([hex_addr]))
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}
