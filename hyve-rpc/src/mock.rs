//! In-memory, scriptable implementations of [`NodeClient`] and
//! [`ExplorerClient`], used by unit tests across the workspace and by
//! `hyve-integration-tests`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RpcError;
use crate::explorer::ExplorerClient;
use crate::node::{BlockHeader, ContractCallResult, ExecutionResult, NodeClient};

#[derive(Default)]
pub struct MockNodeClient {
    inner: Mutex<MockNodeState>,
}

#[derive(Default)]
struct MockNodeState {
    height: u64,
    hash_by_height: HashMap<u64, String>,
    header_by_hash: HashMap<String, BlockHeader>,
    contract_calls: HashMap<(String, String), ContractCallResult>,
    hex_by_addr: HashMap<String, String>,
    addr_by_hex: HashMap<String, String>,
}

impl MockNodeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_height(&self, height: u64) {
        self.inner.lock().unwrap().height = height;
    }

    pub fn set_hash(&self, height: u64, hash: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .hash_by_height
            .insert(height, hash.into());
    }

    pub fn set_confirmations(&self, hash: impl Into<String>, confirmations: u32) {
        self.inner
            .lock()
            .unwrap()
            .header_by_hash
            .insert(hash.into(), BlockHeader { confirmations });
    }

    /// Scripts the response of `callContract(addr, data)`, keyed on the
    /// 4-byte selector carried in `data` so the Address Registry's
    /// sequential `name()`/`symbol()`/`totalSupply()`/`decimals()` probe
    /// can be driven deterministically in tests.
    pub fn set_contract_call(&self, addr: &str, selector: &str, excepted: bool, output: &str) {
        self.inner.lock().unwrap().contract_calls.insert(
            (addr.to_string(), selector.to_string()),
            ContractCallResult {
                execution_result: ExecutionResult {
                    excepted: if excepted { "Revert".to_string() } else { "None".to_string() },
                    output: output.to_string(),
                },
            },
        );
    }

    pub fn set_hex_mapping(&self, base36: impl Into<String>, hex: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        let (base36, hex) = (base36.into(), hex.into());
        inner.hex_by_addr.insert(base36.clone(), hex.clone());
        inner.addr_by_hex.insert(hex, base36);
    }
}

#[async_trait]
impl NodeClient for MockNodeClient {
    async fn get_block_count(&self) -> Result<u64, RpcError> {
        Ok(self.inner.lock().unwrap().height)
    }

    async fn get_block_hash(&self, height: u64) -> Result<String, RpcError> {
        self.inner
            .lock()
            .unwrap()
            .hash_by_height
            .get(&height)
            .cloned()
            .ok_or_else(|| RpcError::NodeError {
                method: "getblockhash",
                code: -8,
                message: format!("no hash scripted for height {height}"),
            })
    }

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeader, RpcError> {
        self.inner
            .lock()
            .unwrap()
            .header_by_hash
            .get(hash)
            .copied()
            .ok_or_else(|| RpcError::NodeError {
                method: "getblockheader",
                code: -5,
                message: format!("no header scripted for hash {hash}"),
            })
    }

    async fn get_block(&self, _hash: &str, _verbose: bool) -> Result<Value, RpcError> {
        Ok(Value::Null)
    }

    async fn get_raw_transaction(&self, _txid: &str) -> Result<Value, RpcError> {
        Ok(Value::Null)
    }

    async fn decode_raw_transaction(&self, _raw: &str) -> Result<Value, RpcError> {
        Ok(Value::Null)
    }

    async fn search_logs(&self, _from: u64, _to: u64) -> Result<Value, RpcError> {
        Ok(Value::Array(vec![]))
    }

    async fn call_contract(&self, addr: &str, data: &str) -> Result<ContractCallResult, RpcError> {
        let selector = &data.get(..8).unwrap_or(data);
        self.inner
            .lock()
            .unwrap()
            .contract_calls
            .get(&(addr.to_string(), (*selector).to_string()))
            .cloned()
            .ok_or_else(|| RpcError::NodeError {
                method: "callcontract",
                code: -1,
                message: format!("no contract call scripted for {addr} {selector}"),
            })
    }

    async fn validate_address(&self, addr: &str) -> Result<bool, RpcError> {
        Ok(addr.len() == 34 || addr.len() == 40)
    }

    async fn get_hex_address(&self, addr: &str) -> Result<String, RpcError> {
        self.inner
            .lock()
            .unwrap()
            .hex_by_addr
            .get(addr)
            .cloned()
            .ok_or_else(|| RpcError::NodeError {
                method: "gethexaddress",
                code: -5,
                message: format!("no hex mapping scripted for {addr}"),
            })
    }

    async fn from_hex_address(&self, hex_addr: &str) -> Result<String, RpcError> {
        self.inner
            .lock()
            .unwrap()
            .addr_by_hex
            .get(hex_addr)
            .cloned()
            .ok_or_else(|| RpcError::NodeError {
                method: "fromhexaddress",
                code: -5,
                message: format!("no address mapping scripted for {hex_addr}"),
            })
    }
}

#[derive(Default)]
pub struct MockExplorerClient {
    blocks: Mutex<HashMap<String, Value>>,
    txs: Mutex<HashMap<String, Value>>,
    addresses: Mutex<HashMap<String, Value>>,
    token_uris: Mutex<HashMap<(String, u64), String>>,
}

impl MockExplorerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_block(&self, height_or_hash: impl Into<String>, block: Value) {
        self.blocks.lock().unwrap().insert(height_or_hash.into(), block);
    }

    pub fn set_tx(&self, txid: impl Into<String>, tx: Value) {
        self.txs.lock().unwrap().insert(txid.into(), tx);
    }

    pub fn set_address(&self, hy: impl Into<String>, info: Value) {
        self.addresses.lock().unwrap().insert(hy.into(), info);
    }

    pub fn set_token_uri(&self, contract_hx: impl Into<String>, token_index: u64, uri: impl Into<String>) {
        self.token_uris
            .lock()
            .unwrap()
            .insert((contract_hx.into(), token_index), uri.into());
    }
}

#[async_trait]
impl ExplorerClient for MockExplorerClient {
    async fn get_block(&self, height_or_hash: &str) -> Result<Value, RpcError> {
        self.blocks
            .lock()
            .unwrap()
            .get(height_or_hash)
            .cloned()
            .ok_or_else(|| RpcError::NotFoundOnExplorer {
                what: height_or_hash.to_string(),
            })
    }

    async fn get_tx(&self, txid: &str) -> Result<Value, RpcError> {
        self.txs
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .ok_or_else(|| RpcError::NotFoundOnExplorer {
                what: txid.to_string(),
            })
    }

    async fn get_address(&self, hy: &str) -> Result<Value, RpcError> {
        self.addresses
            .lock()
            .unwrap()
            .get(hy)
            .cloned()
            .ok_or_else(|| RpcError::NotFoundOnExplorer { what: hy.to_string() })
    }

    async fn get_token_uri(&self, contract_hx: &str, token_index: u64) -> Result<String, RpcError> {
        self.token_uris
            .lock()
            .unwrap()
            .get(&(contract_hx.to_string(), token_index))
            .cloned()
            .ok_or_else(|| RpcError::NotFoundOnExplorer {
                what: format!("{contract_hx}#{token_index}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn node_mock_serves_scripted_height_and_hash() {
        let node = MockNodeClient::new();
        node.set_height(160_388);
        node.set_hash(160_388, "hash388");
        node.set_confirmations("hash388", 3);

        assert_eq!(node.get_block_count().await.unwrap(), 160_388);
        assert_eq!(node.get_block_hash(160_388).await.unwrap(), "hash388");
        assert_eq!(node.get_block_header("hash388").await.unwrap().confirmations, 3);
    }

    #[tokio::test]
    async fn node_mock_missing_hash_is_an_error() {
        let node = MockNodeClient::new();
        assert!(node.get_block_hash(1).await.is_err());
    }

    #[tokio::test]
    async fn explorer_mock_404s_on_unscripted_block() {
        let explorer = MockExplorerClient::new();
        explorer.set_block("200000", json!({"height": 200000}));

        assert!(explorer.get_block("200000").await.is_ok());
        assert!(matches!(
            explorer.get_block("999999").await,
            Err(RpcError::NotFoundOnExplorer { .. })
        ));
    }
}
