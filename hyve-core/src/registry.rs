//! The Address Registry: address normalisation, contract classification,
//! and the `UpdateInfo` refresh cycle (spec §4.2).

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use hyve_rpc::{ExplorerClient, NodeClient};
use hyve_types::{Address, AddressType, JsonPatch};
use lru::LruCache;
use serde_json::Value;
use tracing::debug;

/// Capacity of the normalisation-result cache. Spec §4.2's resource policy
/// leaves the pure name-lookup caches (`hex_of`/`base36_of`/`valid`)
/// explicitly unbounded but allows bounding "the caches" generally with
/// LRU if memory pressure matters; the per-height-hint normalisation memo
/// is the one that actually grows without limit across a long-running
/// server (one entry per distinct `(input, height_hint)` pair ever seen),
/// so it's the one given an eviction policy.
const NORMALIZE_MEMO_CAPACITY: usize = 50_000;

use crate::error::IndexerError;
use crate::store::Store;

/// `name()`, `symbol()`, `totalSupply()`, `decimals()` — the four selectors
/// probed, in order, to classify a 40-hex address (spec §4.2).
const SELECTOR_NAME: &str = "06fdde03";
const SELECTOR_SYMBOL: &str = "95d89b41";
const SELECTOR_TOTAL_SUPPLY: &str = "18160ddd";
const SELECTOR_DECIMALS: &str = "313ce567";

/// The canonical `(hex, base36)` pair an arbitrary address string resolves
/// to, plus the height it was resolved at — the "memo key includes a
/// height hint" rule from §4.2.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NormalizeKey {
    input: String,
    height_hint: u64,
}

#[derive(Debug, Clone)]
struct Normalized {
    hx: String,
    hy: String,
}

/// Normalises and classifies addresses, memoising pure name lookups
/// (unbounded, per spec §4.2) and full normalisation results (keyed by
/// height hint so callers can force a re-probe, LRU-bounded per the
/// resource policy's "implementers may bound the caches" allowance).
pub struct AddressRegistry {
    hex_of: Mutex<HashMap<String, String>>,
    base36_of: Mutex<HashMap<String, String>>,
    valid: Mutex<HashMap<String, bool>>,
    normalize_memo: Mutex<LruCache<NormalizeKey, Normalized>>,
}

impl Default for AddressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self {
            hex_of: Mutex::new(HashMap::new()),
            base36_of: Mutex::new(HashMap::new()),
            valid: Mutex::new(HashMap::new()),
            normalize_memo: Mutex::new(LruCache::new(
                NonZeroUsize::new(NORMALIZE_MEMO_CAPACITY).expect("capacity is a nonzero constant"),
            )),
        }
    }

    /// Converts any address string (34-char base-36 or 40-hex) into its
    /// canonical `(hx, hy)` pair via the node's encoding endpoints.
    pub async fn normalize(
        &self,
        node: &dyn NodeClient,
        input: &str,
        height_hint: u64,
    ) -> Result<(String, String), IndexerError> {
        let key = NormalizeKey {
            input: input.to_string(),
            height_hint,
        };
        if let Some(hit) = self.normalize_memo.lock().unwrap().get(&key) {
            return Ok((hit.hx.clone(), hit.hy.clone()));
        }

        let (hx, hy) = match input.len() {
            34 => {
                let hx = self.hex_for(node, input).await?;
                (hx, input.to_string())
            }
            40 => {
                let hy = self.base36_for(node, input).await?;
                (input.to_string(), hy)
            }
            other => {
                return Err(IndexerError::Validation(format!(
                    "address {input:?} has invalid length {other}"
                )))
            }
        };

        self.normalize_memo.lock().unwrap().put(
            key,
            Normalized {
                hx: hx.clone(),
                hy: hy.clone(),
            },
        );
        Ok((hx, hy))
    }

    async fn hex_for(&self, node: &dyn NodeClient, base36: &str) -> Result<String, IndexerError> {
        if let Some(hit) = self.hex_of.lock().unwrap().get(base36) {
            return Ok(hit.clone());
        }
        let hx = node.get_hex_address(base36).await?;
        self.hex_of.lock().unwrap().insert(base36.to_string(), hx.clone());
        Ok(hx)
    }

    async fn base36_for(&self, node: &dyn NodeClient, hex: &str) -> Result<String, IndexerError> {
        if let Some(hit) = self.base36_of.lock().unwrap().get(hex) {
            return Ok(hit.clone());
        }
        let hy = node.from_hex_address(hex).await?;
        self.base36_of.lock().unwrap().insert(hex.to_string(), hy.clone());
        Ok(hy)
    }

    pub async fn is_valid(&self, node: &dyn NodeClient, addr: &str) -> Result<bool, IndexerError> {
        if let Some(hit) = self.valid.lock().unwrap().get(addr) {
            return Ok(*hit);
        }
        let ok = node.validate_address(addr).await?;
        self.valid.lock().unwrap().insert(addr.to_string(), ok);
        Ok(ok)
    }

    /// Probes the four ERC-20 selectors in order and classifies the
    /// 40-hex address accordingly.
    pub async fn classify(&self, node: &dyn NodeClient, hx: &str) -> Result<AddressType, IndexerError> {
        let name_ok = !self.call_excepted(node, hx, SELECTOR_NAME).await?;
        if !name_ok {
            return Ok(AddressType::Wallet);
        }

        let _symbol_ok = !self.call_excepted(node, hx, SELECTOR_SYMBOL).await?;
        let total_supply_ok = !self.call_excepted(node, hx, SELECTOR_TOTAL_SUPPLY).await?;
        if !total_supply_ok {
            return Ok(AddressType::Contract);
        }

        let decimals_ok = !self.call_excepted(node, hx, SELECTOR_DECIMALS).await?;
        if decimals_ok {
            Ok(AddressType::Token)
        } else {
            Ok(AddressType::Nft)
        }
    }

    async fn call_excepted(&self, node: &dyn NodeClient, hx: &str, selector: &str) -> Result<bool, IndexerError> {
        let result = node.call_contract(hx, selector).await?;
        Ok(result.execution_result.excepted())
    }

    /// `Get(address, create)` from spec §4.2: looks the address up by
    /// either form, classifying and inserting it on first sight.
    pub async fn get(
        &self,
        store: &dyn Store,
        node: &dyn NodeClient,
        input: &str,
        height_hint: u64,
        create: bool,
    ) -> Result<Option<Address>, IndexerError> {
        let (hx, hy) = self.normalize(node, input, height_hint).await?;

        if let Some(existing) = store.get_address_by_hex(&hx).await? {
            return Ok(Some(existing));
        }
        if !create {
            return Ok(None);
        }

        let kind = self.classify(node, &hx).await?;
        let address = store.insert_address(kind, hx, hy, height_hint).await?;
        Ok(Some(address))
    }

    /// `UpdateInfo(addr) -> bool` from spec §4.2: refreshes `info` from the
    /// explorer, stripping volatile balance sub-records, and writes back
    /// only if the result differs by deep equality.
    pub async fn update_info(
        &self,
        store: &dyn Store,
        explorer: &dyn ExplorerClient,
        address: &Address,
        height: u64,
    ) -> Result<bool, IndexerError> {
        let mut explorer_info = explorer.get_address(&address.hy).await?;
        strip_volatile_fields(&mut explorer_info, address.kind);
        if address.kind == AddressType::Nft {
            self.enrich_nft_balances(explorer, &address.hx, &mut explorer_info).await?;
        }

        let refreshed = JsonPatch::new(explorer_info);
        match address.info.apply_if_changed(refreshed.as_value(), true) {
            Some(changed) => {
                store.update_address_info(address.id, changed, height).await?;
                Ok(true)
            }
            None => {
                debug!(addr_id = address.id, "UpdateInfo: no change");
                Ok(false)
            }
        }
    }
}

/// Removes `qrc20Balances`/`qrc721Balances`, and for contracts the
/// statically-known `qrc20`/`qrc721` metadata, per spec §4.2.
fn strip_volatile_fields(info: &mut Value, kind: AddressType) {
    if let Value::Object(map) = info {
        map.remove("qrc20Balances");
        map.remove("qrc721Balances");
        if matches!(kind, AddressType::Contract | AddressType::Token | AddressType::Nft) {
            map.remove("qrc20");
            map.remove("qrc721");
        }
    }
}

impl AddressRegistry {
    /// For an NFT-holding wallet, replaces the bare `ownedTokens` index
    /// list (if present) with `{index, uri}` entries fetched from the
    /// owning contract's `tokenURI`.
    async fn enrich_nft_balances(
        &self,
        explorer: &dyn ExplorerClient,
        contract_hx: &str,
        info: &mut Value,
    ) -> Result<(), IndexerError> {
        let Value::Object(map) = info else { return Ok(()) };
        let Some(Value::Array(owned)) = map.get("ownedTokens") else {
            return Ok(());
        };
        let indices: Vec<u64> = owned.iter().filter_map(Value::as_u64).collect();

        let mut enriched = Vec::with_capacity(indices.len());
        for index in indices {
            let uri = explorer.get_token_uri(contract_hx, index).await?;
            enriched.push(serde_json::json!({ "index": index, "uri": uri }));
        }
        map.insert("ownedTokens".to_string(), Value::Array(enriched));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyve_rpc::mock::MockNodeClient;

    #[tokio::test]
    async fn normalize_caches_per_height_hint() {
        let node = MockNodeClient::new();
        node.set_hex_mapping("B".repeat(34), "A".repeat(40));
        let registry = AddressRegistry::new();

        let (hx1, hy1) = registry.normalize(&node, &"B".repeat(34), 10).await.unwrap();
        assert_eq!(hx1, "A".repeat(40));
        assert_eq!(hy1, "B".repeat(34));

        // Same height hint hits the memo even without re-scripting the node.
        let (hx2, _) = registry.normalize(&node, &"B".repeat(34), 10).await.unwrap();
        assert_eq!(hx2, hx1);
    }

    #[tokio::test]
    async fn normalize_rejects_unexpected_length() {
        let node = MockNodeClient::new();
        let registry = AddressRegistry::new();
        let err = registry.normalize(&node, "short", 0).await.unwrap_err();
        assert!(matches!(err, IndexerError::Validation(_)));
    }

    #[tokio::test]
    async fn classify_wallet_when_name_excepts() {
        let node = MockNodeClient::new();
        let hx = "A".repeat(40);
        node.set_contract_call(&hx, SELECTOR_NAME, true, "");
        let registry = AddressRegistry::new();
        assert_eq!(registry.classify(&node, &hx).await.unwrap(), AddressType::Wallet);
    }

    #[tokio::test]
    async fn classify_token_when_decimals_succeeds() {
        let node = MockNodeClient::new();
        let hx = "A".repeat(40);
        node.set_contract_call(&hx, SELECTOR_NAME, false, "deadbeef");
        node.set_contract_call(&hx, SELECTOR_SYMBOL, false, "deadbeef");
        node.set_contract_call(&hx, SELECTOR_TOTAL_SUPPLY, false, "deadbeef");
        node.set_contract_call(&hx, SELECTOR_DECIMALS, false, "deadbeef");
        let registry = AddressRegistry::new();
        assert_eq!(registry.classify(&node, &hx).await.unwrap(), AddressType::Token);
    }

    #[tokio::test]
    async fn classify_nft_when_decimals_excepts() {
        let node = MockNodeClient::new();
        let hx = "A".repeat(40);
        node.set_contract_call(&hx, SELECTOR_NAME, false, "deadbeef");
        node.set_contract_call(&hx, SELECTOR_SYMBOL, false, "deadbeef");
        node.set_contract_call(&hx, SELECTOR_TOTAL_SUPPLY, false, "deadbeef");
        node.set_contract_call(&hx, SELECTOR_DECIMALS, true, "");
        let registry = AddressRegistry::new();
        assert_eq!(registry.classify(&node, &hx).await.unwrap(), AddressType::Nft);
    }
}
