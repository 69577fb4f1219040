//! The Ingestion Pipeline (spec §4.3): the block poller loop and
//! `MakeBlock`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::{info, warn};

use hyve_rpc::{ExplorerClient, NodeClient};
use hyve_types::address::AddressKind;
use hyve_types::{AddressType, EventKind, JsonPatch};
use hyve_types::sse::{AddrHistResult, BlockSseEvent, BlockSseResult, UserAddrHistResult};

use crate::error::IndexerError;
use crate::events::EventBus;
use crate::metrics;
use crate::registry::AddressRegistry;
use crate::store::Store;

pub struct Poller {
    store: Arc<dyn Store>,
    node: Arc<dyn NodeClient>,
    explorer: Arc<dyn ExplorerClient>,
    registry: Arc<AddressRegistry>,
    events: Arc<EventBus>,
    /// In-memory cache of the highest height persisted, recovered from the
    /// store on construction (spec §4.3's `localHeight`).
    local_height: AtomicU64,
}

impl Poller {
    pub async fn new(
        store: Arc<dyn Store>,
        node: Arc<dyn NodeClient>,
        explorer: Arc<dyn ExplorerClient>,
        registry: Arc<AddressRegistry>,
        events: Arc<EventBus>,
    ) -> Result<Self, IndexerError> {
        let local_height = match store.max_block_height().await? {
            Some(h) => h,
            None => node.get_block_count().await?.saturating_sub(1),
        };
        metrics::LOCAL_HEIGHT.set(local_height as i64);
        Ok(Self {
            store,
            node,
            explorer,
            registry,
            events,
            local_height: AtomicU64::new(local_height),
        })
    }

    pub fn local_height(&self) -> u64 {
        self.local_height.load(Ordering::SeqCst)
    }

    /// One pass of the poller's main loop. Returns `true` if any block was
    /// produced (the caller uses this to decide whether to run the
    /// confirmation sweep).
    pub async fn poll_once(&self) -> Result<bool, IndexerError> {
        let chain_height = self.node.get_block_count().await?;
        let local_height = self.local_height();

        if chain_height <= local_height {
            return Ok(false);
        }

        for height in (local_height + 1)..=chain_height {
            self.make_block(height, chain_height, None).await?;
            self.local_height.store(height, Ordering::SeqCst);
            metrics::LOCAL_HEIGHT.set(height as i64);
        }
        Ok(true)
    }

    /// `MakeBlock(h, chainHeight)` from spec §4.3. When `forced_hash` is
    /// set (fork replay), it is used in place of `getBlockHash(h)` and
    /// `chainHeight` is meaningless for the "write a Stat snapshot" step.
    pub async fn make_block(&self, height: u64, chain_height: u64, forced_hash: Option<String>) -> Result<(), IndexerError> {
        let block_hash = match forced_hash {
            Some(hash) => hash,
            None => self.node.get_block_hash(height).await?,
        };

        let explorer_block = self.fetch_explorer_block(&block_hash).await?;
        let tx_list: Vec<Value> = explorer_block
            .get("tx")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let (hex_set, base36_set) = harvest_addresses(&tx_list);
        let matching = self.store.addresses_matching(&hex_set, &base36_set).await?;

        let conf = explorer_block.get("confirmations").and_then(Value::as_u64).unwrap_or(0) as u32;
        let mut info = explorer_block.clone();
        if let Value::Object(map) = &mut info {
            map.remove("confirmations");
        }

        let block = self
            .store
            .insert_block(height, block_hash.clone(), conf, JsonPatch::new(info), tx_list)
            .await?;

        let mined_at = extract_timestamp(&explorer_block);
        let mut hist_results = Vec::new();

        for address in &matching {
            let changed = self.registry.update_info(&*self.store, &*self.explorer, address, height).await?;
            let subscriber_count = self.store.subscriber_count(address.id).await?;
            if subscriber_count == 0 {
                continue;
            }

            let refreshed = if changed {
                self.store
                    .get_address_by_hex(&address.hx)
                    .await?
                    .map(|a| a.info)
                    .unwrap_or_else(|| address.info.clone())
            } else {
                address.info.clone()
            };

            let hist = self
                .store
                .insert_addr_hist(block.id, address.id, address.info.clone(), refreshed.clone())
                .await?;

            let mined = block.miner_is(&address.hy);
            let mut subscribers = Vec::new();
            for mut subscription in self.store.subscriptions_for_address(address.id).await? {
                let (snap_t, snap_c) = if mined {
                    let (pre_t, pre_c) = subscription.credit_mined_block(mined_at);
                    self.store.update_subscription(&subscription).await?;
                    (pre_t, pre_c)
                } else {
                    (subscription.block_t, subscription.block_c)
                };

                self.store
                    .insert_user_addr_hist(subscription.id, hist.id, snap_t, snap_c)
                    .await?;

                subscribers.push(UserAddrHistResult {
                    user_addr_id: subscription.id,
                    name: subscription.name.clone(),
                    block_t: snap_t,
                    block_c: snap_c,
                });
            }

            hist_results.push(AddrHistResult {
                address: address.clone(),
                info_old: address.info.clone(),
                info_new: refreshed,
                mined,
                subscribers,
            });
        }

        if hist_results.is_empty() {
            self.store.delete_block(block.id).await?;
            metrics::BLOCKS_ROLLED_BACK.inc();
            return Ok(());
        }

        if height == chain_height {
            info!(height, "reached chain tip, stat snapshot due");
        }

        metrics::BLOCKS_INGESTED.inc();

        let sse_result = BlockSseResult {
            id: block.id,
            event: BlockSseEvent::Create,
            height: block.height,
            hash: block.hash.clone(),
            info: block.info.clone(),
            hist: hist_results,
        };
        self.events
            .append(EventKind::Block, serde_json::to_value(&sse_result).expect("BlockSseResult serialises"))
            .await?;
        metrics::EVENTS_APPENDED.inc();

        Ok(())
    }

    async fn fetch_explorer_block(&self, hash: &str) -> Result<Value, IndexerError> {
        loop {
            match self.explorer.get_block(hash).await {
                Ok(block) => return Ok(block),
                Err(source) => {
                    let err = IndexerError::from(source);
                    let Some(delay) = err.retry_after_secs() else {
                        return Err(err);
                    };
                    warn!(hash, delay_secs = delay, error = %err, "retrying explorer block fetch");
                    metrics::RPC_RETRIES.inc();
                    tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
                }
            }
        }
    }
}

/// `time`/`blocktime` are the two field names explorer payloads commonly
/// use for a block's mined timestamp.
fn extract_timestamp(block: &Value) -> DateTime<Utc> {
    block
        .get("time")
        .or_else(|| block.get("blocktime"))
        .and_then(Value::as_i64)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now)
}

/// The address harvesting rule from spec §4.3 step 3: walk input/output
/// script addresses, `receipt.sender`, `receipt.contractAddressHex`, and
/// every `from`/`to`/`addressHex` field inside `qrc20TokenTransfers` ∪
/// `qrc721TokenTransfers`, classifying each string by length.
fn harvest_addresses(tx_list: &[Value]) -> (HashSet<String>, HashSet<String>) {
    let mut hex_set = HashSet::new();
    let mut base36_set = HashSet::new();
    for tx in tx_list {
        walk(tx, &mut hex_set, &mut base36_set);
    }
    (hex_set, base36_set)
}

const HARVESTED_KEYS: &[&str] = &["sender", "contractAddressHex", "from", "to", "addressHex"];

fn walk(value: &Value, hex_set: &mut HashSet<String>, base36_set: &mut HashSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                if key == "addresses" {
                    if let Value::Array(items) = val {
                        for item in items {
                            if let Some(s) = item.as_str() {
                                classify(s, hex_set, base36_set);
                            }
                        }
                    }
                } else if HARVESTED_KEYS.contains(&key.as_str()) {
                    if let Some(s) = val.as_str() {
                        classify(s, hex_set, base36_set);
                    }
                }
                walk(val, hex_set, base36_set);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, hex_set, base36_set);
            }
        }
        _ => {}
    }
}

fn classify(s: &str, hex_set: &mut HashSet<String>, base36_set: &mut HashSet<String>) {
    match AddressType::by_len(s) {
        Some(AddressKind::Hex) => {
            hex_set.insert(s.to_string());
        }
        Some(AddressKind::Base36) => {
            base36_set.insert(s.to_string());
        }
        None => {
            tracing::debug!(address = s, len = s.len(), "dropping address of unexpected length");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn harvest_addresses_collects_from_all_named_fields() {
        let tx_list = vec![json!({
            "vin": [{"addresses": ["A".repeat(40)]}],
            "vout": [{"scriptPubKey": {"addresses": ["B".repeat(34)]}}],
            "receipt": [{"sender": "C".repeat(40), "contractAddressHex": "D".repeat(40)}],
            "qrc20TokenTransfers": [{"from": "E".repeat(40), "to": "F".repeat(34)}],
            "qrc721TokenTransfers": [{"addressHex": "1".repeat(40)}],
            "txid": "G".repeat(64),
        })];

        let (hex_set, base36_set) = harvest_addresses(&tx_list);
        assert!(hex_set.contains(&"A".repeat(40)));
        assert!(hex_set.contains(&"C".repeat(40)));
        assert!(hex_set.contains(&"D".repeat(40)));
        assert!(hex_set.contains(&"E".repeat(40)));
        assert!(hex_set.contains(&"1".repeat(40)));
        assert!(base36_set.contains(&"B".repeat(34)));
        assert!(base36_set.contains(&"F".repeat(34)));
        assert!(!hex_set.contains(&"G".repeat(64)));
    }

    #[test]
    fn harvest_addresses_ignores_unrelated_strings_of_matching_length() {
        let tx_list = vec![json!({"memo": "Z".repeat(40)})];
        let (hex_set, base36_set) = harvest_addresses(&tx_list);
        assert!(hex_set.is_empty());
        assert!(base36_set.is_empty());
    }
}
