use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::json::JsonPatch;

/// A persisted block envelope.
///
/// Invariants (enforced by the store, not by this struct alone):
/// `(height, hash)` is unique, and a block is retained only while it has
/// at least one [`crate::AddrHist`] row or `conf < MATURITY`. See
/// [`Block::is_garbage`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub id: i64,
    pub height: u64,
    pub hash: String,
    /// Node-reported confirmation depth as of the last observation.
    pub conf: u32,
    /// Explorer payload with the volatile `confirmations` field stripped.
    pub info: JsonPatch,
    /// Raw per-transaction payloads, read once at ingestion time.
    pub tx: Vec<Value>,
}

impl Block {
    pub fn new(id: i64, height: u64, hash: String, conf: u32, info: JsonPatch, tx: Vec<Value>) -> Self {
        Self {
            id,
            height,
            hash,
            conf,
            info,
            tx,
        }
    }

    /// `conf >= maturity && history_len == 0` is the deletion precondition
    /// from the data model: a block with no addresses of interest that has
    /// matured is garbage.
    pub fn is_garbage(&self, history_len: usize, maturity: u32) -> bool {
        self.conf >= maturity && history_len == 0
    }

    /// Whether this block is the miner of `wallet_hy` — the "mined block"
    /// relation used to derive [`crate::AddrHist::mined`].
    pub fn miner_is(&self, wallet_hy: &str) -> bool {
        self.info
            .as_value()
            .get("miner")
            .and_then(Value::as_str)
            .is_some_and(|miner| miner == wallet_hy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn is_garbage_requires_both_mature_and_historyless() {
        let block = Block::new(1, 10, "h".into(), 501, JsonPatch::null(), vec![]);
        assert!(block.is_garbage(0, 501));
        assert!(!block.is_garbage(1, 501));

        let immature = Block::new(2, 11, "h2".into(), 10, JsonPatch::null(), vec![]);
        assert!(!immature.is_garbage(0, 501));
    }

    #[test]
    fn miner_is_matches_info_miner_field() {
        let block = Block::new(1, 1, "h".into(), 0, JsonPatch::new(json!({"miner": "TX1"})), vec![]);
        assert!(block.miner_is("TX1"));
        assert!(!block.miner_is("TX2"));
    }
}
