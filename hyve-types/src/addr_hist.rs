use serde::{Deserialize, Serialize};

use crate::json::JsonPatch;

/// A per-block, per-address transition record.
///
/// `mined` is deliberately not a field: it is derived at read time from
/// `block.miner_is(address.hy)`, matching the original's hybrid property
/// rather than a stored, independently-mutable column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddrHist {
    pub id: i64,
    pub block_id: i64,
    pub addr_id: i64,
    pub info_old: JsonPatch,
    pub info_new: JsonPatch,
}

impl AddrHist {
    pub fn new(id: i64, block_id: i64, addr_id: i64, info_old: JsonPatch, info_new: JsonPatch) -> Self {
        Self {
            id,
            block_id,
            addr_id,
            info_old,
            info_new,
        }
    }

    /// Re-reads `info_new`, rotating `info_old <- info_new` as spec'd for
    /// `AddrHist.OnBlockMature`.
    pub fn mature(&mut self, refreshed_info: JsonPatch) {
        self.info_old = std::mem::replace(&mut self.info_new, refreshed_info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mature_rotates_old_into_new() {
        let mut hist = AddrHist::new(
            1,
            1,
            1,
            JsonPatch::new(json!({"balance": 1})),
            JsonPatch::new(json!({"balance": 2})),
        );
        hist.mature(JsonPatch::new(json!({"balance": 3})));
        assert_eq!(hist.info_old.0, json!({"balance": 2}));
        assert_eq!(hist.info_new.0, json!({"balance": 3}));
    }
}
