use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::json::JsonPatch;

/// A named subscription of a user to an address.
///
/// `(user_id, addr_id)` is unique; `name` is unique among the owning
/// user's subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserAddr {
    pub id: i64,
    pub user_id: i64,
    pub addr_id: i64,
    pub name: String,
    /// Timestamp of the last block credited as "mined" for this subscription.
    pub block_t: Option<DateTime<Utc>>,
    /// Count of blocks credited as "mined" for this subscription.
    pub block_c: u64,
    pub info: JsonPatch,
    pub data: JsonPatch,
    /// Hex addresses of watched token contracts.
    pub tokens: HashSet<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("subscription name must be at least 5 characters")]
    TooShort,
    #[error("subscription name contains a disallowed character: {0:?}")]
    DisallowedChar(char),
}

impl UserAddr {
    pub fn new(id: i64, user_id: i64, addr_id: i64, name: String) -> Result<Self, NameError> {
        validate_name(&name)?;
        Ok(Self {
            id,
            user_id,
            addr_id,
            name,
            block_t: None,
            block_c: 0,
            info: JsonPatch::default(),
            data: JsonPatch::default(),
            tokens: HashSet::new(),
        })
    }

    /// Credits a mined block: sets `block_t` to the block's timestamp and
    /// increments `block_c`. Returns the `(block_t, block_c)` pair that
    /// held *before* crediting — this is the snapshot a corresponding
    /// [`UserAddrHist`] row stores.
    pub fn credit_mined_block(&mut self, mined_at: DateTime<Utc>) -> (Option<DateTime<Utc>>, u64) {
        let snapshot = (self.block_t, self.block_c);
        self.block_t = Some(mined_at);
        self.block_c += 1;
        snapshot
    }

    /// Restores counters from a [`UserAddrHist`] snapshot, as done on fork
    /// rewind (spec §4.4 step 1 / §4.7).
    pub fn restore_snapshot(&mut self, block_t: Option<DateTime<Utc>>, block_c: u64) {
        self.block_t = block_t;
        self.block_c = block_c;
    }
}

/// Rejects names under 5 characters or containing punctuation,
/// non-printable characters, or whitespace other than the space
/// character (spec §8 boundary behaviour).
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.chars().count() < 5 {
        return Err(NameError::TooShort);
    }
    for c in name.chars() {
        let is_space = c == ' ';
        let disallowed = c.is_ascii_punctuation() || !c.is_ascii_graphic() && !is_space;
        if disallowed {
            return Err(NameError::DisallowedChar(c));
        }
    }
    Ok(())
}

/// A per-subscription view of an [`crate::AddrHist`]: a checkpoint
/// snapshotting the subscription's counters *before* the history row was
/// produced, so it survives reorgs (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserAddrHist {
    pub id: i64,
    pub user_addr_id: i64,
    pub addr_hist_id: i64,
    pub block_t: Option<DateTime<Utc>>,
    pub block_c: u64,
    pub data: JsonPatch,
}

impl UserAddrHist {
    pub fn new(id: i64, user_addr_id: i64, addr_hist_id: i64, block_t: Option<DateTime<Utc>>, block_c: u64) -> Self {
        Self {
            id,
            user_addr_id,
            addr_hist_id,
            block_t,
            block_c,
            data: JsonPatch::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_names() {
        assert_eq!(validate_name("abcd"), Err(NameError::TooShort));
        assert!(validate_name("abcde").is_ok());
    }

    #[test]
    fn rejects_punctuation_and_control_chars() {
        assert!(matches!(validate_name("abc.de"), Err(NameError::DisallowedChar('.'))));
        assert!(matches!(validate_name("abc\tde"), Err(NameError::DisallowedChar('\t'))));
        assert!(validate_name("my wallet").is_ok());
    }

    #[test]
    fn credit_mined_block_snapshots_pre_credit_state() {
        let mut ua = UserAddr::new(1, 1, 1, "my wallet".into()).unwrap();
        let now: DateTime<Utc> = DateTime::from_timestamp(0, 0).unwrap();
        let (snap_t, snap_c) = ua.credit_mined_block(now);
        assert_eq!(snap_t, None);
        assert_eq!(snap_c, 0);
        assert_eq!(ua.block_c, 1);
        assert_eq!(ua.block_t, Some(now));
    }
}
