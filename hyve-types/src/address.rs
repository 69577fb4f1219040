use serde::{Deserialize, Serialize};

use crate::json::JsonPatch;

/// An on-chain address, interned by its normalised hex form.
///
/// The subscriber set is not embedded here — it is realised relationally
/// as the set of [`crate::UserAddr`] rows whose `addr_id` points at this
/// row, following the "surrogate ids over back-pointers" design note.
/// Removing the last such row is the cascading-delete trigger described
/// in the data model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    pub id: i64,
    /// Immutable after creation.
    pub kind: AddressType,
    /// 40-character hex representation (no `0x` prefix).
    pub hx: String,
    /// 34-character base-36 representation.
    pub hy: String,
    pub last_seen_height: u64,
    /// Last known explorer payload, minus volatile balance sub-records.
    pub info: JsonPatch,
}

impl Address {
    pub fn new(id: i64, kind: AddressType, hx: String, hy: String, last_seen_height: u64) -> Self {
        Self {
            id,
            kind,
            hx,
            hy,
            last_seen_height,
            info: JsonPatch::default(),
        }
    }
}

/// Address classification, determined once at creation time by probing
/// the four ERC-20 selectors described in the Address Registry design.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    /// Plain HYDRA wallet: `name()` excepts, or the address is not a contract.
    Wallet,
    /// Smart contract: only `name()` succeeds.
    Contract,
    /// Fungible token: `name()`, `totalSupply()` and `decimals()` all succeed.
    Token,
    /// Non-fungible token: `name()` and `totalSupply()` succeed, `decimals()` excepts.
    Nft,
}

impl AddressType {
    /// Length-based pre-classification used while harvesting addresses from
    /// a block, before any registry lookup happens: 34 chars -> base-36
    /// form, 40 chars -> hex form. Any other length is not an address at
    /// all and must be dropped by the caller.
    pub fn by_len(s: &str) -> Option<AddressKind> {
        match s.len() {
            34 => Some(AddressKind::Base36),
            40 => Some(AddressKind::Hex),
            _ => None,
        }
    }
}

/// Which textual encoding an address string was found in, not to be
/// confused with [`AddressType`] (the semantic contract classification).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    Base36,
    Hex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_len_classifies_known_lengths() {
        assert_eq!(AddressType::by_len(&"a".repeat(34)), Some(AddressKind::Base36));
        assert_eq!(AddressType::by_len(&"a".repeat(40)), Some(AddressKind::Hex));
    }

    #[test]
    fn by_len_rejects_other_lengths() {
        assert_eq!(AddressType::by_len(&"a".repeat(33)), None);
        assert_eq!(AddressType::by_len(&"a".repeat(41)), None);
        assert_eq!(AddressType::by_len(""), None);
    }
}
