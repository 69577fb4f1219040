use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::json::JsonPatch;

/// Which ingestion pass produced a [`BlockSseResult`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockSseEvent {
    Create,
    Mature,
}

/// The materialised payload of a `block/create` or `block/mature` event —
/// what actually gets JSON-encoded into [`crate::Event::payload`] and sent
/// down the SSE stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockSseResult {
    pub id: i64,
    pub event: BlockSseEvent,
    pub height: u64,
    pub hash: String,
    pub info: JsonPatch,
    pub hist: Vec<AddrHistResult>,
}

/// One address's transition within a [`BlockSseResult`], with its
/// per-subscriber views attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddrHistResult {
    pub address: Address,
    pub info_old: JsonPatch,
    pub info_new: JsonPatch,
    pub mined: bool,
    pub subscribers: Vec<UserAddrHistResult>,
}

/// The per-subscriber slice of an [`AddrHistResult`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserAddrHistResult {
    pub user_addr_id: i64,
    pub name: String,
    pub block_t: Option<DateTime<Utc>>,
    pub block_c: u64,
}
