//! The relational storage contract. Spec §1 names the storage engine as
//! an external collaborator ("schema-level contracts given, not the SQL
//! dialect"); this trait *is* that schema-level contract. [`postgres::PgStore`]
//! is the real implementation, [`memory::MemoryStore`] is an in-memory
//! fake used by unit tests and `hyve-integration-tests`.

pub mod memory;
pub mod postgres;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use hyve_types::{AddrHist, Address, AddressType, Block, Event, EventKind, JsonPatch, User, UserAddr, UserAddrHist};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("row not found: {0}")]
    NotFound(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// The full storage surface mutated by the ingestion pipeline, the
/// confirmation tracker, and (thinly) the HTTP API.
#[async_trait]
pub trait Store: Send + Sync {
    // --- Address Registry (spec §4.2) ---

    async fn get_address_by_id(&self, id: i64) -> Result<Option<Address>, StoreError>;
    async fn get_address_by_hex(&self, hx: &str) -> Result<Option<Address>, StoreError>;
    async fn get_address_by_base36(&self, hy: &str) -> Result<Option<Address>, StoreError>;
    async fn insert_address(
        &self,
        kind: AddressType,
        hx: String,
        hy: String,
        last_seen_height: u64,
    ) -> Result<Address, StoreError>;
    async fn update_address_info(
        &self,
        addr_id: i64,
        info: JsonPatch,
        last_seen_height: u64,
    ) -> Result<(), StoreError>;
    /// Rows whose hex or base-36 form is in the given sets — the query
    /// behind spec §4.3 step 4.
    async fn addresses_matching(
        &self,
        hex_set: &HashSet<String>,
        base36_set: &HashSet<String>,
    ) -> Result<Vec<Address>, StoreError>;
    async fn subscriber_count(&self, addr_id: i64) -> Result<i64, StoreError>;
    /// Deletes the address and cascades to its orphan histories and the
    /// now-empty blocks they pointed to, per the data model's ownership
    /// rule. No-op if the address still has subscribers.
    async fn delete_address_if_orphaned(&self, addr_id: i64) -> Result<(), StoreError>;

    // --- Block Store (spec §3, §4.3, §4.4) ---

    async fn max_block_height(&self) -> Result<Option<u64>, StoreError>;
    async fn get_block_by_id(&self, id: i64) -> Result<Option<Block>, StoreError>;
    async fn get_block_by_height(&self, height: u64) -> Result<Option<Block>, StoreError>;
    async fn insert_block(
        &self,
        height: u64,
        hash: String,
        conf: u32,
        info: JsonPatch,
        tx: Vec<serde_json::Value>,
    ) -> Result<Block, StoreError>;
    async fn set_block_conf(&self, block_id: i64, conf: u32) -> Result<(), StoreError>;
    /// Deletes the block, cascading to its `AddrHist`/`UserAddrHist` rows.
    async fn delete_block(&self, block_id: i64) -> Result<(), StoreError>;
    /// All stored blocks in ascending height order, for the confirmation
    /// tracker's sweep.
    async fn blocks_ascending(&self) -> Result<Vec<Block>, StoreError>;
    async fn history_count(&self, block_id: i64) -> Result<i64, StoreError>;

    // --- History Store (spec §3, §4.3, §4.4, §4.7) ---

    async fn insert_addr_hist(
        &self,
        block_id: i64,
        addr_id: i64,
        info_old: JsonPatch,
        info_new: JsonPatch,
    ) -> Result<AddrHist, StoreError>;
    async fn addr_hist_for_block(&self, block_id: i64) -> Result<Vec<AddrHist>, StoreError>;
    async fn update_addr_hist_info_new(&self, id: i64, info_new: JsonPatch) -> Result<(), StoreError>;
    async fn insert_user_addr_hist(
        &self,
        user_addr_id: i64,
        addr_hist_id: i64,
        block_t: Option<DateTime<Utc>>,
        block_c: u64,
    ) -> Result<UserAddrHist, StoreError>;
    async fn user_addr_hist_for_addr_hist(&self, addr_hist_id: i64) -> Result<Vec<UserAddrHist>, StoreError>;

    // --- Subscription Store (spec §3, §4.7, §6) ---

    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn get_user_by_handle(&self, handle: &str) -> Result<Option<User>, StoreError>;
    async fn create_user(&self, handle: String) -> Result<User, StoreError>;
    async fn delete_user(&self, id: i64) -> Result<(), StoreError>;
    async fn update_user_info(&self, id: i64, patch: JsonPatch, overwrite: bool) -> Result<User, StoreError>;

    async fn get_user_addr(&self, id: i64) -> Result<Option<UserAddr>, StoreError>;
    async fn get_user_addr_by_user_and_addr(&self, user_id: i64, addr_id: i64) -> Result<Option<UserAddr>, StoreError>;
    async fn subscriptions_for_address(&self, addr_id: i64) -> Result<Vec<UserAddr>, StoreError>;
    async fn create_subscription(&self, user_id: i64, addr_id: i64, name: String) -> Result<UserAddr, StoreError>;
    /// Persists the full row (name/info/data/tokens/counters) back.
    async fn update_subscription(&self, user_addr: &UserAddr) -> Result<(), StoreError>;
    async fn delete_subscription(&self, id: i64) -> Result<(), StoreError>;

    // --- Event Queue (spec §4.5) ---

    /// Inserts the row and returns it with its assigned `id`, then
    /// opportunistically purges expired rows in the same call.
    async fn append_event(&self, kind: EventKind, payload: serde_json::Value, now: DateTime<Utc>) -> Result<Event, StoreError>;
    /// Lowest-`id` unexpired rows whose claim set excludes `claimant`,
    /// atomically adding `claimant` to each before returning.
    async fn claim_batch(&self, kind: EventKind, claimant: &str, limit: i64, now: DateTime<Utc>) -> Result<Vec<Event>, StoreError>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
