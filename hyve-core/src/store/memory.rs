//! An in-memory [`Store`] used by unit tests and `hyve-integration-tests`.
//! Mirrors the Postgres schema's shape (one `Vec`/`HashMap` per table,
//! surrogate id counters) without any SQL.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use hyve_types::{AddrHist, Address, AddressType, Block, Event, EventKind, JsonPatch, User, UserAddr, UserAddrHist};

use super::{Store, StoreError};

#[derive(Default)]
struct State {
    addresses: HashMap<i64, Address>,
    next_addr_id: i64,

    blocks: HashMap<i64, Block>,
    next_block_id: i64,

    addr_hist: HashMap<i64, AddrHist>,
    next_addr_hist_id: i64,

    user_addr_hist: HashMap<i64, UserAddrHist>,
    next_user_addr_hist_id: i64,

    users: HashMap<i64, User>,
    next_user_id: i64,

    user_addrs: HashMap<i64, UserAddr>,
    next_user_addr_id: i64,

    events: HashMap<i64, Event>,
    next_event_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_address_by_id(&self, id: i64) -> Result<Option<Address>, StoreError> {
        Ok(self.state.lock().await.addresses.get(&id).cloned())
    }

    async fn get_address_by_hex(&self, hx: &str) -> Result<Option<Address>, StoreError> {
        Ok(self.state.lock().await.addresses.values().find(|a| a.hx == hx).cloned())
    }

    async fn get_address_by_base36(&self, hy: &str) -> Result<Option<Address>, StoreError> {
        Ok(self.state.lock().await.addresses.values().find(|a| a.hy == hy).cloned())
    }

    async fn insert_address(
        &self,
        kind: AddressType,
        hx: String,
        hy: String,
        last_seen_height: u64,
    ) -> Result<Address, StoreError> {
        let mut state = self.state.lock().await;
        if state.addresses.values().any(|a| a.hx == hx || a.hy == hy) {
            return Err(StoreError::Conflict(format!("address {hx}/{hy} already exists")));
        }
        state.next_addr_id += 1;
        let id = state.next_addr_id;
        let address = Address::new(id, kind, hx, hy, last_seen_height);
        state.addresses.insert(id, address.clone());
        Ok(address)
    }

    async fn update_address_info(&self, addr_id: i64, info: JsonPatch, last_seen_height: u64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let address = state
            .addresses
            .get_mut(&addr_id)
            .ok_or_else(|| StoreError::NotFound(format!("address {addr_id}")))?;
        address.info = info;
        address.last_seen_height = last_seen_height;
        Ok(())
    }

    async fn addresses_matching(
        &self,
        hex_set: &HashSet<String>,
        base36_set: &HashSet<String>,
    ) -> Result<Vec<Address>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .addresses
            .values()
            .filter(|a| hex_set.contains(&a.hx) || base36_set.contains(&a.hy))
            .cloned()
            .collect())
    }

    async fn subscriber_count(&self, addr_id: i64) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.user_addrs.values().filter(|ua| ua.addr_id == addr_id).count() as i64)
    }

    async fn delete_address_if_orphaned(&self, addr_id: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let has_subscribers = state.user_addrs.values().any(|ua| ua.addr_id == addr_id);
        if has_subscribers {
            return Ok(());
        }

        let orphan_hist_ids: Vec<i64> = state
            .addr_hist
            .values()
            .filter(|h| h.addr_id == addr_id)
            .map(|h| h.id)
            .collect();
        let mut orphan_block_ids = HashSet::new();
        for hist_id in orphan_hist_ids {
            if let Some(hist) = state.addr_hist.remove(&hist_id) {
                orphan_block_ids.insert(hist.block_id);
            }
            state.user_addr_hist.retain(|_, uah| uah.addr_hist_id != hist_id);
        }
        for block_id in orphan_block_ids {
            let still_has_history = state.addr_hist.values().any(|h| h.block_id == block_id);
            if !still_has_history {
                state.blocks.remove(&block_id);
            }
        }
        state.addresses.remove(&addr_id);
        Ok(())
    }

    async fn max_block_height(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.state.lock().await.blocks.values().map(|b| b.height).max())
    }

    async fn get_block_by_id(&self, id: i64) -> Result<Option<Block>, StoreError> {
        Ok(self.state.lock().await.blocks.get(&id).cloned())
    }

    async fn get_block_by_height(&self, height: u64) -> Result<Option<Block>, StoreError> {
        Ok(self.state.lock().await.blocks.values().find(|b| b.height == height).cloned())
    }

    async fn insert_block(
        &self,
        height: u64,
        hash: String,
        conf: u32,
        info: JsonPatch,
        tx: Vec<serde_json::Value>,
    ) -> Result<Block, StoreError> {
        let mut state = self.state.lock().await;
        if state.blocks.values().any(|b| b.height == height && b.hash == hash) {
            return Err(StoreError::Conflict(format!("block {height}/{hash} already exists")));
        }
        state.next_block_id += 1;
        let id = state.next_block_id;
        let block = Block::new(id, height, hash, conf, info, tx);
        state.blocks.insert(id, block.clone());
        Ok(block)
    }

    async fn set_block_conf(&self, block_id: i64, conf: u32) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let block = state
            .blocks
            .get_mut(&block_id)
            .ok_or_else(|| StoreError::NotFound(format!("block {block_id}")))?;
        block.conf = conf;
        Ok(())
    }

    async fn delete_block(&self, block_id: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let hist_ids: Vec<i64> = state
            .addr_hist
            .values()
            .filter(|h| h.block_id == block_id)
            .map(|h| h.id)
            .collect();
        for hist_id in hist_ids {
            state.addr_hist.remove(&hist_id);
            state.user_addr_hist.retain(|_, uah| uah.addr_hist_id != hist_id);
        }
        state.blocks.remove(&block_id);
        Ok(())
    }

    async fn blocks_ascending(&self) -> Result<Vec<Block>, StoreError> {
        let mut blocks: Vec<Block> = self.state.lock().await.blocks.values().cloned().collect();
        blocks.sort_by_key(|b| b.height);
        Ok(blocks)
    }

    async fn history_count(&self, block_id: i64) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.addr_hist.values().filter(|h| h.block_id == block_id).count() as i64)
    }

    async fn insert_addr_hist(
        &self,
        block_id: i64,
        addr_id: i64,
        info_old: JsonPatch,
        info_new: JsonPatch,
    ) -> Result<AddrHist, StoreError> {
        let mut state = self.state.lock().await;
        state.next_addr_hist_id += 1;
        let id = state.next_addr_hist_id;
        let hist = AddrHist::new(id, block_id, addr_id, info_old, info_new);
        state.addr_hist.insert(id, hist.clone());
        Ok(hist)
    }

    async fn addr_hist_for_block(&self, block_id: i64) -> Result<Vec<AddrHist>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.addr_hist.values().filter(|h| h.block_id == block_id).cloned().collect())
    }

    async fn update_addr_hist_info_new(&self, id: i64, info_new: JsonPatch) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let hist = state
            .addr_hist
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("addr_hist {id}")))?;
        hist.mature(info_new);
        Ok(())
    }

    async fn insert_user_addr_hist(
        &self,
        user_addr_id: i64,
        addr_hist_id: i64,
        block_t: Option<DateTime<Utc>>,
        block_c: u64,
    ) -> Result<UserAddrHist, StoreError> {
        let mut state = self.state.lock().await;
        state.next_user_addr_hist_id += 1;
        let id = state.next_user_addr_hist_id;
        let row = UserAddrHist::new(id, user_addr_id, addr_hist_id, block_t, block_c);
        state.user_addr_hist.insert(id, row.clone());
        Ok(row)
    }

    async fn user_addr_hist_for_addr_hist(&self, addr_hist_id: i64) -> Result<Vec<UserAddrHist>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .user_addr_hist
            .values()
            .filter(|uah| uah.addr_hist_id == addr_hist_id)
            .cloned()
            .collect())
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn get_user_by_handle(&self, handle: &str) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.values().find(|u| u.handle == handle).cloned())
    }

    async fn create_user(&self, handle: String) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.handle == handle) {
            return Err(StoreError::Conflict(format!("user handle {handle} already exists")));
        }
        state.next_user_id += 1;
        let id = state.next_user_id;
        let user = User::new(id, handle);
        state.users.insert(id, user.clone());
        Ok(user)
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let sub_ids: Vec<i64> = state.user_addrs.values().filter(|ua| ua.user_id == id).map(|ua| ua.id).collect();
        for sub_id in sub_ids {
            state.user_addrs.remove(&sub_id);
        }
        state.users.remove(&id);
        Ok(())
    }

    async fn update_user_info(&self, id: i64, patch: JsonPatch, overwrite: bool) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user.info = user.info.with_patch(patch.as_value(), overwrite);
        Ok(user.clone())
    }

    async fn get_user_addr(&self, id: i64) -> Result<Option<UserAddr>, StoreError> {
        Ok(self.state.lock().await.user_addrs.get(&id).cloned())
    }

    async fn get_user_addr_by_user_and_addr(&self, user_id: i64, addr_id: i64) -> Result<Option<UserAddr>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .user_addrs
            .values()
            .find(|ua| ua.user_id == user_id && ua.addr_id == addr_id)
            .cloned())
    }

    async fn subscriptions_for_address(&self, addr_id: i64) -> Result<Vec<UserAddr>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.user_addrs.values().filter(|ua| ua.addr_id == addr_id).cloned().collect())
    }

    async fn create_subscription(&self, user_id: i64, addr_id: i64, name: String) -> Result<UserAddr, StoreError> {
        let mut state = self.state.lock().await;
        if state
            .user_addrs
            .values()
            .any(|ua| ua.user_id == user_id && (ua.addr_id == addr_id || ua.name == name))
        {
            return Err(StoreError::Conflict(format!(
                "subscription ({user_id}, {addr_id}, {name}) violates uniqueness"
            )));
        }
        state.next_user_addr_id += 1;
        let id = state.next_user_addr_id;
        let user_addr = UserAddr::new(id, user_id, addr_id, name)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        state.user_addrs.insert(id, user_addr.clone());
        Ok(user_addr)
    }

    async fn update_subscription(&self, user_addr: &UserAddr) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.user_addrs.contains_key(&user_addr.id) {
            return Err(StoreError::NotFound(format!("user_addr {}", user_addr.id)));
        }
        if state
            .user_addrs
            .values()
            .any(|ua| ua.id != user_addr.id && ua.user_id == user_addr.user_id && ua.name == user_addr.name)
        {
            return Err(StoreError::Conflict(format!(
                "subscription name {:?} already used by another of user {}'s subscriptions",
                user_addr.name, user_addr.user_id
            )));
        }
        state.user_addrs.insert(user_addr.id, user_addr.clone());
        Ok(())
    }

    async fn delete_subscription(&self, id: i64) -> Result<(), StoreError> {
        self.state.lock().await.user_addrs.remove(&id);
        Ok(())
    }

    async fn append_event(&self, kind: EventKind, payload: serde_json::Value, now: DateTime<Utc>) -> Result<Event, StoreError> {
        let mut state = self.state.lock().await;
        state.next_event_id += 1;
        let id = state.next_event_id;
        let mut event = Event::new(now, kind, payload);
        event.id = id;
        state.events.insert(id, event.clone());
        state.events.retain(|_, e| !e.is_expired(now));
        Ok(event)
    }

    async fn claim_batch(&self, kind: EventKind, claimant: &str, limit: i64, now: DateTime<Utc>) -> Result<Vec<Event>, StoreError> {
        let mut state = self.state.lock().await;
        let mut candidates: Vec<i64> = state
            .events
            .values()
            .filter(|e| e.kind == kind && !e.is_expired(now) && !e.claim.contains(claimant))
            .map(|e| e.id)
            .collect();
        candidates.sort_unstable();
        candidates.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(candidates.len());
        for id in candidates {
            if let Some(event) = state.events.get_mut(&id) {
                event.claim_for(claimant);
                claimed.push(event.clone());
            }
        }
        Ok(claimed)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.events.len();
        state.events.retain(|_, e| !e.is_expired(now));
        Ok((before - state.events.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_and_lookup_address_round_trips() {
        let store = MemoryStore::new();
        let addr = store
            .insert_address(AddressType::Wallet, "a".repeat(40), "b".repeat(34), 10)
            .await
            .unwrap();
        assert_eq!(store.get_address_by_hex(&addr.hx).await.unwrap(), Some(addr.clone()));
        assert_eq!(store.get_address_by_base36(&addr.hy).await.unwrap(), Some(addr));
    }

    #[tokio::test]
    async fn delete_address_if_orphaned_cascades_history_and_blocks() {
        let store = MemoryStore::new();
        let addr = store
            .insert_address(AddressType::Wallet, "a".repeat(40), "b".repeat(34), 1)
            .await
            .unwrap();
        let block = store
            .insert_block(1, "h1".into(), 0, JsonPatch::null(), vec![])
            .await
            .unwrap();
        store
            .insert_addr_hist(block.id, addr.id, JsonPatch::null(), JsonPatch::null())
            .await
            .unwrap();

        store.delete_address_if_orphaned(addr.id).await.unwrap();

        assert!(store.get_address_by_hex(&addr.hx).await.unwrap().is_none());
        assert!(store.get_block_by_height(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_batch_excludes_already_claimed_and_is_id_ordered() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.append_event(EventKind::Block, json!({"n": 1}), now).await.unwrap();
        store.append_event(EventKind::Block, json!({"n": 2}), now).await.unwrap();

        let first_batch = store.claim_batch(EventKind::Block, "alice", 10, now).await.unwrap();
        assert_eq!(first_batch.len(), 2);
        assert_eq!(first_batch[0].payload, json!({"n": 1}));

        let second_batch = store.claim_batch(EventKind::Block, "alice", 10, now).await.unwrap();
        assert!(second_batch.is_empty());

        let bob_batch = store.claim_batch(EventKind::Block, "bob", 10, now).await.unwrap();
        assert_eq!(bob_batch.len(), 2);
    }

    #[tokio::test]
    async fn purge_expired_removes_stale_rows() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        store.append_event(EventKind::Block, json!({}), t0).await.unwrap();

        let removed = store.purge_expired(t0 + chrono::Duration::hours(19)).await.unwrap();
        assert_eq!(removed, 1);
    }
}
