//! The Postgres-backed [`Store`]. Queries are issued with `sqlx::query`/
//! `query_as` rather than the `query!` macros — there is no live database
//! at build time to check them against, so we accept the runtime-checked
//! surface and lean on the integration tests instead.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Row};

use hyve_types::{AddrHist, Address, AddressType, Block, Event, EventKind, JsonPatch, User, UserAddr, UserAddrHist};

use super::{Store, StoreError};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Conflict(db_err.message().to_string())
        }
        sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

#[derive(FromRow)]
struct AddressRow {
    id: i64,
    kind: String,
    hx: String,
    hy: String,
    last_seen_height: i64,
    info: Value,
}

impl From<AddressRow> for Address {
    fn from(row: AddressRow) -> Self {
        let kind = match row.kind.as_str() {
            "wallet" => AddressType::Wallet,
            "contract" => AddressType::Contract,
            "token" => AddressType::Token,
            "nft" => AddressType::Nft,
            other => unreachable!("unknown address kind in storage: {other}"),
        };
        let mut address = Address::new(row.id, kind, row.hx, row.hy, row.last_seen_height as u64);
        address.info = JsonPatch::new(row.info);
        address
    }
}

fn address_kind_str(kind: AddressType) -> &'static str {
    match kind {
        AddressType::Wallet => "wallet",
        AddressType::Contract => "contract",
        AddressType::Token => "token",
        AddressType::Nft => "nft",
    }
}

#[derive(FromRow)]
struct BlockRow {
    id: i64,
    height: i64,
    hash: String,
    conf: i32,
    info: Value,
    tx: Value,
}

impl From<BlockRow> for Block {
    fn from(row: BlockRow) -> Self {
        let tx: Vec<Value> = match row.tx {
            Value::Array(items) => items,
            _ => Vec::new(),
        };
        Block::new(row.id, row.height as u64, row.hash, row.conf as u32, JsonPatch::new(row.info), tx)
    }
}

#[derive(FromRow)]
struct AddrHistRow {
    id: i64,
    block_id: i64,
    addr_id: i64,
    info_old: Value,
    info_new: Value,
}

impl From<AddrHistRow> for AddrHist {
    fn from(row: AddrHistRow) -> Self {
        AddrHist::new(row.id, row.block_id, row.addr_id, JsonPatch::new(row.info_old), JsonPatch::new(row.info_new))
    }
}

#[derive(FromRow)]
struct UserAddrHistRow {
    id: i64,
    user_addr_id: i64,
    addr_hist_id: i64,
    block_t: Option<DateTime<Utc>>,
    block_c: i64,
    data: Value,
}

impl From<UserAddrHistRow> for UserAddrHist {
    fn from(row: UserAddrHistRow) -> Self {
        let mut hist = UserAddrHist::new(row.id, row.user_addr_id, row.addr_hist_id, row.block_t, row.block_c as u64);
        hist.data = JsonPatch::new(row.data);
        hist
    }
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    handle: String,
    info: Value,
    data: Value,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let mut user = User::new(row.id, row.handle);
        user.info = JsonPatch::new(row.info);
        user.data = JsonPatch::new(row.data);
        user
    }
}

#[derive(FromRow)]
struct UserAddrRow {
    id: i64,
    user_id: i64,
    addr_id: i64,
    name: String,
    block_t: Option<DateTime<Utc>>,
    block_c: i64,
    info: Value,
    data: Value,
    tokens: Vec<String>,
}

impl From<UserAddrRow> for UserAddr {
    fn from(row: UserAddrRow) -> Self {
        UserAddr {
            id: row.id,
            user_id: row.user_id,
            addr_id: row.addr_id,
            name: row.name,
            block_t: row.block_t,
            block_c: row.block_c as u64,
            info: JsonPatch::new(row.info),
            data: JsonPatch::new(row.data),
            tokens: row.tokens.into_iter().collect(),
        }
    }
}

#[derive(FromRow)]
struct EventRow {
    id: i64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    kind: String,
    payload: Value,
    claim: Vec<String>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            created_at: row.created_at,
            expires_at: row.expires_at,
            kind: match row.kind.as_str() {
                "block" => EventKind::Block,
                other => unreachable!("unknown event kind in storage: {other}"),
            },
            payload: row.payload,
            claim: row.claim.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_address_by_id(&self, id: i64) -> Result<Option<Address>, StoreError> {
        let row: Option<AddressRow> = sqlx::query_as("SELECT id, kind, hx, hy, last_seen_height, info FROM addresses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(Address::from))
    }

    async fn get_address_by_hex(&self, hx: &str) -> Result<Option<Address>, StoreError> {
        let row: Option<AddressRow> = sqlx::query_as("SELECT id, kind, hx, hy, last_seen_height, info FROM addresses WHERE hx = $1")
            .bind(hx)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(Address::from))
    }

    async fn get_address_by_base36(&self, hy: &str) -> Result<Option<Address>, StoreError> {
        let row: Option<AddressRow> = sqlx::query_as("SELECT id, kind, hx, hy, last_seen_height, info FROM addresses WHERE hy = $1")
            .bind(hy)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(Address::from))
    }

    async fn insert_address(
        &self,
        kind: AddressType,
        hx: String,
        hy: String,
        last_seen_height: u64,
    ) -> Result<Address, StoreError> {
        let row: AddressRow = sqlx::query_as(
            "INSERT INTO addresses (kind, hx, hy, last_seen_height, info)
             VALUES ($1, $2, $3, $4, '{}'::jsonb)
             RETURNING id, kind, hx, hy, last_seen_height, info",
        )
        .bind(address_kind_str(kind))
        .bind(&hx)
        .bind(&hy)
        .bind(last_seen_height as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.into())
    }

    async fn update_address_info(&self, addr_id: i64, info: JsonPatch, last_seen_height: u64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE addresses SET info = $1, last_seen_height = $2 WHERE id = $3")
            .bind(info.as_value())
            .bind(last_seen_height as i64)
            .bind(addr_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("address {addr_id}")));
        }
        Ok(())
    }

    async fn addresses_matching(
        &self,
        hex_set: &HashSet<String>,
        base36_set: &HashSet<String>,
    ) -> Result<Vec<Address>, StoreError> {
        let hex_vec: Vec<String> = hex_set.iter().cloned().collect();
        let base36_vec: Vec<String> = base36_set.iter().cloned().collect();
        let rows: Vec<AddressRow> = sqlx::query_as(
            "SELECT id, kind, hx, hy, last_seen_height, info FROM addresses WHERE hx = ANY($1) OR hy = ANY($2)",
        )
        .bind(&hex_vec)
        .bind(&base36_vec)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(Address::from).collect())
    }

    async fn subscriber_count(&self, addr_id: i64) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM user_addrs WHERE addr_id = $1")
            .bind(addr_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.try_get::<i64, _>("n").map_err(map_sqlx)?)
    }

    async fn delete_address_if_orphaned(&self, addr_id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let remaining: i64 = sqlx::query("SELECT COUNT(*) AS n FROM user_addrs WHERE addr_id = $1")
            .bind(addr_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx)?
            .try_get("n")
            .map_err(map_sqlx)?;
        if remaining > 0 {
            return Ok(());
        }

        sqlx::query(
            "DELETE FROM blocks WHERE id IN (
                SELECT block_id FROM addr_hist WHERE addr_id = $1
             ) AND NOT EXISTS (
                SELECT 1 FROM addr_hist h WHERE h.block_id = blocks.id AND h.addr_id <> $1
             )",
        )
        .bind(addr_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        sqlx::query("DELETE FROM addr_hist WHERE addr_id = $1")
            .bind(addr_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        sqlx::query("DELETE FROM addresses WHERE id = $1")
            .bind(addr_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    async fn max_block_height(&self) -> Result<Option<u64>, StoreError> {
        let row = sqlx::query("SELECT MAX(height) AS h FROM blocks")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        let height: Option<i64> = row.try_get("h").map_err(map_sqlx)?;
        Ok(height.map(|h| h as u64))
    }

    async fn get_block_by_id(&self, id: i64) -> Result<Option<Block>, StoreError> {
        let row: Option<BlockRow> = sqlx::query_as("SELECT id, height, hash, conf, info, tx FROM blocks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(Block::from))
    }

    async fn get_block_by_height(&self, height: u64) -> Result<Option<Block>, StoreError> {
        let row: Option<BlockRow> = sqlx::query_as("SELECT id, height, hash, conf, info, tx FROM blocks WHERE height = $1")
            .bind(height as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(Block::from))
    }

    async fn insert_block(
        &self,
        height: u64,
        hash: String,
        conf: u32,
        info: JsonPatch,
        tx: Vec<Value>,
    ) -> Result<Block, StoreError> {
        let row: BlockRow = sqlx::query_as(
            "INSERT INTO blocks (height, hash, conf, info, tx)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, height, hash, conf, info, tx",
        )
        .bind(height as i64)
        .bind(&hash)
        .bind(conf as i32)
        .bind(info.as_value())
        .bind(Value::Array(tx))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.into())
    }

    async fn set_block_conf(&self, block_id: i64, conf: u32) -> Result<(), StoreError> {
        sqlx::query("UPDATE blocks SET conf = $1 WHERE id = $2")
            .bind(conf as i32)
            .bind(block_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn delete_block(&self, block_id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        sqlx::query("DELETE FROM user_addr_hist WHERE addr_hist_id IN (SELECT id FROM addr_hist WHERE block_id = $1)")
            .bind(block_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        sqlx::query("DELETE FROM addr_hist WHERE block_id = $1")
            .bind(block_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        sqlx::query("DELETE FROM blocks WHERE id = $1")
            .bind(block_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    async fn blocks_ascending(&self) -> Result<Vec<Block>, StoreError> {
        let rows: Vec<BlockRow> = sqlx::query_as("SELECT id, height, hash, conf, info, tx FROM blocks ORDER BY height ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(Block::from).collect())
    }

    async fn history_count(&self, block_id: i64) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM addr_hist WHERE block_id = $1")
            .bind(block_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.try_get("n").map_err(map_sqlx)
    }

    async fn insert_addr_hist(
        &self,
        block_id: i64,
        addr_id: i64,
        info_old: JsonPatch,
        info_new: JsonPatch,
    ) -> Result<AddrHist, StoreError> {
        let row: AddrHistRow = sqlx::query_as(
            "INSERT INTO addr_hist (block_id, addr_id, info_old, info_new)
             VALUES ($1, $2, $3, $4)
             RETURNING id, block_id, addr_id, info_old, info_new",
        )
        .bind(block_id)
        .bind(addr_id)
        .bind(info_old.as_value())
        .bind(info_new.as_value())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.into())
    }

    async fn addr_hist_for_block(&self, block_id: i64) -> Result<Vec<AddrHist>, StoreError> {
        let rows: Vec<AddrHistRow> = sqlx::query_as(
            "SELECT id, block_id, addr_id, info_old, info_new FROM addr_hist WHERE block_id = $1",
        )
        .bind(block_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(AddrHist::from).collect())
    }

    async fn update_addr_hist_info_new(&self, id: i64, info_new: JsonPatch) -> Result<(), StoreError> {
        sqlx::query("UPDATE addr_hist SET info_old = info_new, info_new = $1 WHERE id = $2")
            .bind(info_new.as_value())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn insert_user_addr_hist(
        &self,
        user_addr_id: i64,
        addr_hist_id: i64,
        block_t: Option<DateTime<Utc>>,
        block_c: u64,
    ) -> Result<UserAddrHist, StoreError> {
        let row: UserAddrHistRow = sqlx::query_as(
            "INSERT INTO user_addr_hist (user_addr_id, addr_hist_id, block_t, block_c, data)
             VALUES ($1, $2, $3, $4, '{}'::jsonb)
             RETURNING id, user_addr_id, addr_hist_id, block_t, block_c, data",
        )
        .bind(user_addr_id)
        .bind(addr_hist_id)
        .bind(block_t)
        .bind(block_c as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.into())
    }

    async fn user_addr_hist_for_addr_hist(&self, addr_hist_id: i64) -> Result<Vec<UserAddrHist>, StoreError> {
        let rows: Vec<UserAddrHistRow> = sqlx::query_as(
            "SELECT id, user_addr_id, addr_hist_id, block_t, block_c, data FROM user_addr_hist WHERE addr_hist_id = $1",
        )
        .bind(addr_hist_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(UserAddrHist::from).collect())
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as("SELECT id, handle, info, data FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(User::from))
    }

    async fn get_user_by_handle(&self, handle: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as("SELECT id, handle, info, data FROM users WHERE handle = $1")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(User::from))
    }

    async fn create_user(&self, handle: String) -> Result<User, StoreError> {
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (handle, info, data) VALUES ($1, '{}'::jsonb, '{}'::jsonb)
             RETURNING id, handle, info, data",
        )
        .bind(&handle)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.into())
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        sqlx::query("DELETE FROM user_addrs WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    async fn update_user_info(&self, id: i64, patch: JsonPatch, overwrite: bool) -> Result<User, StoreError> {
        let current = self
            .get_user(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        let merged = current.info.with_patch(patch.as_value(), overwrite);
        let row: UserRow = sqlx::query_as("UPDATE users SET info = $1 WHERE id = $2 RETURNING id, handle, info, data")
            .bind(merged.as_value())
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.into())
    }

    async fn get_user_addr(&self, id: i64) -> Result<Option<UserAddr>, StoreError> {
        let row: Option<UserAddrRow> = sqlx::query_as(
            "SELECT id, user_id, addr_id, name, block_t, block_c, info, data, tokens FROM user_addrs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.map(UserAddr::from))
    }

    async fn get_user_addr_by_user_and_addr(&self, user_id: i64, addr_id: i64) -> Result<Option<UserAddr>, StoreError> {
        let row: Option<UserAddrRow> = sqlx::query_as(
            "SELECT id, user_id, addr_id, name, block_t, block_c, info, data, tokens
             FROM user_addrs WHERE user_id = $1 AND addr_id = $2",
        )
        .bind(user_id)
        .bind(addr_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.map(UserAddr::from))
    }

    async fn subscriptions_for_address(&self, addr_id: i64) -> Result<Vec<UserAddr>, StoreError> {
        let rows: Vec<UserAddrRow> = sqlx::query_as(
            "SELECT id, user_id, addr_id, name, block_t, block_c, info, data, tokens
             FROM user_addrs WHERE addr_id = $1",
        )
        .bind(addr_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(UserAddr::from).collect())
    }

    async fn create_subscription(&self, user_id: i64, addr_id: i64, name: String) -> Result<UserAddr, StoreError> {
        UserAddr::new(0, user_id, addr_id, name.clone()).map_err(|e| StoreError::Conflict(e.to_string()))?;
        let row: UserAddrRow = sqlx::query_as(
            "INSERT INTO user_addrs (user_id, addr_id, name, block_t, block_c, info, data, tokens)
             VALUES ($1, $2, $3, NULL, 0, '{}'::jsonb, '{}'::jsonb, ARRAY[]::text[])
             RETURNING id, user_id, addr_id, name, block_t, block_c, info, data, tokens",
        )
        .bind(user_id)
        .bind(addr_id)
        .bind(&name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.into())
    }

    async fn update_subscription(&self, user_addr: &UserAddr) -> Result<(), StoreError> {
        let (conflict,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(
                 SELECT 1 FROM user_addrs
                 WHERE user_id = $1 AND name = $2 AND id != $3
             )",
        )
        .bind(user_addr.user_id)
        .bind(&user_addr.name)
        .bind(user_addr.id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        if conflict {
            return Err(StoreError::Conflict(format!(
                "subscription name {:?} already used by another of user {}'s subscriptions",
                user_addr.name, user_addr.user_id
            )));
        }

        let tokens: Vec<String> = user_addr.tokens.iter().cloned().collect();
        let result = sqlx::query(
            "UPDATE user_addrs SET name = $1, block_t = $2, block_c = $3, info = $4, data = $5, tokens = $6
             WHERE id = $7",
        )
        .bind(&user_addr.name)
        .bind(user_addr.block_t)
        .bind(user_addr.block_c as i64)
        .bind(user_addr.info.as_value())
        .bind(user_addr.data.as_value())
        .bind(&tokens)
        .bind(user_addr.id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user_addr {}", user_addr.id)));
        }
        Ok(())
    }

    async fn delete_subscription(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM user_addrs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn append_event(&self, kind: EventKind, payload: Value, now: DateTime<Utc>) -> Result<Event, StoreError> {
        let expires_at = now + chrono::Duration::hours(hyve_types::EVENT_TTL_HOURS);
        let row: EventRow = sqlx::query_as(
            "INSERT INTO events (created_at, expires_at, kind, payload, claim)
             VALUES ($1, $2, $3, $4, ARRAY[]::text[])
             RETURNING id, created_at, expires_at, kind, payload, claim",
        )
        .bind(now)
        .bind(expires_at)
        .bind(kind.as_str())
        .bind(&payload)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query("DELETE FROM events WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(row.into())
    }

    async fn claim_batch(&self, kind: EventKind, claimant: &str, limit: i64, now: DateTime<Utc>) -> Result<Vec<Event>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT id, created_at, expires_at, kind, payload, claim FROM events
             WHERE kind = $1 AND expires_at > $2 AND NOT ($3 = ANY(claim))
             ORDER BY id ASC
             LIMIT $4
             FOR UPDATE",
        )
        .bind(kind.as_str())
        .bind(now)
        .bind(claimant)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        if !ids.is_empty() {
            sqlx::query("UPDATE events SET claim = array_append(claim, $1) WHERE id = ANY($2)")
                .bind(claimant)
                .bind(&ids)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
        }
        tx.commit().await.map_err(map_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let mut event = Event::from(row);
                event.claim_for(claimant);
                event
            })
            .collect())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM events WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }
}
