use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use hyve_types::user_addr::validate_name;
use hyve_types::{JsonPatch, User, UserAddr};

use super::{ApiError, AppState};

#[derive(Deserialize)]
pub struct CreateUserBody {
    pub handle: String,
}

pub async fn create_user(State(state): State<AppState>, Json(body): Json<CreateUserBody>) -> Result<Json<User>, ApiError> {
    if state.store.get_user_by_handle(&body.handle).await?.is_some() {
        return Err(ApiError::BadRequest(format!("handle {:?} already exists", body.handle)));
    }
    let user = state.store.create_user(body.handle).await?;
    Ok(Json(user))
}

pub async fn get_user(State(state): State<AppState>, Path(pk): Path<i64>) -> Result<Json<User>, ApiError> {
    state
        .store
        .get_user(pk)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("user {pk}")))
}

pub async fn get_user_by_handle(State(state): State<AppState>, Path(tgid): Path<String>) -> Result<Json<User>, ApiError> {
    state
        .store
        .get_user_by_handle(&tgid)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("user handle {tgid:?}")))
}

pub async fn delete_user(State(state): State<AppState>, Path(pk): Path<i64>) -> Result<StatusCode, ApiError> {
    state.store.delete_user(pk).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct PatchInfoBody {
    pub patch: Value,
    #[serde(default)]
    pub over: bool,
}

pub async fn update_user_info(
    State(state): State<AppState>,
    Path(pk): Path<i64>,
    Json(body): Json<PatchInfoBody>,
) -> Result<Json<User>, ApiError> {
    let user = state.store.update_user_info(pk, JsonPatch::new(body.patch), body.over).await?;
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct CreateSubscriptionBody {
    pub addr: String,
    pub name: String,
}

/// `POST /u/{pk}/a/` — resolves `addr` through the Address Registry
/// (creating the address row on first sight, per spec §4.2's
/// `Get(address, create=true)`), then adds the named subscription.
pub async fn create_subscription(
    State(state): State<AppState>,
    Path(pk): Path<i64>,
    Json(body): Json<CreateSubscriptionBody>,
) -> Result<Json<UserAddr>, ApiError> {
    let address = state
        .registry
        .get(&*state.store, &*state.node, &body.addr, 0, true)
        .await?
        .ok_or_else(|| ApiError::Internal("address registry returned nothing for create=true".into()))?;

    if state.store.get_user_addr_by_user_and_addr(pk, address.id).await?.is_some() {
        return Err(ApiError::BadRequest(format!(
            "user {pk} is already subscribed to {}",
            address.hy
        )));
    }

    let subscription = state.store.create_subscription(pk, address.id, body.name).await?;
    Ok(Json(subscription))
}

/// `GET /u/{pk}/a/{addr}` — reads a subscription by the address it
/// watches, not by subscription id (see `update_subscription`/
/// `delete_subscription` for the id-keyed counterparts).
pub async fn get_subscription(
    State(state): State<AppState>,
    Path((pk, addr)): Path<(i64, String)>,
) -> Result<Json<UserAddr>, ApiError> {
    let address = resolve_existing_address(&state, &addr).await?;
    state
        .store
        .get_user_addr_by_user_and_addr(pk, address.id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no subscription from user {pk} to {addr}")))
}

#[derive(Deserialize, Default)]
pub struct UpdateSubscriptionBody {
    pub name: Option<String>,
    pub info: Option<Value>,
    pub data: Option<Value>,
    #[serde(default)]
    pub over: bool,
}

pub async fn update_subscription(
    State(state): State<AppState>,
    Path((_pk, ua_id)): Path<(i64, i64)>,
    Json(body): Json<UpdateSubscriptionBody>,
) -> Result<Json<UserAddr>, ApiError> {
    let mut subscription = state
        .store
        .get_user_addr(ua_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("subscription {ua_id}")))?;

    if let Some(name) = body.name {
        validate_name(&name).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        subscription.name = name;
    }
    if let Some(info) = &body.info {
        subscription.info = subscription.info.with_patch(info, body.over);
    }
    if let Some(data) = &body.data {
        subscription.data = subscription.data.with_patch(data, body.over);
    }

    state.store.update_subscription(&subscription).await?;
    Ok(Json(subscription))
}

pub async fn delete_subscription(
    State(state): State<AppState>,
    Path((_pk, ua_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    let subscription = state
        .store
        .get_user_addr(ua_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("subscription {ua_id}")))?;

    state.store.delete_subscription(ua_id).await?;
    state.store.delete_address_if_orphaned(subscription.addr_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct TokenBody {
    pub addr: String,
}

pub async fn add_token(
    State(state): State<AppState>,
    Path((_pk, ua_id)): Path<(i64, i64)>,
    Json(body): Json<TokenBody>,
) -> Result<Json<UserAddr>, ApiError> {
    let mut subscription = state
        .store
        .get_user_addr(ua_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("subscription {ua_id}")))?;

    let (hx, _hy) = state.registry.normalize(&*state.node, &body.addr, 0).await?;
    subscription.tokens.insert(hx);
    state.store.update_subscription(&subscription).await?;
    Ok(Json(subscription))
}

pub async fn remove_token(
    State(state): State<AppState>,
    Path((_pk, ua_id, addr)): Path<(i64, i64, String)>,
) -> Result<Json<UserAddr>, ApiError> {
    let mut subscription = state
        .store
        .get_user_addr(ua_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("subscription {ua_id}")))?;

    let (hx, _hy) = state.registry.normalize(&*state.node, &addr, 0).await?;
    subscription.tokens.remove(&hx);
    state.store.update_subscription(&subscription).await?;
    Ok(Json(subscription))
}

async fn resolve_existing_address(state: &AppState, addr: &str) -> Result<hyve_types::Address, ApiError> {
    state
        .registry
        .get(&*state.store, &*state.node, addr, 0, false)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("address {addr} is not known to the registry")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use serde_json::json;

    use hyve_core::store::memory::MemoryStore;
    use hyve_core::{AddressRegistry, EventBus};
    use hyve_rpc::mock::MockNodeClient;

    use super::*;

    fn test_state() -> AppState {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(EventBus::new(store.clone()));
        let node = MockNodeClient::new();
        // hex<->base36 mappings for the wallets used across these tests, so
        // the Address Registry's `normalize` never hits an unscripted node call.
        node.set_hex_mapping("W".repeat(34), "a".repeat(40));
        node.set_hex_mapping("X".repeat(34), "b".repeat(40));
        AppState {
            store,
            events,
            node: Arc::new(node),
            registry: Arc::new(AddressRegistry::new()),
            mainnet: false,
        }
    }

    #[tokio::test]
    async fn create_then_get_user_round_trips() {
        let state = test_state();
        let created = create_user(
            State(state.clone()),
            Json(CreateUserBody { handle: "alice".into() }),
        )
        .await
        .unwrap();

        let fetched = get_user(State(state), Path(created.0.id)).await.unwrap();
        assert_eq!(fetched.0.handle, "alice");
    }

    #[tokio::test]
    async fn create_user_rejects_duplicate_handle() {
        let state = test_state();
        create_user(State(state.clone()), Json(CreateUserBody { handle: "bob".into() })).await.unwrap();

        let err = create_user(State(state), Json(CreateUserBody { handle: "bob".into() }))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn get_user_missing_is_not_found() {
        let state = test_state();
        let err = get_user(State(state), Path(9999)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn subscription_lifecycle_create_update_delete() {
        let state = test_state();
        let address = state
            .store
            .insert_address(hyve_types::AddressType::Wallet, "a".repeat(40), "W".repeat(34), 0)
            .await
            .unwrap();
        let user = state.store.create_user("carol".into()).await.unwrap();

        let subscription = create_subscription(
            State(state.clone()),
            Path(user.id),
            Json(CreateSubscriptionBody { addr: address.hy.clone(), name: "carol-wallet".into() }),
        )
        .await
        .unwrap();
        assert_eq!(subscription.0.addr_id, address.id);

        let fetched = get_subscription(State(state.clone()), Path((user.id, address.hy.clone())))
            .await
            .unwrap();
        assert_eq!(fetched.0.id, subscription.0.id);

        let updated = update_subscription(
            State(state.clone()),
            Path((user.id, subscription.0.id)),
            Json(UpdateSubscriptionBody {
                name: Some("renamed".into()),
                info: Some(json!({"note": "hi"})),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.0.name, "renamed");
        assert_eq!(updated.0.info.0, json!({"note": "hi"}));

        delete_subscription(State(state.clone()), Path((user.id, subscription.0.id)))
            .await
            .unwrap();
        assert!(state.store.get_user_addr(subscription.0.id).await.unwrap().is_none());
        // The address had exactly one subscriber; it's now orphaned and gone.
        assert!(state.store.get_address_by_id(address.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_subscription_rejects_invalid_name() {
        let state = test_state();
        let address = state
            .store
            .insert_address(hyve_types::AddressType::Wallet, "b".repeat(40), "X".repeat(34), 0)
            .await
            .unwrap();
        let user = state.store.create_user("dave".into()).await.unwrap();
        let subscription = state.store.create_subscription(user.id, address.id, "dave-wallet".into()).await.unwrap();

        let err = update_subscription(
            State(state),
            Path((user.id, subscription.id)),
            Json(UpdateSubscriptionBody { name: Some("a".into()), ..Default::default() }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn update_subscription_rejects_name_collision_with_another_subscription() {
        let state = test_state();
        let user = state.store.create_user("erin".into()).await.unwrap();
        let wallet = state
            .store
            .insert_address(hyve_types::AddressType::Wallet, "a".repeat(40), "W".repeat(34), 0)
            .await
            .unwrap();
        let token = state
            .store
            .insert_address(hyve_types::AddressType::Wallet, "b".repeat(40), "X".repeat(34), 0)
            .await
            .unwrap();
        state.store.create_subscription(user.id, wallet.id, "taken".into()).await.unwrap();
        let other = state.store.create_subscription(user.id, token.id, "free".into()).await.unwrap();

        let err = update_subscription(
            State(state.clone()),
            Path((user.id, other.id)),
            Json(UpdateSubscriptionBody { name: Some("taken".into()), ..Default::default() }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        // Unchanged: the collision was rejected, not silently applied.
        assert_eq!(state.store.get_user_addr(other.id).await.unwrap().unwrap().name, "free");
    }
}
