//! The thin HTTP/SSE surface over `hyve-core`'s storage and event bus
//! (spec §4.8): shape validation and a direct call into `Store`, no
//! business logic beyond what spec §3/§8 already require.

pub mod server_info;
pub mod sse;
pub mod users;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use serde_json::json;

use hyve_core::{AddressRegistry, EventBus, IndexerError, Store, StoreError};
use hyve_rpc::NodeClient;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub events: Arc<EventBus>,
    pub node: Arc<dyn NodeClient>,
    pub registry: Arc<AddressRegistry>,
    pub mainnet: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/server/info", get(server_info::server_info))
        .route("/stats", get(server_info::stats))
        .route("/sse/block/:block_pk/:transition", get(sse::trigger_block_event))
        .route("/sse/block", get(sse::stream_block))
        .route("/sse/block/next", get(sse::stream_block_next))
        .route("/u/", post(users::create_user))
        .route("/u/:pk", get(users::get_user).delete(users::delete_user))
        .route("/u/tg/:tgid", get(users::get_user_by_handle))
        .route("/u/:pk/info", put(users::update_user_info))
        .route("/u/:pk/a/", post(users::create_subscription))
        .route("/u/:pk/a/:addr", get(users::get_subscription))
        .route(
            "/u/:pk/a/:ua",
            patch(users::update_subscription).delete(users::delete_subscription),
        )
        .route("/u/:pk/a/:ua/t", post(users::add_token))
        .route("/u/:pk/a/:ua/t/:addr", axum::routing::delete(users::remove_token))
        .with_state(state)
}

/// Maps every failure mode onto the status codes spec §7 names for
/// user-visible errors: not-found -> 404, conflict -> 400, else 500.
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Conflict(msg) => ApiError::BadRequest(msg),
            StoreError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<IndexerError> for ApiError {
    fn from(err: IndexerError) -> Self {
        match err {
            IndexerError::Integrity(store_err) => store_err.into(),
            IndexerError::Validation(msg) => ApiError::BadRequest(msg),
            IndexerError::NotFoundOnExplorer(msg) => ApiError::NotFound(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
