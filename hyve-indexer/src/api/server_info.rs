use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use super::AppState;

#[derive(Serialize)]
pub struct ServerInfo {
    pub mainnet: bool,
}

pub async fn server_info(State(state): State<AppState>) -> Json<ServerInfo> {
    Json(ServerInfo { mainnet: state.mainnet })
}

/// Chain-wide statistics snapshot production is an external collaborator
/// (spec §1 Non-goals); this surface stays a typed stub other tools can
/// poll without erroring.
pub async fn stats() -> Json<Value> {
    Json(json!({}))
}
