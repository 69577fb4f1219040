use serde::{Deserialize, Serialize};

use crate::json::JsonPatch;

/// A subscriber account. `handle` is the external identifier (e.g. a
/// Telegram user id) and must be unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub handle: String,
    pub info: JsonPatch,
    pub data: JsonPatch,
}

impl User {
    pub fn new(id: i64, handle: String) -> Self {
        Self {
            id,
            handle,
            info: JsonPatch::default(),
            data: JsonPatch::default(),
        }
    }
}
