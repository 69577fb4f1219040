use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A point-in-time chain snapshot (APR, supply, network weight, etc.),
/// at most one per `(height, hash)`. Production of these rows is an
/// external collaborator (spec §1); this crate only models the schema
/// contract so the read-side views (`stat.quant_stat_1d`,
/// `stat.quant_net_weight`) have something typed to select into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stat {
    pub id: i64,
    pub height: u64,
    pub hash: String,
    pub created_at: DateTime<Utc>,
    /// Opaque snapshot payload (APR, supply, network weight, ...).
    pub data: Value,
}
