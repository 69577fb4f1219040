use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifetime of an event row before it becomes GC-eligible.
pub const EVENT_TTL_HOURS: i64 = 18;

/// The kind tag carried by an [`Event`] row. The spec currently only
/// defines `"block"`, distinguished further by [`crate::BlockSseEvent`]
/// inside the payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Block,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Block => "block",
        }
    }
}

/// A durable, claim-based notification row.
///
/// `id` is strictly monotonic and never reused; consumers sort and
/// deduplicate on it, never on `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub kind: EventKind,
    pub payload: Value,
    pub claim: HashSet<String>,
}

impl Event {
    /// Constructs a row with `expires_at = created_at + 18h`. `id` is left
    /// at `0` — the store assigns the real, post-insert id (see
    /// DESIGN.md's resolution of the "racy max+1" open question).
    pub fn new(created_at: DateTime<Utc>, kind: EventKind, payload: Value) -> Self {
        Self {
            id: 0,
            created_at,
            expires_at: created_at + Duration::hours(EVENT_TTL_HOURS),
            kind,
            payload,
            claim: HashSet::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Adds `claimant` to the claim set if absent. Returns `true` if this
    /// call actually added it (i.e. this is a first delivery to
    /// `claimant`), mirroring `Event.claim_for` in the original.
    pub fn claim_for(&mut self, claimant: &str) -> bool {
        self.claim.insert(claimant.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expiry_is_eighteen_hours_after_creation() {
        let t0 = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let event = Event::new(t0, EventKind::Block, json!({}));
        assert_eq!(event.expires_at, t0 + Duration::hours(18));
        assert!(!event.is_expired(t0 + Duration::hours(17)));
        assert!(event.is_expired(t0 + Duration::hours(19)));
    }

    #[test]
    fn claim_for_is_idempotent() {
        let mut event = Event::new(Utc::now(), EventKind::Block, json!({}));
        assert!(event.claim_for("a"));
        assert!(!event.claim_for("a"));
        assert!(event.claim.contains("a"));
    }
}
