//! The SSE broadcaster's transport-independent core (spec §4.6): a gate
//! loop that turns an [`EventBus`] subscription into a stream of
//! [`Event`] rows for one connection. The HTTP layer wraps this in
//! `axum`'s SSE framing.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, Stream};
use hyve_types::{Event, EventKind};

use crate::events::{EventBus, DEFAULT_CLAIM_LIMIT};
use crate::metrics;

/// Decrements `SSE_CONNECTIONS` when the owning stream is dropped, however
/// it ends (client disconnect, `limit` reached, claim error).
struct ConnectionGauge;

impl ConnectionGauge {
    fn open() -> Self {
        metrics::SSE_CONNECTIONS.inc();
        Self
    }
}

impl Drop for ConnectionGauge {
    fn drop(&mut self) {
        metrics::SSE_CONNECTIONS.dec();
    }
}

struct GateLoopState {
    bus: Arc<EventBus>,
    gate: Arc<tokio::sync::Notify>,
    kind: EventKind,
    claimant: String,
    pending: VecDeque<Event>,
    /// Total events already emitted on this connection; `None` means unbounded.
    emitted: usize,
    limit: Option<usize>,
    _connection: ConnectionGauge,
}

/// Builds the per-connection event stream described in spec §4.6: await
/// the gate, `ClaimBatch`, emit each returned event, optionally stop
/// after `limit` events, reset the gate, loop. Ends when the caller
/// drops the stream (client disconnect) or `limit` is reached.
pub fn gate_loop(bus: Arc<EventBus>, kind: EventKind, claimant: String, limit: Option<usize>) -> impl Stream<Item = Event> {
    let gate = bus.register_gate(kind);
    let state = GateLoopState {
        bus,
        gate,
        kind,
        claimant,
        pending: VecDeque::new(),
        emitted: 0,
        limit,
        _connection: ConnectionGauge::open(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(limit) = state.limit {
                if state.emitted >= limit {
                    return None;
                }
            }

            if let Some(event) = state.pending.pop_front() {
                state.emitted += 1;
                return Some((event, state));
            }

            state.gate.notified().await;
            match state.bus.claim_batch(state.kind, &state.claimant, DEFAULT_CLAIM_LIMIT).await {
                Ok(batch) => state.pending.extend(batch),
                Err(_) => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn gate_loop_delivers_appended_events_in_order() {
        let bus = Arc::new(EventBus::new(Arc::new(MemoryStore::new())));
        let mut stream = Box::pin(gate_loop(bus.clone(), EventKind::Block, "alice".into(), Some(2)));

        bus.append(EventKind::Block, json!({"n": 1})).await.unwrap();
        bus.append(EventKind::Block, json!({"n": 2})).await.unwrap();

        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(first.payload, json!({"n": 1}));
        assert_eq!(second.payload, json!({"n": 2}));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn sse_connections_gauge_tracks_stream_lifetime() {
        let bus = Arc::new(EventBus::new(Arc::new(MemoryStore::new())));
        let before = metrics::SSE_CONNECTIONS.get();
        {
            let stream = gate_loop(bus, EventKind::Block, "bob".into(), Some(1));
            assert_eq!(metrics::SSE_CONNECTIONS.get(), before + 1);
            drop(stream);
        }
        assert_eq!(metrics::SSE_CONNECTIONS.get(), before);
    }
}
