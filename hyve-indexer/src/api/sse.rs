use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::Json;
use futures::stream::{Stream, StreamExt};

use hyve_core::sse::gate_loop;
use hyve_types::sse::{AddrHistResult, BlockSseEvent, BlockSseResult, UserAddrHistResult};
use hyve_types::{Event, EventKind};

use super::{ApiError, AppState};

/// `GET /sse/block` — spec §4.6: an unbounded gate/claim loop framed as
/// SSE, `retry: 30000`, `event: block`.
pub async fn stream_block(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    build_stream(state, addr, None)
}

/// `GET /sse/block/next` — same loop, closes after the first event.
pub async fn stream_block_next(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    build_stream(state, addr, Some(1))
}

fn build_stream(
    state: AppState,
    addr: SocketAddr,
    limit: Option<usize>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    // The remote address is the "stable claimant token" spec §4.6 asks for.
    let claimant = addr.to_string();
    let stream = gate_loop(state.events, EventKind::Block, claimant, limit).map(|event| {
        Ok(SseEvent::default()
            .event("block")
            .retry(Duration::from_millis(30_000))
            .data(event.payload.to_string()))
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(30)).text("keep-alive"))
}

/// `GET /sse/block/{block_pk}/{create|mature}` — internal trigger used to
/// (re-)enqueue a `block/create` or `block/mature` event for an
/// already-stored block; the ingestion pipeline and confirmation tracker
/// append directly through `EventBus` in-process, this path exists for
/// out-of-band replay/ops use.
pub async fn trigger_block_event(
    State(state): State<AppState>,
    Path((block_pk, transition)): Path<(i64, String)>,
) -> Result<Json<Event>, ApiError> {
    let sse_event = match transition.as_str() {
        "create" => BlockSseEvent::Create,
        "mature" => BlockSseEvent::Mature,
        other => return Err(ApiError::BadRequest(format!("unknown transition {other:?}, expected create or mature"))),
    };

    let block = state
        .store
        .get_block_by_id(block_pk)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("block {block_pk}")))?;

    let mut hist_results = Vec::new();
    for hist in state.store.addr_hist_for_block(block.id).await? {
        let Some(address) = state.store.get_address_by_id(hist.addr_id).await? else {
            continue;
        };

        let mut subscribers = Vec::new();
        for snapshot in state.store.user_addr_hist_for_addr_hist(hist.id).await? {
            let name = state
                .store
                .get_user_addr(snapshot.user_addr_id)
                .await?
                .map(|ua| ua.name)
                .unwrap_or_default();
            subscribers.push(UserAddrHistResult {
                user_addr_id: snapshot.user_addr_id,
                name,
                block_t: snapshot.block_t,
                block_c: snapshot.block_c,
            });
        }

        hist_results.push(AddrHistResult {
            mined: block.miner_is(&address.hy),
            address,
            info_old: hist.info_old,
            info_new: hist.info_new,
            subscribers,
        });
    }

    let sse_result = BlockSseResult {
        id: block.id,
        event: sse_event,
        height: block.height,
        hash: block.hash.clone(),
        info: block.info.clone(),
        hist: hist_results,
    };

    let payload =
        serde_json::to_value(&sse_result).map_err(|err| ApiError::Internal(err.to_string()))?;
    let event = state.events.append(EventKind::Block, payload).await?;

    Ok(Json(event))
}
