//! Server-Sent Events for batch progress
//!
//! - `GET /events`: global feed of batch lifecycle events (floating indicator)
//! - `GET /batches/:batch_id/events`: one batch's snapshot, progress and finish

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use homevault_common::sse::{json_event, with_heartbeat, HEARTBEAT_INTERVAL};
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::BatchUpdate;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct EventFilter {
    /// Only forward events of this user
    pub user_id: Option<String>,
}

/// GET /events
///
/// Streams events:
/// - BatchStarted
/// - BatchProgress
/// - BatchCompleted
/// - BatchFailed
pub async fn event_stream(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(user_id = ?filter.user_id, "New SSE client connected to batch events");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    let event = match received {
                        Ok(event) => event,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("SSE: Client lagged, {} events skipped", skipped);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    if !event.is_batch_event() {
                        continue;
                    }
                    if let Some(user_id) = &filter.user_id {
                        if event.user_id() != user_id {
                            continue;
                        }
                    }

                    if let Some(sse_event) = json_event(event.event_type(), &event) {
                        yield Ok(sse_event);
                    }
                }
            }
        }
    };

    with_heartbeat(stream)
}

/// GET /batches/:batch_id/events
///
/// Sends a `Snapshot` first. A finished batch is followed by `Finished` and
/// the stream ends; a running one streams every `Progress` until `Finished`.
/// Unknown batch ids are a 404.
pub async fn batch_event_stream(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let (snapshot, updates) = match state.batches.registry().get(batch_id).await {
        Some(handle) => {
            let (snapshot, rx) = handle.subscribe().await;
            (snapshot, Some(rx))
        }
        None => {
            let session = state
                .batches
                .status(batch_id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("Batch not found: {}", batch_id)))?;
            (session, None)
        }
    };

    info!(batch_id = %batch_id, state = ?snapshot.state, "New SSE client connected to batch");

    let stream = async_stream::stream! {
        if let Some(event) = json_event("Snapshot", &snapshot) {
            yield Ok(event);
        }

        match updates {
            Some(mut rx) if !snapshot.is_terminal() => loop {
                match rx.recv().await {
                    Ok(update) => {
                        let is_finished = matches!(update, BatchUpdate::Finished { .. });
                        if let Some(event) = json_event(update.event_type(), &update) {
                            yield Ok(event);
                        }
                        if is_finished {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Progress carries cumulative results; the next one catches up
                        debug!(batch_id = %batch_id, "SSE: {} batch updates skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            },
            _ => {
                let finished = BatchUpdate::Finished { summary: snapshot.summary() };
                if let Some(event) = json_event(finished.event_type(), &finished) {
                    yield Ok(event);
                }
            }
        }
    };

    Ok(with_heartbeat(stream))
}

pub fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(event_stream))
        .route("/batches/:batch_id/events", get(batch_event_stream))
}
