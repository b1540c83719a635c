//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE helpers for HomeVault services.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;
use tracing::warn;

/// Interval between keep-alive comments on every SSE stream
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serialize a payload into a named SSE event
///
/// Returns `None` (and logs) if serialization fails; callers skip the event.
pub fn json_event<T: Serialize>(event_type: &str, payload: &T) -> Option<Event> {
    match serde_json::to_string(payload) {
        Ok(data) => Some(Event::default().event(event_type).data(data)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
            None
        }
    }
}

/// Wrap a stream in an SSE response with the standard heartbeat
pub fn with_heartbeat<S>(stream: S) -> Sse<S>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
