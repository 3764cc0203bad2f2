//! Server-sent event relay
//!
//! Bridges a session's broadcast channel to a client. Per-session ordering
//! is preserved; lagged clients silently skip missed events.

use crate::runtime::SessionEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert a session's broadcast channel into an SSE response
pub fn sse_stream(
    broadcast_rx: tokio::sync::broadcast::Receiver<SessionEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(event) => Some(Ok(session_event_to_sse(event))),
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn session_event_to_sse(event: SessionEvent) -> Event {
    let (event_type, data) = match event {
        SessionEvent::Turn { role, text } => ("turn", json!({"role": role, "text": text})),
        SessionEvent::ReplyDelta { text } => ("delta", json!({"text": text})),
        SessionEvent::ReplyDone => ("reply_done", json!({})),
        SessionEvent::Retrying { attempt } => ("retrying", json!({"attempt": attempt})),
        SessionEvent::Error { message } => ("error", json!({"message": message})),
        SessionEvent::Closed => ("closed", json!({})),
    };

    Event::default().event(event_type).data(data.to_string())
}
