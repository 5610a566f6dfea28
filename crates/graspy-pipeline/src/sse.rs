//! Server-sent-events encoding of a [`StreamSession`].
//!
//! | Frame           | SSE event name | Data                       |
//! |-----------------|----------------|----------------------------|
//! | progress event  | `message`      | the event as JSON          |
//! | ping            | `ping`         | `keepalive`                |
//! | end of stream   | (none)         | `[DONE]`                   |
//!
//! Routing is left to the embedder; a handler only needs to build the
//! session and return [`sse_response`].

use axum::http::{header, HeaderName};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tracing::warn;

use crate::error::Result;
use crate::session::{StreamFrame, StreamSession};

/// SSE event name for progress events.
pub const MESSAGE_EVENT: &str = "message";

/// SSE event name for liveness pings.
pub const PING_EVENT: &str = "ping";

/// Data of a liveness ping.
pub const PING_DATA: &str = "keepalive";

/// Data of the end-of-stream marker.
pub const DONE_MARKER: &str = "[DONE]";

/// Encodes one frame as an SSE event.
///
/// # Errors
///
/// Returns a JSON error if the progress event cannot be serialized.
pub fn encode_frame(frame: &StreamFrame) -> Result<Event> {
    Ok(match frame {
        StreamFrame::Event(event) => Event::default()
            .event(MESSAGE_EVENT)
            .data(serde_json::to_string(event)?),
        StreamFrame::Ping => Event::default().event(PING_EVENT).data(PING_DATA),
        StreamFrame::EndOfStream => Event::default().data(DONE_MARKER),
    })
}

/// Turns a session into a streaming SSE response.
///
/// The response ends right after the `[DONE]` marker. If the client goes
/// away first, the body is dropped and the session is cancelled.
pub fn sse_response(session: StreamSession) -> Response {
    let events = session.into_frames().map(|frame| {
        encode_frame(&frame).map_err(|e| {
            warn!(error = %e, "Failed to encode stream frame");
            e
        })
    });

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events),
    )
        .into_response()
}
