//! Response negotiation
//!
//! Picks between a single JSON document and a Server-Sent-Events frame for a
//! dispatched response, then renders it with the session header attached.

use super::protocol::JsonRpcResponse;
use crate::types::SessionId;
use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{sse::Event as SseEvent, IntoResponse, Response, Sse},
    Json,
};
use serde::Serialize;
use std::convert::Infallible;
use tracing::{debug, error, warn};

/// Session continuation header
pub const MCP_SESSION_ID: &str = "mcp-session-id";

pub const EVENT_STREAM: &str = "text/event-stream";
pub const APPLICATION_JSON: &str = "application/json";

/// How a method's result wants to be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// One reply document
    Single,
    /// Worth streaming if the caller can take a stream
    Stream,
}

/// Rendering chosen for one response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Json,
    EventStream,
}

/// Media types the caller declared in `Accept`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptPreference {
    pub event_stream: bool,
    pub json: bool,
}

impl AcceptPreference {
    /// Parse an `Accept` header value; entries with `q=0` are ignored
    pub fn parse(header: Option<&str>) -> Self {
        let mut preference = Self::default();
        let Some(header) = header else {
            return preference;
        };

        for entry in header.split(',') {
            let mut parts = entry.split(';');
            let media_type = parts.next().unwrap_or("").trim().to_ascii_lowercase();
            let refused = parts.any(|param| {
                param
                    .trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    == Some(0.0)
            });
            if refused {
                continue;
            }
            match media_type.as_str() {
                EVENT_STREAM => preference.event_stream = true,
                APPLICATION_JSON | "application/*" | "*/*" => preference.json = true,
                _ => {}
            }
        }
        preference
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::parse(headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()))
    }
}

/// Choose a rendering for a result with the given delivery
pub fn negotiate(accept: AcceptPreference, delivery: Delivery) -> ResponseMode {
    if accept.event_stream && delivery == Delivery::Stream {
        return ResponseMode::EventStream;
    }
    if !accept.json {
        // Never fail over an Accept header we do not understand.
        debug!("No recognized Accept preference, defaulting to JSON");
    }
    ResponseMode::Json
}

/// Render an envelope in the chosen mode with the session header attached
pub fn render(
    mode: ResponseMode,
    status: StatusCode,
    session_id: &SessionId,
    envelope: &JsonRpcResponse,
) -> Response {
    let mut response = match mode {
        ResponseMode::Json => (status, Json(envelope)).into_response(),
        ResponseMode::EventStream => {
            let frame = message_event(envelope);
            let stream = tokio_stream::once(Ok::<_, Infallible>(frame));
            (status, Sse::new(stream)).into_response()
        }
    };
    attach_session(&mut response, session_id);
    response
}

/// Bodyless response carrying only the session header
pub fn render_empty(status: StatusCode, session_id: &SessionId) -> Response {
    let mut response = status.into_response();
    attach_session(&mut response, session_id);
    response
}

/// Set the `Mcp-Session-Id` header
pub fn attach_session(response: &mut Response, session_id: &SessionId) {
    match HeaderValue::from_str(session_id.as_str()) {
        Ok(value) => {
            response.headers_mut().insert(MCP_SESSION_ID, value);
        }
        Err(e) => warn!("Session id {} is not a valid header value: {}", session_id, e),
    }
}

/// Frame a JSON payload as an SSE `message` event
pub fn message_event<T: Serialize>(payload: &T) -> SseEvent {
    match serde_json::to_string(payload) {
        Ok(data) => SseEvent::default().event("message").data(data),
        Err(e) => {
            error!("Failed to serialize SSE payload: {}", e);
            SseEvent::default().event("error").data("serialization failed")
        }
    }
}
