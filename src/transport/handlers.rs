//! Streamable HTTP endpoint
//!
//! Per request: resolve the caller namespace and session, then route by HTTP
//! method. POST carries one JSON-RPC envelope; GET is either a capability
//! query (`?capabilities=true`) or an idle event stream; DELETE ends a
//! session; OPTIONS answers CORS preflights.

use crate::error::MnemoError;
use crate::mcp::classifier::classify;
use crate::mcp::dispatcher::{CallContext, RpcHandler};
use crate::mcp::negotiator::{
    self, attach_session, message_event, negotiate, AcceptPreference, ResponseMode,
    MCP_SESSION_ID,
};
use crate::session::SessionStore;
use crate::types::{Namespace, SessionId};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{sse::KeepAlive, IntoResponse, Response, Sse},
    routing::get,
    Json, Router,
};
use futures::StreamExt as _;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const LAST_EVENT_ID: &str = "last-event-id";

/// Shared state of the endpoint handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionStore>,
    pub handler: Arc<dyn RpcHandler>,
    pub default_namespace: Namespace,
    /// Fired when the server stops; ends open event streams
    pub shutdown: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        handler: Arc<dyn RpcHandler>,
        default_namespace: Namespace,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            sessions,
            handler,
            default_namespace,
            shutdown,
        }
    }

    /// Share an existing shutdown signal instead of a private one
    pub fn with_shutdown(mut self, shutdown: broadcast::Sender<()>) -> Self {
        self.shutdown = shutdown;
        self
    }

    fn namespace(&self, segment: Option<Path<String>>) -> Result<Namespace, Response> {
        match segment {
            None => Ok(self.default_namespace.clone()),
            Some(Path(raw)) => Namespace::parse(&raw).map_err(|e| {
                debug!("Rejecting namespace segment {:?}: {}", raw, e);
                plain_error(StatusCode::BAD_REQUEST, e.to_string())
            }),
        }
    }
}

/// Build the router serving `/mcp`, `/{namespace}/mcp` and `/health`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/mcp",
            get(get_endpoint)
                .post(post_endpoint)
                .delete(delete_endpoint)
                .options(preflight),
        )
        .route(
            "/:namespace/mcp",
            get(get_endpoint)
                .post(post_endpoint)
                .delete(delete_endpoint)
                .options(preflight),
        )
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(middleware::map_response(apply_cors))
        .layer(TraceLayer::new_for_http())
}

/// Session identity settled for one request
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub id: SessionId,
    /// The presented id was found in the store
    pub resumed: bool,
}

/// Reuse the presented session if the store knows it, otherwise mint one
///
/// Store failures never fail the request: a lookup failure falls through to
/// minting, and a failed registration leaves the new id unpersisted.
pub async fn resolve_session(
    store: &dyn SessionStore,
    namespace: &Namespace,
    headers: &HeaderMap,
) -> ResolvedSession {
    if let Some(presented) = presented_session(headers) {
        match store.get(namespace, &presented).await {
            Ok(session) => {
                return ResolvedSession {
                    id: session.id,
                    resumed: true,
                }
            }
            Err(MnemoError::SessionNotFound(_)) => {
                debug!("Unknown session {} in {}, minting a new one", presented, namespace)
            }
            Err(e) => warn!(
                "Session lookup for {} in {} failed, minting a new one: {}",
                presented, namespace, e
            ),
        }
    }

    let id = SessionId::generate();
    let mut metadata = Map::new();
    if let Some(agent) = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
    {
        metadata.insert("userAgent".to_string(), json!(agent));
    }

    match store.create(namespace, id.clone(), metadata).await {
        Ok(_) => debug!("Registered session {} in {}", id, namespace),
        Err(e) => warn!(
            "Failed to register session {} in {}, continuing unpersisted: {}",
            id, namespace, e
        ),
    }

    ResolvedSession { id, resumed: false }
}

/// Session id from the request header, if present and well formed
pub fn presented_session(headers: &HeaderMap) -> Option<SessionId> {
    let raw = headers.get(MCP_SESSION_ID)?.to_str().ok()?;
    SessionId::parse(raw.trim()).ok()
}

async fn post_endpoint(
    State(state): State<AppState>,
    segment: Option<Path<String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let namespace = match state.namespace(segment) {
        Ok(namespace) => namespace,
        Err(response) => return response,
    };
    let session = resolve_session(state.sessions.as_ref(), &namespace, &headers).await;

    let request = match classify(&body) {
        Ok(request) => request,
        Err(rejection) => {
            debug!("Rejected envelope: {}", rejection.error.message);
            return negotiator::render(
                ResponseMode::Json,
                StatusCode::BAD_REQUEST,
                &session.id,
                &rejection.into_response(),
            );
        }
    };

    let handshake = (request.method == "initialize").then(|| handshake_metadata(&request.params));
    let ctx = CallContext {
        namespace,
        session_id: session.id.clone(),
    };
    let outcome = state.handler.handle(request, &ctx).await;

    if let Some(patch) = handshake.filter(|patch| !patch.is_empty()) {
        if !outcome.response.is_error() {
            if let Err(e) = state
                .sessions
                .update(&ctx.namespace, &ctx.session_id, patch)
                .await
            {
                warn!("Failed to record handshake for session {}: {}", ctx.session_id, e);
            }
        }
    }

    if outcome.notification {
        return negotiator::render_empty(StatusCode::ACCEPTED, &session.id);
    }

    let mode = negotiate(AcceptPreference::from_headers(&headers), outcome.delivery);
    negotiator::render(mode, StatusCode::ACCEPTED, &session.id, &outcome.response)
}

/// `clientInfo` and `protocolVersion` from `initialize` params
fn handshake_metadata(params: &Value) -> Map<String, Value> {
    let mut patch = Map::new();
    for key in ["clientInfo", "protocolVersion"] {
        if let Some(value) = params.get(key) {
            patch.insert(key.to_string(), value.clone());
        }
    }
    patch
}

async fn get_endpoint(
    State(state): State<AppState>,
    segment: Option<Path<String>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let namespace = match state.namespace(segment) {
        Ok(namespace) => namespace,
        Err(response) => return response,
    };
    let session = resolve_session(state.sessions.as_ref(), &namespace, &headers).await;

    if query
        .get("capabilities")
        .is_some_and(|v| v == "true" || v == "1")
    {
        let mut response = (StatusCode::OK, Json(state.handler.capabilities())).into_response();
        attach_session(&mut response, &session.id);
        return response;
    }

    if let Some(last) = headers.get(LAST_EVENT_ID).and_then(|v| v.to_str().ok()) {
        debug!("Ignoring Last-Event-ID {}: stream resumption is not supported", last);
    }

    info!("Opening event stream for session {} in {}", session.id, namespace);
    let announcement = json!({
        "jsonrpc": "2.0",
        "method": "notifications/message",
        "params": {
            "level": "info",
            "data": { "sessionId": session.id }
        }
    });
    let mut shutdown = state.shutdown.subscribe();
    let closed = async move {
        let _ = shutdown.recv().await;
    };
    // Nothing else is pushed on this stream; it stays open until shutdown.
    let stream = futures::stream::iter([Ok::<_, Infallible>(message_event(&announcement))])
        .chain(futures::stream::pending())
        .take_until(closed);

    let mut response = (
        StatusCode::OK,
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
        .into_response();
    attach_session(&mut response, &session.id);
    response
}

async fn delete_endpoint(
    State(state): State<AppState>,
    segment: Option<Path<String>>,
    headers: HeaderMap,
) -> Response {
    let namespace = match state.namespace(segment) {
        Ok(namespace) => namespace,
        Err(response) => return response,
    };
    let Some(id) = presented_session(&headers) else {
        return plain_error(
            StatusCode::BAD_REQUEST,
            "Mcp-Session-Id header is required to end a session",
        );
    };

    match state.sessions.delete(&namespace, &id).await {
        Ok(()) => {
            info!("Session {} in {} ended by client", id, namespace);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(MnemoError::SessionNotFound(_)) => {
            plain_error(StatusCode::NOT_FOUND, format!("Unknown session: {}", id))
        }
        Err(e) => {
            warn!("Failed to delete session {} in {}: {}", id, namespace, e);
            plain_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Permissive CORS on every response, exposing the session header
async fn apply_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Accept, Mcp-Session-Id, Last-Event-ID"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Mcp-Session-Id"),
    );
    response
}

fn plain_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}
