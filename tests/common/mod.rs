//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use mnemo_core::mcp::{CallContext, CapabilityDocument, DispatchOutcome, JsonRpcRequest};
use mnemo_core::session::SessionStore;
use mnemo_core::transport::{router, AppState};
use mnemo_core::{ActorSessionStore, Dispatcher, InMemoryBackend, Namespace, RpcHandler};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower::ServiceExt;

/// Dispatcher wrapper counting how many requests reached it
pub struct CountingHandler {
    inner: Dispatcher,
    calls: AtomicUsize,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self {
            inner: Dispatcher::new(Arc::new(InMemoryBackend::new())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcHandler for CountingHandler {
    fn capabilities(&self) -> CapabilityDocument {
        self.inner.capabilities()
    }

    async fn handle(&self, request: JsonRpcRequest, ctx: &CallContext) -> DispatchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.handle(request, ctx).await
    }
}

/// Router wired to an actor-backed store and a counting handler
pub struct TestApp {
    pub router: Router,
    pub sessions: Arc<ActorSessionStore>,
    pub handler: Arc<CountingHandler>,
    pub shutdown: broadcast::Sender<()>,
}

impl TestApp {
    pub fn new() -> Self {
        let sessions = Arc::new(ActorSessionStore::new());
        let handler = Arc::new(CountingHandler::new());
        let store: Arc<dyn SessionStore> = sessions.clone();
        let (shutdown, _) = broadcast::channel(1);
        let state = AppState::new(store, handler.clone(), Namespace::parse("default").unwrap())
            .with_shutdown(shutdown.clone());
        Self {
            router: router(state),
            sessions,
            handler,
            shutdown,
        }
    }

    /// Send a request and collect the whole body
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        TestResponse {
            status,
            headers,
            body: body.to_vec(),
        }
    }

    /// POST a raw body, optionally presenting a session id
    pub async fn post(&self, path: &str, session: Option<&str>, body: &str) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .header("accept", "application/json, text/event-stream");
        if let Some(session) = session {
            builder = builder.header("mcp-session-id", session);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// POST a JSON-RPC request with the given id
    pub async fn rpc(
        &self,
        path: &str,
        session: Option<&str>,
        id: i64,
        method: &str,
        params: Value,
    ) -> TestResponse {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        self.post(path, session, &body.to_string()).await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }

    pub fn session_id(&self) -> String {
        self.headers
            .get("mcp-session-id")
            .expect("missing Mcp-Session-Id header")
            .to_str()
            .unwrap()
            .to_string()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
