//! Method dispatch
//!
//! Routes a classified request to one of a closed set of handlers and turns
//! every outcome, including a panicking handler, into a response envelope.

use super::negotiator::Delivery;
use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use super::tools::{list_tools, ToolBackend, ToolCall, ToolName};
use crate::types::{Namespace, SessionId, ToolResult};
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// MCP protocol revision advertised during the handshake
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

/// Methods understood by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Initialize,
    Initialized,
    Ping,
    ToolsList,
    ToolsCall,
}

impl Method {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "initialize" => Some(Method::Initialize),
            "notifications/initialized" => Some(Method::Initialized),
            "ping" => Some(Method::Ping),
            "tools/list" => Some(Method::ToolsList),
            "tools/call" => Some(Method::ToolsCall),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Initialize => "initialize",
            Method::Initialized => "notifications/initialized",
            Method::Ping => "ping",
            Method::ToolsList => "tools/list",
            Method::ToolsCall => "tools/call",
        }
    }

    /// How results of this method should be delivered
    ///
    /// Every method currently answers with a single document. Long-running
    /// methods would return [`Delivery::Stream`] here.
    pub fn delivery(&self) -> Delivery {
        match self {
            Method::Initialize
            | Method::Initialized
            | Method::Ping
            | Method::ToolsList
            | Method::ToolsCall => Delivery::Single,
        }
    }
}

/// Server identity reported in the capability document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Static capability metadata, returned by `initialize` and the GET capability query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDocument {
    pub protocol_version: String,
    pub capabilities: Value,
    pub server_info: ServerInfo,
}

impl CapabilityDocument {
    pub fn new(server_info: ServerInfo) -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: json!({
                "tools": { "listChanged": false }
            }),
            server_info,
        }
    }
}

/// Per-request context handed to handlers
#[derive(Debug, Clone)]
pub struct CallContext {
    pub namespace: Namespace,
    pub session_id: SessionId,
}

/// What the dispatcher produced for one request
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub response: JsonRpcResponse,
    pub delivery: Delivery,
    /// The request carried no id; no envelope should be sent back
    pub notification: bool,
}

/// Handles classified requests for the transport
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Capability document served by `initialize` and the GET capability query
    fn capabilities(&self) -> CapabilityDocument;

    /// Dispatch one request; never fails, errors are envelopes
    async fn handle(&self, request: JsonRpcRequest, ctx: &CallContext) -> DispatchOutcome;
}

#[derive(Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Default [`RpcHandler`] routing to the built-in methods and a tool backend
pub struct Dispatcher {
    backend: Arc<dyn ToolBackend>,
    capabilities: CapabilityDocument,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn ToolBackend>) -> Self {
        Self::with_server_info(backend, ServerInfo::default())
    }

    pub fn with_server_info(backend: Arc<dyn ToolBackend>, server_info: ServerInfo) -> Self {
        Self {
            backend,
            capabilities: CapabilityDocument::new(server_info),
        }
    }

    async fn route(
        &self,
        method: Option<Method>,
        request: JsonRpcRequest,
        ctx: &CallContext,
    ) -> JsonRpcResponse {
        let id = request.id.clone();
        let Some(method) = method else {
            debug!("Unknown method: {}", request.method);
            return JsonRpcResponse::error(id, JsonRpcError::method_not_found(&request.method));
        };

        debug!("Handling {} for session {}", method.as_str(), ctx.session_id);
        let result = match method {
            Method::Initialize => self.handle_initialize(),
            Method::Initialized | Method::Ping => Ok(json!({})),
            Method::ToolsList => Ok(json!({ "tools": list_tools() })),
            Method::ToolsCall => self.handle_tools_call(request.params, ctx).await,
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => JsonRpcResponse::error(id, error),
        }
    }

    fn handle_initialize(&self) -> Result<Value, JsonRpcError> {
        serde_json::to_value(&self.capabilities)
            .map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    async fn handle_tools_call(
        &self,
        params: Value,
        ctx: &CallContext,
    ) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = serde_json::from_value(params).map_err(|e| {
            JsonRpcError::invalid_request(format!("tools/call params: {}", e))
        })?;

        let tool = ToolName::parse(&params.name).ok_or_else(|| {
            warn!("Unknown tool: {}", params.name);
            JsonRpcError::unknown_tool(&params.name)
        })?;
        let call = ToolCall::parse(tool, params.arguments).map_err(JsonRpcError::invalid_request)?;

        let result = match self.backend.invoke(call, &ctx.namespace).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Tool {} failed in {}: {}", tool, ctx.namespace, e);
                ToolResult::error(e.to_string())
            }
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }
}

#[async_trait]
impl RpcHandler for Dispatcher {
    fn capabilities(&self) -> CapabilityDocument {
        self.capabilities.clone()
    }

    async fn handle(&self, request: JsonRpcRequest, ctx: &CallContext) -> DispatchOutcome {
        let id = request.id.clone();
        let notification = request.is_notification();
        let method = Method::parse(&request.method);
        let delivery = method.map(|m| m.delivery()).unwrap_or(Delivery::Single);

        let response = match AssertUnwindSafe(self.route(method, request, ctx))
            .catch_unwind()
            .await
        {
            Ok(response) => response,
            Err(panic) => {
                let detail = panic_detail(panic.as_ref());
                error!("Handler panicked: {}", detail);
                JsonRpcResponse::error(id, JsonRpcError::internal_error(detail))
            }
        };

        DispatchOutcome {
            response,
            delivery,
            notification,
        }
    }
}

fn panic_detail(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MnemoError, Result};
    use crate::mcp::protocol::{RequestId, INTERNAL_ERROR, INVALID_REQUEST, METHOD_NOT_FOUND};
    use std::sync::Mutex;

    /// Records calls and answers from a script
    #[derive(Default)]
    struct ScriptedBackend {
        calls: Mutex<Vec<ToolCall>>,
        fail_with: Option<String>,
        panic: bool,
    }

    #[async_trait]
    impl ToolBackend for ScriptedBackend {
        async fn invoke(&self, call: ToolCall, _namespace: &Namespace) -> Result<ToolResult> {
            self.calls.lock().unwrap().push(call);
            if self.panic {
                panic!("backend exploded");
            }
            match &self.fail_with {
                Some(message) => Err(MnemoError::Tool(message.clone())),
                None => Ok(ToolResult::text("ok")),
            }
        }
    }

    fn ctx() -> CallContext {
        CallContext {
            namespace: Namespace::parse("tests").unwrap(),
            session_id: SessionId::generate(),
        }
    }

    fn request(method: &str, params: Value, id: Option<RequestId>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id,
        }
    }

    #[tokio::test]
    async fn test_initialize_returns_capabilities() {
        let dispatcher = Dispatcher::new(Arc::new(ScriptedBackend::default()));
        let outcome = dispatcher
            .handle(request("initialize", json!({}), Some("1".into())), &ctx())
            .await;

        let result = outcome.response.result.unwrap();
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], env!("CARGO_PKG_NAME"));
        assert!(result["capabilities"]["tools"].is_object());
        assert_eq!(outcome.response.id, Some("1".into()));
        assert_eq!(outcome.delivery, Delivery::Single);
        assert!(!outcome.notification);
    }

    #[tokio::test]
    async fn test_tools_list_matches_catalogue() {
        let dispatcher = Dispatcher::new(Arc::new(ScriptedBackend::default()));
        let outcome = dispatcher
            .handle(request("tools/list", Value::Null, Some(2i64.into())), &ctx())
            .await;
        let tools = outcome.response.result.unwrap()["tools"].clone();
        assert_eq!(tools.as_array().unwrap().len(), ToolName::ALL.len());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let dispatcher = Dispatcher::new(Arc::new(ScriptedBackend::default()));
        let outcome = dispatcher
            .handle(request("resources/list", json!({}), Some(3i64.into())), &ctx())
            .await;
        let error = outcome.response.error.unwrap();
        assert_eq!(error.code, METHOD_NOT_FOUND);
        assert_eq!(error.message, "Method not found: resources/list");
        assert!(outcome.response.result.is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool_never_reaches_backend() {
        let backend = Arc::new(ScriptedBackend::default());
        let dispatcher = Dispatcher::new(backend.clone());
        let outcome = dispatcher
            .handle(
                request(
                    "tools/call",
                    json!({"name": "bogusTool", "arguments": {}}),
                    Some("3".into()),
                ),
                &ctx(),
            )
            .await;

        let error = outcome.response.error.unwrap();
        assert_eq!(error.code, METHOD_NOT_FOUND);
        assert_eq!(error.message, "Unknown tool: bogusTool");
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_tool_arguments_are_invalid_request() {
        let backend = Arc::new(ScriptedBackend::default());
        let dispatcher = Dispatcher::new(backend.clone());

        for params in [
            json!("remember"),
            json!({"arguments": {}}),
            json!({"name": "remember", "arguments": {"content": 1}}),
        ] {
            let outcome = dispatcher
                .handle(request("tools/call", params, Some(4i64.into())), &ctx())
                .await;
            assert_eq!(outcome.response.error.unwrap().code, INVALID_REQUEST);
        }
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_is_tool_error_not_protocol_error() {
        let backend = Arc::new(ScriptedBackend {
            fail_with: Some("vector index offline".to_string()),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(backend);
        let outcome = dispatcher
            .handle(
                request(
                    "tools/call",
                    json!({"name": "search", "arguments": {"query": "x"}}),
                    Some(5i64.into()),
                ),
                &ctx(),
            )
            .await;

        assert!(outcome.response.error.is_none());
        let result = outcome.response.result.unwrap();
        assert_eq!(result["isError"], json!(true));
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("vector index offline"));
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_internal_error() {
        let backend = Arc::new(ScriptedBackend {
            panic: true,
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(backend);
        let outcome = dispatcher
            .handle(
                request(
                    "tools/call",
                    json!({"name": "remember", "arguments": {"content": "x"}}),
                    Some(6i64.into()),
                ),
                &ctx(),
            )
            .await;

        let error = outcome.response.error.unwrap();
        assert_eq!(error.code, INTERNAL_ERROR);
        assert_eq!(error.message, "Internal error");
        assert_eq!(error.data, Some(json!({"detail": "backend exploded"})));
        assert_eq!(outcome.response.id, Some(6i64.into()));
    }

    #[tokio::test]
    async fn test_notification_flag() {
        let dispatcher = Dispatcher::new(Arc::new(ScriptedBackend::default()));
        let outcome = dispatcher
            .handle(request("notifications/initialized", Value::Null, None), &ctx())
            .await;
        assert!(outcome.notification);
        assert!(!outcome.response.is_error());
    }

    #[test]
    fn test_no_method_streams_yet() {
        for name in ["initialize", "notifications/initialized", "ping", "tools/list", "tools/call"] {
            let method = Method::parse(name).unwrap();
            assert_eq!(method.as_str(), name);
            assert_eq!(method.delivery(), Delivery::Single);
        }
    }
}
