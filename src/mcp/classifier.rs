//! Request classification
//!
//! Decides, without side effects, whether a raw POST body is a well-formed
//! JSON-RPC envelope. Rejections carry the error envelope to send back; the
//! dispatcher is never consulted for them.

use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId, JSONRPC_VERSION};
use serde_json::Value;

/// Why a body was turned away before dispatch
#[derive(Debug, Clone)]
pub struct Rejection {
    /// Id recovered from the envelope, if it had a usable one
    pub id: Option<RequestId>,
    pub error: JsonRpcError,
}

impl Rejection {
    fn invalid(id: Option<RequestId>, detail: &str) -> Self {
        Self {
            id,
            error: JsonRpcError::invalid_request(detail),
        }
    }

    /// Error envelope for this rejection
    pub fn into_response(self) -> JsonRpcResponse {
        JsonRpcResponse::error(self.id, self.error)
    }
}

/// Parse and validate a raw body
pub fn classify(body: &[u8]) -> Result<JsonRpcRequest, Rejection> {
    let value: Value = serde_json::from_slice(body).map_err(|_| Rejection {
        id: None,
        error: JsonRpcError::parse_error(),
    })?;
    classify_value(value)
}

/// Validate an already-parsed body
///
/// Valid iff the `jsonrpc` tag is exactly `"2.0"`, `method` is a non-empty
/// string, and `id`, when present, is a string, number or null.
pub fn classify_value(value: Value) -> Result<JsonRpcRequest, Rejection> {
    let mut envelope = match value {
        Value::Object(map) => map,
        Value::Array(_) => return Err(Rejection::invalid(None, "batch requests are not supported")),
        _ => return Err(Rejection::invalid(None, "request must be a JSON object")),
    };

    let id = match envelope.remove("id") {
        None | Some(Value::Null) => None,
        Some(raw) => match RequestId::from_value(&raw) {
            Some(id) => Some(id),
            None => return Err(Rejection::invalid(None, "id must be a string, number or null")),
        },
    };

    match envelope.get("jsonrpc") {
        Some(Value::String(tag)) if tag == JSONRPC_VERSION => {}
        _ => return Err(Rejection::invalid(id, "jsonrpc must be '2.0'")),
    }

    let method = match envelope.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => method,
        _ => return Err(Rejection::invalid(id, "method must be a non-empty string")),
    };

    Ok(JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        method,
        params: envelope.remove("params").unwrap_or(Value::Null),
        id,
    })
}
