//! Model Context Protocol (MCP) core
//!
//! Classifies JSON-RPC 2.0 envelopes, dispatches them to the handshake,
//! catalogue and tool handlers, and negotiates how the reply is rendered.

pub mod classifier;
pub mod dispatcher;
pub mod negotiator;
pub mod protocol;
pub mod tools;

pub use classifier::{classify, Rejection};
pub use dispatcher::{
    CallContext, CapabilityDocument, DispatchOutcome, Dispatcher, Method, RpcHandler, ServerInfo,
};
pub use negotiator::{negotiate, AcceptPreference, Delivery, ResponseMode, MCP_SESSION_ID};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use tools::{ToolBackend, ToolCall, ToolName};
