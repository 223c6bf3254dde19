//! Streamable HTTP transport
//!
//! Serves `/mcp` (default namespace) and `/{namespace}/mcp`, carrying MCP
//! JSON-RPC over POST and an event stream over GET.

pub mod handlers;
pub mod server;

pub use handlers::{presented_session, resolve_session, router, AppState, ResolvedSession};
pub use server::{bind_with_fallback, McpHttpServer};
