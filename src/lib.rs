//! Mnemo MCP - Streamable HTTP front for a namespaced memory service
//!
//! Exposes `remember` and `search` tools to Model Context Protocol clients
//! over a single HTTP endpoint that carries JSON-RPC 2.0 on POST and an event
//! stream on GET.
//!
//! # Architecture
//!
//! - **Types**: Namespaces, session ids and tool results
//! - **Session**: One actor per namespace owning that namespace's sessions
//! - **MCP**: Envelope classification, method dispatch, response negotiation
//! - **Backend**: What the tools actually do (in-process by default)
//! - **Transport**: The axum router and server lifecycle
//!
//! # Example
//!
//! ```ignore
//! use mnemo_core::{McpHttpServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = McpHttpServer::from_config(ServerConfig::load(None)?)?;
//!     server.serve(async { let _ = tokio::signal::ctrl_c().await; }).await
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod mcp;
pub mod session;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use backend::InMemoryBackend;
pub use config::ServerConfig;
pub use error::{MnemoError, Result};
pub use mcp::{Dispatcher, RpcHandler, ToolBackend};
pub use session::{ActorSessionStore, SessionStore};
pub use transport::McpHttpServer;
pub use types::{ContentBlock, Namespace, Session, SessionId, ToolResult};
