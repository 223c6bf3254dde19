//! Tool backends
//!
//! The transport only marshals tool calls; a [`crate::mcp::ToolBackend`]
//! owns what `remember` and `search` actually do.

pub mod memory;

pub use memory::{InMemoryBackend, MemoryId, MemoryRecord};
