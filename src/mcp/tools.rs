//! Tool catalogue and backend seam
//!
//! Two tools are exposed:
//! - `remember`: store a piece of text under the caller namespace
//! - `search`: find previously remembered text relevant to a query
//!
//! The catalogue is static. Argument shapes are parsed here, before the
//! backend is called; the backend owns all domain logic.

use crate::error::Result;
use crate::types::{Namespace, ToolResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Default number of search hits
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Tool schema definition as advertised by `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name (e.g., "remember")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// The closed set of invocable tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    Remember,
    Search,
}

impl ToolName {
    pub const ALL: [ToolName; 2] = [ToolName::Remember, ToolName::Search];

    /// Look up a tool by its wire name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "remember" => Some(ToolName::Remember),
            "search" => Some(ToolName::Search),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Remember => "remember",
            ToolName::Search => "search",
        }
    }

    /// Catalogue entry for this tool
    pub fn describe(&self) -> Tool {
        match self {
            ToolName::Remember => Tool {
                name: self.as_str().to_string(),
                description: "Store a memory for later retrieval. Returns the id of the stored memory.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "content": {
                            "type": "string",
                            "description": "Text to remember"
                        },
                        "tags": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Optional labels used to group memories"
                        },
                        "metadata": {
                            "type": "object",
                            "description": "Optional free-form metadata stored with the memory"
                        }
                    },
                    "required": ["content"]
                }),
            },
            ToolName::Search => Tool {
                name: self.as_str().to_string(),
                description: "Search stored memories by relevance to a query. Returns ranked matches.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "What to look for"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of results",
                            "minimum": 1,
                            "default": DEFAULT_SEARCH_LIMIT
                        }
                    },
                    "required": ["query"]
                }),
            },
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Get list of all available tools
pub fn list_tools() -> Vec<Tool> {
    ToolName::ALL.iter().map(ToolName::describe).collect()
}

/// Arguments of `remember`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RememberArgs {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Arguments of `search`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// A fully parsed tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Remember(RememberArgs),
    Search(SearchArgs),
}

impl ToolCall {
    /// Parse `arguments` into the shape declared by `tool`'s schema
    pub fn parse(tool: ToolName, arguments: Value) -> std::result::Result<Self, String> {
        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            Value::Object(map) => Value::Object(map),
            _ => return Err("arguments must be an object".to_string()),
        };

        let call = match tool {
            ToolName::Remember => serde_json::from_value(arguments).map(ToolCall::Remember),
            ToolName::Search => serde_json::from_value(arguments).map(ToolCall::Search),
        };
        call.map_err(|e| format!("invalid arguments for {}: {}", tool, e))
    }

    pub fn tool(&self) -> ToolName {
        match self {
            ToolCall::Remember(_) => ToolName::Remember,
            ToolCall::Search(_) => ToolName::Search,
        }
    }
}

/// Executes tool calls on behalf of a caller namespace
///
/// An `Err` from the backend is a tool-level failure: the dispatcher reports
/// it as a [`ToolResult`] with `isError: true`, never as a protocol error.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    async fn invoke(&self, call: ToolCall, namespace: &Namespace) -> Result<ToolResult>;
}
