//! Core data types for the mnemo MCP transport
//!
//! Defines the identifiers and records shared by the session store, the
//! dispatcher and the tool backend: caller namespaces, session ids, session
//! records and tool results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{MnemoError, Result};

/// Maximum length of a client-supplied session id
pub const MAX_SESSION_ID_LEN: usize = 256;

/// Maximum length of a caller namespace
pub const MAX_NAMESPACE_LEN: usize = 128;

/// Caller namespace: the isolation boundary for sessions and tool calls
///
/// Namespaces are short opaque labels (typically a user or tenant id) made of
/// ASCII letters, digits and `_ . : @ -`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Parse and validate a namespace
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(MnemoError::InvalidNamespace("namespace is empty".to_string()));
        }
        if s.len() > MAX_NAMESPACE_LEN {
            return Err(MnemoError::InvalidNamespace(format!(
                "namespace exceeds {} characters",
                MAX_NAMESPACE_LEN
            )));
        }
        if let Some(bad) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '@' | '-')))
        {
            return Err(MnemoError::InvalidNamespace(format!(
                "unexpected character {:?} in '{}'",
                bad, s
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Namespace {
    type Error = MnemoError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque session identifier carried in the `Mcp-Session-Id` header
///
/// Minted ids are UUID v4 strings. Ids presented by clients are accepted as
/// long as they are non-empty visible ASCII and at most
/// [`MAX_SESSION_ID_LEN`] characters, which also keeps them valid as HTTP
/// header values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh, globally unique session id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate a client-supplied session id
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(MnemoError::InvalidSessionId("session id is empty".to_string()));
        }
        if s.len() > MAX_SESSION_ID_LEN {
            return Err(MnemoError::InvalidSessionId(format!(
                "session id exceeds {} characters",
                MAX_SESSION_ID_LEN
            )));
        }
        if !s.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(MnemoError::InvalidSessionId(
                "session id must be visible ASCII".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One logical client conversation
///
/// The id and namespace never change after creation. Metadata is only ever
/// shallow-merged (see [`Session::merge_metadata`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub namespace: Namespace,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Session {
    /// Create a session stamped with the current time
    pub fn new(id: SessionId, namespace: Namespace, metadata: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id,
            namespace,
            created_at: now,
            last_activity: now,
            metadata,
        }
    }

    /// Refresh last activity; never moves backwards if the clock does
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Shallow-merge `patch` into the metadata; keys absent from the patch survive
    pub fn merge_metadata(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.metadata.insert(key, value);
        }
    }

    /// Time since last activity, as of `now`
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.last_activity)
    }
}

/// A single content block of a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
}

/// Outcome of a tool invocation
///
/// `is_error` marks a call that was understood and attempted but whose
/// underlying operation failed. It is still a successful RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result with a single text block
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Failed result with a human-readable explanation
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_namespace_validation() {
        assert!(Namespace::parse("user-42").is_ok());
        assert!(Namespace::parse("org:acme@team_1.x").is_ok());
        assert!(Namespace::parse("").is_err());
        assert!(Namespace::parse("has space").is_err());
        assert!(Namespace::parse("slash/ed").is_err());
        assert!(Namespace::parse(&"a".repeat(MAX_NAMESPACE_LEN + 1)).is_err());
    }

    #[test]
    fn test_namespace_serde_validates() {
        let ns: Namespace = serde_json::from_value(json!("alice")).unwrap();
        assert_eq!(ns.as_str(), "alice");
        assert!(serde_json::from_value::<Namespace>(json!("bad name")).is_err());
    }

    #[test]
    fn test_session_id_generation_is_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(SessionId::parse(a.as_str()).is_ok());
    }

    #[test]
    fn test_session_id_parse_rejects_garbage() {
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse("two words").is_err());
        assert!(SessionId::parse("tab\there").is_err());
        assert!(SessionId::parse(&"x".repeat(MAX_SESSION_ID_LEN + 1)).is_err());
        assert!(SessionId::parse("mcp-0123abcd").is_ok());
    }

    #[test]
    fn test_metadata_merge_is_shallow() {
        let mut meta = Map::new();
        meta.insert("a".to_string(), json!(1));
        meta.insert("b".to_string(), json!({"nested": true}));
        let mut session = Session::new(
            SessionId::generate(),
            Namespace::parse("ns").unwrap(),
            meta,
        );

        let mut patch = Map::new();
        patch.insert("b".to_string(), json!("replaced"));
        patch.insert("c".to_string(), json!(3));
        session.merge_metadata(patch);

        assert_eq!(session.metadata["a"], json!(1));
        assert_eq!(session.metadata["b"], json!("replaced"));
        assert_eq!(session.metadata["c"], json!(3));
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut session = Session::new(
            SessionId::generate(),
            Namespace::parse("ns").unwrap(),
            Map::new(),
        );
        let future = Utc::now() + chrono::Duration::hours(1);
        session.last_activity = future;
        session.touch();
        assert_eq!(session.last_activity, future);
    }

    #[test]
    fn test_tool_result_serialization() {
        let ok = serde_json::to_value(ToolResult::text("hi")).unwrap();
        assert_eq!(
            ok,
            json!({"content": [{"type": "text", "text": "hi"}], "isError": false})
        );

        let failed = serde_json::to_value(ToolResult::error("nope")).unwrap();
        assert_eq!(failed["isError"], json!(true));
    }
}
