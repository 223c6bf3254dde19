//! Session store
//!
//! Sessions are owned exclusively by the store; the transport only ever holds
//! a [`SessionId`]. Every operation is keyed by a caller namespace, and each
//! namespace is served by its own actor so that operations within a namespace
//! are applied in a single order.

pub mod actor;
pub mod store;
pub mod sweeper;

use crate::error::Result;
use crate::types::{Namespace, Session, SessionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

pub use actor::{NamespaceActor, SessionMessage};
pub use store::ActorSessionStore;
pub use sweeper::spawn_sweeper;

/// Sessions idle for longer than this are removed by the sweep
pub const SESSION_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Outcome of one expiry sweep over a namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub removed_count: usize,
    pub remaining_count: usize,
}

/// Keyed session storage
///
/// `get` and `update` refresh the session's last activity. Lookups of ids that
/// do not exist in the namespace return [`crate::MnemoError::SessionNotFound`];
/// an unreachable store returns [`crate::MnemoError::SessionStore`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Register a new session
    async fn create(
        &self,
        namespace: &Namespace,
        id: SessionId,
        metadata: Map<String, Value>,
    ) -> Result<Session>;

    /// Look up a session and refresh its last activity
    async fn get(&self, namespace: &Namespace, id: &SessionId) -> Result<Session>;

    /// Shallow-merge `patch` into the session metadata
    async fn update(
        &self,
        namespace: &Namespace,
        id: &SessionId,
        patch: Map<String, Value>,
    ) -> Result<Session>;

    /// Remove a session
    async fn delete(&self, namespace: &Namespace, id: &SessionId) -> Result<()>;

    /// Remove sessions idle for longer than `max_age`
    async fn sweep_expired(&self, namespace: &Namespace, max_age: Duration)
        -> Result<SweepReport>;
}
