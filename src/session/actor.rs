//! Per-namespace session actor
//!
//! One [`NamespaceActor`] owns every session of one caller namespace. Its
//! mailbox is the serialization point: create/get/update/delete/sweep for a
//! namespace are processed strictly one at a time, in arrival order.

use super::SweepReport;
use crate::error::{MnemoError, Result};
use crate::types::{Namespace, Session, SessionId};
use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Messages accepted by a [`NamespaceActor`]
pub enum SessionMessage {
    Create {
        id: SessionId,
        metadata: Map<String, Value>,
        reply: RpcReplyPort<Result<Session>>,
    },
    Get {
        id: SessionId,
        reply: RpcReplyPort<Result<Session>>,
    },
    Update {
        id: SessionId,
        patch: Map<String, Value>,
        reply: RpcReplyPort<Result<Session>>,
    },
    Delete {
        id: SessionId,
        reply: RpcReplyPort<Result<()>>,
    },
    Sweep {
        max_age: Duration,
        reply: RpcReplyPort<SweepReport>,
    },
    /// Stop if no session is left; replies whether the actor is stopping
    Retire { reply: RpcReplyPort<bool> },
}

/// Sessions of a single namespace
pub struct NamespaceState {
    namespace: Namespace,
    sessions: HashMap<SessionId, Session>,
}

impl NamespaceState {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            sessions: HashMap::new(),
        }
    }

    fn create(&mut self, id: SessionId, metadata: Map<String, Value>) -> Result<Session> {
        if self.sessions.contains_key(&id) {
            return Err(MnemoError::SessionExists(id.to_string()));
        }
        let session = Session::new(id.clone(), self.namespace.clone(), metadata);
        self.sessions.insert(id, session.clone());
        Ok(session)
    }

    fn get(&mut self, id: &SessionId) -> Result<Session> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| MnemoError::SessionNotFound(id.to_string()))?;
        session.touch();
        Ok(session.clone())
    }

    fn update(&mut self, id: &SessionId, patch: Map<String, Value>) -> Result<Session> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| MnemoError::SessionNotFound(id.to_string()))?;
        session.merge_metadata(patch);
        session.touch();
        Ok(session.clone())
    }

    fn delete(&mut self, id: &SessionId) -> Result<()> {
        self.sessions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| MnemoError::SessionNotFound(id.to_string()))
    }

    fn sweep(&mut self, max_age: Duration) -> SweepReport {
        let now = Utc::now();
        let before = self.sessions.len();
        // A negative idle time (clock stepped back) counts as fresh.
        self.sessions.retain(|_, session| match session.idle_for(now).to_std() {
            Ok(idle) => idle <= max_age,
            Err(_) => true,
        });
        SweepReport {
            removed_count: before - self.sessions.len(),
            remaining_count: self.sessions.len(),
        }
    }
}

/// Actor serializing session operations for one namespace
pub struct NamespaceActor;

#[ractor::async_trait]
impl Actor for NamespaceActor {
    type Msg = SessionMessage;
    type State = NamespaceState;
    type Arguments = Namespace;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        namespace: Self::Arguments,
    ) -> std::result::Result<Self::State, ActorProcessingErr> {
        debug!("Session actor starting for namespace {}", namespace);
        Ok(NamespaceState::new(namespace))
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        // A send error only means the caller stopped waiting.
        match message {
            SessionMessage::Create {
                id,
                metadata,
                reply,
            } => {
                let _ = reply.send(state.create(id, metadata));
            }
            SessionMessage::Get { id, reply } => {
                let _ = reply.send(state.get(&id));
            }
            SessionMessage::Update { id, patch, reply } => {
                let _ = reply.send(state.update(&id, patch));
            }
            SessionMessage::Delete { id, reply } => {
                let _ = reply.send(state.delete(&id));
            }
            SessionMessage::Sweep { max_age, reply } => {
                let report = state.sweep(max_age);
                if report.removed_count > 0 {
                    debug!(
                        "Swept {} expired sessions from {} ({} remaining)",
                        report.removed_count, state.namespace, report.remaining_count
                    );
                }
                let _ = reply.send(report);
            }
            SessionMessage::Retire { reply } => {
                let idle = state.sessions.is_empty();
                let _ = reply.send(idle);
                if idle {
                    // Messages queued behind this one are dropped with the actor.
                    myself.stop(Some("namespace idle".to_string()));
                }
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        debug!(
            "Session actor for {} stopped with {} sessions",
            state.namespace,
            state.sessions.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> NamespaceState {
        NamespaceState::new(Namespace::parse("tests").unwrap())
    }

    #[test]
    fn test_create_rejects_duplicate_id() {
        let mut state = state();
        let id = SessionId::generate();
        state.create(id.clone(), Map::new()).unwrap();
        assert!(matches!(
            state.create(id, Map::new()),
            Err(MnemoError::SessionExists(_))
        ));
    }

    #[test]
    fn test_update_merges_and_unknown_is_not_found() {
        let mut state = state();
        let id = SessionId::generate();
        let mut meta = Map::new();
        meta.insert("keep".to_string(), json!("me"));
        state.create(id.clone(), meta).unwrap();

        let mut patch = Map::new();
        patch.insert("added".to_string(), json!(1));
        let updated = state.update(&id, patch).unwrap();
        assert_eq!(updated.metadata["keep"], json!("me"));
        assert_eq!(updated.metadata["added"], json!(1));

        assert!(matches!(
            state.update(&SessionId::generate(), Map::new()),
            Err(MnemoError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_sweep_removes_only_stale_sessions() {
        let mut state = state();
        let stale = SessionId::generate();
        let fresh = SessionId::generate();
        state.create(stale.clone(), Map::new()).unwrap();
        state.create(fresh.clone(), Map::new()).unwrap();
        state.sessions.get_mut(&stale).unwrap().last_activity =
            Utc::now() - chrono::Duration::hours(25);

        let report = state.sweep(super::super::SESSION_RETENTION);
        assert_eq!(
            report,
            SweepReport {
                removed_count: 1,
                remaining_count: 1
            }
        );
        assert!(state.get(&fresh).is_ok());
        assert!(state.get(&stale).is_err());
    }

    #[test]
    fn test_get_strictly_advances_last_activity() {
        let mut state = state();
        let id = SessionId::generate();
        let created = state.create(id.clone(), Map::new()).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        let resumed = state.get(&id).unwrap();
        assert!(resumed.last_activity > created.last_activity);
        assert_eq!(resumed.created_at, created.created_at);
    }

    #[test]
    fn test_delete_twice() {
        let mut state = state();
        let id = SessionId::generate();
        state.create(id.clone(), Map::new()).unwrap();
        assert!(state.delete(&id).is_ok());
        assert!(matches!(
            state.delete(&id),
            Err(MnemoError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_actor_round_trip() {
        let namespace = Namespace::parse("actor-test").unwrap();
        let (actor_ref, handle) = Actor::spawn(None, NamespaceActor, namespace.clone())
            .await
            .unwrap();

        let id = SessionId::generate();
        let created = actor_ref
            .call(
                |reply| SessionMessage::Create {
                    id: id.clone(),
                    metadata: Map::new(),
                    reply,
                },
                None,
            )
            .await
            .unwrap();
        let created = match created {
            ractor::rpc::CallResult::Success(session) => session.unwrap(),
            _ => panic!("create call did not complete"),
        };
        assert_eq!(created.id, id);
        assert_eq!(created.namespace, namespace);

        // Still holding a session: retiring is refused.
        let retired = actor_ref
            .call(|reply| SessionMessage::Retire { reply }, None)
            .await
            .unwrap();
        assert!(matches!(retired, ractor::rpc::CallResult::Success(false)));

        actor_ref
            .call(
                |reply| SessionMessage::Delete {
                    id: id.clone(),
                    reply,
                },
                None,
            )
            .await
            .unwrap();
        let retired = actor_ref
            .call(|reply| SessionMessage::Retire { reply }, None)
            .await
            .unwrap();
        assert!(matches!(retired, ractor::rpc::CallResult::Success(true)));

        // The actor stops on its own once idle.
        handle.await.unwrap();
    }
}
