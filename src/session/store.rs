//! Actor-backed [`SessionStore`]
//!
//! Keeps one [`NamespaceActor`] per caller namespace. Only `create` spawns an
//! actor; lookups in a namespace without one are plain misses. `sweep_all`
//! retires actors left without sessions, so the registry tracks live
//! namespaces rather than every namespace ever seen. The registry lock is held
//! only to find, spawn or drop an actor, never while a session operation is in
//! flight.

use super::actor::{NamespaceActor, SessionMessage};
use super::{SessionStore, SweepReport};
use crate::error::{MnemoError, Result};
use crate::types::{Namespace, Session, SessionId};
use async_trait::async_trait;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorRef, RpcReplyPort};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default bound on a single store round trip
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a round trip to a namespace actor did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallFailure {
    TimedOut,
    /// The actor stopped before replying
    Gone,
}

/// Session store with one serializing actor per namespace
pub struct ActorSessionStore {
    actors: Mutex<HashMap<Namespace, ActorRef<SessionMessage>>>,
    call_timeout: Duration,
}

impl ActorSessionStore {
    /// Create a store with the default call timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_CALL_TIMEOUT)
    }

    /// Create a store whose calls give up after `call_timeout`
    pub fn with_timeout(call_timeout: Duration) -> Self {
        Self {
            actors: Mutex::new(HashMap::new()),
            call_timeout,
        }
    }

    /// Namespaces that currently have a live actor
    pub async fn namespaces(&self) -> Vec<Namespace> {
        let actors = self.actors.lock().await;
        let mut namespaces: Vec<_> = actors.keys().cloned().collect();
        namespaces.sort();
        namespaces
    }

    /// Sweep every live namespace, retiring the ones left empty
    ///
    /// Namespaces that fail to sweep are skipped and logged.
    pub async fn sweep_all(&self, max_age: Duration) -> Vec<(Namespace, SweepReport)> {
        let mut reports = Vec::new();
        for namespace in self.namespaces().await {
            match self.sweep_expired(&namespace, max_age).await {
                Ok(report) => {
                    if report.remaining_count == 0 {
                        self.retire(&namespace).await;
                    }
                    reports.push((namespace, report));
                }
                Err(e) => warn!("Session sweep failed for {}: {}", namespace, e),
            }
        }
        reports
    }

    /// Stop every namespace actor
    pub async fn shutdown(&self) {
        let mut actors = self.actors.lock().await;
        for (namespace, actor) in actors.drain() {
            debug!("Stopping session actor for {}", namespace);
            actor.stop(Some("store shutdown".to_string()));
        }
        info!("Session store shut down");
    }

    /// Actor for `namespace`, spawning it if there is none
    async fn actor_for(&self, namespace: &Namespace) -> Result<ActorRef<SessionMessage>> {
        let mut actors = self.actors.lock().await;
        if let Some(actor) = actors.get(namespace) {
            return Ok(actor.clone());
        }

        let (actor, _handle) = Actor::spawn(None, NamespaceActor, namespace.clone())
            .await
            .map_err(|e| {
                MnemoError::SessionStore(format!(
                    "failed to start session actor for {}: {}",
                    namespace, e
                ))
            })?;
        actors.insert(namespace.clone(), actor.clone());
        Ok(actor)
    }

    /// Actor for `namespace`, if one is registered
    async fn registered(&self, namespace: &Namespace) -> Option<ActorRef<SessionMessage>> {
        self.actors.lock().await.get(namespace).cloned()
    }

    /// Drop `actor` from the registry unless it was already replaced
    async fn forget(&self, namespace: &Namespace, actor: &ActorRef<SessionMessage>) {
        let mut actors = self.actors.lock().await;
        if actors
            .get(namespace)
            .is_some_and(|current| current.get_id() == actor.get_id())
        {
            actors.remove(namespace);
        }
    }

    /// Ask an idle namespace actor to stop and unregister it
    async fn retire(&self, namespace: &Namespace) {
        let Some(actor) = self.registered(namespace).await else {
            return;
        };
        match self
            .call(&actor, |reply| SessionMessage::Retire { reply })
            .await
        {
            Ok(true) => {
                self.forget(namespace, &actor).await;
                debug!("Retired idle session actor for {}", namespace);
            }
            Ok(false) => debug!("Namespace {} gained sessions, keeping its actor", namespace),
            Err(CallFailure::Gone) => self.forget(namespace, &actor).await,
            Err(CallFailure::TimedOut) => {
                warn!("Session actor for {} did not answer retirement", namespace)
            }
        }
    }

    /// Send one request to a namespace actor and wait for its reply
    async fn call<T, F>(
        &self,
        actor: &ActorRef<SessionMessage>,
        build: F,
    ) -> std::result::Result<T, CallFailure>
    where
        T: Send + 'static,
        F: FnOnce(RpcReplyPort<T>) -> SessionMessage + Send,
    {
        match actor.call(build, Some(self.call_timeout)).await {
            Ok(CallResult::Success(value)) => Ok(value),
            Ok(CallResult::Timeout) => Err(CallFailure::TimedOut),
            // Reply port dropped, or the mailbox is closed.
            Ok(CallResult::SenderError) | Err(_) => Err(CallFailure::Gone),
        }
    }

    /// Lookup-style operation: a namespace without a live actor has no sessions
    async fn call_existing<T, F>(&self, namespace: &Namespace, id: &SessionId, build: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(RpcReplyPort<Result<T>>) -> SessionMessage + Send,
    {
        let Some(actor) = self.registered(namespace).await else {
            return Err(MnemoError::SessionNotFound(id.to_string()));
        };
        match self.call(&actor, build).await {
            Ok(result) => result,
            Err(CallFailure::Gone) => {
                // Retired (or stopped) actors hold no sessions.
                self.forget(namespace, &actor).await;
                Err(MnemoError::SessionNotFound(id.to_string()))
            }
            Err(CallFailure::TimedOut) => Err(self.timed_out(namespace)),
        }
    }

    fn timed_out(&self, namespace: &Namespace) -> MnemoError {
        MnemoError::SessionStore(format!(
            "session actor for {} timed out after {:?}",
            namespace, self.call_timeout
        ))
    }
}

impl Default for ActorSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for ActorSessionStore {
    async fn create(
        &self,
        namespace: &Namespace,
        id: SessionId,
        metadata: Map<String, Value>,
    ) -> Result<Session> {
        // One retry covers an actor retired between lookup and delivery.
        for attempt in 0..2 {
            let actor = self.actor_for(namespace).await?;
            let (id, metadata) = (id.clone(), metadata.clone());
            match self
                .call(&actor, |reply| SessionMessage::Create {
                    id,
                    metadata,
                    reply,
                })
                .await
            {
                Ok(result) => return result,
                Err(CallFailure::Gone) => {
                    debug!(
                        "Session actor for {} was gone (attempt {}), respawning",
                        namespace,
                        attempt + 1
                    );
                    self.forget(namespace, &actor).await;
                }
                Err(CallFailure::TimedOut) => return Err(self.timed_out(namespace)),
            }
        }
        Err(MnemoError::SessionStore(format!(
            "session actor for {} is not running",
            namespace
        )))
    }

    async fn get(&self, namespace: &Namespace, id: &SessionId) -> Result<Session> {
        let key = id.clone();
        self.call_existing(namespace, id, |reply| SessionMessage::Get { id: key, reply })
            .await
    }

    async fn update(
        &self,
        namespace: &Namespace,
        id: &SessionId,
        patch: Map<String, Value>,
    ) -> Result<Session> {
        let key = id.clone();
        self.call_existing(namespace, id, |reply| SessionMessage::Update {
            id: key,
            patch,
            reply,
        })
        .await
    }

    async fn delete(&self, namespace: &Namespace, id: &SessionId) -> Result<()> {
        let key = id.clone();
        self.call_existing(namespace, id, |reply| SessionMessage::Delete { id: key, reply })
            .await
    }

    async fn sweep_expired(
        &self,
        namespace: &Namespace,
        max_age: Duration,
    ) -> Result<SweepReport> {
        let Some(actor) = self.registered(namespace).await else {
            return Ok(SweepReport::default());
        };
        match self
            .call(&actor, |reply| SessionMessage::Sweep { max_age, reply })
            .await
        {
            Ok(report) => Ok(report),
            Err(CallFailure::Gone) => {
                self.forget(namespace, &actor).await;
                Ok(SweepReport::default())
            }
            Err(CallFailure::TimedOut) => Err(self.timed_out(namespace)),
        }
    }
}
