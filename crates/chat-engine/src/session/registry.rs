//! Shared session registry
//!
//! Stores every live session behind its own async mutex so that all
//! transitions for one session are serialized while unrelated sessions
//! proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::error::{ChatEngineError, Result};
use crate::session::session::Session;
use crate::session::types::{SessionId, SessionStatus};

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new session. Returns the shared handle.
    pub async fn insert(&self, session: Session) -> Arc<Mutex<Session>> {
        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id.clone(), handle.clone());
        tracing::debug!("Registered session {}", id);
        handle
    }

    /// Fetch the shared handle for a session.
    pub async fn get(&self, id: &SessionId) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ChatEngineError::SessionNotFound(id.clone()))
    }

    pub async fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Snapshot of all session handles, for sweeps and statistics.
    pub async fn handles(&self) -> Vec<Arc<Mutex<Session>>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Count sessions per status. Takes each session lock briefly.
    pub async fn status_counts(&self) -> HashMap<SessionStatus, usize> {
        let mut counts = HashMap::new();
        for handle in self.handles().await {
            let status = handle.lock().await.status;
            *counts.entry(status).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_session_is_an_error() {
        let registry = SessionRegistry::new();
        let err = registry.get(&SessionId::from("nope")).await.unwrap_err();
        assert!(matches!(err, ChatEngineError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn insert_and_mutate() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        registry.insert(Session::new(id.clone())).await;

        let handle = registry.get(&id).await.unwrap();
        {
            let mut session = handle.lock().await;
            session.append_message(crate::session::Message::customer(id.clone(), "hi"));
        }

        let handle = registry.get(&id).await.unwrap();
        assert_eq!(handle.lock().await.status, SessionStatus::InProgress);
    }
}
