//! Agent entities and the shared agent registry
//!
//! An [`Agent`] is a human operator. Presence (online/offline) and
//! availability (willing to take new sessions) are tracked separately:
//! availability only means anything while the agent is online, and being
//! available is necessary but not sufficient for assignment, since the agent
//! must also have capacity headroom.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockWriteGuard};
use uuid::Uuid;

use crate::error::{ChatEngineError, Result};
use crate::session::SessionId;

/// Unique agent identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Online/offline presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Offline,
    Online,
}

/// Willingness to take new sessions. Meaningful only while online.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable,
}

/// A human operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub display_name: String,
    pub skills: Vec<String>,
    pub presence: Presence,
    pub availability: Availability,

    /// Sessions currently assigned to this agent. The length of this list is
    /// the agent's `activeSessionCount`.
    pub active_sessions: Vec<SessionId>,

    /// Hard cap on concurrent assignments.
    pub max_concurrent_sessions: usize,

    /// Cumulative accrued working minutes. Monotonic non-decreasing.
    pub total_working_minutes: i64,

    /// Running mean of customer feedback ratings.
    pub avg_rating: f64,
    pub total_feedback: u32,

    /// Set when the agent comes online; used as the assignment tie-break.
    pub online_since: Option<DateTime<Utc>>,

    /// Last heartbeat from the agent's client, for the stale-interval sweep.
    pub last_heartbeat: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: AgentId, display_name: impl Into<String>, max_concurrent_sessions: usize) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            skills: Vec::new(),
            presence: Presence::Offline,
            availability: Availability::Unavailable,
            active_sessions: Vec::new(),
            max_concurrent_sessions,
            total_working_minutes: 0,
            avg_rating: 0.0,
            total_feedback: 0,
            online_since: None,
            last_heartbeat: None,
            created_at: Utc::now(),
        }
    }

    /// Current number of assigned sessions.
    pub fn active_session_count(&self) -> usize {
        self.active_sessions.len()
    }

    /// Whether this agent can accept a new assignment right now.
    pub fn is_eligible(&self) -> bool {
        self.presence == Presence::Online
            && self.availability == Availability::Available
            && self.active_sessions.len() < self.max_concurrent_sessions
    }

    /// Reserve a slot for a session. Fails with [`ChatEngineError::AgentAtCapacity`]
    /// when the concurrency cap has no headroom; no mutation is applied in
    /// that case.
    pub fn begin_session(&mut self, session_id: SessionId) -> Result<()> {
        if self.active_sessions.len() >= self.max_concurrent_sessions {
            return Err(ChatEngineError::AgentAtCapacity {
                agent_id: self.id.clone(),
                capacity: self.max_concurrent_sessions,
            });
        }
        self.active_sessions.push(session_id);
        Ok(())
    }

    /// Drop a session from the active set. Returns false when the session was
    /// not held, which is a no-op rather than an error: release events can be
    /// re-delivered.
    pub fn end_session(&mut self, session_id: &SessionId) -> bool {
        let before = self.active_sessions.len();
        self.active_sessions.retain(|s| s != session_id);
        self.active_sessions.len() != before
    }

    /// Fold a 1-5 rating into the running average.
    pub fn record_feedback(&mut self, rating: u8) {
        let n = self.total_feedback as f64;
        self.avg_rating = (self.avg_rating * n + rating as f64) / (n + 1.0);
        self.total_feedback += 1;
    }
}

/// Shared registry of all agents.
///
/// Per-agent mutations are serialized under the registry's write lock; the
/// assignment coordinator takes the same write lock for the full duration of
/// a match pass so capacity checks and reservations are atomic.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    inner: RwLock<HashMap<AgentId, Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, agent: Agent) {
        let mut agents = self.inner.write().await;
        tracing::debug!("Registered agent {} ({})", agent.id, agent.display_name);
        agents.insert(agent.id.clone(), agent);
    }

    pub async fn get(&self, id: &AgentId) -> Option<Agent> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &AgentId) -> bool {
        self.inner.read().await.contains_key(id)
    }

    /// Run a mutation against one agent under the write lock.
    pub async fn with_agent_mut<F, R>(&self, id: &AgentId, f: F) -> Result<R>
    where
        F: FnOnce(&mut Agent) -> Result<R>,
    {
        let mut agents = self.inner.write().await;
        match agents.get_mut(id) {
            Some(agent) => f(agent),
            None => Err(ChatEngineError::AgentNotFound(id.clone())),
        }
    }

    /// Take the write lock for a transactional pass over multiple agents.
    pub async fn write(&self) -> RwLockWriteGuard<'_, HashMap<AgentId, Agent>> {
        self.inner.write().await
    }

    pub async fn list(&self) -> Vec<Agent> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn count_eligible(&self) -> usize {
        self.inner
            .read()
            .await
            .values()
            .filter(|a| a.is_eligible())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_cap_is_hard() {
        let mut agent = Agent::new(AgentId::from("a1"), "Agent One", 1);
        agent.begin_session(SessionId::from("s1")).unwrap();

        let err = agent.begin_session(SessionId::from("s2")).unwrap_err();
        assert!(matches!(err, ChatEngineError::AgentAtCapacity { .. }));
        // No partial mutation
        assert_eq!(agent.active_session_count(), 1);
    }

    #[test]
    fn end_session_is_idempotent() {
        let mut agent = Agent::new(AgentId::from("a1"), "Agent One", 2);
        agent.begin_session(SessionId::from("s1")).unwrap();

        assert!(agent.end_session(&SessionId::from("s1")));
        assert!(!agent.end_session(&SessionId::from("s1")));
        assert_eq!(agent.active_session_count(), 0);
    }

    #[test]
    fn eligibility_requires_presence_availability_and_headroom() {
        let mut agent = Agent::new(AgentId::from("a1"), "Agent One", 1);
        assert!(!agent.is_eligible());

        agent.presence = Presence::Online;
        assert!(!agent.is_eligible());

        agent.availability = Availability::Available;
        assert!(agent.is_eligible());

        agent.begin_session(SessionId::from("s1")).unwrap();
        assert!(!agent.is_eligible());
    }

    #[test]
    fn feedback_running_average() {
        let mut agent = Agent::new(AgentId::from("a1"), "Agent One", 1);
        agent.record_feedback(5);
        agent.record_feedback(3);
        assert_eq!(agent.total_feedback, 2);
        assert!((agent.avg_rating - 4.0).abs() < f64::EPSILON);
    }
}
