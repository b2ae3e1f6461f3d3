//! Durable persistence behind the [`Repository`] trait
//!
//! The engine treats storage as a write-behind audit trail: live state is
//! in memory and persisted copies exist for history queries and restarts.
//! The trait keeps the engine testable without a database; the bundled
//! [`InMemoryRepository`] is the default backing store and the fixture for
//! every test.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{Agent, AgentId};
use crate::error::Result;
use crate::presence::PresenceInterval;
use crate::session::{
    EscalationId, EscalationRecord, EscalationStatus, Message, Session, SessionId,
};

/// A customer's rating of a resolved session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerFeedback {
    pub id: String,
    pub session_id: SessionId,
    /// The agent who handled the session, when one did.
    pub agent_id: Option<AgentId>,
    /// 1-5.
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CustomerFeedback {
    pub fn new(
        session_id: SessionId,
        agent_id: Option<AgentId>,
        rating: u8,
        comment: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id,
            agent_id,
            rating,
            comment,
            created_at: Utc::now(),
        }
    }
}

/// Storage backend contract.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn save_session(&self, session: &Session) -> Result<()>;
    async fn load_session(&self, id: &SessionId) -> Result<Option<Session>>;

    async fn append_message(&self, message: &Message) -> Result<()>;
    async fn messages_for_session(&self, id: &SessionId) -> Result<Vec<Message>>;

    async fn append_escalation(&self, record: &EscalationRecord) -> Result<()>;
    /// Upsert by record id.
    async fn update_escalation(&self, record: &EscalationRecord) -> Result<()>;
    /// Escalations not yet resolved, oldest first.
    async fn open_escalations(&self) -> Result<Vec<EscalationRecord>>;
    async fn escalations_for_session(&self, id: &SessionId) -> Result<Vec<EscalationRecord>>;

    async fn save_agent(&self, agent: &Agent) -> Result<()>;
    async fn load_agent(&self, id: &AgentId) -> Result<Option<Agent>>;

    async fn append_interval(&self, interval: &PresenceInterval) -> Result<()>;
    async fn intervals_for_agent(&self, agent_id: &AgentId) -> Result<Vec<PresenceInterval>>;

    async fn append_feedback(&self, feedback: &CustomerFeedback) -> Result<()>;
    async fn feedback_for_agent(&self, agent_id: &AgentId) -> Result<Vec<CustomerFeedback>>;
}

/// Process-local [`Repository`] over plain maps.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    sessions: RwLock<HashMap<SessionId, Session>>,
    messages: RwLock<Vec<Message>>,
    escalations: RwLock<HashMap<EscalationId, EscalationRecord>>,
    agents: RwLock<HashMap<AgentId, Agent>>,
    intervals: RwLock<Vec<PresenceInterval>>,
    feedback: RwLock<Vec<CustomerFeedback>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn save_session(&self, session: &Session) -> Result<()> {
        self.sessions
            .write()
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn load_session(&self, id: &SessionId) -> Result<Option<Session>> {
        Ok(self.sessions.read().get(id).cloned())
    }

    async fn append_message(&self, message: &Message) -> Result<()> {
        self.messages.write().push(message.clone());
        Ok(())
    }

    async fn messages_for_session(&self, id: &SessionId) -> Result<Vec<Message>> {
        Ok(self
            .messages
            .read()
            .iter()
            .filter(|m| &m.session_id == id)
            .cloned()
            .collect())
    }

    async fn append_escalation(&self, record: &EscalationRecord) -> Result<()> {
        self.escalations
            .write()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_escalation(&self, record: &EscalationRecord) -> Result<()> {
        self.escalations
            .write()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn open_escalations(&self) -> Result<Vec<EscalationRecord>> {
        let mut open: Vec<_> = self
            .escalations
            .read()
            .values()
            .filter(|r| r.status != EscalationStatus::Resolved)
            .cloned()
            .collect();
        open.sort_by_key(|r| r.created_at);
        Ok(open)
    }

    async fn escalations_for_session(&self, id: &SessionId) -> Result<Vec<EscalationRecord>> {
        let mut records: Vec<_> = self
            .escalations
            .read()
            .values()
            .filter(|r| &r.session_id == id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn save_agent(&self, agent: &Agent) -> Result<()> {
        self.agents.write().insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    async fn load_agent(&self, id: &AgentId) -> Result<Option<Agent>> {
        Ok(self.agents.read().get(id).cloned())
    }

    async fn append_interval(&self, interval: &PresenceInterval) -> Result<()> {
        self.intervals.write().push(interval.clone());
        Ok(())
    }

    async fn intervals_for_agent(&self, agent_id: &AgentId) -> Result<Vec<PresenceInterval>> {
        Ok(self
            .intervals
            .read()
            .iter()
            .filter(|i| &i.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn append_feedback(&self, feedback: &CustomerFeedback) -> Result<()> {
        self.feedback.write().push(feedback.clone());
        Ok(())
    }

    async fn feedback_for_agent(&self, agent_id: &AgentId) -> Result<Vec<CustomerFeedback>> {
        Ok(self
            .feedback
            .read()
            .iter()
            .filter(|f| f.agent_id.as_ref() == Some(agent_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::EscalationReason;

    #[tokio::test]
    async fn open_escalations_exclude_resolved() {
        let repo = InMemoryRepository::new();
        let mut first = EscalationRecord::new(
            SessionId::from("s1"),
            EscalationReason::LowConfidence,
            0.4,
        );
        let second = EscalationRecord::new(
            SessionId::from("s2"),
            EscalationReason::KeywordTrigger,
            0.9,
        );
        repo.append_escalation(&first).await.unwrap();
        repo.append_escalation(&second).await.unwrap();

        first.status = EscalationStatus::Resolved;
        repo.update_escalation(&first).await.unwrap();

        let open = repo.open_escalations().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].session_id, SessionId::from("s2"));
    }

    #[tokio::test]
    async fn messages_are_scoped_to_their_session() {
        let repo = InMemoryRepository::new();
        repo.append_message(&Message::customer(SessionId::from("s1"), "one"))
            .await
            .unwrap();
        repo.append_message(&Message::customer(SessionId::from("s2"), "two"))
            .await
            .unwrap();

        let messages = repo
            .messages_for_session(&SessionId::from("s1"))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "one");
    }

    #[tokio::test]
    async fn feedback_query_filters_by_agent() {
        let repo = InMemoryRepository::new();
        let agent = AgentId::from("a1");
        repo.append_feedback(&CustomerFeedback::new(
            SessionId::from("s1"),
            Some(agent.clone()),
            5,
            None,
        ))
        .await
        .unwrap();
        repo.append_feedback(&CustomerFeedback::new(
            SessionId::from("s2"),
            None,
            3,
            Some("fine".to_string()),
        ))
        .await
        .unwrap();

        let for_agent = repo.feedback_for_agent(&agent).await.unwrap();
        assert_eq!(for_agent.len(), 1);
        assert_eq!(for_agent[0].rating, 5);
    }
}
