//! Session entity and its guarded transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::error::{ChatEngineError, Result};
use crate::session::types::{Message, SessionId, SessionStatus};

/// One customer conversation.
///
/// Invariant: `assigned_agent` is set only while `status` is `Escalated`
/// (an `Escalated` session with no assignee is awaiting an agent). The
/// context list is append-only; messages are never rewritten, with the one
/// exception of flipping `caused_escalation` on the triggering customer turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub assigned_agent: Option<AgentId>,
    /// Set once, at resolve time. 1-5.
    pub satisfaction_score: Option<u8>,
    /// Ordered, append-only list of exchanged turns.
    pub context: Vec<Message>,
    /// Number of escalation records created for this session.
    pub escalation_count: u32,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: SessionStatus::Open,
            created_at: now,
            last_activity_at: now,
            assigned_agent: None,
            satisfaction_score: None,
            context: Vec::new(),
            escalation_count: 0,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == SessionStatus::Resolved
    }

    /// Append a turn. Valid in every state: resolved sessions still accept
    /// messages for logging (e.g. trailing feedback), they are just no longer
    /// interpreted. Moves `open` sessions to `in_progress` on the first
    /// customer turn.
    pub fn append_message(&mut self, message: Message) -> &Message {
        self.last_activity_at = message.timestamp;
        if self.status == SessionStatus::Open {
            self.status = SessionStatus::InProgress;
            tracing::debug!("Session {} open -> in_progress", self.id);
        }
        self.context.push(message);
        self.context.last().expect("just pushed")
    }

    /// The trailing slice of context handed to the responder gateway.
    pub fn gateway_window(&self, max_turns: usize) -> &[Message] {
        let start = self.context.len().saturating_sub(max_turns);
        &self.context[start..]
    }

    /// Mark the session escalated. Valid from `open` or `in_progress`.
    pub fn mark_escalated(&mut self) -> Result<()> {
        match self.status {
            SessionStatus::Open | SessionStatus::InProgress => {
                self.status = SessionStatus::Escalated;
                self.escalation_count += 1;
                self.last_activity_at = Utc::now();
                tracing::debug!("Session {} -> escalated", self.id);
                Ok(())
            }
            status => Err(ChatEngineError::invalid_transition(
                &self.id, status, "escalate",
            )),
        }
    }

    /// Flag the most recent customer turn as the escalation trigger.
    pub fn flag_escalation_trigger(&mut self) {
        if let Some(msg) = self
            .context
            .iter_mut()
            .rev()
            .find(|m| m.sender == crate::session::Sender::Customer)
        {
            msg.caused_escalation = true;
        }
    }

    /// Bind an agent. Valid only while `escalated` with no assignee.
    pub fn assign(&mut self, agent_id: AgentId) -> Result<()> {
        if self.status != SessionStatus::Escalated {
            return Err(ChatEngineError::invalid_transition(
                &self.id,
                self.status,
                "assign",
            ));
        }
        if let Some(existing) = &self.assigned_agent {
            return Err(ChatEngineError::AlreadyAssigned {
                session_id: self.id.clone(),
                agent_id: existing.clone(),
            });
        }
        tracing::debug!("Session {} assigned to agent {}", self.id, agent_id);
        self.assigned_agent = Some(agent_id);
        self.last_activity_at = Utc::now();
        Ok(())
    }

    /// Unbind an agent. Releasing an unassigned session is a no-op (release
    /// events can be re-delivered); releasing on behalf of the wrong agent is
    /// an invariant violation.
    pub fn release(&mut self, agent_id: &AgentId) -> Result<bool> {
        match &self.assigned_agent {
            None => Ok(false),
            Some(assigned) if assigned == agent_id => {
                tracing::debug!("Session {} released by agent {}", self.id, agent_id);
                self.assigned_agent = None;
                self.last_activity_at = Utc::now();
                Ok(true)
            }
            Some(assigned) => Err(ChatEngineError::NotAssignedToAgent {
                session_id: self.id.clone(),
                assigned: assigned.clone(),
                requested: agent_id.clone(),
            }),
        }
    }

    /// Terminal transition. Valid from `in_progress` or `escalated`; an
    /// assigned agent is implicitly released and returned so the caller can
    /// free the agent's capacity.
    pub fn resolve(&mut self, satisfaction_score: Option<u8>) -> Result<Option<AgentId>> {
        match self.status {
            SessionStatus::InProgress | SessionStatus::Escalated => {}
            status => {
                return Err(ChatEngineError::invalid_transition(
                    &self.id, status, "resolve",
                ))
            }
        }
        if let Some(score) = satisfaction_score {
            if !(1..=5).contains(&score) {
                return Err(ChatEngineError::InvalidSatisfactionScore(score));
            }
        }

        let released = self.assigned_agent.take();
        self.status = SessionStatus::Resolved;
        self.satisfaction_score = satisfaction_score;
        self.last_activity_at = Utc::now();
        tracing::debug!("Session {} resolved", self.id);
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::Sender;

    fn session() -> Session {
        Session::new(SessionId::from("s1"))
    }

    #[test]
    fn first_message_moves_open_to_in_progress() {
        let mut s = session();
        assert_eq!(s.status, SessionStatus::Open);
        s.append_message(Message::customer(s.id.clone(), "hello"));
        assert_eq!(s.status, SessionStatus::InProgress);
    }

    #[test]
    fn resolved_is_terminal_but_still_logs_messages() {
        let mut s = session();
        s.append_message(Message::customer(s.id.clone(), "hello"));
        s.resolve(Some(4)).unwrap();
        assert_eq!(s.status, SessionStatus::Resolved);
        assert_eq!(s.satisfaction_score, Some(4));

        // Further transitions are defects
        assert!(s.mark_escalated().is_err());
        assert!(s.resolve(None).is_err());

        // But appending is still allowed for the audit trail
        s.append_message(Message::customer(s.id.clone(), "thanks anyway"));
        assert_eq!(s.context.len(), 2);
        assert_eq!(s.status, SessionStatus::Resolved);
    }

    #[test]
    fn assign_requires_escalated_and_unassigned() {
        let mut s = session();
        s.append_message(Message::customer(s.id.clone(), "help"));

        // Not escalated yet
        assert!(s.assign(AgentId::from("a1")).is_err());

        s.mark_escalated().unwrap();
        s.assign(AgentId::from("a1")).unwrap();

        // Second assignment is a defect
        let err = s.assign(AgentId::from("a2")).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ChatEngineError::AlreadyAssigned { .. }
        ));
    }

    #[test]
    fn release_is_idempotent_but_checks_identity() {
        let mut s = session();
        s.append_message(Message::customer(s.id.clone(), "help"));
        s.mark_escalated().unwrap();
        s.assign(AgentId::from("a1")).unwrap();

        // Wrong agent fails loudly
        assert!(s.release(&AgentId::from("a2")).is_err());

        assert!(s.release(&AgentId::from("a1")).unwrap());
        // Re-delivered release is a no-op
        assert!(!s.release(&AgentId::from("a1")).unwrap());
        assert_eq!(s.status, SessionStatus::Escalated);
    }

    #[test]
    fn resolve_implicitly_releases() {
        let mut s = session();
        s.append_message(Message::customer(s.id.clone(), "help"));
        s.mark_escalated().unwrap();
        s.assign(AgentId::from("a1")).unwrap();

        let released = s.resolve(Some(5)).unwrap();
        assert_eq!(released, Some(AgentId::from("a1")));
        assert!(s.assigned_agent.is_none());
    }

    #[test]
    fn satisfaction_score_is_validated() {
        let mut s = session();
        s.append_message(Message::customer(s.id.clone(), "hello"));
        assert!(matches!(
            s.resolve(Some(6)),
            Err(crate::error::ChatEngineError::InvalidSatisfactionScore(6))
        ));
        // Failed resolve applied nothing
        assert_eq!(s.status, SessionStatus::InProgress);
    }

    #[test]
    fn gateway_window_truncates() {
        let mut s = session();
        for i in 0..25 {
            s.append_message(Message::customer(s.id.clone(), format!("msg {i}")));
        }
        let window = s.gateway_window(20);
        assert_eq!(window.len(), 20);
        assert_eq!(window[0].content, "msg 5");
    }

    #[test]
    fn escalation_trigger_flags_latest_customer_turn() {
        let mut s = session();
        s.append_message(Message::customer(s.id.clone(), "hello"));
        s.append_message(Message::responder(s.id.clone(), "hi!", 0.9, None));
        s.append_message(Message::customer(s.id.clone(), "refund now"));
        s.flag_escalation_trigger();

        let flagged: Vec<_> = s.context.iter().filter(|m| m.caused_escalation).collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].content, "refund now");
        assert_eq!(flagged[0].sender, Sender::Customer);
    }
}
