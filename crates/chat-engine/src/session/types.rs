//! Shared session-scoped types: identifiers, message turns, and the
//! escalation audit record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentId;

/// Unique session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, no message processed yet.
    Open,
    /// The automated responder is actively answering.
    InProgress,
    /// Awaiting or under human handling.
    Escalated,
    /// Terminal. Messages are still appended for logging but not interpreted.
    Resolved,
}

/// Who produced a message turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Customer,
    Responder,
    Agent(AgentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    System,
    EscalationNotice,
}

/// One turn within a session. Immutable once written, ordered strictly by
/// timestamp within its session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub sender: Sender,
    pub content: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    /// Present only for automated-responder messages.
    pub confidence: Option<f32>,
    pub intent: Option<String>,
    pub caused_escalation: bool,
}

impl Message {
    pub fn customer(session_id: SessionId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            sender: Sender::Customer,
            content: content.into(),
            message_type: MessageType::Text,
            timestamp: Utc::now(),
            confidence: None,
            intent: None,
            caused_escalation: false,
        }
    }

    pub fn responder(
        session_id: SessionId,
        content: impl Into<String>,
        confidence: f32,
        intent: Option<String>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            sender: Sender::Responder,
            content: content.into(),
            message_type: MessageType::Text,
            timestamp: Utc::now(),
            confidence: Some(confidence),
            intent,
            caused_escalation: false,
        }
    }

    pub fn agent(session_id: SessionId, agent_id: AgentId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            sender: Sender::Agent(agent_id),
            content: content.into(),
            message_type: MessageType::Text,
            timestamp: Utc::now(),
            confidence: None,
            intent: None,
            caused_escalation: false,
        }
    }

    pub fn escalation_notice(session_id: SessionId, intent: Option<String>) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            sender: Sender::Responder,
            content: "I'm connecting you with a human agent who will be able to help you \
                      better with this request. Please wait a moment while I transfer you."
                .to_string(),
            message_type: MessageType::EscalationNotice,
            timestamp: Utc::now(),
            confidence: None,
            intent,
            caused_escalation: false,
        }
    }
}

/// Unique escalation record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscalationId(pub String);

impl EscalationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for EscalationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a session was handed off to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscalationReason {
    LowConfidence,
    KeywordTrigger,
    ExplicitRequest,
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowConfidence => write!(f, "low-confidence"),
            Self::KeywordTrigger => write!(f, "keyword-trigger"),
            Self::ExplicitRequest => write!(f, "explicit-request"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Open,
    InProgress,
    Resolved,
}

/// Durable audit record of one handoff. Created exactly once per escalation
/// attempt; derived from session transitions, never a second source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub id: EscalationId,
    pub session_id: SessionId,
    pub reason: EscalationReason,
    pub confidence_at_trigger: f32,
    pub status: EscalationStatus,
    pub assigned_agent: Option<AgentId>,
    pub created_at: DateTime<Utc>,
}

impl EscalationRecord {
    pub fn new(session_id: SessionId, reason: EscalationReason, confidence_at_trigger: f32) -> Self {
        Self {
            id: EscalationId::new(),
            session_id,
            reason,
            confidence_at_trigger,
            status: EscalationStatus::Open,
            assigned_agent: None,
            created_at: Utc::now(),
        }
    }
}
