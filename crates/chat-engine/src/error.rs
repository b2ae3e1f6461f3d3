//! Error types for the chat engine
//!
//! Invariant violations get their own variants so callers can match on
//! exactly which invariant an operation would have broken. Operations that
//! return these errors apply no state mutation.

use thiserror::Error;

use crate::agent::AgentId;
use crate::session::{SessionId, SessionStatus};

#[derive(Error, Debug)]
pub enum ChatEngineError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("Invalid transition for session {session_id}: {operation} not valid in {status:?}")]
    InvalidTransition {
        session_id: SessionId,
        status: SessionStatus,
        operation: &'static str,
    },

    #[error("Agent {agent_id} is at capacity ({capacity} concurrent sessions)")]
    AgentAtCapacity { agent_id: AgentId, capacity: usize },

    #[error("Session {session_id} is already assigned to agent {agent_id}")]
    AlreadyAssigned {
        session_id: SessionId,
        agent_id: AgentId,
    },

    #[error("Session {session_id} is assigned to {assigned}, not {requested}")]
    NotAssignedToAgent {
        session_id: SessionId,
        assigned: AgentId,
        requested: AgentId,
    },

    #[error("Satisfaction score {0} out of range (expected 1-5)")]
    InvalidSatisfactionScore(u8),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatEngineError {
    pub fn invalid_transition(
        session_id: &SessionId,
        status: SessionStatus,
        operation: &'static str,
    ) -> Self {
        Self::InvalidTransition {
            session_id: session_id.clone(),
            status,
            operation,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self::Internal(msg.to_string())
    }

    pub fn storage(msg: &str) -> Self {
        Self::Storage(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChatEngineError>;
