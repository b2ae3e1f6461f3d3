//! In-process administrative surfaces
//!
//! Thin facades over [`ChatEngine`] for embedding applications. They add
//! no state of their own; they exist so a dashboard or supervisor tool
//! can be handed a narrow capability instead of the whole engine.

use std::sync::Arc;

use crate::agent::{Agent, AgentId};
use crate::assignment::QueuedEscalation;
use crate::error::Result;
use crate::orchestrator::{AgentAnalytics, ChatEngine, EngineStats};
use crate::session::{EscalationRecord, Message, Session, SessionId};

/// Operational surface: provisioning and monitoring.
#[derive(Clone)]
pub struct AdminApi {
    engine: Arc<ChatEngine>,
}

impl AdminApi {
    pub fn new(engine: Arc<ChatEngine>) -> Self {
        Self { engine }
    }

    pub async fn register_agent(
        &self,
        agent_id: AgentId,
        display_name: impl Into<String>,
        skills: Vec<String>,
    ) -> Result<()> {
        self.engine.register_agent(agent_id, display_name, skills).await
    }

    pub async fn create_session(&self) -> Result<SessionId> {
        self.engine.create_session().await
    }

    pub async fn stats(&self) -> EngineStats {
        self.engine.stats().await
    }

    pub async fn list_agents(&self) -> Vec<Agent> {
        self.engine.list_agents().await
    }

    pub async fn session(&self, session_id: &SessionId) -> Result<Session> {
        self.engine.session_snapshot(session_id).await
    }

    pub async fn transcript(&self, session_id: &SessionId) -> Result<Vec<Message>> {
        self.engine.transcript(session_id).await
    }

    /// Escalations awaiting or under human handling, oldest first.
    pub async fn open_escalations(&self) -> Result<Vec<EscalationRecord>> {
        self.engine.repository().open_escalations().await
    }
}

/// Supervision surface: everything the admin view has, plus interventions.
#[derive(Clone)]
pub struct SupervisorApi {
    engine: Arc<ChatEngine>,
}

impl SupervisorApi {
    pub fn new(engine: Arc<ChatEngine>) -> Self {
        Self { engine }
    }

    pub async fn agent_analytics(&self, agent_id: &AgentId) -> Result<AgentAnalytics> {
        self.engine.agent_analytics(agent_id).await
    }

    /// Sessions currently waiting in line, in assignment order.
    pub async fn queued_escalations(&self) -> Vec<QueuedEscalation> {
        self.engine.queued_snapshot().await
    }

    /// Hand a queued session to a named agent out of turn. Still subject to
    /// the agent's capacity cap.
    pub async fn assign_session(&self, session_id: &SessionId, agent_id: &AgentId) -> Result<()> {
        self.engine.assign_session_to_agent(session_id, agent_id).await
    }

    /// Pull a session out of the waiting line without resolving it.
    pub async fn cancel_queued(&self, session_id: &SessionId) -> bool {
        self.engine.cancel_queued(session_id).await
    }

    /// Override an agent's concurrency cap.
    pub async fn set_agent_capacity(&self, agent_id: &AgentId, cap: usize) -> Result<()> {
        self.engine.set_agent_capacity(agent_id, cap).await
    }
}
