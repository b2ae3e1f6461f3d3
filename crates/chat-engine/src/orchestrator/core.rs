//! The engine struct, construction, statistics, and shared internals.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::agent::{AgentId, AgentRegistry};
use crate::assignment::AssignmentCoordinator;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::{EngineEvent, EventBroadcaster, Topic};
use crate::gateway::{IntentResponder, ResponderGateway};
use crate::policy::EscalationPolicy;
use crate::presence::PresenceTracker;
use crate::session::{EscalationStatus, Session, SessionId, SessionRegistry, SessionStatus};
use crate::storage::{InMemoryRepository, Repository};

use super::types::EngineStats;

/// The session and escalation engine.
///
/// Cheap to share: wrap it in an [`Arc`] and clone handles freely. All
/// operations take `&self`.
pub struct ChatEngine {
    pub(super) config: EngineConfig,
    pub(super) sessions: Arc<SessionRegistry>,
    pub(super) agents: Arc<AgentRegistry>,
    pub(super) presence: Arc<PresenceTracker>,
    pub(super) coordinator: AssignmentCoordinator,
    pub(super) policy: EscalationPolicy,
    pub(super) gateway: Arc<dyn ResponderGateway>,
    pub(super) repository: Arc<dyn Repository>,
    pub(super) events: EventBroadcaster,
}

impl ChatEngine {
    pub fn new(
        config: EngineConfig,
        gateway: Arc<dyn ResponderGateway>,
        repository: Arc<dyn Repository>,
    ) -> Self {
        let sessions = Arc::new(SessionRegistry::new());
        let agents = Arc::new(AgentRegistry::new());
        let coordinator = AssignmentCoordinator::new(sessions.clone(), agents.clone());
        let policy = EscalationPolicy::new(&config.policy);

        Self {
            config,
            sessions,
            agents,
            presence: Arc::new(PresenceTracker::new()),
            coordinator,
            policy,
            gateway,
            repository,
            events: EventBroadcaster::default(),
        }
    }

    /// Engine with the built-in pattern-table responder and in-memory
    /// storage. What demos and most tests run on.
    pub fn with_defaults(config: EngineConfig) -> Self {
        Self::new(
            config,
            Arc::new(IntentResponder::new()),
            Arc::new(InMemoryRepository::new()),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    /// Subscribe to an event topic.
    pub fn subscribe(&self, topic: &Topic) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.events.subscribe(topic)
    }

    /// Point-in-time statistics.
    pub async fn stats(&self) -> EngineStats {
        let counts = self.sessions.status_counts().await;
        let count = |s: SessionStatus| counts.get(&s).copied().unwrap_or(0);
        let agents = self.agents.list().await;

        EngineStats {
            total_sessions: counts.values().sum(),
            open_sessions: count(SessionStatus::Open),
            in_progress_sessions: count(SessionStatus::InProgress),
            escalated_sessions: count(SessionStatus::Escalated),
            resolved_sessions: count(SessionStatus::Resolved),
            queued_escalations: self.coordinator.queue_len().await,
            eligible_agents: agents.iter().filter(|a| a.is_eligible()).count(),
            total_agents: agents.len(),
        }
    }

    /// Snapshot one session's current state.
    pub async fn session_snapshot(&self, session_id: &SessionId) -> Result<Session> {
        let handle = self.sessions.get(session_id).await?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    /// Persist a session snapshot taken under its lock.
    pub(super) async fn persist_session(&self, session: &Session) -> Result<()> {
        self.repository.save_session(session).await
    }

    /// Persist the named agent's current registry state.
    pub(super) async fn persist_agent(&self, agent_id: &AgentId) -> Result<()> {
        if let Some(agent) = self.agents.get(agent_id).await {
            self.repository.save_agent(&agent).await?;
        }
        Ok(())
    }

    /// The escalation time of the session's most recent unresolved
    /// escalation, used to keep requeued sessions at their original place
    /// in line.
    pub(super) async fn escalation_time(&self, session_id: &SessionId) -> DateTime<Utc> {
        match self.repository.escalations_for_session(session_id).await {
            Ok(records) => records
                .iter()
                .rev()
                .find(|r| r.status != EscalationStatus::Resolved)
                .map(|r| r.created_at)
                .unwrap_or_else(Utc::now),
            Err(_) => Utc::now(),
        }
    }

    /// Update the session's latest open escalation record on assignment.
    pub(super) async fn mark_escalation_assigned(
        &self,
        session_id: &SessionId,
        agent_id: &AgentId,
    ) -> Result<()> {
        let records = self.repository.escalations_for_session(session_id).await?;
        if let Some(mut record) = records
            .into_iter()
            .rev()
            .find(|r| r.status != EscalationStatus::Resolved)
        {
            record.assigned_agent = Some(agent_id.clone());
            record.status = EscalationStatus::InProgress;
            self.repository.update_escalation(&record).await?;
        }
        Ok(())
    }

    /// Close out the session's latest open escalation record.
    pub(super) async fn mark_escalation_resolved(&self, session_id: &SessionId) -> Result<()> {
        let records = self.repository.escalations_for_session(session_id).await?;
        if let Some(mut record) = records
            .into_iter()
            .rev()
            .find(|r| r.status != EscalationStatus::Resolved)
        {
            record.status = EscalationStatus::Resolved;
            self.repository.update_escalation(&record).await?;
        }
        Ok(())
    }

    /// Drain the pending queue and publish/persist the resulting
    /// assignments. Called whenever capacity may have been freed or an
    /// agent became eligible, and periodically by the server's drain loop.
    pub(super) async fn drain_queue(&self) -> Result<usize> {
        let completed = self.coordinator.drain().await;
        let n = completed.len();
        for assignment in completed {
            self.after_assignment(&assignment.session_id, &assignment.agent_id)
                .await?;
        }
        Ok(n)
    }

    /// Bookkeeping common to queued and immediate assignments: persist both
    /// sides, update the audit record, announce.
    pub(super) async fn after_assignment(
        &self,
        session_id: &SessionId,
        agent_id: &AgentId,
    ) -> Result<()> {
        let snapshot = self.session_snapshot(session_id).await?;
        self.persist_session(&snapshot).await?;
        self.persist_agent(agent_id).await?;
        self.mark_escalation_assigned(session_id, agent_id).await?;
        self.events.publish_session(
            session_id,
            EngineEvent::AgentAssigned {
                session_id: session_id.clone(),
                agent_id: agent_id.clone(),
            },
        );
        self.events.publish(
            &Topic::Agent(agent_id.clone()),
            EngineEvent::AgentAssigned {
                session_id: session_id.clone(),
                agent_id: agent_id.clone(),
            },
        );
        Ok(())
    }

    /// Run one assignment pass over the pending queue. Returns how many
    /// assignments were made.
    pub async fn drain_pending(&self) -> Result<usize> {
        self.drain_queue().await
    }

    /// Sessions currently waiting for an agent, in assignment order.
    pub async fn queued_snapshot(&self) -> Vec<crate::assignment::QueuedEscalation> {
        self.coordinator.queued_snapshot().await
    }

    /// Remove a session from the waiting line without resolving it.
    /// Returns whether it was queued.
    pub async fn cancel_queued(&self, session_id: &SessionId) -> bool {
        self.coordinator.cancel(session_id).await
    }

    /// Direct assignment by a supervisor. Bypasses queue order, never the
    /// capacity cap.
    pub async fn assign_session_to_agent(
        &self,
        session_id: &SessionId,
        agent_id: &AgentId,
    ) -> Result<()> {
        self.coordinator.assign_direct(session_id, agent_id).await?;
        self.after_assignment(session_id, agent_id).await
    }
}
