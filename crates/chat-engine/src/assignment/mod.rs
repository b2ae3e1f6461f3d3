//! Escalation queue and assignment coordination
//!
//! A single FIFO queue of escalated sessions awaiting a human, ordered by
//! escalation time, plus the matching pass that binds queued sessions to
//! eligible agents. The queue mutex is held for the whole of any match
//! pass, so two concurrent drains can never hand the same agent slot out
//! twice; within a pass the agent registry's write lock makes the capacity
//! check and the reservation one atomic step.
//!
//! Lock order everywhere: queue, then agent registry, then the individual
//! session. Callers must not hold a session lock when calling in.
//!
//! Matching picks the eligible agent with the fewest active sessions,
//! breaking ties by who came online earliest. The queue drains strictly in
//! order: eligibility does not depend on the session, so when the head
//! cannot be matched nothing behind it can either.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::agent::{AgentId, AgentRegistry};
use crate::error::{ChatEngineError, Result};
use crate::session::{SessionId, SessionRegistry, SessionStatus};

/// A session waiting in line for an agent.
#[derive(Debug, Clone)]
pub struct QueuedEscalation {
    pub session_id: SessionId,
    /// Escalation time. Preserved across requeues so a session released by
    /// an agent going offline keeps its place in line.
    pub queued_at: DateTime<Utc>,
}

/// What happened to an assignment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentOutcome {
    Assigned(AgentId),
    /// No eligible agent; queued at the given 1-based position.
    Queued { position: usize },
}

/// Result of [`AssignmentCoordinator::request_assignment`]: the requested
/// session's outcome plus every assignment the accompanying drain made.
/// The drain runs head-first, so older queued sessions can come out of it
/// ahead of (or instead of) the requested one.
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub outcome: AssignmentOutcome,
    pub assignments: Vec<CompletedAssignment>,
}

/// One assignment completed by a drain pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedAssignment {
    pub session_id: SessionId,
    pub agent_id: AgentId,
}

pub struct AssignmentCoordinator {
    sessions: std::sync::Arc<SessionRegistry>,
    agents: std::sync::Arc<AgentRegistry>,
    queue: Mutex<VecDeque<QueuedEscalation>>,
}

impl AssignmentCoordinator {
    pub fn new(
        sessions: std::sync::Arc<SessionRegistry>,
        agents: std::sync::Arc<AgentRegistry>,
    ) -> Self {
        Self {
            sessions,
            agents,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Place a freshly escalated session in line and drain the queue
    /// head-first. The new session joins at the back; it is only assigned
    /// if the drain reaches it, so older queued sessions always claim
    /// freed capacity first.
    pub async fn request_assignment(&self, session_id: &SessionId) -> Result<RequestResult> {
        // Validate before touching the queue so a bad request stays an error
        // rather than a silently dropped entry.
        let handle = self.sessions.get(session_id).await?;
        {
            let session = handle.lock().await;
            if session.status != SessionStatus::Escalated {
                return Err(ChatEngineError::invalid_transition(
                    session_id,
                    session.status,
                    "request assignment",
                ));
            }
            if let Some(agent_id) = &session.assigned_agent {
                return Err(ChatEngineError::AlreadyAssigned {
                    session_id: session_id.clone(),
                    agent_id: agent_id.clone(),
                });
            }
        }

        let mut queue = self.queue.lock().await;
        if !queue.iter().any(|q| &q.session_id == session_id) {
            queue.push_back(QueuedEscalation {
                session_id: session_id.clone(),
                queued_at: Utc::now(),
            });
        }

        let assignments = self.drain_locked(&mut queue).await;
        let outcome = match assignments
            .iter()
            .find(|a| &a.session_id == session_id)
        {
            Some(assignment) => AssignmentOutcome::Assigned(assignment.agent_id.clone()),
            None => {
                let position = queue
                    .iter()
                    .position(|q| &q.session_id == session_id)
                    .map(|i| i + 1)
                    .unwrap_or(queue.len());
                tracing::info!(
                    "Session {} queued for assignment at position {}",
                    session_id,
                    position
                );
                AssignmentOutcome::Queued { position }
            }
        };
        Ok(RequestResult {
            outcome,
            assignments,
        })
    }

    /// Direct assignment to a named agent, bypassing the queue order but not
    /// the capacity cap. Removes the session from the queue on success.
    pub async fn assign_direct(&self, session_id: &SessionId, agent_id: &AgentId) -> Result<()> {
        let mut queue = self.queue.lock().await;
        let handle = self.sessions.get(session_id).await?;
        let mut agents = self.agents.write().await;

        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| ChatEngineError::AgentNotFound(agent_id.clone()))?;
        agent.begin_session(session_id.clone())?;

        let mut session = handle.lock().await;
        match session.assign(agent_id.clone()) {
            Ok(()) => {
                drop(session);
                queue.retain(|q| &q.session_id != session_id);
                tracing::info!("Session {} directly assigned to agent {}", session_id, agent_id);
                Ok(())
            }
            Err(e) => {
                drop(session);
                if let Some(agent) = agents.get_mut(agent_id) {
                    agent.end_session(session_id);
                }
                Err(e)
            }
        }
    }

    /// Match as many queued sessions as eligible agents allow, in FIFO
    /// order. Entries whose session was resolved, cancelled, or otherwise
    /// moved on are dropped in passing.
    pub async fn drain(&self) -> Vec<CompletedAssignment> {
        let mut queue = self.queue.lock().await;
        self.drain_locked(&mut queue).await
    }

    /// Head-first drain loop. Caller must hold the queue lock.
    async fn drain_locked(&self, queue: &mut VecDeque<QueuedEscalation>) -> Vec<CompletedAssignment> {
        let mut completed = Vec::new();

        loop {
            let Some(head) = queue.front().cloned() else { break };

            let handle = match self.sessions.get(&head.session_id).await {
                Ok(h) => h,
                Err(_) => {
                    queue.pop_front();
                    continue;
                }
            };
            {
                let session = handle.lock().await;
                if session.status != SessionStatus::Escalated
                    || session.assigned_agent.is_some()
                {
                    tracing::debug!(
                        "Dropping stale queue entry for session {}",
                        head.session_id
                    );
                    queue.pop_front();
                    continue;
                }
            }

            match self.try_match(&head.session_id).await {
                Ok(Some(agent_id)) => {
                    queue.pop_front();
                    tracing::info!(
                        "Session {} assigned to agent {} from queue",
                        head.session_id,
                        agent_id
                    );
                    completed.push(CompletedAssignment {
                        session_id: head.session_id,
                        agent_id,
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(
                        "Dropping unassignable queue entry for session {}: {}",
                        head.session_id,
                        e
                    );
                    queue.pop_front();
                }
            }
        }
        completed
    }

    /// Put a session back in line with its original escalation time, used
    /// when its agent goes offline. No-op if already queued.
    pub async fn enqueue(&self, session_id: SessionId, queued_at: DateTime<Utc>) {
        let mut queue = self.queue.lock().await;
        if queue.iter().any(|q| q.session_id == session_id) {
            return;
        }
        let pos = queue
            .iter()
            .position(|q| q.queued_at > queued_at)
            .unwrap_or(queue.len());
        tracing::debug!("Requeued session {} at position {}", session_id, pos + 1);
        queue.insert(pos, QueuedEscalation { session_id, queued_at });
    }

    /// Remove a session from the queue. Returns whether it was present.
    pub async fn cancel(&self, session_id: &SessionId) -> bool {
        let mut queue = self.queue.lock().await;
        let before = queue.len();
        queue.retain(|q| &q.session_id != session_id);
        queue.len() != before
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn queued_snapshot(&self) -> Vec<QueuedEscalation> {
        self.queue.lock().await.iter().cloned().collect()
    }

    /// One atomic match attempt. Caller must hold the queue lock. Reserves a
    /// slot on the least-loaded eligible agent and binds the session; the
    /// reservation is rolled back if the session is no longer assignable.
    async fn try_match(&self, session_id: &SessionId) -> Result<Option<AgentId>> {
        let handle = self.sessions.get(session_id).await?;
        let mut agents = self.agents.write().await;

        let best = agents
            .values()
            .filter(|a| a.is_eligible())
            .min_by(|a, b| {
                a.active_session_count()
                    .cmp(&b.active_session_count())
                    .then_with(|| a.online_since.cmp(&b.online_since))
            })
            .map(|a| a.id.clone());
        let Some(agent_id) = best else {
            return Ok(None);
        };

        match agents.get_mut(&agent_id) {
            Some(agent) => agent.begin_session(session_id.clone())?,
            None => return Ok(None),
        }

        let mut session = handle.lock().await;
        match session.assign(agent_id.clone()) {
            Ok(()) => Ok(Some(agent_id)),
            Err(e) => {
                drop(session);
                if let Some(agent) = agents.get_mut(&agent_id) {
                    agent.end_session(session_id);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, Availability, Presence};
    use crate::session::{Message, Session};
    use chrono::TimeZone;
    use std::sync::Arc;

    async fn escalated_session(sessions: &SessionRegistry, id: &str) -> SessionId {
        let session_id = SessionId::from(id);
        let mut session = Session::new(session_id.clone());
        session.append_message(Message::customer(session_id.clone(), "I need a human"));
        session.mark_escalated().unwrap();
        sessions.insert(session).await;
        session_id
    }

    async fn online_agent(
        agents: &AgentRegistry,
        id: &str,
        capacity: usize,
        online_hour: u32,
    ) -> AgentId {
        let agent_id = AgentId::from(id);
        let mut agent = Agent::new(agent_id.clone(), id.to_string(), capacity);
        agent.presence = Presence::Online;
        agent.availability = Availability::Available;
        agent.online_since = Some(Utc.with_ymd_and_hms(2026, 3, 10, online_hour, 0, 0).unwrap());
        agents.insert(agent).await;
        agent_id
    }

    fn coordinator() -> (Arc<SessionRegistry>, Arc<AgentRegistry>, AssignmentCoordinator) {
        let sessions = Arc::new(SessionRegistry::new());
        let agents = Arc::new(AgentRegistry::new());
        let coordinator = AssignmentCoordinator::new(sessions.clone(), agents.clone());
        (sessions, agents, coordinator)
    }

    #[tokio::test]
    async fn assigns_least_loaded_agent() {
        let (sessions, agents, coordinator) = coordinator();
        let busy = online_agent(&agents, "busy", 3, 8).await;
        let idle = online_agent(&agents, "idle", 3, 9).await;
        agents
            .with_agent_mut(&busy, |a| a.begin_session(SessionId::from("other")))
            .await
            .unwrap();

        let s1 = escalated_session(&sessions, "s1").await;
        let result = coordinator.request_assignment(&s1).await.unwrap();
        assert_eq!(result.outcome, AssignmentOutcome::Assigned(idle));
    }

    #[tokio::test]
    async fn tie_breaks_by_earliest_online() {
        let (sessions, agents, coordinator) = coordinator();
        online_agent(&agents, "late", 3, 10).await;
        let early = online_agent(&agents, "early", 3, 7).await;

        let s1 = escalated_session(&sessions, "s1").await;
        let result = coordinator.request_assignment(&s1).await.unwrap();
        assert_eq!(result.outcome, AssignmentOutcome::Assigned(early));
    }

    #[tokio::test]
    async fn queues_when_nobody_is_eligible_then_drains_fifo() {
        let (sessions, agents, coordinator) = coordinator();
        let s1 = escalated_session(&sessions, "s1").await;
        let s2 = escalated_session(&sessions, "s2").await;

        assert_eq!(
            coordinator.request_assignment(&s1).await.unwrap().outcome,
            AssignmentOutcome::Queued { position: 1 }
        );
        assert_eq!(
            coordinator.request_assignment(&s2).await.unwrap().outcome,
            AssignmentOutcome::Queued { position: 2 }
        );

        let agent_id = online_agent(&agents, "a1", 2, 9).await;
        let completed = coordinator.drain().await;
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].session_id, s1);
        assert_eq!(completed[1].session_id, s2);
        assert!(completed.iter().all(|c| c.agent_id == agent_id));
        assert_eq!(coordinator.queue_len().await, 0);
    }

    #[tokio::test]
    async fn drain_stops_at_capacity() {
        let (sessions, agents, coordinator) = coordinator();
        let s1 = escalated_session(&sessions, "s1").await;
        let s2 = escalated_session(&sessions, "s2").await;
        coordinator.request_assignment(&s1).await.unwrap();
        coordinator.request_assignment(&s2).await.unwrap();

        online_agent(&agents, "a1", 1, 9).await;
        let completed = coordinator.drain().await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].session_id, s1);
        assert_eq!(coordinator.queue_len().await, 1);
    }

    #[tokio::test]
    async fn direct_assign_respects_capacity() {
        let (sessions, agents, coordinator) = coordinator();
        let agent_id = online_agent(&agents, "a1", 1, 9).await;
        let s1 = escalated_session(&sessions, "s1").await;
        let s2 = escalated_session(&sessions, "s2").await;

        coordinator.assign_direct(&s1, &agent_id).await.unwrap();
        let err = coordinator.assign_direct(&s2, &agent_id).await.unwrap_err();
        assert!(matches!(err, ChatEngineError::AgentAtCapacity { .. }));

        // The failed attempt did not leak a reservation
        assert_eq!(
            agents.get(&agent_id).await.unwrap().active_session_count(),
            1
        );
    }

    #[tokio::test]
    async fn cancel_removes_queued_entry() {
        let (sessions, _agents, coordinator) = coordinator();
        let s1 = escalated_session(&sessions, "s1").await;
        coordinator.request_assignment(&s1).await.unwrap();

        assert!(coordinator.cancel(&s1).await);
        assert!(!coordinator.cancel(&s1).await);
        assert_eq!(coordinator.queue_len().await, 0);
    }

    #[tokio::test]
    async fn requeue_keeps_original_place_in_line() {
        let (sessions, _agents, coordinator) = coordinator();
        let s1 = escalated_session(&sessions, "s1").await;
        let s2 = escalated_session(&sessions, "s2").await;
        coordinator.request_assignment(&s2).await.unwrap();

        // s1 escalated before s2 but re-enters the queue after it
        let earlier = Utc::now() - chrono::Duration::minutes(10);
        coordinator.enqueue(s1.clone(), earlier).await;

        let snapshot = coordinator.queued_snapshot().await;
        assert_eq!(snapshot[0].session_id, s1);
        assert_eq!(snapshot[1].session_id, s2);
    }

    #[tokio::test]
    async fn newcomer_cannot_jump_older_queued_sessions() {
        let (sessions, agents, coordinator) = coordinator();
        let s1 = escalated_session(&sessions, "s1").await;
        coordinator.request_assignment(&s1).await.unwrap();
        assert_eq!(coordinator.queue_len().await, 1);

        // An agent becomes eligible without an intervening drain; the next
        // request must hand the slot to the session at the head of the line.
        let agent_id = online_agent(&agents, "a1", 1, 9).await;
        let s2 = escalated_session(&sessions, "s2").await;
        let result = coordinator.request_assignment(&s2).await.unwrap();

        assert_eq!(result.outcome, AssignmentOutcome::Queued { position: 1 });
        assert_eq!(result.assignments.len(), 1);
        assert_eq!(result.assignments[0].session_id, s1);
        assert_eq!(result.assignments[0].agent_id, agent_id);

        let handle = sessions.get(&s1).await.unwrap();
        assert_eq!(
            handle.lock().await.assigned_agent,
            Some(AgentId::from("a1"))
        );
        let handle = sessions.get(&s2).await.unwrap();
        assert_eq!(handle.lock().await.assigned_agent, None);
    }

    #[tokio::test]
    async fn drain_drops_resolved_sessions() {
        let (sessions, agents, coordinator) = coordinator();
        let s1 = escalated_session(&sessions, "s1").await;
        let s2 = escalated_session(&sessions, "s2").await;
        coordinator.request_assignment(&s1).await.unwrap();
        coordinator.request_assignment(&s2).await.unwrap();

        // s1 resolves while still queued
        let handle = sessions.get(&s1).await.unwrap();
        handle.lock().await.resolve(None).unwrap();

        let agent_id = online_agent(&agents, "a1", 1, 9).await;
        let completed = coordinator.drain().await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].session_id, s2);
        assert_eq!(completed[0].agent_id, agent_id);
    }
}
