//! Agent registration, presence transitions, and assignment release.

use chrono::{DateTime, Utc};

use crate::agent::{Agent, AgentId, Availability, Presence};
use crate::error::{ChatEngineError, Result};
use crate::events::EngineEvent;
use crate::presence::{OpenOutcome, PresenceInterval};
use crate::session::SessionId;

use super::core::ChatEngine;
use super::types::AgentAnalytics;

impl ChatEngine {
    /// Register an agent with the default concurrency cap. Re-registering
    /// an existing id updates the profile and keeps live state.
    pub async fn register_agent(
        &self,
        agent_id: AgentId,
        display_name: impl Into<String>,
        skills: Vec<String>,
    ) -> Result<()> {
        let display_name = display_name.into();
        if self.agents.contains(&agent_id).await {
            self.agents
                .with_agent_mut(&agent_id, |agent| {
                    agent.display_name = display_name;
                    agent.skills = skills;
                    Ok(())
                })
                .await?;
        } else {
            let mut agent = Agent::new(
                agent_id.clone(),
                display_name,
                self.config.agents.default_max_concurrent_sessions,
            );
            agent.skills = skills;
            self.agents.insert(agent).await;
        }
        self.persist_agent(&agent_id).await?;
        Ok(())
    }

    /// Adjust one agent's concurrency cap. Lowering it below the current
    /// active count stops new assignments without dropping existing ones.
    pub async fn set_agent_capacity(&self, agent_id: &AgentId, cap: usize) -> Result<()> {
        self.agents
            .with_agent_mut(agent_id, |agent| {
                agent.max_concurrent_sessions = cap;
                Ok(())
            })
            .await?;
        self.persist_agent(agent_id).await?;
        // A raised cap is new headroom; queued sessions get first claim.
        self.drain_queue().await?;
        Ok(())
    }

    /// Bring an agent online and available, opening a working interval.
    /// Idempotent: a re-delivered online event counts as a heartbeat and
    /// keeps the existing interval, `online_since`, and availability (an
    /// agent who set themselves unavailable stays unavailable across a
    /// reconnect).
    pub async fn agent_online(&self, agent_id: &AgentId) -> Result<()> {
        let now = Utc::now();
        let was_offline = self
            .agents
            .with_agent_mut(agent_id, |agent| {
                let was_offline = agent.presence == Presence::Offline;
                agent.presence = Presence::Online;
                agent.last_heartbeat = Some(now);
                if was_offline {
                    agent.availability = Availability::Available;
                    agent.online_since = Some(now);
                }
                Ok(was_offline)
            })
            .await?;

        let outcome = self.presence.open_interval(agent_id, now).await;
        if was_offline || outcome == OpenOutcome::Opened {
            self.persist_agent(agent_id).await?;
            self.events.publish_agent(
                agent_id,
                EngineEvent::AgentPresenceChanged {
                    agent_id: agent_id.clone(),
                    online: true,
                },
            );
            tracing::info!("Agent {} online", agent_id);
        }

        // A newly eligible agent can take queued escalations immediately.
        self.drain_queue().await?;
        Ok(())
    }

    /// Take an agent offline: close the working interval, accrue its
    /// minutes, and requeue every session they held at its original place
    /// in line. Returns the requeued sessions. Idempotent.
    pub async fn agent_offline(&self, agent_id: &AgentId) -> Result<Vec<SessionId>> {
        let interval = self.presence.close_interval(agent_id, Utc::now()).await;
        self.finish_offline(agent_id, interval).await
    }

    /// Record a liveness heartbeat from the agent's client.
    pub async fn agent_heartbeat(&self, agent_id: &AgentId) -> Result<()> {
        if !self.agents.contains(agent_id).await {
            return Err(ChatEngineError::AgentNotFound(agent_id.clone()));
        }
        let now = Utc::now();
        self.presence.heartbeat(agent_id, now).await;
        self.agents
            .with_agent_mut(agent_id, |agent| {
                agent.last_heartbeat = Some(now);
                Ok(())
            })
            .await
    }

    /// Toggle willingness to take new sessions. Only meaningful while
    /// online; existing assignments are unaffected either way.
    pub async fn set_agent_availability(&self, agent_id: &AgentId, available: bool) -> Result<()> {
        self.agents
            .with_agent_mut(agent_id, |agent| {
                agent.availability = if available {
                    Availability::Available
                } else {
                    Availability::Unavailable
                };
                Ok(())
            })
            .await?;
        self.persist_agent(agent_id).await?;
        if available {
            self.drain_queue().await?;
        }
        Ok(())
    }

    /// An agent hands a session back without resolving it. The session
    /// returns to the queue at its original escalation time. Releasing a
    /// session that is no longer assigned is a no-op.
    pub async fn release_session(&self, agent_id: &AgentId, session_id: &SessionId) -> Result<()> {
        let handle = self.sessions.get(session_id).await?;
        let released = {
            let mut session = handle.lock().await;
            let released = session.release(agent_id)?;
            if released {
                self.events.publish_session(
                    session_id,
                    EngineEvent::AgentReleased {
                        session_id: session_id.clone(),
                        agent_id: agent_id.clone(),
                        requeued: true,
                    },
                );
            }
            let snapshot = session.clone();
            drop(session);
            self.persist_session(&snapshot).await?;
            released
        };
        if !released {
            return Ok(());
        }

        self.agents
            .with_agent_mut(agent_id, |agent| {
                agent.end_session(session_id);
                Ok(())
            })
            .await?;
        self.persist_agent(agent_id).await?;

        let queued_at = self.escalation_time(session_id).await;
        self.coordinator.enqueue(session_id.clone(), queued_at).await;
        tracing::info!(
            "Agent {} released session {} back to the queue",
            agent_id,
            session_id
        );
        self.drain_queue().await?;
        Ok(())
    }

    /// Force-close presence for agents whose heartbeat has gone stale,
    /// treating each as an offline transition. Returns how many agents were
    /// taken offline.
    pub async fn sweep_stale_presence(&self, now: DateTime<Utc>) -> Result<usize> {
        let closed = self
            .presence
            .sweep_stale(self.config.presence.heartbeat_timeout, now)
            .await;
        let n = closed.len();
        for interval in closed {
            let agent_id = interval.agent_id.clone();
            if let Err(e) = self.finish_offline(&agent_id, Some(interval)).await {
                tracing::warn!("Stale-presence sweep failed for agent {}: {}", agent_id, e);
            }
        }
        Ok(n)
    }

    /// Per-agent performance view for supervision.
    pub async fn agent_analytics(&self, agent_id: &AgentId) -> Result<AgentAnalytics> {
        let agent = self
            .agents
            .get(agent_id)
            .await
            .ok_or_else(|| ChatEngineError::AgentNotFound(agent_id.clone()))?;
        let minutes_today = self.presence.minutes_today(agent_id).await;

        Ok(AgentAnalytics {
            agent_id: agent.id,
            display_name: agent.display_name,
            presence: agent.presence,
            availability: agent.availability,
            active_sessions: agent.active_sessions.len(),
            max_concurrent_sessions: agent.max_concurrent_sessions,
            total_working_minutes: agent.total_working_minutes,
            minutes_today,
            avg_rating: agent.avg_rating,
            total_feedback: agent.total_feedback,
        })
    }

    pub async fn list_agents(&self) -> Vec<Agent> {
        self.agents.list().await
    }

    /// Accrued working minutes for one agent over an inclusive day range
    /// (`YYYY-MM-DD`).
    pub async fn working_minutes(&self, agent_id: &AgentId, from: &str, to: &str) -> Result<i64> {
        if !self.agents.contains(agent_id).await {
            return Err(ChatEngineError::AgentNotFound(agent_id.clone()));
        }
        Ok(self.presence.minutes_in_range(agent_id, from, to).await)
    }

    /// Shared tail of the offline paths: registry transition, minute
    /// accrual, persistence, and requeueing of held sessions.
    async fn finish_offline(
        &self,
        agent_id: &AgentId,
        interval: Option<PresenceInterval>,
    ) -> Result<Vec<SessionId>> {
        let released = {
            let mut agents = self.agents.write().await;
            let agent = agents
                .get_mut(agent_id)
                .ok_or_else(|| ChatEngineError::AgentNotFound(agent_id.clone()))?;
            if agent.presence == Presence::Offline && interval.is_none() {
                return Ok(Vec::new());
            }
            agent.presence = Presence::Offline;
            agent.availability = Availability::Unavailable;
            agent.online_since = None;
            if let Some(interval) = &interval {
                agent.total_working_minutes += interval.duration_minutes.unwrap_or(0);
            }
            std::mem::take(&mut agent.active_sessions)
        };

        if let Some(interval) = &interval {
            self.repository.append_interval(interval).await?;
        }
        self.persist_agent(agent_id).await?;
        self.events.publish_agent(
            agent_id,
            EngineEvent::AgentPresenceChanged {
                agent_id: agent_id.clone(),
                online: false,
            },
        );

        for session_id in &released {
            let Ok(handle) = self.sessions.get(session_id).await else {
                continue;
            };
            {
                let mut session = handle.lock().await;
                // The registry said this agent held the session, so a
                // wrong-agent error cannot occur here.
                let _ = session.release(agent_id);
                self.events.publish_session(
                    session_id,
                    EngineEvent::AgentReleased {
                        session_id: session_id.clone(),
                        agent_id: agent_id.clone(),
                        requeued: true,
                    },
                );
                let snapshot = session.clone();
                drop(session);
                self.persist_session(&snapshot).await?;
            }
            let queued_at = self.escalation_time(session_id).await;
            self.coordinator.enqueue(session_id.clone(), queued_at).await;
        }

        if !released.is_empty() {
            tracing::info!(
                "Agent {} offline; requeued {} session(s)",
                agent_id,
                released.len()
            );
            // Remaining agents may be able to absorb the requeued work.
            self.drain_queue().await?;
        } else {
            tracing::info!("Agent {} offline", agent_id);
        }
        Ok(released)
    }
}
