//! Session lifecycle and message handling.

use chrono::{DateTime, Utc};

use crate::assignment::AssignmentOutcome;
use crate::error::{ChatEngineError, Result};
use crate::events::EngineEvent;
use crate::gateway::{self, GatewayReply};
use crate::policy::RoutingDecision;
use crate::session::{
    EscalationReason, EscalationRecord, Message, Sender, Session, SessionId, SessionStatus,
};
use crate::storage::CustomerFeedback;

use super::core::ChatEngine;

impl ChatEngine {
    /// Open a new session.
    pub async fn create_session(&self) -> Result<SessionId> {
        let session = Session::new(SessionId::new());
        let session_id = session.id.clone();
        let created_at = session.created_at;

        self.persist_session(&session).await?;
        self.sessions.insert(session).await;
        self.events.publish_session(
            &session_id,
            EngineEvent::SessionCreated {
                session_id: session_id.clone(),
                created_at,
            },
        );
        tracing::info!("Created session {}", session_id);
        Ok(session_id)
    }

    /// Process one customer turn.
    ///
    /// Returns the automated reply delivered to the customer, if any:
    /// the responder's answer, or the handoff notice when the turn
    /// triggered an escalation. `None` means a human owns the
    /// conversation (or the session is resolved) and no automated reply
    /// was produced.
    pub async fn handle_customer_message(
        &self,
        session_id: &SessionId,
        text: &str,
    ) -> Result<Option<Message>> {
        let handle = self.sessions.get(session_id).await?;

        // Append the turn and decide whether the responder is still in the
        // loop, all under the session lock.
        let (routed_to_human, context, prior_escalations) = {
            let mut session = handle.lock().await;
            let message = session
                .append_message(Message::customer(session_id.clone(), text))
                .clone();
            self.repository.append_message(&message).await?;
            self.events.publish_session(
                session_id,
                EngineEvent::MessageAppended {
                    session_id: session_id.clone(),
                    message,
                },
            );

            let routed = matches!(
                session.status,
                SessionStatus::Escalated | SessionStatus::Resolved
            );
            let window = session
                .gateway_window(self.config.gateway.context_window)
                .to_vec();
            let snapshot = session.clone();
            drop(session);
            self.persist_session(&snapshot).await?;
            (routed, window, snapshot.escalation_count)
        };

        // Escalated sessions route straight to the human; resolved sessions
        // log the turn without interpreting it.
        if routed_to_human {
            return Ok(None);
        }

        // Gateway call happens with no lock held. Failure is folded into a
        // zero-confidence candidate so the policy escalates it.
        let reply = gateway::generate_bounded(
            self.gateway.as_ref(),
            session_id,
            &context,
            self.config.gateway.call_timeout,
        )
        .await;
        let (candidate, confidence, intent) = match reply {
            Ok(reply) => {
                let confidence = reply.confidence;
                let intent = reply.intent.clone();
                (Some(reply), confidence, intent)
            }
            Err(e) => {
                tracing::warn!("Gateway failure for session {}: {}", session_id, e);
                (None, 0.0, None)
            }
        };

        let decision = self
            .policy
            .decide(confidence, intent.as_deref(), text, prior_escalations);

        match decision {
            RoutingDecision::AnswerWithAi => {
                // The policy never answers on a failed gateway call.
                let reply = candidate
                    .ok_or_else(|| ChatEngineError::internal("answer decision without reply"))?;
                self.deliver_reply(session_id, reply).await.map(Some)
            }
            RoutingDecision::Escalate(reason) => {
                self.escalate(session_id, reason, confidence, intent).await
            }
        }
    }

    /// Append the responder's answer, persist, announce.
    async fn deliver_reply(
        &self,
        session_id: &SessionId,
        reply: GatewayReply,
    ) -> Result<Message> {
        let handle = self.sessions.get(session_id).await?;
        let mut session = handle.lock().await;
        let message = session
            .append_message(Message::responder(
                session_id.clone(),
                reply.text,
                reply.confidence,
                reply.intent,
            ))
            .clone();
        self.repository.append_message(&message).await?;
        self.events.publish_session(
            session_id,
            EngineEvent::MessageAppended {
                session_id: session_id.clone(),
                message: message.clone(),
            },
        );
        let snapshot = session.clone();
        drop(session);
        self.persist_session(&snapshot).await?;
        Ok(message)
    }

    /// Transition to `escalated`, write the audit record and the handoff
    /// notice, then hand the session to the assignment coordinator.
    async fn escalate(
        &self,
        session_id: &SessionId,
        reason: EscalationReason,
        confidence: f32,
        intent: Option<String>,
    ) -> Result<Option<Message>> {
        let handle = self.sessions.get(session_id).await?;
        let notice = {
            let mut session = handle.lock().await;
            // The session may have moved on while the gateway call was in
            // flight; a concurrent resolve wins and the turn stays logged.
            if session.status == SessionStatus::Resolved {
                return Ok(None);
            }
            if session.status != SessionStatus::Escalated {
                session.mark_escalated()?;
            }
            session.flag_escalation_trigger();

            let notice = session
                .append_message(Message::escalation_notice(
                    session_id.clone(),
                    intent.clone(),
                ))
                .clone();
            self.repository.append_message(&notice).await?;

            let record = EscalationRecord::new(session_id.clone(), reason, confidence);
            self.repository.append_escalation(&record).await?;

            self.events.publish_session(
                session_id,
                EngineEvent::SessionEscalated {
                    session_id: session_id.clone(),
                    reason,
                    confidence,
                },
            );
            self.events.publish_session(
                session_id,
                EngineEvent::MessageAppended {
                    session_id: session_id.clone(),
                    message: notice.clone(),
                },
            );

            let snapshot = session.clone();
            drop(session);
            self.persist_session(&snapshot).await?;
            notice
        };

        tracing::info!(
            "Session {} escalated ({}) at confidence {:.2}",
            session_id,
            reason,
            confidence
        );

        // Session lock is released; safe to enter the coordinator. The
        // request drains head-first, so older queued sessions may be
        // assigned by it too.
        let result = match self.coordinator.request_assignment(session_id).await {
            Ok(result) => result,
            // A concurrent drain can win the race and assign this session
            // first; that pass already did the bookkeeping.
            Err(ChatEngineError::AlreadyAssigned { .. }) => return Ok(Some(notice)),
            Err(e) => return Err(e),
        };
        for assignment in &result.assignments {
            self.after_assignment(&assignment.session_id, &assignment.agent_id)
                .await?;
        }
        if let AssignmentOutcome::Queued { position } = result.outcome {
            self.events.publish_session(
                session_id,
                EngineEvent::EscalationQueued {
                    session_id: session_id.clone(),
                    position,
                },
            );
        }
        Ok(Some(notice))
    }

    /// A human agent replies on a session assigned to them.
    pub async fn agent_send_message(
        &self,
        agent_id: &crate::agent::AgentId,
        session_id: &SessionId,
        text: &str,
    ) -> Result<Message> {
        let handle = self.sessions.get(session_id).await?;
        let mut session = handle.lock().await;

        match &session.assigned_agent {
            Some(assigned) if assigned == agent_id => {}
            Some(assigned) => {
                return Err(ChatEngineError::NotAssignedToAgent {
                    session_id: session_id.clone(),
                    assigned: assigned.clone(),
                    requested: agent_id.clone(),
                })
            }
            None => {
                return Err(ChatEngineError::invalid_transition(
                    session_id,
                    session.status,
                    "agent message",
                ))
            }
        }

        let message = session
            .append_message(Message::agent(
                session_id.clone(),
                agent_id.clone(),
                text,
            ))
            .clone();
        self.repository.append_message(&message).await?;
        self.events.publish_session(
            session_id,
            EngineEvent::MessageAppended {
                session_id: session_id.clone(),
                message: message.clone(),
            },
        );
        let snapshot = session.clone();
        drop(session);
        self.persist_session(&snapshot).await?;
        Ok(message)
    }

    /// Resolve a session, optionally with a 1-5 satisfaction score. Frees
    /// the assigned agent's capacity and drains the queue into it.
    pub async fn resolve_session(
        &self,
        session_id: &SessionId,
        satisfaction_score: Option<u8>,
    ) -> Result<()> {
        let handle = self.sessions.get(session_id).await?;
        let released = {
            let mut session = handle.lock().await;
            let released = session.resolve(satisfaction_score)?;
            self.events.publish_session(
                session_id,
                EngineEvent::SessionResolved {
                    session_id: session_id.clone(),
                    status: session.status,
                    satisfaction_score,
                },
            );
            let snapshot = session.clone();
            drop(session);
            self.persist_session(&snapshot).await?;
            released
        };

        // Unassigned escalations may still be waiting in line.
        self.coordinator.cancel(session_id).await;
        self.mark_escalation_resolved(session_id).await?;

        if let Some(agent_id) = released {
            self.agents
                .with_agent_mut(&agent_id, |agent| {
                    agent.end_session(session_id);
                    Ok(())
                })
                .await?;
            self.persist_agent(&agent_id).await?;
            self.events.publish_agent(
                &agent_id,
                EngineEvent::AgentReleased {
                    session_id: session_id.clone(),
                    agent_id: agent_id.clone(),
                    requeued: false,
                },
            );
            // Freed capacity can take the next queued escalation.
            self.drain_queue().await?;
        }

        tracing::info!("Resolved session {}", session_id);
        Ok(())
    }

    /// Record customer feedback for a resolved session. The rating is
    /// attributed to the agent on the session's most recent escalation, when
    /// there was one, and folded into their running average.
    pub async fn submit_feedback(
        &self,
        session_id: &SessionId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<CustomerFeedback> {
        if !(1..=5).contains(&rating) {
            return Err(ChatEngineError::InvalidSatisfactionScore(rating));
        }
        if !self.sessions.contains(session_id).await {
            return Err(ChatEngineError::SessionNotFound(session_id.clone()));
        }

        let agent_id = self
            .repository
            .escalations_for_session(session_id)
            .await?
            .into_iter()
            .rev()
            .find_map(|r| r.assigned_agent);

        if let Some(agent_id) = &agent_id {
            self.agents
                .with_agent_mut(agent_id, |agent| {
                    agent.record_feedback(rating);
                    Ok(())
                })
                .await?;
            self.persist_agent(agent_id).await?;
        }

        let feedback =
            CustomerFeedback::new(session_id.clone(), agent_id.clone(), rating, comment);
        self.repository.append_feedback(&feedback).await?;
        self.events.publish_session(
            session_id,
            EngineEvent::FeedbackReceived {
                session_id: session_id.clone(),
                agent_id,
                rating,
            },
        );
        Ok(feedback)
    }

    /// The persisted transcript for a session, oldest first.
    pub async fn transcript(&self, session_id: &SessionId) -> Result<Vec<Message>> {
        if !self.sessions.contains(session_id).await {
            // Historical sessions survive in storage after a restart.
            let messages = self.repository.messages_for_session(session_id).await?;
            if messages.is_empty() {
                return Err(ChatEngineError::SessionNotFound(session_id.clone()));
            }
            return Ok(messages);
        }
        self.repository.messages_for_session(session_id).await
    }

    /// Resolve sessions idle past the configured timeout. Returns how many
    /// were closed.
    pub async fn sweep_idle_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let timeout = chrono::Duration::from_std(self.config.server.idle_session_timeout)
            .unwrap_or(chrono::Duration::MAX);
        let mut swept = 0;

        for handle in self.sessions.handles().await {
            let session_id = {
                let session = handle.lock().await;
                // A session that never received a message has no
                // conversation to resolve; resolve is not valid from `open`.
                if session.status == SessionStatus::Open
                    || session.is_resolved()
                    || now - session.last_activity_at <= timeout
                {
                    continue;
                }
                session.id.clone()
            };
            // Regular resolve path: releases the agent, cancels queue
            // entries, publishes the terminal event.
            match self.resolve_session(&session_id, None).await {
                Ok(()) => {
                    tracing::info!("Idle-resolved session {}", session_id);
                    swept += 1;
                }
                // A message arriving between the check and the resolve can
                // legitimately invalidate the transition.
                Err(e) => tracing::debug!("Idle sweep skipped session {}: {}", session_id, e),
            }
        }
        Ok(swept)
    }

    /// Count of messages a customer has sent on a session, used by
    /// embedding layers for rate limiting.
    pub async fn customer_turn_count(&self, session_id: &SessionId) -> Result<usize> {
        let handle = self.sessions.get(session_id).await?;
        let session = handle.lock().await;
        Ok(session
            .context
            .iter()
            .filter(|m| m.sender == Sender::Customer)
            .count())
    }
}
