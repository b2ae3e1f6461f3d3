//! Engine event broadcasting
//!
//! Fan-out of engine facts to in-process subscribers over per-topic
//! broadcast channels. Delivery is at-most-once per subscription epoch:
//! a subscriber sees every event published to its topic after it
//! subscribed, in publication order, and nothing from before. There is
//! no replay; the persistent transcript is the source of history.
//!
//! Publishing never awaits, so it is safe to publish while a session
//! lock is held. That is what makes per-topic ordering match transition
//! order: the event is emitted before the lock that serialized the
//! transition is dropped.

use std::fmt;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::agent::AgentId;
use crate::session::{EscalationReason, Message, SessionId, SessionStatus};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Addressable event streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    /// Everything that happens to one session.
    Session(SessionId),
    /// Assignment and presence changes for one agent.
    Agent(AgentId),
    /// Global feed for dashboards and supervision.
    AdminGlobal,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Session(id) => write!(f, "session:{}", id),
            Topic::Agent(id) => write!(f, "agent:{}", id),
            Topic::AdminGlobal => write!(f, "admin:global"),
        }
    }
}

/// Facts the engine announces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    SessionCreated {
        session_id: SessionId,
        created_at: DateTime<Utc>,
    },
    MessageAppended {
        session_id: SessionId,
        message: Message,
    },
    SessionEscalated {
        session_id: SessionId,
        reason: EscalationReason,
        confidence: f32,
    },
    EscalationQueued {
        session_id: SessionId,
        position: usize,
    },
    AgentAssigned {
        session_id: SessionId,
        agent_id: AgentId,
    },
    AgentReleased {
        session_id: SessionId,
        agent_id: AgentId,
        requeued: bool,
    },
    SessionResolved {
        session_id: SessionId,
        status: SessionStatus,
        satisfaction_score: Option<u8>,
    },
    AgentPresenceChanged {
        agent_id: AgentId,
        online: bool,
    },
    FeedbackReceived {
        session_id: SessionId,
        agent_id: Option<AgentId>,
        rating: u8,
    },
}

/// Per-topic broadcast hub.
///
/// Channels are created lazily on first subscribe or publish and kept for
/// the life of the broadcaster. Slow subscribers lag rather than block the
/// publisher; a lagged receiver observes `RecvError::Lagged` and resumes
/// from the oldest retained event.
#[derive(Debug)]
pub struct EventBroadcaster {
    channels: DashMap<String, broadcast::Sender<EngineEvent>>,
    capacity: usize,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    fn sender(&self, topic: &Topic) -> broadcast::Sender<EngineEvent> {
        self.channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Subscribe to a topic. Only events published after this call are seen.
    pub fn subscribe(&self, topic: &Topic) -> broadcast::Receiver<EngineEvent> {
        self.sender(topic).subscribe()
    }

    /// Publish to one topic. Returns the number of live subscribers; zero
    /// subscribers is normal, the event is simply dropped.
    pub fn publish(&self, topic: &Topic, event: EngineEvent) -> usize {
        let sender = self.sender(topic);
        match sender.send(event) {
            Ok(n) => n,
            Err(_) => 0,
        }
    }

    /// Publish session-scoped events to the session topic and mirror them on
    /// the admin feed.
    pub fn publish_session(&self, session_id: &SessionId, event: EngineEvent) {
        self.publish(&Topic::Session(session_id.clone()), event.clone());
        self.publish(&Topic::AdminGlobal, event);
    }

    /// Publish agent-scoped events to the agent topic and mirror them on the
    /// admin feed.
    pub fn publish_agent(&self, agent_id: &AgentId, event: EngineEvent) {
        self.publish(&Topic::Agent(agent_id.clone()), event.clone());
        self.publish(&Topic::AdminGlobal, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_in_publication_order() {
        let broadcaster = EventBroadcaster::default();
        let session_id = SessionId::from("s1");
        let topic = Topic::Session(session_id.clone());
        let mut rx = broadcaster.subscribe(&topic);

        for i in 0..3 {
            broadcaster.publish(
                &topic,
                EngineEvent::EscalationQueued {
                    session_id: session_id.clone(),
                    position: i,
                },
            );
        }

        for expected in 0..3 {
            match rx.recv().await.unwrap() {
                EngineEvent::EscalationQueued { position, .. } => {
                    assert_eq!(position, expected)
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn no_replay_before_subscription() {
        let broadcaster = EventBroadcaster::default();
        let topic = Topic::AdminGlobal;

        broadcaster.publish(
            &topic,
            EngineEvent::SessionCreated {
                session_id: SessionId::from("early"),
                created_at: Utc::now(),
            },
        );

        let mut rx = broadcaster.subscribe(&topic);
        broadcaster.publish(
            &topic,
            EngineEvent::SessionCreated {
                session_id: SessionId::from("late"),
                created_at: Utc::now(),
            },
        );

        match rx.recv().await.unwrap() {
            EngineEvent::SessionCreated { session_id, .. } => {
                assert_eq!(session_id, SessionId::from("late"))
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let broadcaster = EventBroadcaster::default();
        let mut rx_a = broadcaster.subscribe(&Topic::Session(SessionId::from("a")));
        let mut rx_b = broadcaster.subscribe(&Topic::Session(SessionId::from("b")));

        broadcaster.publish(
            &Topic::Session(SessionId::from("a")),
            EngineEvent::SessionCreated {
                session_id: SessionId::from("a"),
                created_at: Utc::now(),
            },
        );

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn session_events_mirror_to_admin_feed() {
        let broadcaster = EventBroadcaster::default();
        let session_id = SessionId::from("s1");
        let mut admin = broadcaster.subscribe(&Topic::AdminGlobal);

        broadcaster.publish_session(
            &session_id,
            EngineEvent::SessionResolved {
                session_id: session_id.clone(),
                status: SessionStatus::Resolved,
                satisfaction_score: Some(5),
            },
        );

        assert!(matches!(
            admin.recv().await.unwrap(),
            EngineEvent::SessionResolved { .. }
        ));
    }
}
