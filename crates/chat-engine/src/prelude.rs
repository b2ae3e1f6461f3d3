//! Convenience re-exports for embedding applications.

pub use crate::agent::{Agent, AgentId, Availability, Presence};
pub use crate::api::{AdminApi, SupervisorApi};
pub use crate::assignment::{AssignmentOutcome, QueuedEscalation};
pub use crate::config::EngineConfig;
pub use crate::error::{ChatEngineError, Result};
pub use crate::events::{EngineEvent, Topic};
pub use crate::gateway::{GatewayError, GatewayReply, IntentResponder, ResponderGateway};
pub use crate::orchestrator::{AgentAnalytics, ChatEngine, EngineStats};
pub use crate::policy::{EscalationPolicy, RoutingDecision};
pub use crate::presence::{PresenceInterval, PresenceTracker};
pub use crate::session::{
    EscalationReason, EscalationRecord, EscalationStatus, Message, MessageType, Sender, Session,
    SessionId, SessionStatus,
};
pub use crate::storage::{CustomerFeedback, InMemoryRepository, Repository};
pub use crate::server::{SupportServer, SupportServerBuilder};
