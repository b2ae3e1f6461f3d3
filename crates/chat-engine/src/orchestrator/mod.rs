//! Engine orchestration
//!
//! [`ChatEngine`] ties the pieces together: the session and agent
//! registries, the presence tracker, the escalation policy, the responder
//! gateway, the assignment coordinator, persistence, and event
//! broadcasting. All public operations live here; the submodules split
//! them by concern:
//!
//! - `conversations`: session lifecycle and message handling
//! - `agents`: agent registration, presence, and assignment release
//!
//! Locking discipline: the responder gateway is never called while a
//! session lock is held, and no session lock is held when entering the
//! assignment coordinator.

mod agents;
mod conversations;
mod core;
mod types;

pub use self::core::ChatEngine;
pub use types::{AgentAnalytics, EngineStats};
