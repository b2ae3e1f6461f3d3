//! Engine configuration
//!
//! Plain configuration structs with sensible defaults. Loading these from a
//! file or environment is the embedding application's concern; the engine
//! only consumes the assembled [`EngineConfig`].

use std::time::Duration;

/// Top-level configuration for the chat engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Escalation policy tuning
    pub policy: PolicyConfig,

    /// Responder gateway behavior
    pub gateway: GatewayConfig,

    /// Agent presence and working-hours accounting
    pub presence: PresenceConfig,

    /// Agent defaults
    pub agents: AgentConfig,

    /// Background task scheduling
    pub server: ServerConfig,
}

/// Tuning for the escalation decision.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Candidate replies below this confidence are escalated.
    pub confidence_threshold: f32,

    /// Case-insensitive substrings that force an escalation regardless of
    /// confidence.
    pub escalation_keywords: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            escalation_keywords: vec![
                "refund".to_string(),
                "complaint".to_string(),
                "cancel my account".to_string(),
                "speak to a manager".to_string(),
            ],
        }
    }
}

/// Responder gateway call behavior.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Upper bound on a single gateway call. A call that exceeds this is
    /// treated as a gateway failure, never surfaced to the customer.
    pub call_timeout: Duration,

    /// Maximum number of prior turns handed to the gateway as context.
    pub context_window: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            context_window: 20,
        }
    }
}

/// Presence tracking and stale-interval housekeeping.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// An open interval with no heartbeat for this long is considered stale
    /// and force-closed at the last-seen timestamp.
    pub heartbeat_timeout: Duration,

    /// How often the stale-interval sweep runs.
    pub sweep_interval: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Agent defaults applied at registration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Capacity assigned to agents registered without an explicit cap.
    pub default_max_concurrent_sessions: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_max_concurrent_sessions: 3,
        }
    }
}

/// Background task scheduling for [`crate::server::SupportServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How often the pending-escalation queue is drained, independent of the
    /// event-driven drains on agent availability changes.
    pub queue_drain_interval: Duration,

    /// Sessions with no activity for this long are resolved by the sweep.
    pub idle_session_timeout: Duration,

    /// How often the idle-session sweep runs.
    pub idle_sweep_interval: Duration,

    /// How often the monitor loop logs engine statistics.
    pub monitor_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            queue_drain_interval: Duration::from_millis(500),
            idle_session_timeout: Duration::from_secs(3600),
            idle_sweep_interval: Duration::from_secs(60),
            monitor_interval: Duration::from_secs(10),
        }
    }
}
