//! Snapshot types reported by the engine.

use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, Availability, Presence};

/// Point-in-time engine statistics, for dashboards and the monitor loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub total_sessions: usize,
    pub open_sessions: usize,
    pub in_progress_sessions: usize,
    pub escalated_sessions: usize,
    pub resolved_sessions: usize,
    /// Escalated sessions still waiting for an agent.
    pub queued_escalations: usize,
    pub total_agents: usize,
    /// Agents online, available, and with capacity headroom.
    pub eligible_agents: usize,
}

/// Per-agent performance view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAnalytics {
    pub agent_id: AgentId,
    pub display_name: String,
    pub presence: Presence,
    pub availability: Availability,
    pub active_sessions: usize,
    pub max_concurrent_sessions: usize,
    /// Lifetime accrued minutes from closed presence intervals.
    pub total_working_minutes: i64,
    /// Minutes attributed to today (UTC), closed intervals only.
    pub minutes_today: i64,
    pub avg_rating: f64,
    pub total_feedback: u32,
}
