//! Agent presence tracking and working-hours accrual
//!
//! One open [`PresenceInterval`] per agent at a time. Opening while already
//! open is a no-op (client reconnects re-deliver the event), closing while
//! closed likewise. An interval that spans midnight is not truncated: it is
//! recorded as one interval and its minutes are attributed to the calendar
//! day it started.
//!
//! A housekeeping sweep force-closes intervals whose agent has not sent a
//! heartbeat within the configured timeout. The interval ends at the
//! last-seen timestamp, not sweep time, so a dead connection does not
//! inflate hours.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::agent::AgentId;

/// One contiguous online span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceInterval {
    pub id: String,
    pub agent_id: AgentId,
    /// Calendar day (YYYY-MM-DD, UTC) the interval started; minutes are
    /// attributed here even when the interval crosses midnight.
    pub day: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
}

/// Result of an open attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened,
    /// An interval was already open; the existing one continues uninterrupted.
    AlreadyOpen,
}

#[derive(Debug)]
struct OpenInterval {
    id: String,
    start_time: DateTime<Utc>,
    last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct TrackerState {
    open: HashMap<AgentId, OpenInterval>,
    /// Accrued minutes per (agent, start day), closed intervals only.
    day_minutes: HashMap<(AgentId, String), i64>,
}

/// Tracks presence intervals for all agents.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    state: Mutex<TrackerState>,
}

fn day_key(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Open an interval at `now`. Idempotent: a second open while one is
    /// already running resumes the existing interval.
    pub async fn open_interval(&self, agent_id: &AgentId, now: DateTime<Utc>) -> OpenOutcome {
        let mut state = self.state.lock().await;
        if state.open.contains_key(agent_id) {
            tracing::debug!("Agent {} already has an open presence interval", agent_id);
            return OpenOutcome::AlreadyOpen;
        }
        state.open.insert(
            agent_id.clone(),
            OpenInterval {
                id: Uuid::new_v4().to_string(),
                start_time: now,
                last_heartbeat: now,
            },
        );
        tracing::debug!("Opened presence interval for agent {}", agent_id);
        OpenOutcome::Opened
    }

    /// Record a client heartbeat. Unknown or offline agents are ignored.
    pub async fn heartbeat(&self, agent_id: &AgentId, now: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if let Some(open) = state.open.get_mut(agent_id) {
            open.last_heartbeat = now;
        }
    }

    /// Close the open interval at `now` and return it with its accrued
    /// minutes. Closing while closed is a no-op (`None`).
    pub async fn close_interval(
        &self,
        agent_id: &AgentId,
        now: DateTime<Utc>,
    ) -> Option<PresenceInterval> {
        let mut state = self.state.lock().await;
        let open = state.open.remove(agent_id)?;
        Some(Self::finish(&mut state, agent_id, open, now))
    }

    /// Force-close intervals whose last heartbeat is older than `timeout`,
    /// ending them at the last-seen timestamp. Returns the closed intervals.
    pub async fn sweep_stale(
        &self,
        timeout: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Vec<PresenceInterval> {
        let timeout = ChronoDuration::from_std(timeout).unwrap_or(ChronoDuration::MAX);
        let mut state = self.state.lock().await;

        let stale: Vec<AgentId> = state
            .open
            .iter()
            .filter(|(_, open)| now - open.last_heartbeat > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        let mut closed = Vec::with_capacity(stale.len());
        for agent_id in stale {
            if let Some(open) = state.open.remove(&agent_id) {
                let last_seen = open.last_heartbeat;
                tracing::warn!(
                    "Force-closing stale presence interval for agent {} at last heartbeat {}",
                    agent_id,
                    last_seen
                );
                closed.push(Self::finish(&mut state, &agent_id, open, last_seen));
            }
        }
        closed
    }

    /// Whether the agent currently has an open interval.
    pub async fn is_open(&self, agent_id: &AgentId) -> bool {
        self.state.lock().await.open.contains_key(agent_id)
    }

    /// Accrued minutes from closed intervals attributed to `day`.
    pub async fn minutes_on_day(&self, agent_id: &AgentId, day: &str) -> i64 {
        let state = self.state.lock().await;
        state
            .day_minutes
            .get(&(agent_id.clone(), day.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Accrued minutes over an inclusive day range (`YYYY-MM-DD` keys order
    /// lexicographically).
    pub async fn minutes_in_range(&self, agent_id: &AgentId, from: &str, to: &str) -> i64 {
        let state = self.state.lock().await;
        state
            .day_minutes
            .iter()
            .filter(|((id, day), _)| id == agent_id && day.as_str() >= from && day.as_str() <= to)
            .map(|(_, minutes)| minutes)
            .sum()
    }

    /// Accrued minutes attributed to today (UTC).
    pub async fn minutes_today(&self, agent_id: &AgentId) -> i64 {
        self.minutes_on_day(agent_id, &day_key(Utc::now())).await
    }

    fn finish(
        state: &mut TrackerState,
        agent_id: &AgentId,
        open: OpenInterval,
        end: DateTime<Utc>,
    ) -> PresenceInterval {
        let duration = (end - open.start_time).num_minutes().max(0);
        let day = day_key(open.start_time);
        *state
            .day_minutes
            .entry((agent_id.clone(), day.clone()))
            .or_insert(0) += duration;

        tracing::debug!(
            "Closed presence interval for agent {}: {} minutes on {}",
            agent_id,
            duration,
            day
        );

        PresenceInterval {
            id: open.id,
            agent_id: agent_id.clone(),
            day,
            start_time: open.start_time,
            end_time: Some(end),
            duration_minutes: Some(duration),
        }
    }
}
