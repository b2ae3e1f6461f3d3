//! Escalation policy
//!
//! Pure decision function over the candidate reply's confidence, the
//! classified intent, and keyword signals in the customer's message. No
//! side effects and no gateway access, so it can be exercised with literal
//! inputs.
//!
//! Rules, first match wins:
//! 1. configured keyword present in the message -> escalate (keyword-trigger)
//! 2. intent is an explicit request for a human -> escalate (explicit-request)
//! 3. confidence below the threshold -> escalate (low-confidence); a failed
//!    or timed-out gateway call enters here as confidence 0.0
//! 4. otherwise -> answer with AI

use crate::config::PolicyConfig;
use crate::gateway::INTENT_HUMAN_AGENT;
use crate::session::EscalationReason;

/// Outcome of the routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Deliver the candidate reply to the customer.
    AnswerWithAi,
    /// Hand the session off to a human.
    Escalate(EscalationReason),
}

#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    confidence_threshold: f32,
    /// Stored lowercased; matching is case-insensitive substring.
    keywords: Vec<String>,
}

impl EscalationPolicy {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            keywords: config
                .escalation_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    /// Decide how to route one customer turn.
    ///
    /// `candidate_confidence` is the gateway's adequacy estimate, with a
    /// failed gateway call mapped to 0.0 by the caller.
    /// `prior_escalations` is the number of escalation records already
    /// created for the session; on the live path it is always 0 because an
    /// escalated session routes messages straight to its agent, but the
    /// parameter keeps the function usable for offline transcript replay.
    pub fn decide(
        &self,
        candidate_confidence: f32,
        intent: Option<&str>,
        message_text: &str,
        prior_escalations: u32,
    ) -> RoutingDecision {
        let _ = prior_escalations;

        let lower = message_text.to_lowercase();
        if self.keywords.iter().any(|k| lower.contains(k.as_str())) {
            return RoutingDecision::Escalate(EscalationReason::KeywordTrigger);
        }

        if intent == Some(INTENT_HUMAN_AGENT) {
            return RoutingDecision::Escalate(EscalationReason::ExplicitRequest);
        }

        if candidate_confidence < self.confidence_threshold {
            return RoutingDecision::Escalate(EscalationReason::LowConfidence);
        }

        RoutingDecision::AnswerWithAi
    }
}
