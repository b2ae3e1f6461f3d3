//! Responder gateway
//!
//! Wraps the external text-generation backend behind the [`ResponderGateway`]
//! trait. A call returns a candidate reply with a confidence score and a
//! classified intent, or a typed [`GatewayError`]. Failure is a first-class
//! outcome: the engine converts it into an escalation decision and never
//! surfaces it to the customer.
//!
//! Calls are bounded by a caller-specified timeout; a timed-out call is
//! folded into [`GatewayError::Timeout`]. The gateway is never invoked while
//! a session lock is held.

mod intent;

pub use intent::{IntentResponder, INTENT_HUMAN_AGENT};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{Message, SessionId};

/// A candidate automated reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayReply {
    pub text: String,
    /// Adequacy estimate in [0, 1].
    pub confidence: f32,
    pub intent: Option<String>,
}

/// Ways the text-generation backend can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway call timed out")]
    Timeout,

    #[error("gateway quota exhausted")]
    QuotaExhausted,

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// External text-generation collaborator.
#[async_trait]
pub trait ResponderGateway: Send + Sync {
    /// Produce a candidate reply for the latest customer turn, given the
    /// trailing conversation context.
    async fn generate(
        &self,
        session_id: &SessionId,
        context: &[Message],
    ) -> Result<GatewayReply, GatewayError>;
}

/// Call the gateway with an upper bound on wall time. Timeouts become
/// [`GatewayError::Timeout`] so the policy can treat them as zero-confidence
/// failures.
pub async fn generate_bounded(
    gateway: &dyn ResponderGateway,
    session_id: &SessionId,
    context: &[Message],
    timeout: Duration,
) -> Result<GatewayReply, GatewayError> {
    match tokio::time::timeout(timeout, gateway.generate(session_id, context)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("Gateway call for session {} timed out", session_id);
            Err(GatewayError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowGateway;

    #[async_trait]
    impl ResponderGateway for SlowGateway {
        async fn generate(
            &self,
            _session_id: &SessionId,
            _context: &[Message],
        ) -> Result<GatewayReply, GatewayError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            unreachable!("test gateway never completes")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_gateway_times_out() {
        let session_id = SessionId::new();
        let result = generate_bounded(
            &SlowGateway,
            &session_id,
            &[],
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(result.unwrap_err(), GatewayError::Timeout);
    }
}
