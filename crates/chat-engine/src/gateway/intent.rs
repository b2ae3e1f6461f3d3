//! Built-in pattern-table responder
//!
//! A small rule-based responder used when no external text-generation
//! backend is wired in (and by tests). Classifies the customer's message
//! against a fixed intent table and answers with a canned response. Exact
//! pattern matches score 0.9, word-overlap matches 0.7, and anything else
//! falls back to the `support` intent at 0.5.

use async_trait::async_trait;

use crate::gateway::{GatewayError, GatewayReply, ResponderGateway};
use crate::session::{Message, Sender, SessionId};

/// Intent name for an explicit request to talk to a human.
pub const INTENT_HUMAN_AGENT: &str = "human-agent";

struct IntentEntry {
    name: &'static str,
    patterns: &'static [&'static str],
    responses: &'static [&'static str],
}

const INTENTS: &[IntentEntry] = &[
    IntentEntry {
        name: "greeting",
        patterns: &["hi", "hello", "good morning", "good afternoon", "hey", "howdy"],
        responses: &[
            "Hello! How can I help you today?",
            "Hi there! What can I assist you with?",
        ],
    },
    IntentEntry {
        name: "goodbye",
        patterns: &["bye", "goodbye", "see you later", "thanks bye", "good night"],
        responses: &[
            "Goodbye! Have a great day!",
            "Thanks for chatting. Take care!",
        ],
    },
    IntentEntry {
        name: "support",
        patterns: &["help", "i need help", "can you help me", "support", "i have a problem"],
        responses: &[
            "I'm here to help! What seems to be the issue?",
            "Of course! Please describe your problem.",
        ],
    },
    IntentEntry {
        name: "billing",
        patterns: &["billing", "payment", "invoice", "charge", "bill", "cost", "price"],
        responses: &[
            "I can help with billing questions. Let me look into that for you.",
            "For billing inquiries, I'll need some details. What specific billing issue are you experiencing?",
        ],
    },
    IntentEntry {
        name: "technical",
        patterns: &["technical", "bug", "not working", "error", "broken"],
        responses: &[
            "I'll help you resolve this technical issue. Can you provide more details?",
            "Let me help you troubleshoot this. What exactly isn't working?",
        ],
    },
    IntentEntry {
        name: INTENT_HUMAN_AGENT,
        patterns: &["human", "agent", "person", "real person", "speak to someone", "talk to human"],
        responses: &[
            "I understand you'd like to speak with a human agent. Let me connect you with one of our specialists.",
        ],
    },
    IntentEntry {
        name: "thanks",
        patterns: &["thank you", "thanks", "appreciate it", "grateful"],
        responses: &[
            "You're welcome! Is there anything else I can help you with?",
            "Happy to help! Let me know if you need anything else.",
        ],
    },
];

/// Rule-based [`ResponderGateway`] implementation.
#[derive(Debug, Default)]
pub struct IntentResponder;

impl IntentResponder {
    pub fn new() -> Self {
        Self
    }

    /// Classify a message. Returns `(intent, confidence)`.
    pub fn classify(&self, text: &str) -> (&'static str, f32) {
        let lower = text.to_lowercase();

        // Whole-pattern substring match first
        for entry in INTENTS {
            if entry.patterns.iter().any(|p| lower.contains(p)) {
                return (entry.name, 0.9);
            }
        }

        // Then any shared word
        for entry in INTENTS {
            for pattern in entry.patterns {
                if pattern.split_whitespace().any(|word| {
                    lower.split_whitespace().any(|w| w == word)
                }) {
                    return (entry.name, 0.7);
                }
            }
        }

        ("support", 0.5)
    }

    fn response_for(&self, intent: &str, seed: usize) -> &'static str {
        INTENTS
            .iter()
            .find(|e| e.name == intent)
            .map(|e| e.responses[seed % e.responses.len()])
            .unwrap_or("I understand you're asking about that. Let me help you with more information.")
    }
}

#[async_trait]
impl ResponderGateway for IntentResponder {
    async fn generate(
        &self,
        _session_id: &SessionId,
        context: &[Message],
    ) -> Result<GatewayReply, GatewayError> {
        let last_customer = context
            .iter()
            .rev()
            .find(|m| m.sender == Sender::Customer)
            .map(|m| m.content.as_str())
            .unwrap_or("");

        let (intent, confidence) = self.classify(last_customer);
        // Stable per-conversation response selection instead of RNG
        let text = self.response_for(intent, context.len());

        Ok(GatewayReply {
            text: text.to_string(),
            confidence,
            intent: Some(intent.to_string()),
        })
    }
}
