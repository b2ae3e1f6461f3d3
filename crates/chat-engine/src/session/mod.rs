//! Session lifecycle and state machine
//!
//! A [`Session`] is one customer conversation. It moves through
//! `open → in_progress → escalated → resolved`, where `resolved` is terminal.
//! Every transition is guarded; an invalid transition fails loudly with
//! [`crate::error::ChatEngineError::InvalidTransition`] and applies no
//! mutation.
//!
//! All transitions for a given session are serialized: the
//! [`SessionRegistry`] hands out each session behind its own async mutex, so
//! two events for the same session are processed one after another, never
//! interleaved.

mod registry;
mod session;
mod types;

pub use registry::SessionRegistry;
pub use session::Session;
pub use types::{
    EscalationId, EscalationReason, EscalationRecord, EscalationStatus, Message, MessageId,
    MessageType, Sender, SessionId, SessionStatus,
};
