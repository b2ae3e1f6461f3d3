//! # Chatline Engine
//!
//! Session and escalation engine for customer-support chat: an automated
//! responder answers what it can, and everything else is routed to human
//! agents through a FIFO escalation queue.
//!
//! The engine owns four pieces of coordinated state:
//!
//! - **Sessions**: each customer conversation moves through
//!   `open -> in_progress -> escalated -> resolved`, carrying an
//!   append-only transcript.
//! - **Routing**: every customer turn is answered by the responder gateway
//!   and then judged by the escalation policy (keyword triggers, explicit
//!   requests for a human, low confidence). Gateway failures escalate, they
//!   never surface to the customer.
//! - **Agents**: presence, availability, a hard cap on concurrent
//!   sessions, and working-minutes accounting from presence intervals.
//! - **Assignment**: escalated sessions wait in a single FIFO queue and are
//!   matched to the least-loaded eligible agent; sessions released by an
//!   agent going offline keep their original place in line.
//!
//! Every state change is announced on per-topic event streams
//! (`session:{id}`, `agent:{id}`, `admin:global`) in the order it was
//! applied.
//!
//! ## Quick start
//!
//! ```no_run
//! use chatline_engine::prelude::*;
//!
//! # async fn run() -> chatline_engine::Result<()> {
//! let engine = std::sync::Arc::new(ChatEngine::with_defaults(EngineConfig::default()));
//!
//! engine
//!     .register_agent(AgentId::from("alice"), "Alice", vec!["billing".into()])
//!     .await?;
//! engine.agent_online(&AgentId::from("alice")).await?;
//!
//! let session_id = engine.create_session().await?;
//! let reply = engine
//!     .handle_customer_message(&session_id, "I want a refund")
//!     .await?;
//! // Keyword trigger: the reply is the handoff notice and the session is
//! // now assigned to Alice.
//! assert!(reply.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! For a long-running deployment, wrap the engine in a
//! [`server::SupportServer`] to get the periodic queue drain, the
//! stale-presence sweep, and the idle-session sweep.

pub mod agent;
pub mod api;
pub mod assignment;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod orchestrator;
pub mod policy;
pub mod prelude;
pub mod presence;
pub mod server;
pub mod session;
pub mod storage;

pub use error::{ChatEngineError, Result};
pub use orchestrator::ChatEngine;
pub use server::{SupportServer, SupportServerBuilder};
