//! ticket-desk - a support-ticket lifecycle engine for chat-platform
//! communities
//!
//! This crate implements the stateful core of a community support-ticket
//! workflow: static panel/action configuration with per-server overrides,
//! ticket state transitions (claim, escalate, close, switch-action,
//! auto-expire), and the bounded confirmation/collection dialogs that
//! drive them. The chat platform itself - channels, messages, permission
//! overwrites, transcripts - sits behind narrow traits implemented by the
//! embedding integration layer; command parsing and message rendering are
//! out of scope.

// Allow missing error documentation for internal implementations
#![allow(clippy::missing_errors_doc)]
// Allow some pedantic lints that don't improve code quality
#![allow(clippy::option_if_let_else)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::too_many_lines)]

//! # Concurrency
//!
//! Every lifecycle call is an independent asynchronous handler; there is no
//! per-ticket lock. Instead, every ticket save carries an
//! optimistic-concurrency version check, so two racing transitions on the
//! same ticket resolve to one winner and one visible `VersionConflict`.
//! Confirmation dialogs await exactly one matching inbound event over a
//! single subscription, so no two outcomes of the same prompt can both
//! execute.
//!
//! # Example
//!
//! ```rust,ignore
//! use ticket_desk::config::PanelSet;
//! use ticket_desk::storage::MemoryStorage;
//! use ticket_desk::TicketEngine;
//!
//! let engine = TicketEngine::builder()
//!     .panels(PanelSet::load("config/panels.yml")?)
//!     .storage(std::sync::Arc::new(MemoryStorage::new()))
//!     .platform(platform)
//!     .transcripts(transcripts)
//!     .build()?;
//!
//! // Re-arm persisted auto-expire timers and sweep the backlog
//! engine.reconcile_auto_expiry().await?;
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod flows;
pub mod logging;
pub mod platform;
pub mod storage;
pub mod test_utils;

// Re-export commonly used types
pub use error::{Result, TicketDeskError};
pub use flows::TicketEngine;
