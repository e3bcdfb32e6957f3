//! Core domain entities
//!
//! The persisted documents of the ticket system: tickets, per-actor user
//! profiles, and guild-scoped settings. Entities are plain data; state
//! transitions live in [`crate::flows`].

pub mod builders;
mod settings;
mod ticket;
mod user;

pub use builders::TicketBuilder;
pub use settings::{AutoExpireEntry, GuildSettings};
pub use ticket::{Ticket, TicketId};
pub use user::UserProfile;
