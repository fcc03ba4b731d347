//! Core type definitions for Game Night.
//!
//! This crate defines the plain data shared by the sync engine and the app:
//! - Identifiers for players, activities, events and surrogate row keys
//! - One record struct per backend table, plus the projected shapes used by
//!   the vote and RSVP rosters
//! - The [`Record`] descriptor trait that ties a row type to its table
//! - Filters, row-set filter sets and subscription scopes
//!
//! Nothing in here performs I/O.

mod filter;
mod ids;
mod record;
mod records;

pub use filter::{Filter, FilterOp, RowFilters, SubscriptionScope};
pub use ids::{ActivityId, EventId, PlayerId, RowId};
pub use record::{Record, RecordKey, record_id};
pub use records::{
    Activity, GameEvent, Platform, Player, PlayerActivityMetadata, PlayerName, Rsvp,
    RsvpWithPlayer, Vote, VoteWithPlayer,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid id: {0}")]
    InvalidId(#[from] std::num::ParseIntError),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}
