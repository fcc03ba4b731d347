//! Live row synchronization for Game Night.
//!
//! Keeps local views of backend tables current: fetch once, then apply the
//! platform's row change notifications.
//!
//! # Architecture
//!
//! - **Client**: [`RemoteDataClient`] and [`AuthClient`] abstract the hosted
//!   platform. [`memory::MemoryClient`] runs everything in-process;
//!   [`supabase::SupabaseClient`] talks to a real project.
//! - **Cache**: [`RowCache`] holds an ordered, id-unique collection of rows
//!   and applies insert/update/delete events idempotently.
//! - **Watchers**: [`LiveRow`] follows one row by key, [`LiveRows`] a filtered
//!   set, [`SessionWatcher`] the signed-in user. Each publishes its state
//!   through a `tokio::sync::watch` channel.
//!
//! ## Watcher lifecycle
//!
//! 1. **Scope**: the caller sets a key or filter set
//! 2. **Subscribe**: a change channel is opened for the scope
//! 3. **Fetch**: the initial rows are loaded and published
//! 4. **Follow**: queued and later change events are applied on top
//! 5. **Release**: rescoping or dropping the watcher closes the channel
//!    before any new one is opened
//!
//! # Example
//!
//! ```no_run
//! use gamenight_sync::{LiveRows, memory::MemoryClient};
//! use gamenight_types::{RowFilters, Vote};
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let client = Arc::new(MemoryClient::new());
//! let votes = LiveRows::<Vote>::with_filters(client, RowFilters::scoped_eq("event_id", 3));
//! let state = votes.settled().await;
//! println!("{} votes", state.rows().len());
//! # }
//! ```

mod cache;
mod client;
mod error;
mod live_row;
mod live_rows;
pub mod memory;
mod scope;
mod session;
pub mod supabase;

pub use cache::{RowCache, apply_single};
pub use client::{
    AuthClient, AuthEvent, AuthStateChange, AuthStateListener, ChangeEvent, ChangeKind, Identity,
    RemoteDataClient, SelectQuery, Subscription, fetch_one, fetch_rows,
};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use live_row::{LiveRow, RowState};
pub use live_rows::{LiveRows, RowsState};
pub use session::{SessionState, SessionWatcher};
