//! # Game Night
//!
//! Client state for a group's recurring game night: who is signed in, their
//! player profile, the event schedule, the activity roster, and tonight's
//! votes and RSVPs, all kept live against the data platform.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   watch<Arc<ViewState>>   ┌───────────┐
//! │  GameNight   │ ─────────────────────────▶│  CLI / UI │
//! │ (watchers)   │                           └─────┬─────┘
//! └──────┬───────┘                                 │ Actions
//!        │ select / subscribe                      ▼
//!        └──────────────▶ RemoteDataClient ◀── insert / delete / upsert
//! ```
//!
//! Writes never touch the view directly. They go to the platform and come
//! back through the change stream.

pub mod actions;
pub mod active_event;
pub mod config;
pub mod demo;
pub mod report;
pub mod runtime;
pub mod view;

pub use actions::{ActionOutcome, Actions, Notification, NotificationLevel, ProfileUpdate};
pub use active_event::{ActiveEventRule, is_active, next_event, select_active_event};
pub use config::{AppConfig, ConfigError, SignInSettings};
pub use runtime::{Clock, GameNight, RuntimeOptions, SystemClock};
pub use view::{Loadable, Screen, ViewState, VoteCount};
