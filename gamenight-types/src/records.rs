//! Row types for each backend table.

use crate::{ActivityId, EventId, PlayerId, Record, RowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Something the group can play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub thumbnail_urls: Vec<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub price_type: Option<String>,
    #[serde(default = "default_min_players")]
    pub min_players: i32,
    #[serde(default)]
    pub max_players: Option<i32>,
    #[serde(default)]
    pub recommended_players: Option<i32>,
    #[serde(default)]
    pub storage_required: Option<String>,
    #[serde(default)]
    pub discord_channel_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_min_players() -> i32 {
    1
}

impl Activity {
    /// True when the activity costs nothing.
    pub fn is_free(&self) -> bool {
        self.price.is_none_or(|p| p <= 0.0)
    }
}

impl Record for Activity {
    const TABLE: &'static str = "activities";
    type Id = ActivityId;

    fn id(&self) -> ActivityId {
        self.id
    }
}

/// A scheduled game night.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub id: EventId,
    pub start_at: DateTime<Utc>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for GameEvent {
    const TABLE: &'static str = "events";
    type Id = EventId;

    fn id(&self) -> EventId {
        self.id
    }
}

/// Platforms a player can play on. The column is free text, so values
/// outside the known set are kept as [`Platform::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Mac,
    Mobile,
    #[serde(untagged)]
    Other(String),
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Windows, Platform::Mac, Platform::Mobile];
}

/// A member's profile. Shares its id with the authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub steam_profile_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Player {
    const TABLE: &'static str = "players";
    type Id = PlayerId;

    fn id(&self) -> PlayerId {
        self.id
    }
}

/// A player's attendance for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rsvp {
    pub id: RowId,
    pub event_id: EventId,
    pub player_id: PlayerId,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Rsvp {
    const TABLE: &'static str = "rsvps";
    type Id = RowId;

    fn id(&self) -> RowId {
        self.id
    }
}

/// A player's vote for an activity at an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: RowId,
    pub event_id: EventId,
    pub activity_id: ActivityId,
    pub player_id: PlayerId,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Vote {
    const TABLE: &'static str = "votes";
    type Id = RowId;

    fn id(&self) -> RowId {
        self.id
    }
}

/// Per-player flags on an activity (favorite, already set up).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerActivityMetadata {
    pub id: RowId,
    pub player_id: PlayerId,
    pub activity_id: ActivityId,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_setup: Option<bool>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for PlayerActivityMetadata {
    const TABLE: &'static str = "player_activity_metadata";
    type Id = RowId;

    fn id(&self) -> RowId {
        self.id
    }
}

/// Joined display name of the player behind a vote or RSVP.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerName {
    #[serde(default)]
    pub name: Option<String>,
}

impl PlayerName {
    /// Name to show, falling back to a placeholder for unnamed players.
    pub fn display(&self) -> &str {
        self.name.as_deref().unwrap_or("Unnamed Player")
    }
}

/// The embedded player is `null` when the foreign key dangles.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A vote together with the voter's display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteWithPlayer {
    #[serde(flatten)]
    pub vote: Vote,
    #[serde(default, deserialize_with = "null_as_default")]
    pub players: PlayerName,
}

impl Record for VoteWithPlayer {
    const TABLE: &'static str = "votes";
    const PROJECTION: Option<&'static str> = Some("*,players(name)");
    type Id = RowId;

    fn id(&self) -> RowId {
        self.vote.id
    }
}

/// An RSVP together with the attendee's display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsvpWithPlayer {
    #[serde(flatten)]
    pub rsvp: Rsvp,
    #[serde(default, deserialize_with = "null_as_default")]
    pub players: PlayerName,
}

impl Record for RsvpWithPlayer {
    const TABLE: &'static str = "rsvps";
    const PROJECTION: Option<&'static str> = Some("*,players(name)");
    type Id = RowId;

    fn id(&self) -> RowId {
        self.rsvp.id
    }
}
