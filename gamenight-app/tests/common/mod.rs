//! Shared fixtures for app tests.

#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use gamenight_app::{Clock, Loadable, ViewState};
use gamenight_sync::memory::MemoryClient;
use gamenight_sync::{Identity, SessionState};
use gamenight_types::{
    Activity, ActivityId, EventId, GameEvent, Player, PlayerId, PlayerName, RowId, Rsvp,
    RsvpWithPlayer, Vote, VoteWithPlayer,
};
use serde_json::json;
use std::sync::Mutex;

pub const ALICE: &str = "00000000-0000-0000-0000-00000000000a";
pub const BOB: &str = "00000000-0000-0000-0000-00000000000b";

pub fn player_id(raw: &str) -> PlayerId {
    PlayerId::parse(raw).unwrap()
}

pub fn identity(raw: &str, name: &str) -> Identity {
    Identity {
        id: player_id(raw),
        email: None,
        full_name: Some(name.to_string()),
        avatar_url: None,
    }
}

/// 2024-06-01 at `hour:minute` in UTC-5.
pub fn local(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    FixedOffset::west_opt(5 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 6, day, hour, minute, 0)
        .unwrap()
}

pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// Clock the test moves by hand.
pub struct ManualClock(Mutex<DateTime<FixedOffset>>);

impl ManualClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.0.lock().unwrap()
    }
}

pub fn game_event(id: i64, start: DateTime<FixedOffset>) -> GameEvent {
    GameEvent {
        id: EventId::new(id),
        start_at: start.with_timezone(&Utc),
        end_at: None,
        created_at: None,
    }
}

pub fn activity(id: i64, name: &str) -> Activity {
    serde_json::from_value(json!({"id": id, "name": name, "type": "game"})).unwrap()
}

pub fn player(raw: &str, name: &str) -> Player {
    serde_json::from_value(json!({"id": raw, "name": name})).unwrap()
}

pub fn vote(id: i64, event: i64, activity: i64, voter: &str, name: &str) -> VoteWithPlayer {
    VoteWithPlayer {
        vote: Vote {
            id: RowId::new(id),
            event_id: EventId::new(event),
            activity_id: ActivityId::new(activity),
            player_id: player_id(voter),
            created_at: None,
        },
        players: PlayerName {
            name: Some(name.to_string()),
        },
    }
}

pub fn rsvp(id: i64, event: i64, attendee: &str, name: &str) -> RsvpWithPlayer {
    RsvpWithPlayer {
        rsvp: Rsvp {
            id: RowId::new(id),
            event_id: EventId::new(event),
            player_id: player_id(attendee),
            created_at: None,
        },
        players: PlayerName {
            name: Some(name.to_string()),
        },
    }
}

/// Alice signed in with a profile, event 3 active, three activities, no
/// votes or RSVPs yet.
pub fn alice_view() -> ViewState {
    ViewState {
        session: SessionState {
            loading: false,
            user: Some(identity(ALICE, "Alice")),
        },
        player: Loadable::ready(Some(player(ALICE, "Alice"))),
        events: Loadable::ready(vec![game_event(3, local(1, 18, 0))]),
        active_event: Some(game_event(3, local(1, 18, 0))),
        activities: Loadable::ready(vec![
            activity(1, "Lethal Company"),
            activity(2, "Jackbox"),
            activity(3, "Movie Night"),
        ]),
        votes: Loadable::ready(Vec::new()),
        rsvps: Loadable::ready(Vec::new()),
    }
}

/// In-memory backend matching [`alice_view`].
pub fn backend() -> MemoryClient {
    let client = MemoryClient::new()
        .with_game_night_schema()
        .with_account("alice-token", identity(ALICE, "Alice"));
    client.seed(
        "players",
        [
            json!({"id": ALICE, "name": "Alice"}),
            json!({"id": BOB, "name": "Bob"}),
        ],
    );
    client.seed(
        "events",
        [json!({"id": 3, "start_at": local(1, 18, 0).with_timezone(&Utc)})],
    );
    client.seed(
        "activities",
        [
            json!({"id": 1, "name": "Lethal Company", "type": "game"}),
            json!({"id": 2, "name": "Jackbox", "type": "game"}),
            json!({"id": 3, "name": "Movie Night", "type": "watch"}),
        ],
    );
    client
}
