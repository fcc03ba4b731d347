//! Seeded in-memory backend for `--demo`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use gamenight_sync::Identity;
use gamenight_sync::memory::MemoryClient;
use gamenight_types::PlayerId;
use serde_json::json;

/// Id of the demo user, signed in from the start.
pub const DEMO_PLAYER: &str = "6f0c1e2a-6b7d-4c1e-9a51-6e6b9d6c0001";
const FRIEND: &str = "6f0c1e2a-6b7d-4c1e-9a51-6e6b9d6c0002";
const NEWCOMER: &str = "6f0c1e2a-6b7d-4c1e-9a51-6e6b9d6c0003";

/// Access token accepted by the demo backend.
pub const DEMO_TOKEN: &str = "demo-access-token";

pub fn demo_identity() -> Identity {
    Identity {
        id: demo_player_id(),
        email: Some("demo@example.com".to_string()),
        full_name: Some("Demo Player".to_string()),
        avatar_url: None,
    }
}

fn demo_player_id() -> PlayerId {
    DEMO_PLAYER.parse().unwrap_or_default()
}

/// A backend with a game night at 18:00 on `today`, one the week after,
/// a small activity roster and a friend who already RSVPed and voted.
pub fn seeded_client<Tz: TimeZone>(today: &DateTime<Tz>) -> MemoryClient {
    let tonight = today
        .date_naive()
        .and_hms_opt(18, 0, 0)
        .and_then(|at| today.timezone().from_local_datetime(&at).earliest())
        .map(|at| at.with_timezone(&Utc))
        .unwrap_or_else(|| today.with_timezone(&Utc));
    let next_week = tonight + Duration::days(7);

    let client = MemoryClient::new()
        .with_game_night_schema()
        .with_account(DEMO_TOKEN, demo_identity());
    client.seed(
        "players",
        [
            json!({"id": DEMO_PLAYER, "name": "Demo Player", "platforms": ["windows"], "is_verified": true}),
            json!({"id": FRIEND, "name": "Riley", "platforms": ["mac", "windows"], "is_verified": true}),
            json!({"id": NEWCOMER, "name": null}),
        ],
    );
    client.seed(
        "events",
        [
            json!({"id": 1, "start_at": tonight}),
            json!({"id": 2, "start_at": next_week}),
        ],
    );
    client.seed(
        "activities",
        [
            json!({"id": 1, "name": "Lethal Company", "type": "game", "price": 9.99, "min_players": 1, "max_players": 4}),
            json!({"id": 2, "name": "Jackbox Party Pack", "type": "game", "platforms": ["windows", "mac", "mobile"], "min_players": 3}),
            json!({"id": 3, "name": "Movie Night", "type": "watch", "min_players": 2}),
        ],
    );
    client.seed("rsvps", [json!({"id": 1, "event_id": 1, "player_id": FRIEND})]);
    client.seed(
        "votes",
        [json!({"id": 1, "event_id": 1, "activity_id": 2, "player_id": FRIEND})],
    );
    client.sign_in_as(demo_identity());
    client
}
