use gamenight_types::{
    Activity, ActivityId, EventId, GameEvent, Platform, Player, PlayerId, Record, RowId,
    RsvpWithPlayer, Vote, VoteWithPlayer, record_id,
};
use pretty_assertions::assert_eq;
use serde_json::json;

const PLAYER: &str = "5f0b4c5e-8d8a-4c3f-9f2a-1b2c3d4e5f60";

// ── Identifiers ─────────────────────────────────────────────────

#[test]
fn player_id_parse_and_display() {
    let id = PlayerId::parse(PLAYER).unwrap();
    assert_eq!(id.to_string(), PLAYER);
    assert_eq!(PLAYER.parse::<PlayerId>().unwrap(), id);
    assert!(PlayerId::parse("not-a-uuid").is_err());
}

#[test]
fn int_ids_are_transparent() {
    let id = EventId::new(42);
    assert_eq!(serde_json::to_value(id).unwrap(), json!(42));
    assert_eq!(serde_json::from_value::<EventId>(json!(42)).unwrap(), id);
    assert_eq!("42".parse::<EventId>().unwrap(), id);
    assert_eq!(ActivityId::from(3).get(), 3);
}

// ── Table descriptors ───────────────────────────────────────────

#[test]
fn table_names() {
    assert_eq!(Activity::TABLE, "activities");
    assert_eq!(GameEvent::TABLE, "events");
    assert_eq!(Player::TABLE, "players");
    assert_eq!(Vote::TABLE, "votes");
    assert_eq!(VoteWithPlayer::TABLE, "votes");
    assert_eq!(RsvpWithPlayer::TABLE, "rsvps");
}

#[test]
fn projections() {
    assert_eq!(Vote::select_columns(), "*");
    assert_eq!(Vote::PROJECTION, None);
    assert_eq!(VoteWithPlayer::select_columns(), "*,players(name)");
    assert_eq!(RsvpWithPlayer::PROJECTION, Some("*,players(name)"));
}

#[test]
fn id_filter_targets_primary_key() {
    let filter = Player::id_filter(&PlayerId::parse(PLAYER).unwrap());
    assert_eq!(filter.to_string(), format!("id=eq.{PLAYER}"));
}

#[test]
fn record_id_reads_raw_payload() {
    assert_eq!(record_id::<Vote>(&json!({"id": 7})), Some(RowId::new(7)));
    assert_eq!(record_id::<Vote>(&json!({"event_id": 7})), None);
    assert_eq!(record_id::<Vote>(&json!({"id": "seven"})), None);
}

// ── Row decoding ────────────────────────────────────────────────

#[test]
fn activity_decodes_with_defaults() {
    let activity: Activity = serde_json::from_value(json!({
        "id": 1,
        "name": "Lethal Company",
        "type": "video_game",
        "price": 9.99,
    }))
    .unwrap();
    assert_eq!(activity.kind, "video_game");
    assert_eq!(activity.min_players, 1);
    assert!(activity.tags.is_empty());
    assert!(!activity.is_free());
}

#[test]
fn activity_without_price_is_free() {
    let activity: Activity = serde_json::from_value(json!({
        "id": 2, "name": "Chess", "type": "board_game", "price": null
    }))
    .unwrap();
    assert!(activity.is_free());
}

#[test]
fn event_decodes_offsets() {
    let event: GameEvent = serde_json::from_value(json!({
        "id": 3,
        "start_at": "2026-10-19T18:00:00+00:00",
        "end_at": null,
    }))
    .unwrap();
    assert_eq!(event.id, EventId::new(3));
    assert!(event.end_at.is_none());
}

#[test]
fn player_platforms_are_lowercase() {
    let player: Player = serde_json::from_value(json!({
        "id": PLAYER,
        "name": "Frank",
        "platforms": ["windows", "mobile"],
    }))
    .unwrap();
    assert_eq!(player.platforms, vec![Platform::Windows, Platform::Mobile]);
    assert!(!player.is_verified);
}

#[test]
fn player_keeps_unlisted_platforms() {
    let player: Player = serde_json::from_value(json!({
        "id": PLAYER,
        "name": "Frank",
        "platforms": ["windows", "linux"],
    }))
    .unwrap();
    assert_eq!(
        player.platforms,
        vec![Platform::Windows, Platform::Other("linux".to_string())]
    );
    assert_eq!(
        serde_json::to_value(&player.platforms).unwrap(),
        json!(["windows", "linux"])
    );
}

#[test]
fn projected_vote_flattens_base_row() {
    let vote: VoteWithPlayer = serde_json::from_value(json!({
        "id": 9,
        "event_id": 3,
        "activity_id": 1,
        "player_id": PLAYER,
        "players": {"name": "Frank"},
    }))
    .unwrap();
    assert_eq!(vote.id(), RowId::new(9));
    assert_eq!(vote.vote.activity_id, ActivityId::new(1));
    assert_eq!(vote.players.display(), "Frank");
}

#[test]
fn projected_vote_without_name_uses_placeholder() {
    let vote: VoteWithPlayer = serde_json::from_value(json!({
        "id": 9, "event_id": 3, "activity_id": 1, "player_id": PLAYER,
        "players": {"name": null},
    }))
    .unwrap();
    assert_eq!(vote.players.display(), "Unnamed Player");
}

#[test]
fn projected_rsvp_with_dangling_player() {
    let rsvp: RsvpWithPlayer = serde_json::from_value(json!({
        "id": 4, "event_id": 3, "player_id": PLAYER,
        "players": null,
    }))
    .unwrap();
    assert_eq!(rsvp.id(), RowId::new(4));
    assert_eq!(rsvp.players.display(), "Unnamed Player");
}
