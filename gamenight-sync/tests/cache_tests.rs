use gamenight_sync::{ChangeEvent, RowCache, apply_single};
use gamenight_types::{ActivityId, EventId, PlayerId, RowId, Vote};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;

fn vote(id: i64, activity: i64) -> Vote {
    Vote {
        id: RowId::new(id),
        event_id: EventId::new(3),
        activity_id: ActivityId::new(activity),
        player_id: PlayerId::from_uuid(uuid_for(id)),
        created_at: None,
    }
}

fn uuid_for(n: i64) -> uuid::Uuid {
    uuid::Uuid::from_u128(n as u128)
}

fn ids(cache: &RowCache<Vote>) -> Vec<i64> {
    cache.rows().iter().map(|v| v.id.get()).collect()
}

// ── Fetch results ───────────────────────────────────────────────

#[test]
fn replace_all_keeps_server_order() {
    let mut cache = RowCache::new();
    cache.replace_all(vec![vote(3, 1), vote(1, 1), vote(2, 1)]);
    assert_eq!(ids(&cache), vec![3, 1, 2]);
}

#[test]
fn replace_all_drops_duplicate_ids() {
    let mut cache = RowCache::new();
    cache.replace_all(vec![vote(1, 1), vote(1, 2), vote(2, 1)]);
    assert_eq!(ids(&cache), vec![1, 2]);
    assert_eq!(cache.get(&RowId::new(1)).unwrap().activity_id, ActivityId::new(1));
}

#[test]
fn replace_all_discards_previous_rows() {
    let mut cache = RowCache::new();
    cache.replace_all(vec![vote(1, 1)]);
    cache.replace_all(vec![vote(2, 1)]);
    assert_eq!(ids(&cache), vec![2]);
}

// ── Change events ───────────────────────────────────────────────

#[test]
fn update_replaces_in_place() {
    let mut cache = RowCache::new();
    cache.replace_all(vec![vote(1, 1), vote(2, 1), vote(3, 1)]);
    assert!(cache.apply_update(vote(2, 9)));
    assert_eq!(ids(&cache), vec![1, 2, 3]);
    assert_eq!(cache.rows()[1].activity_id, ActivityId::new(9));
}

#[test]
fn update_of_absent_row_is_ignored() {
    let mut cache = RowCache::new();
    cache.replace_all(vec![vote(1, 1)]);
    assert!(!cache.apply_update(vote(5, 1)));
    assert_eq!(ids(&cache), vec![1]);
}

#[test]
fn insert_appends_once() {
    let mut cache = RowCache::new();
    assert!(cache.insert_if_absent(vote(7, 1)));
    assert!(!cache.insert_if_absent(vote(7, 2)));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.rows()[0].activity_id, ActivityId::new(1));
}

#[test]
fn delete_removes_matching_id() {
    let mut cache = RowCache::new();
    cache.replace_all(vec![vote(1, 1), vote(2, 1)]);
    assert!(cache.remove(&RowId::new(1)));
    assert_eq!(ids(&cache), vec![2]);
}

#[test]
fn delete_of_absent_row_is_noop() {
    let mut cache = RowCache::new();
    cache.replace_all(vec![vote(1, 1)]);
    assert!(!cache.remove(&RowId::new(99)));
    assert_eq!(ids(&cache), vec![1]);
}

#[test]
fn clear_and_into_rows() {
    let mut cache = RowCache::new();
    cache.replace_all(vec![vote(1, 1), vote(2, 1)]);
    let rows = cache.clone().into_rows();
    assert_eq!(rows.len(), 2);
    cache.clear();
    assert!(cache.is_empty());
    assert!(!cache.contains(&RowId::new(1)));
}

// ── Single row ──────────────────────────────────────────────────

#[test]
fn single_row_takes_the_latest_write() {
    let key = RowId::new(1);
    let mut row: Option<Vote> = None;

    let insert = ChangeEvent::Insert {
        new: serde_json::to_value(vote(1, 1)).unwrap(),
    };
    assert!(apply_single(&mut row, &key, &insert).unwrap());
    assert!(!apply_single(&mut row, &key, &insert).unwrap());

    let update = ChangeEvent::Update {
        new: serde_json::to_value(vote(1, 4)).unwrap(),
        old: json!({"id": 1}),
    };
    assert!(apply_single(&mut row, &key, &update).unwrap());
    assert_eq!(row.as_ref().map(|v| v.activity_id), Some(ActivityId::new(4)));

    let delete = ChangeEvent::Delete { old: json!({"id": 1}) };
    assert!(apply_single(&mut row, &key, &delete).unwrap());
    assert!(row.is_none());
    assert!(!apply_single(&mut row, &key, &delete).unwrap());
}

#[test]
fn single_row_ignores_other_ids() {
    let mut row = Some(vote(1, 1));
    let other = ChangeEvent::Delete { old: json!({"id": 2}) };
    assert!(!apply_single(&mut row, &RowId::new(1), &other).unwrap());
    assert!(row.is_some());
}

#[test]
fn single_row_rejects_undecodable_payload() {
    let mut row: Option<Vote> = None;
    let bad = ChangeEvent::Insert {
        new: json!({"id": 1, "event_id": "tonight"}),
    };
    assert!(apply_single(&mut row, &RowId::new(1), &bad).is_err());
    assert!(row.is_none());
}

// ── Properties ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Insert(i64, i64),
    Update(i64, i64),
    Delete(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0i64..8, 0i64..4).prop_map(|(id, a)| Op::Insert(id, a)),
        (0i64..8, 0i64..4).prop_map(|(id, a)| Op::Update(id, a)),
        (0i64..8).prop_map(Op::Delete),
    ]
}

fn apply(cache: &mut RowCache<Vote>, op: &Op) {
    match *op {
        Op::Insert(id, a) => {
            cache.insert_if_absent(vote(id, a));
        }
        Op::Update(id, a) => {
            cache.apply_update(vote(id, a));
        }
        Op::Delete(id) => {
            cache.remove(&RowId::new(id));
        }
    }
}

proptest! {
    #[test]
    fn ids_stay_unique(ops in proptest::collection::vec(op_strategy(), 0..64)) {
        let mut cache = RowCache::new();
        for op in &ops {
            apply(&mut cache, op);
        }
        let unique: HashSet<_> = cache.rows().iter().map(|v| v.id).collect();
        prop_assert_eq!(unique.len(), cache.len());
    }

    #[test]
    fn replaying_an_event_is_idempotent(
        ops in proptest::collection::vec(op_strategy(), 0..32),
        last in op_strategy(),
    ) {
        let mut cache = RowCache::new();
        for op in &ops {
            apply(&mut cache, op);
        }
        apply(&mut cache, &last);
        let once = cache.clone();
        apply(&mut cache, &last);
        prop_assert_eq!(once, cache);
    }

    #[test]
    fn update_never_changes_membership(
        ops in proptest::collection::vec(op_strategy(), 0..32),
        id in 0i64..8,
        activity in 0i64..4,
    ) {
        let mut cache = RowCache::new();
        for op in &ops {
            apply(&mut cache, op);
        }
        let before = ids(&cache);
        cache.apply_update(vote(id, activity));
        prop_assert_eq!(before, ids(&cache));
    }
}
