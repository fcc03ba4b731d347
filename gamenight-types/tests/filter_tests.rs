use gamenight_types::{Filter, FilterOp, RowFilters, SubscriptionScope};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;

// ── Rendering & parsing ─────────────────────────────────────────

#[test]
fn eq_filter_renders_postgrest_form() {
    let filter = Filter::eq("event_id", 3);
    assert_eq!(filter.to_string(), "event_id=eq.3");
    assert_eq!(filter.query_pair(), ("event_id".to_string(), "eq.3".to_string()));
}

#[test]
fn parse_roundtrips_display() {
    let filter: Filter = "player_id=neq.abc".parse().unwrap();
    assert_eq!(filter.field, "player_id");
    assert_eq!(filter.op, FilterOp::Neq);
    assert_eq!(filter.value, "abc");
}

#[test]
fn parse_keeps_dots_in_value() {
    let filter: Filter = "price=gt.9.99".parse().unwrap();
    assert_eq!(filter.op, FilterOp::Gt);
    assert_eq!(filter.value, "9.99");
}

#[test]
fn parse_rejects_malformed() {
    assert!("event_id".parse::<Filter>().is_err());
    assert!("event_id=3".parse::<Filter>().is_err());
    assert!("event_id=like.3".parse::<Filter>().is_err());
    assert!("=eq.3".parse::<Filter>().is_err());
}

// ── Evaluation ──────────────────────────────────────────────────

#[test]
fn eq_matches_numbers_and_strings() {
    let row = json!({"event_id": 3, "player_id": "p1"});
    assert!(Filter::eq("event_id", 3).matches(&row));
    assert!(!Filter::eq("event_id", 4).matches(&row));
    assert!(Filter::eq("player_id", "p1").matches(&row));
}

#[test]
fn missing_field_is_null() {
    let row = json!({"id": 1});
    assert!(Filter::new("end_at", FilterOp::Is, "null").matches(&row));
    assert!(!Filter::eq("event_id", 1).matches(&row));
}

#[test]
fn ordering_ops_compare_numerically() {
    let row = json!({"price": 10});
    assert!(Filter::new("price", FilterOp::Gt, 9).matches(&row));
    assert!(Filter::new("price", FilterOp::Gte, 10).matches(&row));
    assert!(!Filter::new("price", FilterOp::Lt, 10).matches(&row));
    assert!(Filter::new("price", FilterOp::Lte, 100).matches(&row));
}

#[test]
fn ordering_ops_never_match_null() {
    let row = json!({"price": null});
    assert!(!Filter::new("price", FilterOp::Gt, 0).matches(&row));
    assert!(!Filter::new("price", FilterOp::Lt, 0).matches(&row));
}

#[test]
fn in_matches_any_listed_value() {
    let row = json!({"activity_id": 7});
    assert!(Filter::new("activity_id", FilterOp::In, "(1,7,9)").matches(&row));
    assert!(!Filter::new("activity_id", FilterOp::In, "(1,9)").matches(&row));
}

#[test]
fn is_matches_booleans() {
    let row = json!({"is_favorite": true});
    assert!(Filter::new("is_favorite", FilterOp::Is, "true").matches(&row));
    assert!(!Filter::new("is_favorite", FilterOp::Is, "false").matches(&row));
}

proptest! {
    #[test]
    fn eq_and_neq_are_complementary(value in any::<i64>(), other in any::<i64>()) {
        let row = json!({"n": value});
        let eq = Filter::eq("n", other).matches(&row);
        let neq = Filter::new("n", FilterOp::Neq, other).matches(&row);
        prop_assert_ne!(eq, neq);
    }
}

// ── RowFilters ──────────────────────────────────────────────────

#[test]
fn row_filters_default_is_all() {
    let filters = RowFilters::default();
    assert_eq!(filters, RowFilters::All);
    assert!(filters.initial().is_empty());
    assert!(filters.change().is_none());
}

#[test]
fn scoped_eq_uses_same_filter_for_fetch_and_changes() {
    let filters = RowFilters::scoped_eq("event_id", 12);
    assert_eq!(filters.initial(), &[Filter::eq("event_id", 12)]);
    assert_eq!(filters.change(), Some(&Filter::eq("event_id", 12)));
    assert!(!filters.is_disabled());
}

#[test]
fn disabled_has_no_filters() {
    let filters = RowFilters::Disabled;
    assert!(filters.is_disabled());
    assert!(filters.initial().is_empty());
    assert!(filters.change().is_none());
}

#[test]
fn scope_identity_follows_filter_value() {
    assert_eq!(RowFilters::scoped_eq("event_id", 1), RowFilters::scoped_eq("event_id", 1));
    assert_ne!(RowFilters::scoped_eq("event_id", 1), RowFilters::scoped_eq("event_id", 2));
}

// ── SubscriptionScope ───────────────────────────────────────────

#[test]
fn channel_names() {
    let all = SubscriptionScope::new("events", None);
    assert_eq!(all.channel_name(), "events-all-channel");

    let scoped = SubscriptionScope::new("votes", Some(Filter::eq("event_id", 4)));
    assert_eq!(scoped.channel_name(), "votes-event_id=eq.4-channel");
}

#[test]
fn scope_matches_rows_inside_filter() {
    let scope = SubscriptionScope::new("votes", Some(Filter::eq("event_id", 4)));
    assert!(scope.matches(&json!({"event_id": 4})));
    assert!(!scope.matches(&json!({"event_id": 5})));
    assert!(SubscriptionScope::new("votes", None).matches(&json!({})));
}
