use futures::{SinkExt, StreamExt};
use gamenight_sync::supabase::realtime::{decode_change, join_payload};
use gamenight_sync::supabase::{PhoenixMessage, RealtimeClient, SupabaseConfig, TokenStore};
use gamenight_sync::{ChangeEvent, SyncError};
use gamenight_types::{Filter, SubscriptionScope};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;

fn votes_scope() -> SubscriptionScope {
    SubscriptionScope::new("votes", Some(Filter::eq("event_id", 3)))
}

fn change_payload(kind: &str, record: Value, old_record: Value) -> Value {
    json!({
        "ids": [1],
        "data": {
            "type": kind,
            "schema": "public",
            "table": "votes",
            "commit_timestamp": "2024-06-01T18:00:00Z",
            "record": record,
            "old_record": old_record,
        }
    })
}

// ── Codec ───────────────────────────────────────────────────────

#[test]
fn frame_uses_ref_key() {
    let frame = PhoenixMessage::new("phoenix", "heartbeat", json!({}), Some("7".to_string()));
    let text = frame.encode().unwrap();
    let value: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["ref"], json!("7"));
    assert_eq!(PhoenixMessage::decode(&text).unwrap(), frame);
}

#[test]
fn frame_without_ref_decodes() {
    let frame = PhoenixMessage::decode(r#"{"topic":"t","event":"postgres_changes","payload":{}}"#)
        .unwrap();
    assert!(frame.reference.is_none());
}

#[test]
fn malformed_frame_is_protocol_error() {
    let err = PhoenixMessage::decode("not json").unwrap_err();
    assert!(matches!(err, SyncError::Protocol(_)));
}

#[test]
fn join_payload_describes_table_and_filter() {
    let payload = join_payload("public", &votes_scope(), "token");
    assert_eq!(
        payload["config"]["postgres_changes"],
        json!([{"event": "*", "schema": "public", "table": "votes", "filter": "event_id=eq.3"}])
    );
    assert_eq!(payload["access_token"], json!("token"));
}

#[test]
fn join_payload_without_filter() {
    let payload = join_payload("public", &SubscriptionScope::new("events", None), "t");
    assert!(payload["config"]["postgres_changes"][0].get("filter").is_none());
}

#[test]
fn decodes_each_change_kind() {
    let row = json!({"id": 5, "event_id": 3});
    assert_eq!(
        decode_change(&change_payload("INSERT", row.clone(), json!({}))),
        Some(ChangeEvent::Insert { new: row.clone() })
    );
    assert_eq!(
        decode_change(&change_payload("UPDATE", row.clone(), json!({"id": 5}))),
        Some(ChangeEvent::Update {
            new: row.clone(),
            old: json!({"id": 5})
        })
    );
    assert_eq!(
        decode_change(&change_payload("DELETE", Value::Null, json!({"id": 5}))),
        Some(ChangeEvent::Delete { old: json!({"id": 5}) })
    );
}

#[test]
fn unknown_change_kind_is_ignored() {
    assert_eq!(decode_change(&change_payload("TRUNCATE", json!({}), json!({}))), None);
    assert_eq!(decode_change(&json!({"status": "ok"})), None);
}

// ── Socket ──────────────────────────────────────────────────────

/// Accepts one socket, answers joins with `reply`, pushes one insert after
/// a successful join and returns every frame received until `phx_leave`.
async fn fake_realtime(reply: Value) -> (SupabaseConfig, JoinHandle<Vec<PhoenixMessage>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut seen = Vec::new();
        while let Some(Ok(frame)) = ws.next().await {
            let Message::Text(text) = frame else {
                continue;
            };
            let message = PhoenixMessage::decode(&text).unwrap();
            seen.push(message.clone());
            match message.event.as_str() {
                "phx_join" => {
                    let ack = PhoenixMessage::new(
                        message.topic.clone(),
                        "phx_reply",
                        reply.clone(),
                        message.reference.clone(),
                    );
                    ws.send(Message::Text(ack.encode().unwrap().into())).await.unwrap();
                    if reply["status"] == json!("ok") {
                        let push = PhoenixMessage::new(
                            message.topic.clone(),
                            "postgres_changes",
                            change_payload(
                                "INSERT",
                                json!({"id": 7, "event_id": 3, "activity_id": 1}),
                                json!({}),
                            ),
                            None,
                        );
                        ws.send(Message::Text(push.encode().unwrap().into())).await.unwrap();
                    }
                }
                "phx_leave" => break,
                _ => {}
            }
        }
        seen
    });
    (SupabaseConfig::new(format!("http://{addr}"), "anon-key"), handle)
}

fn no_session() -> TokenStore {
    Arc::new(RwLock::new(None))
}

#[tokio::test]
async fn subscribe_receives_changes_and_leaves() {
    let (config, server) = fake_realtime(json!({"status": "ok", "response": {}})).await;
    let realtime = RealtimeClient::new(config, no_session());

    let mut subscription = realtime.subscribe(votes_scope()).await.unwrap();
    assert!(subscription.id().starts_with("realtime:votes-event_id=eq.3-channel"));

    let event = tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.row()["id"], json!(7));

    let topic = subscription.id().to_string();
    realtime.unsubscribe(subscription).await.unwrap();
    let seen = tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .unwrap()
        .unwrap();

    let events: Vec<&str> = seen.iter().map(|m| m.event.as_str()).collect();
    assert_eq!(events, vec!["phx_join", "phx_leave"]);
    assert_eq!(seen[0].topic, topic);
    assert_eq!(seen[0].payload["access_token"], json!("anon-key"));
    assert_eq!(seen[1].topic, topic);
    realtime.disconnect().await;
}

#[tokio::test]
async fn refused_join_is_subscription_failure() {
    let (config, _server) = fake_realtime(json!({
        "status": "error",
        "response": {"reason": "invalid filter"}
    }))
    .await;
    let realtime = RealtimeClient::new(config, no_session());

    let err = realtime.subscribe(votes_scope()).await.unwrap_err();
    assert_eq!(err, SyncError::SubscriptionFailed("invalid filter".to_string()));
    realtime.disconnect().await;
}

#[tokio::test]
async fn unanswered_join_times_out_and_leaves() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut seen: Vec<PhoenixMessage> = Vec::new();
        while let Some(Ok(frame)) = ws.next().await {
            let Message::Text(text) = frame else {
                continue;
            };
            let message = PhoenixMessage::decode(&text).unwrap();
            seen.push(message.clone());
            let joins = seen.iter().filter(|m| m.event == "phx_join").count();
            match message.event.as_str() {
                // The first join is only answered after the client gave up on it.
                "phx_join" if joins == 1 => {}
                "phx_leave" if joins == 1 => {
                    let late = PhoenixMessage::new(
                        message.topic.clone(),
                        "phx_reply",
                        json!({"status": "ok", "response": {}}),
                        seen[0].reference.clone(),
                    );
                    ws.send(Message::Text(late.encode().unwrap().into())).await.unwrap();
                }
                "phx_join" => {
                    let ack = PhoenixMessage::new(
                        message.topic.clone(),
                        "phx_reply",
                        json!({"status": "ok", "response": {}}),
                        message.reference.clone(),
                    );
                    ws.send(Message::Text(ack.encode().unwrap().into())).await.unwrap();
                }
                "phx_leave" => break,
                _ => {}
            }
        }
        seen
    });

    let config = SupabaseConfig {
        subscribe_timeout_secs: 1,
        ..SupabaseConfig::new(format!("http://{addr}"), "anon-key")
    };
    let realtime = RealtimeClient::new(config, no_session());

    let err = realtime.subscribe(votes_scope()).await.unwrap_err();
    assert_eq!(err, SyncError::Timeout);

    let subscription = realtime.subscribe(votes_scope()).await.unwrap();
    let topic = subscription.id().to_string();
    realtime.unsubscribe(subscription).await.unwrap();

    let seen = tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .unwrap()
        .unwrap();
    let events: Vec<&str> = seen
        .iter()
        .filter(|m| m.event != "heartbeat")
        .map(|m| m.event.as_str())
        .collect();
    assert_eq!(events, vec!["phx_join", "phx_leave", "phx_join", "phx_leave"]);
    assert_eq!(seen[0].topic, seen[1].topic);
    assert_ne!(seen[0].topic, topic);
    realtime.disconnect().await;
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let realtime = RealtimeClient::new(
        SupabaseConfig::new(format!("http://{addr}"), "anon-key"),
        no_session(),
    );
    let err = realtime.subscribe(votes_scope()).await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)));
}

#[tokio::test]
async fn unsubscribe_without_socket_is_ok() {
    let realtime = RealtimeClient::new(SupabaseConfig::default(), no_session());
    let (_tx, rx) = tokio::sync::mpsc::channel(1);
    let subscription = gamenight_sync::Subscription::new("realtime:x:1", votes_scope(), rx);
    realtime.unsubscribe(subscription).await.unwrap();
}
