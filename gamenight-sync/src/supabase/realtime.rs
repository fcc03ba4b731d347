//! Realtime change notifications over a Phoenix channel socket.
//!
//! One websocket is shared by every subscription. Each subscription joins
//! its own topic with a `postgres_changes` config for one table and an
//! optional filter; the server acknowledges the join with a `phx_reply`
//! and then pushes `postgres_changes` frames on that topic.
//!
//! A dropped socket closes every subscription's event stream. Nothing is
//! re-joined automatically.

use super::{SupabaseConfig, TokenStore};
use crate::client::{ChangeEvent, Subscription};
use crate::error::{SyncError, SyncResult};
use futures::{SinkExt, StreamExt};
use gamenight_types::SubscriptionScope;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const COMMAND_CHANNEL_CAPACITY: usize = 64;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One frame of the Phoenix channel protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixMessage {
    pub fn new(
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: Value,
        reference: Option<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
            reference,
        }
    }

    pub fn encode(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> SyncResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| SyncError::Protocol(format!("malformed realtime frame: {e}")))
    }
}

/// `phx_join` payload subscribing to row changes of one table.
pub fn join_payload(schema: &str, scope: &SubscriptionScope, access_token: &str) -> Value {
    let mut change = json!({
        "event": "*",
        "schema": schema,
        "table": scope.table,
    });
    if let Some(filter) = &scope.filter {
        change["filter"] = Value::String(filter.to_string());
    }
    json!({
        "config": {
            "broadcast": { "ack": false, "self": false },
            "presence": { "key": "" },
            "postgres_changes": [change],
            "private": false,
        },
        "access_token": access_token,
    })
}

/// Decodes the payload of a `postgres_changes` frame.
pub fn decode_change(payload: &Value) -> Option<ChangeEvent> {
    let data = payload.get("data")?;
    let record = data.get("record").cloned().unwrap_or(Value::Null);
    let old = data
        .get("old_record")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    match data.get("type")?.as_str()? {
        "INSERT" => Some(ChangeEvent::Insert { new: record }),
        "UPDATE" => Some(ChangeEvent::Update { new: record, old }),
        "DELETE" => Some(ChangeEvent::Delete { old }),
        _ => None,
    }
}

/// Status of a `phx_reply`: `Ok` or the server's reason for refusing.
fn reply_status(payload: &Value) -> Result<(), String> {
    match payload.get("status").and_then(Value::as_str) {
        Some("ok") => Ok(()),
        status => {
            let reason = payload
                .pointer("/response/reason")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("join refused (status {})", status.unwrap_or("none")));
            Err(reason)
        }
    }
}

enum Command {
    Join {
        topic: String,
        payload: Value,
        events: mpsc::Sender<ChangeEvent>,
        ack: oneshot::Sender<SyncResult<()>>,
    },
    Leave {
        topic: String,
    },
}

struct Connection {
    commands: mpsc::Sender<Command>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Subscription side of the platform.
pub struct RealtimeClient {
    config: SupabaseConfig,
    tokens: TokenStore,
    connection: Mutex<Option<Connection>>,
    next_topic: AtomicU64,
}

impl RealtimeClient {
    /// Creates a client. The socket is opened on the first subscribe.
    pub fn new(config: SupabaseConfig, tokens: TokenStore) -> Self {
        Self {
            config,
            tokens,
            connection: Mutex::new(None),
            next_topic: AtomicU64::new(1),
        }
    }

    /// Joins a topic for `scope` and waits for the server to acknowledge it.
    pub async fn subscribe(&self, scope: SubscriptionScope) -> SyncResult<Subscription> {
        let commands = self.ensure_connected().await?;
        let access_token = match self.tokens.read().await.as_ref() {
            Some(tokens) => tokens.access_token.clone(),
            None => self.config.anon_key.clone(),
        };
        let topic = format!(
            "realtime:{}:{}",
            scope.channel_name(),
            self.next_topic.fetch_add(1, Ordering::Relaxed)
        );
        let payload = join_payload(&self.config.schema, &scope, &access_token);
        let (events, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (ack, ack_rx) = oneshot::channel();

        commands
            .send(Command::Join {
                topic: topic.clone(),
                payload,
                events,
                ack,
            })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;

        match tokio::time::timeout(self.config.subscribe_timeout(), ack_rx).await {
            Ok(Ok(Ok(()))) => {
                debug!(%topic, "channel joined");
                Ok(Subscription::new(topic, scope, events_rx))
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(SyncError::ChannelClosed),
            Err(_) => {
                let _ = commands.send(Command::Leave { topic }).await;
                Err(SyncError::Timeout)
            }
        }
    }

    /// Leaves the subscription's topic. Succeeds trivially when the socket
    /// is already gone.
    pub async fn unsubscribe(&self, subscription: Subscription) -> SyncResult<()> {
        let commands = match self.connection.lock().await.as_ref() {
            Some(connection) => connection.commands.clone(),
            None => return Ok(()),
        };
        let topic = subscription.id().to_string();
        drop(subscription);
        if commands.send(Command::Leave { topic }).await.is_err() {
            debug!("realtime socket already closed");
        }
        Ok(())
    }

    /// Closes the socket and ends every subscription's event stream.
    pub async fn disconnect(&self) {
        let Some(connection) = self.connection.lock().await.take() else {
            return;
        };
        connection.token.cancel();
        let _ = connection.task.await;
        info!("realtime disconnected");
    }

    async fn ensure_connected(&self) -> SyncResult<mpsc::Sender<Command>> {
        let mut guard = self.connection.lock().await;
        if let Some(connection) = guard.as_ref() {
            if !connection.commands.is_closed() {
                return Ok(connection.commands.clone());
            }
        }

        let url = self.config.realtime_url();
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| SyncError::Network(format!("realtime connect failed: {e}")))?;
        info!("realtime connected");

        let (commands, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let token = CancellationToken::new();
        let task = tokio::spawn(run_socket(
            socket,
            commands_rx,
            self.config.heartbeat_interval(),
            token.clone(),
        ));
        *guard = Some(Connection {
            commands: commands.clone(),
            token,
            task,
        });
        Ok(commands)
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().as_ref() {
            connection.token.cancel();
        }
    }
}

/// Socket loop: sends joins, leaves and heartbeats, routes server frames
/// to subscriptions.
async fn run_socket(
    socket: Socket,
    mut commands: mpsc::Receiver<Command>,
    heartbeat_period: Duration,
    token: CancellationToken,
) {
    let (mut sink, mut stream) = socket.split();
    let mut channels: HashMap<String, mpsc::Sender<ChangeEvent>> = HashMap::new();
    let mut pending: HashMap<String, (String, oneshot::Sender<SyncResult<()>>)> = HashMap::new();
    let mut next_ref: u64 = 0;
    let mut heartbeat = interval_at(Instant::now() + heartbeat_period, heartbeat_period);

    loop {
        let outgoing = tokio::select! {
            _ = token.cancelled() => {
                let _ = sink.close().await;
                break;
            }
            command = commands.recv() => match command {
                None => break,
                Some(Command::Join { topic, payload, events, ack }) => {
                    next_ref += 1;
                    let reference = next_ref.to_string();
                    channels.insert(topic.clone(), events);
                    pending.insert(reference.clone(), (topic.clone(), ack));
                    PhoenixMessage::new(topic, "phx_join", payload, Some(reference))
                }
                Some(Command::Leave { topic }) => {
                    pending.retain(|_, (joining, _)| *joining != topic);
                    if channels.remove(&topic).is_none() {
                        continue;
                    }
                    next_ref += 1;
                    PhoenixMessage::new(topic, "phx_leave", json!({}), Some(next_ref.to_string()))
                }
            },
            _ = heartbeat.tick() => {
                next_ref += 1;
                PhoenixMessage::new("phoenix", "heartbeat", json!({}), Some(next_ref.to_string()))
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match PhoenixMessage::decode(text.as_str()) {
                        Ok(message) => route(message, &mut channels, &mut pending),
                        Err(e) => warn!("{e}"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "realtime socket closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("realtime socket error: {e}");
                        break;
                    }
                    None => break,
                }
                continue;
            }
        };

        let text = match outgoing.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to encode realtime frame: {e}");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            warn!("realtime send failed: {e}");
            break;
        }
    }

    for (_, (topic, ack)) in pending.drain() {
        debug!(%topic, "join abandoned");
        let _ = ack.send(Err(SyncError::ChannelClosed));
    }
    debug!(open = channels.len(), "realtime socket loop ended");
}

fn route(
    message: PhoenixMessage,
    channels: &mut HashMap<String, mpsc::Sender<ChangeEvent>>,
    pending: &mut HashMap<String, (String, oneshot::Sender<SyncResult<()>>)>,
) {
    match message.event.as_str() {
        "phx_reply" => {
            let Some((topic, ack)) = message.reference.and_then(|r| pending.remove(&r)) else {
                return;
            };
            let result = reply_status(&message.payload).map_err(|reason| {
                channels.remove(&topic);
                warn!(%topic, "join refused: {reason}");
                SyncError::SubscriptionFailed(reason)
            });
            let _ = ack.send(result);
        }
        "postgres_changes" => {
            let Some(events) = channels.get(&message.topic) else {
                return;
            };
            let Some(event) = decode_change(&message.payload) else {
                warn!(topic = %message.topic, "undecodable change payload");
                return;
            };
            match events.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(topic = %message.topic, "subscriber lagging, change dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    channels.remove(&message.topic);
                }
            }
        }
        "phx_error" | "phx_close" => {
            if channels.remove(&message.topic).is_some() {
                warn!(topic = %message.topic, event = %message.event, "channel closed by server");
            }
        }
        "system" => {
            if message.payload.get("status").and_then(Value::as_str) == Some("error") {
                warn!(topic = %message.topic, payload = %message.payload, "realtime system error");
            }
        }
        _ => {}
    }
}
