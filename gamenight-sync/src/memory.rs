//! In-process data platform.
//!
//! Implements [`RemoteDataClient`] and [`AuthClient`] over tables held in
//! memory. Writes fan change events out to every subscription whose scope
//! matches, the way the hosted platform does, so live watchers can be
//! exercised end to end without a network. Used by the test suites and the
//! CLI's demo mode.

use crate::client::{
    AuthClient, AuthEvent, AuthStateChange, AuthStateListener, ChangeEvent, Identity,
    RemoteDataClient, SelectQuery, Subscription,
};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use gamenight_types::{Filter, SubscriptionScope};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A call made against the client, recorded in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Select { table: String, filters: Vec<Filter> },
    Insert { table: String, row: Value },
    Update { table: String, patch: Value, filters: Vec<Filter> },
    Upsert { table: String, row: Value, on_conflict: Vec<String> },
    Delete { table: String, filters: Vec<Filter> },
    Subscribe { scope: SubscriptionScope },
    Unsubscribe { scope: SubscriptionScope },
    SignIn { provider: String, redirect_to: String },
    SignOut,
}

impl Operation {
    /// True for inserts, updates, upserts and deletes.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Insert { .. } | Self::Update { .. } | Self::Upsert { .. } | Self::Delete { .. }
        )
    }

    /// Table the operation touched, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Select { table, .. }
            | Self::Insert { table, .. }
            | Self::Update { table, .. }
            | Self::Upsert { table, .. }
            | Self::Delete { table, .. } => Some(table),
            Self::Subscribe { scope } | Self::Unsubscribe { scope } => Some(&scope.table),
            Self::SignIn { .. } | Self::SignOut => None,
        }
    }
}

struct Subscriber {
    id: String,
    scope: SubscriptionScope,
    tx: mpsc::Sender<ChangeEvent>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Value>>,
    next_ids: HashMap<String, i64>,
    /// (table, related table) -> foreign key column on `table`.
    relations: HashMap<(String, String), String>,
    unique_keys: HashMap<String, Vec<Vec<String>>>,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
    log: Vec<Operation>,
    failures: HashMap<String, SyncError>,
    fail_subscriptions: bool,
    auth_failure: Option<SyncError>,
    accounts: HashMap<String, Identity>,
    user: Option<Identity>,
}

/// In-memory implementation of the data platform.
pub struct MemoryClient {
    inner: Mutex<Inner>,
    auth_tx: broadcast::Sender<AuthStateChange>,
    fetch_gate: watch::Sender<bool>,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    /// Creates an empty platform with no tables and no signed-in user.
    pub fn new() -> Self {
        let (auth_tx, _) = broadcast::channel(32);
        let (fetch_gate, _) = watch::channel(true);
        Self {
            inner: Mutex::new(Inner::default()),
            auth_tx,
            fetch_gate,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Setup ───────────────────────────────────────────────────

    /// Declares that `table.fk_column` references `related.id`, enabling
    /// `related(cols)` projections on `table`.
    pub fn with_relation(self, table: &str, related: &str, fk_column: &str) -> Self {
        self.lock()
            .relations
            .insert((table.to_string(), related.to_string()), fk_column.to_string());
        self
    }

    /// Declares a unique constraint over `columns` of `table`.
    pub fn with_unique_key(self, table: &str, columns: &[&str]) -> Self {
        self.lock()
            .unique_keys
            .entry(table.to_string())
            .or_default()
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Registers an account that [`AuthClient::set_session`] accepts for
    /// `access_token`.
    pub fn with_account(self, access_token: &str, identity: Identity) -> Self {
        self.lock()
            .accounts
            .insert(access_token.to_string(), identity);
        self
    }

    /// Inserts rows without emitting change events or logging.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let mut inner = self.lock();
        for row in rows {
            if let Some(id) = row.get("id").and_then(Value::as_i64) {
                let next = inner.next_ids.entry(table.to_string()).or_insert(1);
                *next = (*next).max(id + 1);
            }
            inner.tables.entry(table.to_string()).or_default().push(row);
        }
    }

    /// The full Game Night schema's relations and unique keys.
    pub fn with_game_night_schema(self) -> Self {
        self.with_relation("votes", "players", "player_id")
            .with_relation("rsvps", "players", "player_id")
            .with_unique_key("votes", &["event_id", "activity_id", "player_id"])
            .with_unique_key("rsvps", &["event_id", "player_id"])
            .with_unique_key("player_activity_metadata", &["player_id", "activity_id"])
    }

    // ── Failure injection ───────────────────────────────────────

    /// Makes every query and write against `table` fail with `error`.
    pub fn fail_table(&self, table: &str, error: SyncError) {
        self.lock().failures.insert(table.to_string(), error);
    }

    /// Makes every auth call fail with `error`.
    pub fn fail_auth(&self, error: SyncError) {
        self.lock().auth_failure = Some(error);
    }

    /// Makes new subscriptions fail.
    pub fn fail_subscriptions(&self, fail: bool) {
        self.lock().fail_subscriptions = fail;
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        let mut inner = self.lock();
        inner.failures.clear();
        inner.auth_failure = None;
        inner.fail_subscriptions = false;
    }

    /// Drops the change streams of every subscription on `table`.
    pub fn close_subscriptions(&self, table: &str) {
        self.lock().subscribers.retain(|s| s.scope.table != table);
    }

    /// Holds select responses until [`MemoryClient::release_fetches`].
    ///
    /// Rows are still read when the select is issued, so writes made while
    /// fetches are held are missing from the response, like a slow network.
    pub fn hold_fetches(&self) {
        self.fetch_gate.send_replace(false);
    }

    pub fn release_fetches(&self) {
        self.fetch_gate.send_replace(true);
    }

    // ── Inspection ──────────────────────────────────────────────

    /// Current rows of `table`.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Every operation so far, in call order.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().log.clone()
    }

    /// Write operations so far, in call order.
    pub fn writes(&self) -> Vec<Operation> {
        self.lock()
            .log
            .iter()
            .filter(|op| op.is_write())
            .cloned()
            .collect()
    }

    /// Scopes of open subscriptions.
    pub fn active_scopes(&self) -> Vec<SubscriptionScope> {
        self.lock()
            .subscribers
            .iter()
            .filter(|s| !s.tx.is_closed())
            .map(|s| s.scope.clone())
            .collect()
    }

    /// Signs `identity` in directly, as if an OAuth round trip completed.
    pub fn sign_in_as(&self, identity: Identity) {
        self.lock().user = Some(identity.clone());
        let _ = self.auth_tx.send(AuthStateChange {
            event: AuthEvent::SignedIn,
            user: Some(identity),
        });
    }

    // ── Internals ───────────────────────────────────────────────

    fn check_failure(inner: &Inner, table: &str) -> SyncResult<()> {
        match inner.failures.get(table) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn check_auth(inner: &Inner) -> SyncResult<()> {
        match &inner.auth_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Inner {
    fn publish(&mut self, table: &str, event: ChangeEvent) {
        self.subscribers.retain(|s| !s.tx.is_closed());
        for subscriber in &self.subscribers {
            if subscriber.scope.table != table || !subscriber.scope.matches(event.row()) {
                continue;
            }
            if let Err(e) = subscriber.tx.try_send(event.clone()) {
                warn!(subscription = %subscriber.id, "dropping change event: {e}");
            }
        }
    }

    fn check_unique(&self, table: &str, row: &Value, skip_index: Option<usize>) -> SyncResult<()> {
        let rows = self.tables.get(table).map(Vec::as_slice).unwrap_or_default();
        let id = row.get("id");
        let duplicate_id = id.is_some()
            && rows
                .iter()
                .enumerate()
                .any(|(i, r)| Some(i) != skip_index && r.get("id") == id);
        if duplicate_id {
            return Err(SyncError::query(
                "23505",
                format!("duplicate key value violates unique constraint \"{table}_pkey\""),
            ));
        }
        for key in self.unique_keys.get(table).into_iter().flatten() {
            let clash = rows.iter().enumerate().any(|(i, existing)| {
                Some(i) != skip_index && key.iter().all(|c| existing.get(c) == row.get(c))
            });
            if clash {
                return Err(SyncError::query(
                    "23505",
                    format!(
                        "duplicate key value violates unique constraint on {table}({})",
                        key.join(", ")
                    ),
                ));
            }
        }
        Ok(())
    }

    fn insert_row(&mut self, table: &str, row: Value) -> SyncResult<Value> {
        let Value::Object(mut fields) = row else {
            return Err(SyncError::query("PGRST102", "row must be a JSON object"));
        };
        if !fields.contains_key("id") {
            let next = self.next_ids.entry(table.to_string()).or_insert(1);
            fields.insert("id".to_string(), Value::from(*next));
            *next += 1;
        }
        let row = Value::Object(fields);
        self.check_unique(table, &row, None)?;
        if let Some(id) = row.get("id").and_then(Value::as_i64) {
            let next = self.next_ids.entry(table.to_string()).or_insert(1);
            *next = (*next).max(id + 1);
        }
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        self.publish(table, ChangeEvent::Insert { new: row.clone() });
        Ok(row)
    }

    fn update_at(&mut self, table: &str, index: usize, patch: &Map<String, Value>) -> SyncResult<()> {
        let old = self.tables[table][index].clone();
        let mut new = old.clone();
        if let Value::Object(fields) = &mut new {
            for (key, value) in patch {
                fields.insert(key.clone(), value.clone());
            }
        }
        self.check_unique(table, &new, Some(index))?;
        if let Some(rows) = self.tables.get_mut(table) {
            rows[index] = new.clone();
        }
        self.publish(table, ChangeEvent::Update { new, old });
        Ok(())
    }

    fn project(&self, table: &str, row: &Value, columns: &str) -> SyncResult<Value> {
        let Value::Object(fields) = row else {
            return Ok(row.clone());
        };
        let mut out = Map::new();
        for item in split_columns(columns) {
            if item == "*" {
                out.extend(fields.clone());
            } else if let Some((related, inner_cols)) = parse_embed(&item) {
                let fk = self
                    .relations
                    .get(&(table.to_string(), related.to_string()))
                    .ok_or_else(|| {
                        SyncError::query(
                            "PGRST200",
                            format!("no relationship between '{table}' and '{related}'"),
                        )
                    })?;
                let target = fields.get(fk).and_then(|key| {
                    self.tables
                        .get(related)
                        .and_then(|rows| rows.iter().find(|r| r.get("id") == Some(key)))
                });
                let embedded = match target {
                    Some(target) => self.project(related, target, inner_cols)?,
                    None => Value::Null,
                };
                out.insert(related.to_string(), embedded);
            } else if let Some(value) = fields.get(&item) {
                out.insert(item, value.clone());
            }
        }
        Ok(Value::Object(out))
    }
}

/// Splits a column list on top-level commas.
fn split_columns(columns: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in columns.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                items.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        items.push(current.trim().to_string());
    }
    items
}

/// Parses `related(cols)` into its parts.
fn parse_embed(item: &str) -> Option<(&str, &str)> {
    let open = item.find('(')?;
    let inner = item[open + 1..].strip_suffix(')')?;
    Some((&item[..open], inner))
}

fn matches_all(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|f| f.matches(row))
}

#[async_trait]
impl RemoteDataClient for MemoryClient {
    async fn select(&self, query: SelectQuery) -> SyncResult<Vec<Value>> {
        let result = {
            let mut inner = self.lock();
            inner.log.push(Operation::Select {
                table: query.table.clone(),
                filters: query.filters.clone(),
            });
            Self::check_failure(&inner, &query.table)?;
            let rows = inner.tables.get(&query.table).cloned().unwrap_or_default();
            let mut out = Vec::new();
            for row in rows.iter().filter(|row| matches_all(row, &query.filters)) {
                if query.limit.is_some_and(|limit| out.len() >= limit) {
                    break;
                }
                out.push(inner.project(&query.table, row, &query.columns)?);
            }
            out
        };

        let mut gate = self.fetch_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        Ok(result)
    }

    async fn insert(&self, table: &str, row: Value) -> SyncResult<()> {
        let mut inner = self.lock();
        inner.log.push(Operation::Insert {
            table: table.to_string(),
            row: row.clone(),
        });
        Self::check_failure(&inner, table)?;
        inner.insert_row(table, row)?;
        Ok(())
    }

    async fn update(&self, table: &str, patch: Value, filters: &[Filter]) -> SyncResult<()> {
        let mut inner = self.lock();
        inner.log.push(Operation::Update {
            table: table.to_string(),
            patch: patch.clone(),
            filters: filters.to_vec(),
        });
        Self::check_failure(&inner, table)?;
        let Value::Object(patch) = patch else {
            return Err(SyncError::query("PGRST102", "patch must be a JSON object"));
        };
        let targets: Vec<usize> = inner
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .enumerate()
                    .filter(|(_, row)| matches_all(row, filters))
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default();
        for index in targets {
            inner.update_at(table, index, &patch)?;
        }
        Ok(())
    }

    async fn upsert(&self, table: &str, row: Value, on_conflict: &[&str]) -> SyncResult<()> {
        let mut inner = self.lock();
        inner.log.push(Operation::Upsert {
            table: table.to_string(),
            row: row.clone(),
            on_conflict: on_conflict.iter().map(|c| c.to_string()).collect(),
        });
        Self::check_failure(&inner, table)?;
        let Value::Object(fields) = &row else {
            return Err(SyncError::query("PGRST102", "row must be a JSON object"));
        };
        let existing = inner.tables.get(table).and_then(|rows| {
            rows.iter()
                .position(|r| on_conflict.iter().all(|c| r.get(*c) == fields.get(*c)))
        });
        match existing {
            Some(index) => inner.update_at(table, index, fields),
            None => inner.insert_row(table, row.clone()).map(|_| ()),
        }
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> SyncResult<()> {
        let mut inner = self.lock();
        inner.log.push(Operation::Delete {
            table: table.to_string(),
            filters: filters.to_vec(),
        });
        Self::check_failure(&inner, table)?;
        let Some(rows) = inner.tables.get_mut(table) else {
            return Ok(());
        };
        let (removed, kept): (Vec<Value>, Vec<Value>) = std::mem::take(rows)
            .into_iter()
            .partition(|row| matches_all(row, filters));
        *rows = kept;
        for old in removed {
            inner.publish(table, ChangeEvent::Delete { old });
        }
        Ok(())
    }

    async fn subscribe(&self, scope: SubscriptionScope) -> SyncResult<Subscription> {
        let mut inner = self.lock();
        inner.log.push(Operation::Subscribe {
            scope: scope.clone(),
        });
        if inner.fail_subscriptions {
            return Err(SyncError::SubscriptionFailed(format!(
                "channel {} rejected",
                scope.channel_name()
            )));
        }
        inner.next_subscription += 1;
        let id = format!("sub_{}", inner.next_subscription);
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        inner.subscribers.push(Subscriber {
            id: id.clone(),
            scope: scope.clone(),
            tx,
        });
        debug!(subscription = %id, channel = %scope.channel_name(), "memory subscription opened");
        Ok(Subscription::new(id, scope, rx))
    }

    async fn unsubscribe(&self, subscription: Subscription) -> SyncResult<()> {
        let mut inner = self.lock();
        inner.log.push(Operation::Unsubscribe {
            scope: subscription.scope().clone(),
        });
        inner.subscribers.retain(|s| s.id != subscription.id());
        Ok(())
    }
}

#[async_trait]
impl AuthClient for MemoryClient {
    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> SyncResult<String> {
        let mut inner = self.lock();
        inner.log.push(Operation::SignIn {
            provider: provider.to_string(),
            redirect_to: redirect_to.to_string(),
        });
        Self::check_auth(&inner)?;
        Ok(format!(
            "memory://authorize?provider={}&redirect_to={}",
            urlencoding::encode(provider),
            urlencoding::encode(redirect_to)
        ))
    }

    async fn set_session(
        &self,
        access_token: &str,
        _refresh_token: Option<&str>,
    ) -> SyncResult<Identity> {
        let identity = {
            let inner = self.lock();
            Self::check_auth(&inner)?;
            inner
                .accounts
                .get(access_token)
                .cloned()
                .ok_or_else(|| SyncError::Auth("invalid access token".to_string()))?
        };
        self.sign_in_as(identity.clone());
        Ok(identity)
    }

    async fn sign_out(&self) -> SyncResult<()> {
        {
            let mut inner = self.lock();
            inner.log.push(Operation::SignOut);
            Self::check_auth(&inner)?;
            inner.user = None;
        }
        let _ = self.auth_tx.send(AuthStateChange {
            event: AuthEvent::SignedOut,
            user: None,
        });
        Ok(())
    }

    fn on_auth_state_change(&self) -> AuthStateListener {
        let inner = self.lock();
        AuthStateListener::new(inner.user.clone(), self.auth_tx.subscribe())
    }
}
