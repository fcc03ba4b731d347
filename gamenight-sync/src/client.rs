//! Remote data platform boundary.
//!
//! The platform (auth, relational store, change notifications) is an
//! external service. These traits are the only way the rest of the
//! workspace reaches it, so the live watchers run unchanged against the
//! in-memory client in tests and the Supabase adapter in production.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use gamenight_types::{Filter, PlayerId, Record, SubscriptionScope};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

/// A filtered read against one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub table: String,
    /// Column list, possibly with relational projections (`*,players(name)`).
    pub columns: String,
    /// Predicates, ANDed together.
    pub filters: Vec<Filter>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    /// Selects every column of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            limit: None,
        }
    }

    /// Query for `R`'s table using `R`'s projection.
    pub fn for_record<R: Record>() -> Self {
        Self::new(R::TABLE).columns(R::select_columns())
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Kind of a row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change notification.
///
/// Payloads carry the base table's row shape only; joined fields are never
/// present.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Insert { new: Value },
    Update { new: Value, old: Value },
    /// `old` may contain only the primary key.
    Delete { old: Value },
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Insert { .. } => ChangeKind::Insert,
            Self::Update { .. } => ChangeKind::Update,
            Self::Delete { .. } => ChangeKind::Delete,
        }
    }

    /// The row the event is about: the new shape for inserts and updates,
    /// the old shape for deletes.
    pub fn row(&self) -> &Value {
        match self {
            Self::Insert { new } | Self::Update { new, .. } => new,
            Self::Delete { old } => old,
        }
    }
}

/// An open change-event channel for one scope.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    scope: SubscriptionScope,
    events: mpsc::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(
        id: impl Into<String>,
        scope: SubscriptionScope,
        events: mpsc::Receiver<ChangeEvent>,
    ) -> Self {
        Self {
            id: id.into(),
            scope,
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scope(&self) -> &SubscriptionScope {
        &self.scope
    }

    /// Next change event. `None` once the platform drops the channel; the
    /// subscription is never re-established automatically.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }
}

/// Query, write and change-subscription access to the data platform.
#[async_trait]
pub trait RemoteDataClient: Send + Sync {
    /// Runs a filtered select and returns the raw rows in server order.
    async fn select(&self, query: SelectQuery) -> SyncResult<Vec<Value>>;

    /// Inserts one row.
    async fn insert(&self, table: &str, row: Value) -> SyncResult<()>;

    /// Applies `patch` to every row matching all `filters`.
    async fn update(&self, table: &str, patch: Value, filters: &[Filter]) -> SyncResult<()>;

    /// Inserts `row`, or merges it into the existing row that has the same
    /// values for the `on_conflict` columns.
    async fn upsert(&self, table: &str, row: Value, on_conflict: &[&str]) -> SyncResult<()>;

    /// Deletes every row matching all `filters`.
    async fn delete(&self, table: &str, filters: &[Filter]) -> SyncResult<()>;

    /// Opens a change subscription and waits for the platform to confirm it.
    async fn subscribe(&self, scope: SubscriptionScope) -> SyncResult<Subscription>;

    /// Releases a subscription.
    async fn unsubscribe(&self, subscription: Subscription) -> SyncResult<()>;
}

/// Fetches the row of `R` with the given key, if any.
pub async fn fetch_one<R, C>(client: &C, id: &R::Id) -> SyncResult<Option<R>>
where
    R: Record,
    C: RemoteDataClient + ?Sized,
{
    let query = SelectQuery::for_record::<R>()
        .filter(R::id_filter(id))
        .limit(1);
    let mut rows = client.select(query).await?;
    if rows.len() > 1 {
        return Err(SyncError::Protocol(format!(
            "expected at most one {} row for id {id}, got {}",
            R::TABLE,
            rows.len()
        )));
    }
    rows.pop()
        .map(serde_json::from_value)
        .transpose()
        .map_err(SyncError::from)
}

/// Fetches every row of `R` matching all `filters`.
pub async fn fetch_rows<R, C>(client: &C, filters: &[Filter]) -> SyncResult<Vec<R>>
where
    R: Record,
    C: RemoteDataClient + ?Sized,
{
    let query = SelectQuery::for_record::<R>().filters(filters.iter().cloned());
    client
        .select(query)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(SyncError::from))
        .collect()
}

/// The signed-in user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: PlayerId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Auth state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// Delivered first to every new listener with the current session.
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// One auth state notification.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthStateChange {
    pub event: AuthEvent,
    pub user: Option<Identity>,
}

/// Receives auth state notifications for one listener.
pub struct AuthStateListener {
    initial: Option<AuthStateChange>,
    rx: broadcast::Receiver<AuthStateChange>,
}

impl AuthStateListener {
    pub fn new(current: Option<Identity>, rx: broadcast::Receiver<AuthStateChange>) -> Self {
        Self {
            initial: Some(AuthStateChange {
                event: AuthEvent::InitialSession,
                user: current,
            }),
            rx,
        }
    }

    /// Next notification; `None` once the provider shuts down.
    pub async fn next(&mut self) -> Option<AuthStateChange> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        loop {
            match self.rx.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("auth listener lagged, skipped {skipped} notifications");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// OAuth sign-in and session notifications.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Starts an OAuth sign-in and returns the provider URL to send the user
    /// to. The provider redirects back to `redirect_to` when done.
    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> SyncResult<String>;

    /// Completes sign-in with the tokens handed to the redirect URL.
    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> SyncResult<Identity>;

    /// Signs the current user out.
    async fn sign_out(&self) -> SyncResult<()>;

    /// Registers for auth state notifications.
    fn on_auth_state_change(&self) -> AuthStateListener;
}
