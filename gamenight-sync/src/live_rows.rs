//! Row-set live watcher.
//!
//! Fetches every row matching a filter set and keeps the collection current
//! from change events scoped by the set's change filter.
//!
//! Change events only carry the base table's row shape. When `R` declares a
//! projection, inserted and updated rows are re-fetched with the projection
//! before they enter the cache so consumers always see the joined shape.

use crate::cache::RowCache;
use crate::client::{ChangeEvent, RemoteDataClient, fetch_one, fetch_rows};
use crate::error::SyncError;
use crate::scope::{Publisher, ScopeTask, StateCell, release, unless_cancelled};
use gamenight_types::{Record, RowFilters, SubscriptionScope, record_id};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Published state of a [`LiveRows`].
#[derive(Debug, Clone, PartialEq)]
pub struct RowsState<R: Record> {
    pub loading: bool,
    pub error: Option<SyncError>,
    pub rows: RowCache<R>,
}

impl<R: Record> RowsState<R> {
    fn settled_empty() -> Self {
        Self {
            loading: false,
            error: None,
            rows: RowCache::new(),
        }
    }

    fn loading() -> Self {
        Self {
            loading: true,
            error: None,
            rows: RowCache::new(),
        }
    }

    /// Rows in cache order.
    pub fn rows(&self) -> &[R] {
        self.rows.rows()
    }
}

impl<R: Record> Default for RowsState<R> {
    fn default() -> Self {
        Self::settled_empty()
    }
}

/// Keeps the rows of `R` matching a filter set in sync with the platform.
pub struct LiveRows<R: Record> {
    client: Arc<dyn RemoteDataClient>,
    filters: Option<RowFilters>,
    state: StateCell<RowsState<R>>,
    task: Option<ScopeTask>,
}

impl<R: Record> LiveRows<R> {
    /// Creates an idle watcher. Call [`LiveRows::set_filters`] to start it.
    pub fn new(client: Arc<dyn RemoteDataClient>) -> Self {
        Self {
            client,
            filters: None,
            state: StateCell::new(RowsState::loading()),
            task: None,
        }
    }

    /// Creates a watcher and immediately scopes it to `filters`.
    pub fn with_filters(client: Arc<dyn RemoteDataClient>, filters: RowFilters) -> Self {
        let mut live = Self::new(client);
        live.set_filters(filters);
        live
    }

    /// Current filter set, if the watcher has been scoped.
    pub fn filters(&self) -> Option<&RowFilters> {
        self.filters.as_ref()
    }

    /// Rescopes the watcher. Passing the current filters again is a no-op.
    ///
    /// [`RowFilters::Disabled`] empties the collection and settles it
    /// without fetching or subscribing.
    pub fn set_filters(&mut self, filters: RowFilters) {
        if self.filters.as_ref() == Some(&filters) {
            return;
        }
        let previous = self.task.take().and_then(ScopeTask::cancel);
        self.filters = Some(filters.clone());

        if filters.is_disabled() {
            self.state.next_generation(RowsState::settled_empty());
            return;
        }

        let publisher = self.state.next_generation(RowsState::loading());
        let client = self.client.clone();
        self.task = Some(ScopeTask::spawn(move |token| {
            run_scope(client, filters, publisher, previous, token)
        }));
    }

    /// Receiver for state changes.
    pub fn subscribe(&self) -> watch::Receiver<RowsState<R>> {
        self.state.subscribe()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> RowsState<R> {
        self.state.borrow().clone()
    }

    /// Waits until the current scope has finished loading.
    pub async fn settled(&self) -> RowsState<R> {
        let mut rx = self.subscribe();
        match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }
}

async fn run_scope<R: Record>(
    client: Arc<dyn RemoteDataClient>,
    filters: RowFilters,
    publisher: Publisher<RowsState<R>>,
    previous: Option<JoinHandle<()>>,
    token: CancellationToken,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }
    if !publisher.is_current() {
        return;
    }

    let scope = SubscriptionScope::new(R::TABLE, filters.change().cloned());
    let channel = scope.channel_name();
    let Some(subscribed) = unless_cancelled(&token, client.subscribe(scope)).await else {
        return;
    };
    let mut subscription = match subscribed {
        Ok(subscription) => {
            debug!(%channel, "subscribed to {}", R::TABLE);
            Some(subscription)
        }
        Err(e) => {
            warn!(%channel, "subscription failed, rows will not update: {e}");
            None
        }
    };

    // Events arriving while the fetch is in flight queue up in the
    // subscription and are applied on top of the fetch result.
    let fetch = fetch_rows::<R, _>(client.as_ref(), filters.initial());
    let Some(fetched) = unless_cancelled(&token, fetch).await else {
        if let Some(subscription) = subscription {
            release(client.as_ref(), subscription).await;
        }
        return;
    };
    publisher.update(|state| {
        match fetched {
            Ok(rows) => {
                state.rows.replace_all(rows);
                state.error = None;
            }
            Err(e) => {
                warn!("failed to fetch {}: {e}", R::TABLE);
                state.rows.clear();
                state.error = Some(e);
            }
        }
        state.loading = false;
        true
    });

    let Some(sub) = subscription.as_mut() else {
        return;
    };
    loop {
        let Some(event) = unless_cancelled(&token, sub.recv()).await else {
            break;
        };
        let Some(event) = event else {
            debug!(%channel, "change stream closed");
            return;
        };
        if unless_cancelled(&token, apply_event(client.as_ref(), &publisher, event))
            .await
            .is_none()
        {
            break;
        }
    }

    if let Some(subscription) = subscription {
        release(client.as_ref(), subscription).await;
    }
}

async fn apply_event<R: Record>(
    client: &dyn RemoteDataClient,
    publisher: &Publisher<RowsState<R>>,
    event: ChangeEvent,
) {
    let Some(id) = record_id::<R>(event.row()) else {
        warn!("ignoring {} change without a usable id", R::TABLE);
        return;
    };
    match event {
        ChangeEvent::Update { new, .. } => {
            if !current_contains(publisher, &id) {
                return;
            }
            let Some(row) = materialize::<R>(client, &id, new).await else {
                return;
            };
            publisher.update(|state| state.rows.apply_update(row));
        }
        ChangeEvent::Insert { new } => {
            if current_contains(publisher, &id) {
                return;
            }
            let Some(row) = materialize::<R>(client, &id, new).await else {
                return;
            };
            publisher.update(|state| state.rows.insert_if_absent(row));
        }
        ChangeEvent::Delete { .. } => {
            publisher.update(|state| state.rows.remove(&id));
        }
    }
}

fn current_contains<R: Record>(publisher: &Publisher<RowsState<R>>, id: &R::Id) -> bool {
    publisher.peek(|state| state.rows.contains(id))
}

/// Turns a change payload into a row of `R`: decoded directly, or
/// re-fetched when `R` carries a projection.
async fn materialize<R: Record>(
    client: &dyn RemoteDataClient,
    id: &R::Id,
    payload: serde_json::Value,
) -> Option<R> {
    if R::PROJECTION.is_none() {
        return match serde_json::from_value(payload) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!("ignoring undecodable {} change: {e}", R::TABLE);
                None
            }
        };
    }
    match fetch_one::<R, _>(client, id).await {
        Ok(row) => row,
        Err(e) => {
            warn!("failed to re-fetch {} row {id}: {e}", R::TABLE);
            None
        }
    }
}
