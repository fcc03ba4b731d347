//! Single-row live watcher.
//!
//! Fetches one record by key and keeps it current from change events scoped
//! to that key. Inserts and updates replace the stored row outright
//! (last writer wins); a delete clears it.

use crate::cache::apply_single;
use crate::client::{ChangeEvent, RemoteDataClient, fetch_one};
use crate::error::SyncError;
use crate::scope::{Publisher, ScopeTask, StateCell, release, unless_cancelled};
use gamenight_types::{Record, SubscriptionScope};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Published state of a [`LiveRow`].
#[derive(Debug, Clone, PartialEq)]
pub struct RowState<R> {
    pub loading: bool,
    pub error: Option<SyncError>,
    pub row: Option<R>,
}

impl<R> RowState<R> {
    fn settled_empty() -> Self {
        Self {
            loading: false,
            error: None,
            row: None,
        }
    }

    fn loading() -> Self {
        Self {
            loading: true,
            error: None,
            row: None,
        }
    }
}

impl<R> Default for RowState<R> {
    fn default() -> Self {
        Self::settled_empty()
    }
}

/// Keeps one row of `R` in sync with the platform.
pub struct LiveRow<R: Record> {
    client: Arc<dyn RemoteDataClient>,
    key: Option<R::Id>,
    state: StateCell<RowState<R>>,
    task: Option<ScopeTask>,
}

impl<R: Record> LiveRow<R> {
    /// Creates a watcher with no key. It is settled, empty and idle.
    pub fn new(client: Arc<dyn RemoteDataClient>) -> Self {
        Self {
            client,
            key: None,
            state: StateCell::new(RowState::settled_empty()),
            task: None,
        }
    }

    /// Creates a watcher and immediately scopes it to `key`.
    pub fn with_key(client: Arc<dyn RemoteDataClient>, key: Option<R::Id>) -> Self {
        let mut live = Self::new(client);
        live.set_key(key);
        live
    }

    /// Current key.
    pub fn key(&self) -> Option<&R::Id> {
        self.key.as_ref()
    }

    /// Rescopes the watcher. Setting the current key again is a no-op.
    ///
    /// With no key the watcher settles to "no record" without fetching or
    /// subscribing.
    pub fn set_key(&mut self, key: Option<R::Id>) {
        if key == self.key && (key.is_none() || self.task.is_some()) {
            return;
        }
        let previous = self.task.take().and_then(ScopeTask::cancel);
        self.key = key.clone();

        let Some(key) = key else {
            self.state.next_generation(RowState::settled_empty());
            return;
        };

        let publisher = self.state.next_generation(RowState::loading());
        let client = self.client.clone();
        self.task = Some(ScopeTask::spawn(move |token| {
            run_scope(client, key, publisher, previous, token)
        }));
    }

    /// Receiver for state changes.
    pub fn subscribe(&self) -> watch::Receiver<RowState<R>> {
        self.state.subscribe()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> RowState<R> {
        self.state.borrow().clone()
    }

    /// Waits until the current scope has finished loading.
    pub async fn settled(&self) -> RowState<R> {
        let mut rx = self.subscribe();
        match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }
}

async fn run_scope<R: Record>(
    client: Arc<dyn RemoteDataClient>,
    key: R::Id,
    publisher: Publisher<RowState<R>>,
    previous: Option<JoinHandle<()>>,
    token: CancellationToken,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }
    if !publisher.is_current() {
        return;
    }

    let scope = SubscriptionScope::new(R::TABLE, Some(R::id_filter(&key)));
    let channel = scope.channel_name();
    let Some(subscribed) = unless_cancelled(&token, client.subscribe(scope)).await else {
        return;
    };
    let mut subscription = match subscribed {
        Ok(subscription) => {
            debug!(%channel, "subscribed to {} row {key}", R::TABLE);
            Some(subscription)
        }
        Err(e) => {
            warn!(%channel, "subscription failed, row will not update: {e}");
            None
        }
    };

    let Some(fetched) = unless_cancelled(&token, fetch_one::<R, _>(client.as_ref(), &key)).await
    else {
        if let Some(subscription) = subscription {
            release(client.as_ref(), subscription).await;
        }
        return;
    };
    publisher.update(|state| {
        match fetched {
            Ok(row) => {
                state.row = row;
                state.error = None;
            }
            Err(e) => {
                warn!("failed to fetch {} row {key}: {e}", R::TABLE);
                state.row = None;
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
        apply_event::<R>(&publisher, &key, event);
    }

    if let Some(subscription) = subscription {
        release(client.as_ref(), subscription).await;
    }
}

fn apply_event<R: Record>(publisher: &Publisher<RowState<R>>, key: &R::Id, event: ChangeEvent) {
    let mut failure = None;
    publisher.update(|state| match apply_single(&mut state.row, key, &event) {
        Ok(changed) => changed,
        Err(e) => {
            failure = Some(e);
            false
        }
    });
    if let Some(e) = failure {
        warn!("ignoring undecodable {} change: {e}", R::TABLE);
    }
}
