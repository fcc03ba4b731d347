//! Scope tasks shared by the live watchers.
//!
//! A watcher runs one task per scope (table + key or filters). Rescoping
//! cancels the running task and spawns a new one that first waits for its
//! predecessor to finish, so the old subscription is always released before
//! the new one is opened. Every scope also gets a generation number; writes
//! from a task whose generation is no longer current are dropped, which
//! keeps a superseded fetch from landing after a rescope.

use crate::client::{RemoteDataClient, Subscription};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A running scope task.
pub(crate) struct ScopeTask {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ScopeTask {
    /// Spawns `run` with a fresh cancellation token.
    pub(crate) fn spawn<F, Fut>(run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(token.clone()));
        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Cancels the task and hands back its join handle so a successor can
    /// wait for the teardown to finish.
    pub(crate) fn cancel(mut self) -> Option<JoinHandle<()>> {
        self.token.cancel();
        self.handle.take()
    }
}

impl Drop for ScopeTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Write access to a watcher's published state, bound to one generation.
pub(crate) struct Publisher<S> {
    sender: Arc<watch::Sender<S>>,
    current: Arc<AtomicU64>,
    generation: u64,
}

impl<S> Publisher<S> {
    /// Applies `modify` if this generation is still current. `modify`
    /// returns whether it changed anything; receivers are only woken on
    /// change.
    pub(crate) fn update(&self, modify: impl FnOnce(&mut S) -> bool) -> bool {
        let current = &self.current;
        let generation = self.generation;
        self.sender.send_if_modified(|state| {
            if current.load(Ordering::Acquire) != generation {
                return false;
            }
            modify(state)
        })
    }

    /// Reads the published state.
    pub(crate) fn peek<T>(&self, read: impl FnOnce(&S) -> T) -> T {
        read(&self.sender.borrow())
    }

    pub(crate) fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }
}

/// Owner side of a watcher's state: hands out publishers per generation.
pub(crate) struct StateCell<S> {
    sender: Arc<watch::Sender<S>>,
    current: Arc<AtomicU64>,
}

impl<S> StateCell<S> {
    pub(crate) fn new(initial: S) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
            current: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Starts a new generation, invalidating every earlier publisher, and
    /// replaces the state with `reset`.
    pub(crate) fn next_generation(&self, reset: S) -> Publisher<S> {
        let generation = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        self.sender.send_replace(reset);
        Publisher {
            sender: self.sender.clone(),
            current: self.current.clone(),
            generation,
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<S> {
        self.sender.subscribe()
    }

    pub(crate) fn borrow(&self) -> watch::Ref<'_, S> {
        self.sender.borrow()
    }
}

/// Awaits `fut` unless `token` fires first.
pub(crate) async fn unless_cancelled<T>(
    token: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Option<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        value = fut => Some(value),
    }
}

/// Releases a subscription, logging the outcome.
pub(crate) async fn release(client: &dyn RemoteDataClient, subscription: Subscription) {
    let channel = subscription.scope().channel_name();
    match client.unsubscribe(subscription).await {
        Ok(()) => debug!(%channel, "unsubscribed"),
        Err(e) => warn!(%channel, "failed to unsubscribe: {e}"),
    }
}
