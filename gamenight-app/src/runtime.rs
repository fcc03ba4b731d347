//! Composition root.
//!
//! [`GameNight`] owns the session watcher and one live watcher per table,
//! keeps their scopes in step with each other, and republishes the combined
//! [`ViewState`] whenever any of them changes:
//!
//! - the player watcher follows the signed-in user's id;
//! - votes and RSVPs follow the active event and are disabled without one;
//! - the active event is recomputed from the roster on every change and on a
//!   periodic tick so it rolls over at midnight.

use crate::active_event::{ActiveEventRule, select_active_event};
use crate::view::ViewState;
use chrono::{DateTime, FixedOffset, Local};
use gamenight_sync::{AuthClient, LiveRow, LiveRows, RemoteDataClient, SessionWatcher};
use gamenight_types::{Activity, GameEvent, Player, RowFilters, RsvpWithPlayer, VoteWithPlayer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Source of the current time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock in the local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Runtime settings.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub rule: ActiveEventRule,
    /// How often the active event is re-evaluated without a roster change.
    pub refresh_interval: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            rule: ActiveEventRule::default(),
            refresh_interval: Duration::from_secs(60),
        }
    }
}

/// Running game night client state.
///
/// Dropping it (or cancelling its token) stops every watcher and releases
/// their subscriptions.
pub struct GameNight {
    view: watch::Receiver<Arc<ViewState>>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl GameNight {
    /// Starts the watchers against the system clock.
    pub fn start(
        data: Arc<dyn RemoteDataClient>,
        auth: Arc<dyn AuthClient>,
        options: RuntimeOptions,
    ) -> Self {
        Self::with_clock(data, auth, options, Arc::new(SystemClock))
    }

    /// Starts the watchers with an explicit clock.
    pub fn with_clock(
        data: Arc<dyn RemoteDataClient>,
        auth: Arc<dyn AuthClient>,
        options: RuntimeOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let token = CancellationToken::new();
        let (tx, rx) = watch::channel(Arc::new(ViewState::default()));
        let task = tokio::spawn(run(data, auth, options, clock, tx, token.clone()));
        Self {
            view: rx,
            token,
            task: Some(task),
        }
    }

    /// Receiver for view changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ViewState>> {
        self.view.clone()
    }

    /// Current snapshot.
    pub fn view(&self) -> Arc<ViewState> {
        self.view.borrow().clone()
    }

    /// Waits until every watcher has finished loading.
    pub async fn settled(&self) -> Arc<ViewState> {
        self.wait_for(|view| view.is_settled()).await
    }

    /// Waits for a snapshot matching `pred`. Returns the last snapshot if
    /// the runtime stops first.
    pub async fn wait_for(&self, mut pred: impl FnMut(&ViewState) -> bool) -> Arc<ViewState> {
        let mut rx = self.subscribe();
        match rx.wait_for(|view| pred(view)).await {
            Ok(view) => view.clone(),
            Err(_) => self.view(),
        }
    }

    /// Token that stops the runtime when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stops the runtime and waits for its watchers to shut down.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for GameNight {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run(
    data: Arc<dyn RemoteDataClient>,
    auth: Arc<dyn AuthClient>,
    options: RuntimeOptions,
    clock: Arc<dyn Clock>,
    tx: watch::Sender<Arc<ViewState>>,
    token: CancellationToken,
) {
    let session = SessionWatcher::start(auth.as_ref());
    let mut player = LiveRow::<Player>::new(data.clone());
    let events = LiveRows::<GameEvent>::with_filters(data.clone(), RowFilters::All);
    let activities = LiveRows::<Activity>::with_filters(data.clone(), RowFilters::All);
    let mut votes = LiveRows::<VoteWithPlayer>::new(data.clone());
    let mut rsvps = LiveRows::<RsvpWithPlayer>::new(data);

    let mut session_rx = session.subscribe();
    let mut player_rx = player.subscribe();
    let mut events_rx = events.subscribe();
    let mut activities_rx = activities.subscribe();
    let mut votes_rx = votes.subscribe();
    let mut rsvps_rx = rsvps.subscribe();

    let mut refresh = tokio::time::interval(options.refresh_interval);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut session_open = true;

    info!(rule = ?options.rule, "game night runtime started");
    loop {
        let session_state = session_rx.borrow_and_update().clone();
        let user_id = session_state.user.as_ref().map(|user| user.id);
        if player.key() != user_id.as_ref() {
            debug!(user = ?user_id, "rescoping player");
            player.set_key(user_id);
        }

        let events_state = events_rx.borrow_and_update().clone();
        let active_event =
            select_active_event(events_state.rows(), &clock.now(), options.rule).cloned();
        let filters = match &active_event {
            Some(event) => RowFilters::scoped_eq("event_id", event.id),
            None => RowFilters::Disabled,
        };
        if votes.filters() != Some(&filters) {
            debug!(event = ?active_event.as_ref().map(|e| e.id), "rescoping votes and rsvps");
            votes.set_filters(filters.clone());
            rsvps.set_filters(filters);
        }

        let next = ViewState {
            session: session_state,
            player: player_rx.borrow_and_update().clone().into(),
            events: events_state.into(),
            active_event,
            activities: activities_rx.borrow_and_update().clone().into(),
            votes: votes_rx.borrow_and_update().clone().into(),
            rsvps: rsvps_rx.borrow_and_update().clone().into(),
        };
        tx.send_if_modified(|current| {
            if **current == next {
                return false;
            }
            *current = Arc::new(next);
            true
        });

        tokio::select! {
            _ = token.cancelled() => break,
            changed = session_rx.changed(), if session_open => {
                if changed.is_err() {
                    debug!("session watcher stopped");
                    session_open = false;
                }
            }
            _ = player_rx.changed() => {}
            _ = events_rx.changed() => {}
            _ = activities_rx.changed() => {}
            _ = votes_rx.changed() => {}
            _ = rsvps_rx.changed() => {}
            _ = refresh.tick() => {}
        }
    }
    info!("game night runtime stopped");
}
