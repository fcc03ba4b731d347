//! Session watcher: tracks the signed-in user.

use crate::client::{AuthClient, Identity};
use crate::scope::{ScopeTask, unless_cancelled};
use tokio::sync::watch;
use tracing::debug;

/// Published state of a [`SessionWatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// True until the first auth notification arrives.
    pub loading: bool,
    pub user: Option<Identity>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            loading: true,
            user: None,
        }
    }
}

/// Listens for auth state changes for as long as it is alive. Dropping it
/// deregisters the listener.
///
/// A dropped notification stream is not recovered; the last known user
/// stays published.
pub struct SessionWatcher {
    state: watch::Receiver<SessionState>,
    _task: ScopeTask,
}

impl SessionWatcher {
    /// Registers with `auth` and starts tracking.
    pub fn start(auth: &dyn AuthClient) -> Self {
        let mut listener = auth.on_auth_state_change();
        let (tx, rx) = watch::channel(SessionState::default());
        let task = ScopeTask::spawn(move |token| async move {
            while let Some(next) = unless_cancelled(&token, listener.next()).await {
                let Some(change) = next else {
                    debug!("auth state stream closed");
                    break;
                };
                debug!(event = ?change.event, signed_in = change.user.is_some(), "auth state changed");
                tx.send_if_modified(|state| {
                    let next = SessionState {
                        loading: false,
                        user: change.user,
                    };
                    if *state == next {
                        return false;
                    }
                    *state = next;
                    true
                });
            }
        });
        Self {
            state: rx,
            _task: task,
        }
    }

    /// Receiver for state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Waits for the first auth notification.
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.subscribe();
        match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }
}
