//! User write actions.
//!
//! Every action is a direct request against the data platform. Nothing is
//! applied to local state: the live watchers pick the result up from the
//! change stream. Failures are logged and turned into an error notification.

use crate::config::SignInSettings;
use crate::view::ViewState;
use gamenight_sync::{AuthClient, Identity, RemoteDataClient, SyncResult};
use gamenight_types::{
    ActivityId, EventId, Filter, Platform, Player, PlayerActivityMetadata, PlayerId, Record, Rsvp,
    Vote,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

/// Severity of a [`Notification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
    /// Needs acknowledging before the user can carry on.
    Alert,
}

/// Message shown to the user after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message)
    }

    pub fn alert(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Alert, message)
    }

    fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Result of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The write went through.
    Completed(Notification),
    /// The platform rejected the write.
    Failed(Notification),
    /// Voting needs an RSVP first. Ask the user, then call
    /// [`Actions::confirm_rsvp_and_vote`].
    ConfirmRsvp { activity: ActivityId },
    /// Refused locally; nothing was sent.
    Blocked(Notification),
    /// No player profile or no active event to act on.
    Unavailable,
}

impl ActionOutcome {
    /// The notification to show, if any.
    pub fn notification(&self) -> Option<&Notification> {
        match self {
            Self::Completed(n) | Self::Failed(n) | Self::Blocked(n) => Some(n),
            Self::ConfirmRsvp { .. } | Self::Unavailable => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Profile fields a player can edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: String,
    pub platforms: Vec<Platform>,
}

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 30;

const VOTE_SUBMITTED: &str = "Submitted your vote!";
const VOTE_REMOVED: &str = "Removed your vote!";
const VOTE_SUBMIT_FAILED: &str = "There was an error submitting your vote. Please try again.";
const VOTE_REMOVE_FAILED: &str = "There was an error removing your vote. Please try again.";
const RSVP_ADDED: &str = "You've RSVPed for game night tonight! You better show up.";
const RSVP_REMOVED: &str = "You've removed your RSVP for game night tonight. This is so sad.";
const RSVP_ADD_FAILED: &str = "There was an error RSVPing you for tonight. Please try again.";
const RSVP_REMOVE_FAILED: &str = "There was an error removing your RSVP. Please try again.";
const RSVP_HAS_VOTES: &str = "You've already voted on activities for tonight. Remove those votes first if you want to take back your RSVP.";
const PROFILE_UPDATED: &str = "Your player profile has been updated.";
const PROFILE_FAILED: &str = "There was an error updating your profile. Please try again.";
const PREFERENCE_FAILED: &str = "There was an error saving that preference. Please try again.";
const SIGN_IN_FAILED: &str = "There was an error signing in. Please try again later.";
const SIGN_OUT_FAILED: &str = "There was an error signing out. Please try again.";

/// Issues writes on behalf of the signed-in player.
#[derive(Clone)]
pub struct Actions {
    data: Arc<dyn RemoteDataClient>,
    auth: Arc<dyn AuthClient>,
    sign_in: SignInSettings,
}

impl Actions {
    pub fn new(
        data: Arc<dyn RemoteDataClient>,
        auth: Arc<dyn AuthClient>,
        sign_in: SignInSettings,
    ) -> Self {
        Self {
            data,
            auth,
            sign_in,
        }
    }

    // ── Votes ───────────────────────────────────────────────────

    /// Votes for `activity`, or removes the vote if the player already cast
    /// one. Voting without an RSVP asks for confirmation instead.
    pub async fn toggle_vote(&self, view: &ViewState, activity: ActivityId) -> ActionOutcome {
        let Some((player, event)) = voter(view) else {
            return ActionOutcome::Unavailable;
        };
        if view.has_voted(player, activity) {
            let filters = [
                Filter::eq("event_id", event),
                Filter::eq("activity_id", activity),
                Filter::eq("player_id", player),
            ];
            return outcome(
                self.data.delete(Vote::TABLE, &filters).await,
                Notification::info(VOTE_REMOVED),
                VOTE_REMOVE_FAILED,
            );
        }
        if !view.is_rsvped(player) {
            return ActionOutcome::ConfirmRsvp { activity };
        }
        self.insert_vote(player, event, activity).await
    }

    /// RSVPs for the active event and then votes for `activity`. The vote
    /// is only sent once the RSVP has been accepted.
    pub async fn confirm_rsvp_and_vote(
        &self,
        view: &ViewState,
        activity: ActivityId,
    ) -> ActionOutcome {
        let Some((player, event)) = voter(view) else {
            return ActionOutcome::Unavailable;
        };
        if !view.is_rsvped(player) {
            let rsvp = self.insert_rsvp(player, event).await;
            if !rsvp.is_completed() {
                return rsvp;
            }
        }
        self.insert_vote(player, event, activity).await
    }

    async fn insert_vote(
        &self,
        player: PlayerId,
        event: EventId,
        activity: ActivityId,
    ) -> ActionOutcome {
        let row = json!({"event_id": event, "activity_id": activity, "player_id": player});
        outcome(
            self.data.insert(Vote::TABLE, row).await,
            Notification::success(VOTE_SUBMITTED),
            VOTE_SUBMIT_FAILED,
        )
    }

    // ── RSVPs ───────────────────────────────────────────────────

    /// RSVPs for the active event, or takes the RSVP back. Taking it back
    /// is refused while the player still has votes for the event.
    pub async fn toggle_rsvp(&self, view: &ViewState) -> ActionOutcome {
        let Some((player, event)) = voter(view) else {
            return ActionOutcome::Unavailable;
        };
        if !view.is_rsvped(player) {
            return self.insert_rsvp(player, event).await;
        }
        if view.has_any_vote(player) {
            return ActionOutcome::Blocked(Notification::alert(RSVP_HAS_VOTES));
        }
        let filters = [Filter::eq("player_id", player), Filter::eq("event_id", event)];
        outcome(
            self.data.delete(Rsvp::TABLE, &filters).await,
            Notification::info(RSVP_REMOVED),
            RSVP_REMOVE_FAILED,
        )
    }

    async fn insert_rsvp(&self, player: PlayerId, event: EventId) -> ActionOutcome {
        let row = json!({"event_id": event, "player_id": player});
        outcome(
            self.data.insert(Rsvp::TABLE, row).await,
            Notification::success(RSVP_ADDED),
            RSVP_ADD_FAILED,
        )
    }

    // ── Activity preferences ────────────────────────────────────

    /// Marks `activity` as a favorite of the player, or clears the mark.
    pub async fn set_favorite(
        &self,
        view: &ViewState,
        activity: ActivityId,
        favorite: bool,
    ) -> ActionOutcome {
        let message = if favorite {
            "Added to your favorites."
        } else {
            "Removed from your favorites."
        };
        self.upsert_preference(view, activity, json!({"is_favorite": favorite}), message)
            .await
    }

    /// Records whether the player has `activity` installed and ready.
    pub async fn set_setup(
        &self,
        view: &ViewState,
        activity: ActivityId,
        setup: bool,
    ) -> ActionOutcome {
        let message = if setup {
            "Marked as set up."
        } else {
            "Marked as not set up."
        };
        self.upsert_preference(view, activity, json!({"is_setup": setup}), message)
            .await
    }

    async fn upsert_preference(
        &self,
        view: &ViewState,
        activity: ActivityId,
        flags: Value,
        message: &str,
    ) -> ActionOutcome {
        let Some(player) = view.player_id() else {
            return ActionOutcome::Unavailable;
        };
        let mut row = json!({"player_id": player, "activity_id": activity});
        if let (Some(row), Value::Object(flags)) = (row.as_object_mut(), flags) {
            row.extend(flags);
        }
        let result = self
            .data
            .upsert(
                PlayerActivityMetadata::TABLE,
                row,
                &["player_id", "activity_id"],
            )
            .await;
        outcome(result, Notification::success(message), PREFERENCE_FAILED)
    }

    // ── Profile ─────────────────────────────────────────────────

    /// Updates the player's display name and platforms.
    pub async fn update_profile(&self, view: &ViewState, update: ProfileUpdate) -> ActionOutcome {
        let Some(player) = view.player_id() else {
            return ActionOutcome::Unavailable;
        };
        let name = update.name.trim();
        let length = name.chars().count();
        if !(NAME_MIN..=NAME_MAX).contains(&length) {
            return ActionOutcome::Blocked(Notification::error(format!(
                "Your name must be between {NAME_MIN} and {NAME_MAX} characters."
            )));
        }
        let mut platforms: Vec<Platform> = Vec::new();
        for platform in update.platforms {
            if !platforms.contains(&platform) {
                platforms.push(platform);
            }
        }
        let patch = json!({"name": name, "platforms": platforms});
        let filters = [Filter::eq("id", player)];
        outcome(
            self.data.update(Player::TABLE, patch, &filters).await,
            Notification::success(PROFILE_UPDATED),
            PROFILE_FAILED,
        )
    }

    // ── Session ─────────────────────────────────────────────────

    /// Starts OAuth sign-in and returns the URL to send the user to.
    /// Failures come back as an alert.
    pub async fn sign_in(&self) -> Result<String, Notification> {
        self.auth
            .sign_in_with_oauth(&self.sign_in.provider, &self.sign_in.redirect_url)
            .await
            .map_err(|e| {
                warn!(provider = %self.sign_in.provider, "sign-in failed: {e}");
                Notification::alert(SIGN_IN_FAILED)
            })
    }

    /// Completes sign-in with the tokens from the provider callback.
    pub async fn complete_sign_in(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<Identity, Notification> {
        match self.auth.set_session(access_token, refresh_token).await {
            Ok(identity) => {
                info!(user = %identity.id, "signed in");
                Ok(identity)
            }
            Err(e) => {
                warn!("completing sign-in failed: {e}");
                Err(Notification::alert(SIGN_IN_FAILED))
            }
        }
    }

    pub async fn sign_out(&self) -> ActionOutcome {
        match self.auth.sign_out().await {
            Ok(()) => ActionOutcome::Completed(Notification::info("Signed out.")),
            Err(e) => {
                warn!("sign-out failed: {e}");
                ActionOutcome::Failed(Notification::alert(SIGN_OUT_FAILED))
            }
        }
    }
}

fn outcome(result: SyncResult<()>, success: Notification, failure: &str) -> ActionOutcome {
    match result {
        Ok(()) => ActionOutcome::Completed(success),
        Err(e) => {
            warn!(kind = ?e.kind(), "write failed: {e}");
            ActionOutcome::Failed(Notification::error(failure))
        }
    }
}

/// The player and event a vote or RSVP is for.
fn voter(view: &ViewState) -> Option<(PlayerId, EventId)> {
    Some((view.player_id()?, view.active_event.as_ref()?.id))
}
