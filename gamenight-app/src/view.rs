//! The aggregate read model shown to the user.

use gamenight_sync::{Identity, RowState, RowsState, SessionState, SyncError};
use gamenight_types::{
    Activity, ActivityId, EventId, GameEvent, Player, PlayerId, Record, RsvpWithPlayer,
    VoteWithPlayer,
};

/// A value plus the loading and error flags of the watcher behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct Loadable<T> {
    pub loading: bool,
    pub error: Option<SyncError>,
    pub data: T,
}

impl<T: Default> Loadable<T> {
    /// Nothing fetched yet.
    pub fn pending() -> Self {
        Self {
            loading: true,
            error: None,
            data: T::default(),
        }
    }

    /// Settled with `data`.
    pub fn ready(data: T) -> Self {
        Self {
            loading: false,
            error: None,
            data,
        }
    }
}

impl<R: Record> From<RowsState<R>> for Loadable<Vec<R>> {
    fn from(state: RowsState<R>) -> Self {
        let data = state.rows().to_vec();
        Self {
            loading: state.loading,
            error: state.error,
            data,
        }
    }
}

impl<R> From<RowState<R>> for Loadable<Option<R>> {
    fn from(state: RowState<R>) -> Self {
        Self {
            loading: state.loading,
            error: state.error,
            data: state.row,
        }
    }
}

/// Everything the user sees, as one immutable snapshot.
///
/// Votes and RSVPs only ever hold rows for `active_event`; both are empty
/// and settled when there is no active event.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub session: SessionState,
    pub player: Loadable<Option<Player>>,
    pub events: Loadable<Vec<GameEvent>>,
    pub active_event: Option<GameEvent>,
    pub activities: Loadable<Vec<Activity>>,
    pub votes: Loadable<Vec<VoteWithPlayer>>,
    pub rsvps: Loadable<Vec<RsvpWithPlayer>>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            session: SessionState::default(),
            player: Loadable::pending(),
            events: Loadable::pending(),
            active_event: None,
            activities: Loadable::pending(),
            votes: Loadable::pending(),
            rsvps: Loadable::pending(),
        }
    }
}

/// Votes for one activity, in roster order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteCount {
    pub activity: ActivityId,
    pub name: String,
    pub votes: usize,
    pub voters: Vec<String>,
}

/// Top-level screen implied by a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Loading,
    SignedOut,
    /// Signed in, but no player profile exists yet.
    PendingVerification,
    NoGameNight,
    GameNight,
}

impl ViewState {
    /// The signed-in user.
    pub fn user(&self) -> Option<&Identity> {
        self.session.user.as_ref()
    }

    /// The signed-in player's profile.
    pub fn player(&self) -> Option<&Player> {
        self.player.data.as_ref()
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player().map(|p| p.id)
    }

    /// True once every watcher has finished its initial load.
    pub fn is_settled(&self) -> bool {
        !self.session.loading
            && !self.player.loading
            && !self.events.loading
            && !self.activities.loading
            && !self.votes.loading
            && !self.rsvps.loading
    }

    /// Voting needs a profile and an event tonight.
    pub fn can_vote(&self) -> bool {
        self.player().is_some() && self.active_event.is_some()
    }

    /// Votes cast for `activity` at the active event.
    pub fn votes_for(&self, activity: ActivityId) -> Vec<&VoteWithPlayer> {
        self.votes
            .data
            .iter()
            .filter(|v| v.vote.activity_id == activity && self.is_active_event(v.vote.event_id))
            .collect()
    }

    /// Whether `player` voted for `activity` at the active event.
    pub fn has_voted(&self, player: PlayerId, activity: ActivityId) -> bool {
        self.votes_for(activity)
            .iter()
            .any(|v| v.vote.player_id == player)
    }

    /// Whether `player` has any vote at the active event.
    pub fn has_any_vote(&self, player: PlayerId) -> bool {
        self.votes
            .data
            .iter()
            .any(|v| v.vote.player_id == player && self.is_active_event(v.vote.event_id))
    }

    /// Whether `player` RSVPed for the active event.
    pub fn is_rsvped(&self, player: PlayerId) -> bool {
        self.rsvps
            .data
            .iter()
            .any(|r| r.rsvp.player_id == player && self.is_active_event(r.rsvp.event_id))
    }

    /// Display names of everyone attending the active event.
    pub fn attendees(&self) -> Vec<&str> {
        self.rsvps
            .data
            .iter()
            .filter(|r| self.is_active_event(r.rsvp.event_id))
            .map(|r| r.players.display())
            .collect()
    }

    /// Per-activity vote counts for the active event, in roster order.
    pub fn vote_tally(&self) -> Vec<VoteCount> {
        self.activities
            .data
            .iter()
            .map(|activity| {
                let votes = self.votes_for(activity.id);
                VoteCount {
                    activity: activity.id,
                    name: activity.name.clone(),
                    votes: votes.len(),
                    voters: votes.iter().map(|v| v.players.display().to_string()).collect(),
                }
            })
            .collect()
    }

    /// Activity with `id` in the roster.
    pub fn activity(&self, id: ActivityId) -> Option<&Activity> {
        self.activities.data.iter().find(|a| a.id == id)
    }

    /// Which screen the snapshot calls for.
    pub fn screen(&self) -> Screen {
        if self.session.loading {
            return Screen::Loading;
        }
        if self.user().is_none() {
            return Screen::SignedOut;
        }
        if self.player.loading || self.events.loading {
            return Screen::Loading;
        }
        if self.player().is_none() {
            return Screen::PendingVerification;
        }
        if self.active_event.is_none() {
            return Screen::NoGameNight;
        }
        Screen::GameNight
    }

    fn is_active_event(&self, event: EventId) -> bool {
        self.active_event.as_ref().is_some_and(|e| e.id == event)
    }
}
