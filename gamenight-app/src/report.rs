//! Plain-text rendering of a [`ViewState`] for the terminal.

use crate::active_event::next_event;
use crate::view::{Screen, ViewState};
use chrono::{DateTime, Local, TimeZone, Utc};
use std::fmt;

pub const TITLE: &str = "Rathskeller Game Night";

/// Renders the screen the snapshot calls for.
pub fn render<Tz: TimeZone>(view: &ViewState, now: &DateTime<Tz>) -> String {
    Report::new(view, now).to_string()
}

/// The screen for one snapshot, formatted through [`fmt::Display`].
pub struct Report<'a, Tz: TimeZone> {
    view: &'a ViewState,
    now: &'a DateTime<Tz>,
}

impl<'a, Tz: TimeZone> Report<'a, Tz> {
    pub fn new(view: &'a ViewState, now: &'a DateTime<Tz>) -> Self {
        Self { view, now }
    }

    fn game_night(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self.view;
        let (Some(event), Some(player)) = (&view.active_event, view.player()) else {
            return Ok(());
        };
        writeln!(f, "Tonight at {}", local_time(event.start_at))?;
        let attendees = view.attendees();
        writeln!(f, "Going ({}): {}", attendees.len(), attendees.join(", "))?;
        let going = if view.is_rsvped(player.id) {
            "going"
        } else {
            "not going"
        };
        writeln!(f, "You are {going}")?;
        writeln!(f)?;
        for count in view.vote_tally() {
            let mark = if view.has_voted(player.id, count.activity) {
                "*"
            } else {
                " "
            };
            let plural = if count.votes == 1 { "" } else { "s" };
            write!(
                f,
                "{mark} [{}] {} - {} vote{plural}",
                count.activity, count.name, count.votes
            )?;
            if !count.voters.is_empty() {
                write!(f, " ({})", count.voters.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl<Tz: TimeZone> fmt::Display for Report<'_, Tz> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self.view;
        writeln!(f, "{TITLE}")?;
        match view.screen() {
            Screen::Loading => writeln!(f, "Loading...")?,
            Screen::SignedOut => writeln!(f, "Not signed in. Run `gamenight login` to sign in.")?,
            Screen::PendingVerification => {
                writeln!(f, "Pending Verification")?;
                writeln!(
                    f,
                    "Your account has not been set up as a player yet. Ask an organizer to add you."
                )?;
            }
            Screen::NoGameNight => {
                writeln!(f, "No game night tonight!")?;
                if let Some(next) = next_event(&view.events.data, self.now) {
                    writeln!(f, "The next one is scheduled for {}.", local_time(next.start_at))?;
                }
            }
            Screen::GameNight => self.game_night(f)?,
        }
        for (what, error) in errors(view) {
            writeln!(f, "! could not load {what}: {error}")?;
        }
        Ok(())
    }
}

fn errors(view: &ViewState) -> Vec<(&'static str, String)> {
    [
        ("profile", view.player.error.as_ref()),
        ("events", view.events.error.as_ref()),
        ("activities", view.activities.error.as_ref()),
        ("votes", view.votes.error.as_ref()),
        ("rsvps", view.rsvps.error.as_ref()),
    ]
    .into_iter()
    .filter_map(|(what, error)| error.map(|e| (what, e.to_string())))
    .collect()
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%A, %B %-d at %-I:%M %p").to_string()
}
