//! Picks "tonight's" event out of the event roster.
//!
//! Both rules evaluate calendar days in the time zone of the `now` passed in,
//! so callers decide whether "today" is local time or something else.

use chrono::{DateTime, Duration, TimeZone};
use gamenight_types::GameEvent;
use serde::{Deserialize, Serialize};

/// How an event's validity window is derived.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ActiveEventRule {
    /// Active for the whole calendar day the event starts on.
    #[default]
    SameDay,
    /// Active from its start until its explicit end, or until the end of the
    /// start day when no end is set.
    Interval,
}

/// The event active at `now`, if any. When several qualify the first in
/// roster order wins.
pub fn select_active_event<'a, Tz: TimeZone>(
    events: &'a [GameEvent],
    now: &DateTime<Tz>,
    rule: ActiveEventRule,
) -> Option<&'a GameEvent> {
    events.iter().find(|event| is_active(event, now, rule))
}

/// Whether `event` is active at `now` under `rule`.
pub fn is_active<Tz: TimeZone>(event: &GameEvent, now: &DateTime<Tz>, rule: ActiveEventRule) -> bool {
    let tz = now.timezone();
    let start = event.start_at.with_timezone(&tz);
    match rule {
        ActiveEventRule::SameDay => start.date_naive() == now.date_naive(),
        ActiveEventRule::Interval => {
            if *now < start {
                return false;
            }
            match event.end_at {
                Some(end) => *now <= end.with_timezone(&tz),
                None => end_of_day(&start).is_some_and(|midnight| *now < midnight),
            }
        }
    }
}

/// The soonest event starting after `now`.
pub fn next_event<'a, Tz: TimeZone>(events: &'a [GameEvent], now: &DateTime<Tz>) -> Option<&'a GameEvent> {
    events
        .iter()
        .filter(|event| event.start_at > *now)
        .min_by_key(|event| event.start_at)
}

/// First instant of the day after `at`, in `at`'s zone.
fn end_of_day<Tz: TimeZone>(at: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let next = at.date_naive().succ_opt()?.and_hms_opt(0, 0, 0)?;
    match at.timezone().from_local_datetime(&next).earliest() {
        Some(midnight) => Some(midnight),
        // Midnight skipped by a DST jump.
        None => at
            .timezone()
            .from_local_datetime(&(next + Duration::hours(1)))
            .earliest(),
    }
}
