//! Next preferred run date of a job, computed from its history log.

use chrono::{DateTime, Duration, Utc};

use super::broker::DataBrokerScheduleConfig;
use super::history::{EventType, HistoryEvent};

/// A preferred date still ahead of `now` is a pending run; it survives a
/// recomputation when it is earlier than the newly computed date. A date at
/// or before `now` has been consumed by the run that just happened.
fn earliest_pending(
    current: Option<DateTime<Utc>>,
    computed: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match current {
        Some(current) if current > now && current < computed => current,
        _ => computed,
    }
}

/// `date + interval`; `None` when either is out of range.
fn after(date: DateTime<Utc>, interval: Option<Duration>) -> Option<DateTime<Utc>> {
    interval.and_then(|interval| date.checked_add_signed(interval))
}

/// A computed date that is out of range leaves only a still-pending current
/// date.
fn reschedule(
    current: Option<DateTime<Utc>>,
    computed: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match computed {
        Some(computed) => Some(earliest_pending(current, computed, now)),
        None => current.filter(|current| *current > now),
    }
}

pub fn scan_preferred_run_date(
    current: Option<DateTime<Utc>>,
    events: &[HistoryEvent],
    config: &DataBrokerScheduleConfig,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let Some(last) = events.last() else {
        return current;
    };

    match &last.event_type {
        EventType::NoMatchFound
        | EventType::MatchFound { .. }
        | EventType::OptOutConfirmed { .. }
        | EventType::Error { .. }
        | EventType::OptOutRequested { .. } => {
            let computed = after(last.date, config.interval_after(&last.event_type));
            reschedule(current, computed, now)
        }
        EventType::ScanStarted | EventType::OptOutStarted { .. } => current,
    }
}

pub fn opt_out_preferred_run_date(
    current: Option<DateTime<Utc>>,
    events: &[HistoryEvent],
    config: &DataBrokerScheduleConfig,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let Some(last) = events.last() else {
        return current;
    };

    match &last.event_type {
        EventType::MatchFound { profile_id } => {
            // Still listed long after the broker accepted the request.
            let ignored = events
                .iter()
                .rev()
                .find(|e| e.event_type == EventType::OptOutRequested { profile_id: *profile_id })
                .and_then(|requested| after(requested.date, config.maintenance_scan_interval()))
                .is_some_and(|expires| expires < now);
            if ignored { Some(now) } else { current }
        }
        EventType::Error { .. } => {
            let attempts = events
                .iter()
                .filter(|e| matches!(e.event_type, EventType::OptOutStarted { .. }))
                .count();
            if config.attempt_limit().is_some_and(|limit| attempts >= limit) {
                return None;
            }
            let computed = after(last.date, config.retry_error_interval());
            reschedule(current, computed, now)
        }
        EventType::OptOutRequested { .. } | EventType::OptOutConfirmed { .. } => None,
        EventType::NoMatchFound | EventType::ScanStarted | EventType::OptOutStarted { .. } => {
            current
        }
    }
}

/// Scan date after an opt-out request was accepted: the confirmation scan
/// is pulled forward unless an earlier scan is already pending.
pub fn confirm_opt_out_scan_date(
    current: Option<DateTime<Utc>>,
    config: &DataBrokerScheduleConfig,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    reschedule(current, after(now, config.confirm_opt_out_scan_interval()), now)
}
