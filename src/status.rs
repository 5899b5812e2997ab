//! Time-window evaluation for a project's working day.
//!
//! Everything here is pure: the status is derived from the project's schedule, the dates of
//! the days it already owns and the supplied instant, and is never persisted.

use crate::models::{Project, ProjectStatus};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

const SECONDS_PER_MINUTE: u32 = 60;
pub const SECONDS_PER_DAY: u32 = 24 * 60 * SECONDS_PER_MINUTE;

/// A project's status at one instant, plus the calendar facts needed to decide which of its
/// days may be closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingWindow {
    pub status: ProjectStatus,
    pub today: NaiveDate,
    planning_date: Option<NaiveDate>,
}

impl OperatingWindow {
    /// The day new tasks are planned into, when the status allows planning at all.
    pub fn planning_date(&self) -> Option<NaiveDate> {
        self.planning_date
    }

    /// Whether a day with this date has fully elapsed and may be reconciled.
    pub fn is_eligible(&self, date: NaiveDate) -> bool {
        match self.status {
            ProjectStatus::Accepting => self.planning_date.is_some_and(|planning| date < planning),
            ProjectStatus::Closed => date < self.today,
            ProjectStatus::NotStarted | ProjectStatus::FirstDay | ProjectStatus::Running => false,
        }
    }
}

pub fn status(project: &Project, day_dates: &[NaiveDate], now: DateTime<Utc>) -> ProjectStatus {
    operating_window(project, day_dates, now).status
}

pub fn operating_window(project: &Project, day_dates: &[NaiveDate], now: DateTime<Utc>) -> OperatingWindow {
    let local = local_now(project.utc_offset_minutes, now);
    let today = local.date();
    let clock = local.time().num_seconds_from_midnight();

    let starting = project.starting_time.num_seconds_from_midnight();
    let closing = project.closing_time.num_seconds_from_midnight();
    let grace_end = closing.saturating_add(project.closing_time_tolerance.saturating_mul(SECONDS_PER_MINUTE));

    let (status, planning_date) = if day_dates.is_empty() {
        (ProjectStatus::NotStarted, None)
    } else if clock >= grace_end {
        (ProjectStatus::Accepting, today.succ_opt())
    } else if clock >= closing {
        (ProjectStatus::Closed, None)
    } else if day_dates.len() == 1 && day_dates[0] == today {
        (ProjectStatus::FirstDay, Some(today))
    } else if clock >= starting {
        (ProjectStatus::Running, None)
    } else {
        // After midnight and before opening: still planning, but the planned day is today.
        (ProjectStatus::Accepting, Some(today))
    };

    OperatingWindow {
        status,
        today,
        planning_date,
    }
}

/// Wall-clock time at the project's fixed UTC offset.
pub fn local_now(utc_offset_minutes: i32, now: DateTime<Utc>) -> NaiveDateTime {
    match FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60)) {
        Some(offset) => now.with_timezone(&offset).naive_local(),
        None => now.naive_utc(),
    }
}

pub fn local_today(utc_offset_minutes: i32, now: DateTime<Utc>) -> NaiveDate {
    local_now(utc_offset_minutes, now).date()
}

/// Checks the schedule invariants the evaluator relies on: the working day opens before it
/// closes and the grace period ends before midnight.
pub fn validate_schedule(
    starting_time: NaiveTime,
    closing_time: NaiveTime,
    closing_time_tolerance: u32,
    utc_offset_minutes: i32,
) -> Result<(), String> {
    if closing_time <= starting_time {
        return Err("closing time must be later than starting time".to_string());
    }
    let grace_end = u64::from(closing_time.num_seconds_from_midnight())
        + u64::from(closing_time_tolerance) * u64::from(SECONDS_PER_MINUTE);
    if grace_end >= u64::from(SECONDS_PER_DAY) {
        return Err("closing time plus tolerance must end before midnight".to_string());
    }
    if FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60)).is_none() {
        return Err(format!("utc offset of {} minutes is out of range", utc_offset_minutes));
    }
    Ok(())
}
