use crate::errors::AdmissionError;
use crate::models::Project;
use crate::status;
use chrono::{DateTime, NaiveDate, Utc};

/// Decides whether a task may be planned at `now`.
///
/// Status is time-dependent, so callers re-check immediately before every creation attempt.
pub fn can_add_task(
    project: &Project,
    day_dates: &[NaiveDate],
    category_count: usize,
    now: DateTime<Utc>,
) -> Result<(), AdmissionError> {
    let current = status::status(project, day_dates, now);
    if !current.accepts_tasks() {
        return Err(AdmissionError::InvalidProjectStatus(current));
    }
    if category_count == 0 {
        return Err(AdmissionError::NoCategories);
    }
    Ok(())
}

pub fn check_category_limit(project: &Project, category_count: usize) -> Result<(), AdmissionError> {
    if category_count >= project.max_categories as usize {
        return Err(AdmissionError::CategoryLimitReached(project.max_categories));
    }
    Ok(())
}

pub fn check_task_limit(project: &Project, tasks_in_day: usize) -> Result<(), AdmissionError> {
    if tasks_in_day >= project.max_tasks as usize {
        return Err(AdmissionError::TaskLimitReached(project.max_tasks));
    }
    Ok(())
}
