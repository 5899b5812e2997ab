//! Day-close reconciliation.
//!
//! `reconcile` settles one task of an elapsed day. Each call is one unit of work against the
//! store, so a reader never sees an original marked as migrated without its duplicate in
//! place and queued. Repeating a call is harmless: abandoned tasks are flagged as migrated,
//! and queue inserts are set-like.

use crate::errors::{AppError, AppResult};
use crate::graph::{self, Graph, GraphStore, TaskLocation};
use crate::models::{PassReport, QueueKind, Task, TaskDraft, TaskOutcome, TaskSnapshot, TaskState};
use crate::queue;
use crate::resolver;
use crate::status;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

pub fn reconcile<S: GraphStore>(store: &S, task_id: &str, now: DateTime<Utc>) -> AppResult<TaskOutcome> {
    store.atomically(|graph| reconcile_task(graph, task_id, now))
}

/// Applies the day-close rules to one task, inside the caller's unit of work.
pub fn reconcile_task(graph: &dyn Graph, task_id: &str, now: DateTime<Utc>) -> AppResult<TaskOutcome> {
    let location = graph::locate_task(graph, task_id)?;
    let dates = graph::day_dates(graph, &location.project.id)?;
    let window = status::operating_window(&location.project, &dates, now);

    let mut outcome = TaskOutcome::default();
    if !window.is_eligible(location.day.date) {
        tracing::debug!(
            task_id = %task_id,
            date = %location.day.date,
            status = %window.status,
            "day not eligible for closing"
        );
        return Ok(outcome);
    }
    outcome.eligible = true;

    let project_id = location.project.id.clone();
    let mut task = location.task.clone();

    match task.state {
        TaskState::Pending => {
            if is_untouched(&task) {
                task.state = TaskState::NotDone;
                graph.update_task(&task)?;
                outcome.abandoned = true;
                tracing::info!(task_id = %task.id, "task abandoned");
            } else {
                record_enqueue(graph, &project_id, QueueKind::Pending, &task.id, &mut outcome)?;
            }
        }
        TaskState::Dilate => {
            record_enqueue(graph, &project_id, QueueKind::Dilate, &task.id, &mut outcome)?;
        }
        TaskState::NotDone | TaskState::Done => {}
    }

    if task.state == TaskState::NotDone && !task.migrated {
        let duplicate_id = migrate_forward(graph, &location, &mut task, now)?;
        outcome.migrated_to = Some(duplicate_id);
    }

    Ok(outcome)
}

/// A pending task that made no progress during its day.
fn is_untouched(task: &Task) -> bool {
    task.completion_percentage == 0.0
        || task.completion_percentage == task.initial_completion_percentage
}

fn record_enqueue(
    graph: &dyn Graph,
    project_id: &str,
    kind: QueueKind,
    task_id: &str,
    outcome: &mut TaskOutcome,
) -> AppResult<()> {
    if queue::enqueue_logged(graph, project_id, kind, task_id)? {
        outcome.queued = Some(kind);
    } else {
        outcome.already_queued = true;
    }
    Ok(())
}

/// Copies `task` into the next calendar day and queues the copy. `task` is flagged as
/// migrated last; any failure before that aborts the whole unit of work.
fn migrate_forward(
    graph: &dyn Graph,
    location: &TaskLocation,
    task: &mut Task,
    now: DateTime<Utc>,
) -> AppResult<String> {
    let next_date = location
        .day
        .date
        .succ_opt()
        .ok_or_else(|| AppError::Internal(format!("no day follows {}", location.day.date)))?;
    let target_day = resolver::resolve_or_create_day(graph, &location.project, next_date)?;

    let snapshot = TaskSnapshot::of(task, &location.category);
    let draft = TaskDraft::carried_from(&snapshot, now);
    let target_category = resolver::resolve_or_create_category(graph, &target_day, &snapshot.category_name)?;
    let duplicate = graph.insert_task(&target_category.id, &draft)?;

    if !queue::enqueue_logged(graph, &location.project.id, QueueKind::Pending, &duplicate.id)? {
        return Err(AppError::Conflict(format!(
            "duplicate {} of task {} was already queued",
            duplicate.id, task.id
        )));
    }

    task.migrated = true;
    graph.update_task(task)?;
    tracing::info!(
        task_id = %task.id,
        duplicate_id = %duplicate.id,
        date = %next_date,
        "task migrated forward"
    );
    Ok(duplicate.id)
}

/// Reconciles every open task of every eligible day of the project.
///
/// The scan repeats until it finds nothing new, so duplicates that land in a day which is
/// itself eligible are settled in the same pass. No task is reconciled twice per pass.
pub fn close_elapsed_days<S: GraphStore>(store: &S, project_id: &str, now: DateTime<Utc>) -> AppResult<PassReport> {
    let mut report = PassReport::default();
    let mut processed: HashSet<String> = HashSet::new();

    loop {
        let candidates = store.atomically(|graph| eligible_task_ids(graph, project_id, now))?;
        let fresh: Vec<String> = candidates
            .into_iter()
            .filter(|task_id| !processed.contains(task_id))
            .collect();
        if fresh.is_empty() {
            break;
        }
        for task_id in fresh {
            let outcome = reconcile(store, &task_id, now)?;
            report.record(&outcome);
            processed.insert(task_id);
        }
    }

    tracing::info!(
        project_id = %project_id,
        examined = report.examined,
        abandoned = report.abandoned,
        migrated = report.migrated,
        queued_pending = report.queued_pending,
        queued_dilate = report.queued_dilate,
        already_queued = report.already_queued,
        "closed elapsed days"
    );
    Ok(report)
}

/// Tasks of eligible days that still have a rule to go through, oldest day first.
fn eligible_task_ids(graph: &dyn Graph, project_id: &str, now: DateTime<Utc>) -> AppResult<Vec<String>> {
    let project = graph::require_project(graph, project_id)?;
    let days = graph.list_days(project_id)?;
    let dates: Vec<_> = days.iter().map(|day| day.date).collect();
    let window = status::operating_window(&project, &dates, now);

    let mut ids = Vec::new();
    for day in days.iter().filter(|day| window.is_eligible(day.date)) {
        for task in graph.list_day_tasks(&day.id)? {
            let settled = match task.state {
                TaskState::Done => true,
                TaskState::NotDone => task.migrated,
                TaskState::Pending | TaskState::Dilate => false,
            };
            if !settled {
                ids.push(task.id);
            }
        }
    }
    Ok(ids)
}
