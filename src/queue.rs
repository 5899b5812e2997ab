//! Pending and dilate queues.
//!
//! A queue is a per-project set of task references. Adding a reference twice is a no-op that
//! gets logged, never an error. `carry_queued_tasks` empties both queues into the day being
//! planned.

use crate::errors::{AppError, AppResult};
use crate::graph::{self, Graph, GraphStore};
use crate::models::{Day, Project, QueueKind, TaskState};
use crate::resolver;
use crate::status;
use chrono::{DateTime, Utc};

pub const DRAIN_ORDER: [QueueKind; 2] = [QueueKind::Pending, QueueKind::Dilate];

/// Adds `task_id` to the queue, returning whether the queue changed.
pub fn enqueue_logged(graph: &dyn Graph, project_id: &str, kind: QueueKind, task_id: &str) -> AppResult<bool> {
    let inserted = graph.enqueue(project_id, kind, task_id)?;
    if inserted {
        tracing::info!(project_id = %project_id, task_id = %task_id, queue = %kind, "task queued");
    } else {
        tracing::warn!(project_id = %project_id, task_id = %task_id, queue = %kind, "task already queued");
    }
    Ok(inserted)
}

/// Moves every queued task into `day` and clears the queues.
///
/// Relocated tasks keep their state and progress. Their creation date becomes `now` and
/// their initial completion is reset to the current completion, so progress is measured
/// from the moment they entered `day`. References to tasks that were closed in the meantime
/// are dropped without moving the task. Returns the number of tasks moved.
pub fn drain_into(graph: &dyn Graph, project: &Project, day: &Day, now: DateTime<Utc>) -> AppResult<usize> {
    let mut moved = 0;
    for kind in DRAIN_ORDER {
        for mut task in graph.queued_tasks(&project.id, kind)? {
            let relocate = matches!(task.state, TaskState::Pending | TaskState::Dilate);
            if relocate {
                let source = graph
                    .category(&task.category_id)?
                    .ok_or_else(|| AppError::Internal(format!("task {} has no category", task.id)))?;
                if source.day_id != day.id {
                    let target = resolver::resolve_or_create_category(graph, day, &source.name)?;
                    task.category_id = target.id;
                    task.initial_completion_percentage = task.completion_percentage;
                    task.creation_date = now;
                    graph.update_task(&task)?;
                    moved += 1;
                    tracing::info!(
                        project_id = %project.id,
                        task_id = %task.id,
                        queue = %kind,
                        day_id = %day.id,
                        "carried queued task"
                    );
                }
            } else {
                tracing::debug!(task_id = %task.id, state = %task.state, "dropping stale queue reference");
            }
            graph.dequeue(&project.id, kind, &task.id)?;
        }
    }
    Ok(moved)
}

/// Carries both queues into the planning day of `project_id`.
///
/// Does nothing, returning 0, unless the project is currently planning a day.
pub fn carry_queued_tasks<S: GraphStore>(store: &S, project_id: &str, now: DateTime<Utc>) -> AppResult<usize> {
    store.atomically(|graph| {
        let project = graph::require_project(graph, project_id)?;
        let dates = graph::day_dates(graph, project_id)?;
        let window = status::operating_window(&project, &dates, now);
        let planning_date = match window.planning_date() {
            Some(date) if window.status.accepts_tasks() => date,
            _ => {
                tracing::debug!(project_id = %project_id, status = %window.status, "queues left in place");
                return Ok(0);
            }
        };
        let day = resolver::resolve_or_create_day(graph, &project, planning_date)?;
        drain_into(graph, &project, &day, now)
    })
}
