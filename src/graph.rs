//! The entity-graph collaborator seen by the engine.
//!
//! `Graph` is the set of reads and writes the engine needs. `GraphStore` hands out a `Graph`
//! for the duration of one atomic unit of work. The engine never reaches the storage any
//! other way.

use crate::errors::{AppError, AppResult};
use crate::models::{Category, Day, Project, ProjectCategory, QueueKind, Task, TaskDraft};
use chrono::NaiveDate;

pub trait Graph {
    fn project(&self, project_id: &str) -> AppResult<Option<Project>>;
    fn list_project_categories(&self, project_id: &str) -> AppResult<Vec<ProjectCategory>>;
    /// Fails with `Conflict` when the project already has a template with that name.
    fn insert_project_category(&self, project_id: &str, name: &str) -> AppResult<ProjectCategory>;

    fn day(&self, day_id: &str) -> AppResult<Option<Day>>;
    /// Days of a project, oldest first.
    fn list_days(&self, project_id: &str) -> AppResult<Vec<Day>>;
    fn find_day(&self, project_id: &str, date: NaiveDate) -> AppResult<Option<Day>>;
    fn insert_day(&self, project_id: &str, date: NaiveDate, utc_offset_minutes: i32) -> AppResult<Day>;

    fn category(&self, category_id: &str) -> AppResult<Option<Category>>;
    fn list_categories(&self, day_id: &str) -> AppResult<Vec<Category>>;
    /// Name lookup is case-insensitive.
    fn find_category(&self, day_id: &str, name: &str) -> AppResult<Option<Category>>;
    fn insert_category(&self, day_id: &str, name: &str) -> AppResult<Category>;

    fn task(&self, task_id: &str) -> AppResult<Option<Task>>;
    fn list_day_tasks(&self, day_id: &str) -> AppResult<Vec<Task>>;
    fn insert_task(&self, category_id: &str, draft: &TaskDraft) -> AppResult<Task>;
    /// Persists every mutable field of `task`, including its category.
    fn update_task(&self, task: &Task) -> AppResult<()>;

    /// Adds a reference to the queue. Returns `false`, leaving the queue untouched, when the
    /// task is already queued.
    fn enqueue(&self, project_id: &str, kind: QueueKind, task_id: &str) -> AppResult<bool>;
    fn dequeue(&self, project_id: &str, kind: QueueKind, task_id: &str) -> AppResult<bool>;
    fn queued_tasks(&self, project_id: &str, kind: QueueKind) -> AppResult<Vec<Task>>;

    fn delete_bucket_entry(&self, entry_id: &str) -> AppResult<bool>;
}

/// Runs units of work against the entity graph.
///
/// `atomically` must commit all writes made through the `Graph` when `work` returns `Ok` and
/// none of them otherwise. When called from several threads, implementations must serialize
/// units of work that touch the same days.
pub trait GraphStore {
    fn atomically<T, F>(&self, work: F) -> AppResult<T>
    where
        F: FnOnce(&dyn Graph) -> AppResult<T>;
}

/// A task together with everything that owns it.
#[derive(Debug, Clone)]
pub struct TaskLocation {
    pub task: Task,
    pub category: Category,
    pub day: Day,
    pub project: Project,
}

pub fn locate_task(graph: &dyn Graph, task_id: &str) -> AppResult<TaskLocation> {
    let task = graph
        .task(task_id)?
        .ok_or_else(|| AppError::NotFound(format!("task {}", task_id)))?;
    let category = graph
        .category(&task.category_id)?
        .ok_or_else(|| AppError::Internal(format!("task {} has no category", task_id)))?;
    let day = graph
        .day(&category.day_id)?
        .ok_or_else(|| AppError::Internal(format!("category {} has no day", category.id)))?;
    let project = graph
        .project(&day.project_id)?
        .ok_or_else(|| AppError::Internal(format!("day {} has no project", day.id)))?;
    Ok(TaskLocation {
        task,
        category,
        day,
        project,
    })
}

pub fn day_dates(graph: &dyn Graph, project_id: &str) -> AppResult<Vec<NaiveDate>> {
    Ok(graph
        .list_days(project_id)?
        .into_iter()
        .map(|day| day.date)
        .collect())
}

pub fn require_project(graph: &dyn Graph, project_id: &str) -> AppResult<Project> {
    graph
        .project(project_id)?
        .ok_or_else(|| AppError::NotFound(format!("project {}", project_id)))
}
