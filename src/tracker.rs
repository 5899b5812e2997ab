use crate::admission;
use crate::clock::Clock;
use crate::db::Database;
use crate::errors::{AdmissionError, AppError, AppResult};
use crate::graph::{self, Graph, GraphStore};
use crate::metrics;
use crate::models::{
    AppSettings, BucketEntry, CreateProjectPayload, CreateTaskPayload, Day, PassReport, Project, ProjectCategory,
    ProjectOverview, ProjectStatus, QueueKind, Task, TaskDraft, TaskOutcome, TaskState,
};
use crate::queue;
use crate::reconcile;
use crate::resolver;
use crate::status;
use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

const DATABASE_FILE: &str = "workday.db";

/// Entry point for hosts. Owns the store and the time source and exposes every operation
/// the tracker supports.
pub struct Tracker {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl Tracker {
    pub fn open(data_dir: PathBuf, clock: Arc<dyn Clock>) -> AppResult<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let db = Database::new(&data_dir.join(DATABASE_FILE))?;
        tracing::info!(data_dir = %data_dir.display(), "tracker opened");
        Ok(Self { db, clock })
    }

    pub fn create_project(&self, payload: CreateProjectPayload) -> AppResult<Project> {
        let name = required_name(&payload.name, "project name")?;
        let settings = self.db.get_settings()?;

        let project = Project {
            id: Uuid::new_v4().to_string(),
            name,
            starting_time: payload.starting_time.unwrap_or(settings.default_starting_time),
            closing_time: payload.closing_time.unwrap_or(settings.default_closing_time),
            closing_time_tolerance: payload
                .closing_time_tolerance
                .unwrap_or(settings.default_closing_time_tolerance),
            max_categories: payload.max_categories.unwrap_or(settings.default_max_categories),
            max_tasks: payload.max_tasks.unwrap_or(settings.default_max_tasks),
            notify_closing_time: payload
                .notify_closing_time
                .unwrap_or(settings.default_notify_closing_time),
            creation_date: self.clock.now(),
            utc_offset_minutes: payload
                .utc_offset_minutes
                .unwrap_or(settings.default_utc_offset_minutes),
        };

        status::validate_schedule(
            project.starting_time,
            project.closing_time,
            project.closing_time_tolerance,
            project.utc_offset_minutes,
        )
        .map_err(AppError::Invalid)?;
        if project.max_categories == 0 || project.max_tasks == 0 {
            return Err(AppError::Invalid("category and task limits must be at least 1".to_string()));
        }

        let categories = payload
            .categories
            .iter()
            .map(|name| required_name(name, "category name"))
            .collect::<AppResult<Vec<_>>>()?;
        if categories.len() > project.max_categories as usize {
            return Err(AdmissionError::CategoryLimitReached(project.max_categories).into());
        }

        self.db.insert_project(&project, &categories)?;
        tracing::info!(project_id = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    /// Opens the first working day of a project that has none.
    pub fn start_project(&self, project_id: &str) -> AppResult<Day> {
        let now = self.clock.now();
        let day = self.db.atomically(|graph| {
            let project = graph::require_project(graph, project_id)?;
            if !graph.list_days(project_id)?.is_empty() {
                return Err(AppError::Conflict(format!("project {} has already started", project_id)));
            }
            let today = status::local_today(project.utc_offset_minutes, now);
            resolver::resolve_or_create_day(graph, &project, today)
        })?;
        tracing::info!(project_id = %project_id, date = %day.date, "project started");
        Ok(day)
    }

    pub fn get_project(&self, project_id: &str) -> AppResult<Project> {
        self.db.atomically(|graph| graph::require_project(graph, project_id))
    }

    pub fn list_projects(&self) -> AppResult<Vec<Project>> {
        self.db.list_projects()
    }

    pub fn delete_project(&self, project_id: &str) -> AppResult<()> {
        if !self.db.delete_project(project_id)? {
            return Err(AppError::NotFound(format!("project {}", project_id)));
        }
        tracing::info!(project_id = %project_id, "project deleted");
        Ok(())
    }

    pub fn project_status(&self, project_id: &str) -> AppResult<ProjectStatus> {
        let now = self.clock.now();
        self.db.atomically(|graph| {
            let project = graph::require_project(graph, project_id)?;
            let dates = graph::day_dates(graph, project_id)?;
            Ok(status::status(&project, &dates, now))
        })
    }

    pub fn can_add_task(&self, project_id: &str) -> AppResult<()> {
        let now = self.clock.now();
        self.db.atomically(|graph| {
            let project = graph::require_project(graph, project_id)?;
            let dates = graph::day_dates(graph, project_id)?;
            let templates = graph.list_project_categories(project_id)?;
            admission::can_add_task(&project, &dates, templates.len(), now)?;
            Ok(())
        })
    }

    pub fn add_project_category(&self, project_id: &str, name: &str) -> AppResult<ProjectCategory> {
        let name = required_name(name, "category name")?;
        let category = self.db.atomically(|graph| {
            let project = graph::require_project(graph, project_id)?;
            let count = graph.list_project_categories(project_id)?.len();
            admission::check_category_limit(&project, count)?;
            graph.insert_project_category(project_id, &name)
        })?;
        tracing::info!(project_id = %project_id, name = %category.name, "project category added");
        Ok(category)
    }

    pub fn list_project_categories(&self, project_id: &str) -> AppResult<Vec<ProjectCategory>> {
        self.db.atomically(|graph| {
            graph::require_project(graph, project_id)?;
            graph.list_project_categories(project_id)
        })
    }

    pub fn remove_project_category(&self, project_id: &str, name: &str) -> AppResult<()> {
        if !self.db.remove_project_category(project_id, name)? {
            return Err(AppError::NotFound(format!("category '{}' in project {}", name, project_id)));
        }
        Ok(())
    }

    /// Plans a task into the day currently open for planning.
    pub fn add_task(&self, project_id: &str, payload: CreateTaskPayload) -> AppResult<Task> {
        let now = self.clock.now();
        let task = self.db.atomically(|graph| plan_task(graph, project_id, &payload, now))?;
        tracing::info!(project_id = %project_id, task_id = %task.id, state = %task.state, "task added");
        Ok(task)
    }

    pub fn set_task_completion(&self, task_id: &str, completion_percentage: f64) -> AppResult<Task> {
        if !(0.0..=100.0).contains(&completion_percentage) {
            return Err(AppError::Invalid(format!(
                "completion must be between 0 and 100, got {}",
                completion_percentage
            )));
        }
        self.mutate_task(task_id, |task| task.completion_percentage = completion_percentage)
    }

    pub fn set_task_state(&self, task_id: &str, state: TaskState) -> AppResult<Task> {
        self.mutate_task(task_id, |task| task.state = state)
    }

    fn mutate_task<F>(&self, task_id: &str, change: F) -> AppResult<Task>
    where
        F: FnOnce(&mut Task),
    {
        self.db.atomically(|graph| {
            let mut task = graph
                .task(task_id)?
                .ok_or_else(|| AppError::NotFound(format!("task {}", task_id)))?;
            if task.migrated {
                return Err(AppError::Conflict(format!(
                    "task {} was carried forward and is kept as history",
                    task_id
                )));
            }
            change(&mut task);
            graph.update_task(&task)?;
            Ok(task)
        })
    }

    pub fn list_days(&self, project_id: &str) -> AppResult<Vec<Day>> {
        self.db.atomically(|graph| {
            graph::require_project(graph, project_id)?;
            graph.list_days(project_id)
        })
    }

    pub fn day_tasks(&self, project_id: &str, date: NaiveDate) -> AppResult<Vec<Task>> {
        self.db.atomically(|graph| match graph.find_day(project_id, date)? {
            Some(day) => graph.list_day_tasks(&day.id),
            None => Ok(Vec::new()),
        })
    }

    pub fn queued_tasks(&self, project_id: &str, kind: QueueKind) -> AppResult<Vec<Task>> {
        self.db.atomically(|graph| graph.queued_tasks(project_id, kind))
    }

    pub fn reconcile_task(&self, task_id: &str) -> AppResult<TaskOutcome> {
        reconcile::reconcile(&self.db, task_id, self.clock.now())
    }

    pub fn close_elapsed_days(&self, project_id: &str) -> AppResult<PassReport> {
        self.get_project(project_id)?;
        reconcile::close_elapsed_days(&self.db, project_id, self.clock.now())
    }

    pub fn carry_queued_tasks(&self, project_id: &str) -> AppResult<usize> {
        queue::carry_queued_tasks(&self.db, project_id, self.clock.now())
    }

    /// Host lifecycle hook: closes whatever has elapsed, then carries queued work into the
    /// day being planned. Safe to call as often as the host likes.
    pub fn refresh(&self, project_id: &str) -> AppResult<(PassReport, usize)> {
        let report = self.close_elapsed_days(project_id)?;
        let carried = self.carry_queued_tasks(project_id)?;
        Ok((report, carried))
    }

    pub fn add_bucket_entry(&self, project_id: &str, name: &str, priority: i32) -> AppResult<BucketEntry> {
        let project = self.get_project(project_id)?;
        let entry = BucketEntry {
            id: Uuid::new_v4().to_string(),
            project_id: project.id,
            name: required_name(name, "bucket entry name")?,
            priority,
            creation_date: self.clock.now(),
            utc_offset_minutes: project.utc_offset_minutes,
        };
        self.db.insert_bucket_entry(&entry)?;
        Ok(entry)
    }

    pub fn list_bucket_entries(&self, project_id: &str) -> AppResult<Vec<BucketEntry>> {
        self.db.list_bucket_entries(project_id)
    }

    pub fn remove_bucket_entry(&self, entry_id: &str) -> AppResult<()> {
        if !self.db.delete_bucket_entry(entry_id)? {
            return Err(AppError::NotFound(format!("bucket entry {}", entry_id)));
        }
        Ok(())
    }

    /// Turns a bucket entry into a task of the planning day. The task is created and the
    /// entry removed in one unit of work.
    pub fn promote_bucket_entry(
        &self,
        entry_id: &str,
        category: &str,
        initial_state: Option<TaskState>,
    ) -> AppResult<Task> {
        let entry = self
            .db
            .get_bucket_entry(entry_id)?
            .ok_or_else(|| AppError::NotFound(format!("bucket entry {}", entry_id)))?;
        self.close_elapsed_days(&entry.project_id)?;
        let now = self.clock.now();
        let task = self
            .db
            .atomically(|graph| promote_entry(graph, &entry, category, initial_state, now))?;
        tracing::info!(entry_id = %entry.id, task_id = %task.id, "bucket entry promoted");
        Ok(task)
    }

    pub fn day_success_rate(&self, project_id: &str, date: NaiveDate) -> AppResult<f64> {
        Ok(metrics::day_success_rate(&self.day_tasks(project_id, date)?))
    }

    pub fn project_success_rate(&self, project_id: &str) -> AppResult<f64> {
        self.db.atomically(|graph| running_success_rate(graph, project_id))
    }

    pub fn overview(&self, project_id: &str) -> AppResult<ProjectOverview> {
        let now = self.clock.now();
        self.db.atomically(|graph| {
            let project = graph::require_project(graph, project_id)?;
            let dates = graph::day_dates(graph, project_id)?;
            Ok(ProjectOverview {
                status: status::status(&project, &dates, now),
                success_rate: running_success_rate(graph, project_id)?,
                pending_queue_len: graph.queued_tasks(project_id, QueueKind::Pending)?.len(),
                dilate_queue_len: graph.queued_tasks(project_id, QueueKind::Dilate)?.len(),
                project,
            })
        })
    }

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        self.db.get_settings()
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        self.db.update_settings(update)
    }
}

/// Admission, template lookup and the per-day limit, then the insert. All inside the
/// caller's unit of work.
fn plan_task(
    graph: &dyn Graph,
    project_id: &str,
    payload: &CreateTaskPayload,
    now: DateTime<Utc>,
) -> AppResult<Task> {
    let name = required_name(&payload.name, "task name")?;
    let state = payload.initial_state.unwrap_or(TaskState::Pending);
    if !matches!(state, TaskState::Pending | TaskState::Dilate) {
        return Err(AppError::Invalid(format!("a new task cannot start as {}", state)));
    }

    let project = graph::require_project(graph, project_id)?;
    let dates = graph::day_dates(graph, project_id)?;
    let templates = graph.list_project_categories(project_id)?;
    admission::can_add_task(&project, &dates, templates.len(), now)?;

    let template = templates
        .iter()
        .find(|template| template.name.eq_ignore_ascii_case(payload.category.trim()))
        .ok_or_else(|| AppError::Invalid(format!("unknown category '{}'", payload.category)))?;
    let planning_date = status::operating_window(&project, &dates, now)
        .planning_date()
        .ok_or_else(|| AppError::Internal("no day is open for planning".to_string()))?;

    let day = resolver::resolve_or_create_day(graph, &project, planning_date)?;
    admission::check_task_limit(&project, graph.list_day_tasks(&day.id)?.len())?;
    let category = resolver::resolve_or_create_category(graph, &day, &template.name)?;
    graph.insert_task(&category.id, &TaskDraft::new(&name, payload.note.as_deref(), state, now))
}

fn promote_entry(
    graph: &dyn Graph,
    entry: &BucketEntry,
    category: &str,
    initial_state: Option<TaskState>,
    now: DateTime<Utc>,
) -> AppResult<Task> {
    let payload = CreateTaskPayload {
        category: category.to_string(),
        name: entry.name.clone(),
        note: None,
        initial_state,
    };
    let task = plan_task(graph, &entry.project_id, &payload, now)?;
    if !graph.delete_bucket_entry(&entry.id)? {
        return Err(AppError::NotFound(format!("bucket entry {}", entry.id)));
    }
    Ok(task)
}

fn running_success_rate(graph: &dyn Graph, project_id: &str) -> AppResult<f64> {
    graph::require_project(graph, project_id)?;
    let mut rates = Vec::new();
    for day in graph.list_days(project_id)? {
        rates.push(metrics::day_success_rate(&graph.list_day_tasks(&day.id)?));
    }
    Ok(metrics::project_success_rate(&rates))
}

fn required_name(raw: &str, what: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Invalid(format!("{} cannot be empty", what)));
    }
    Ok(trimmed.to_string())
}
