use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    NotStarted,
    FirstDay,
    Running,
    Closed,
    Accepting,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::FirstDay => "first-day",
            Self::Running => "running",
            Self::Closed => "closed",
            Self::Accepting => "accepting",
        }
    }

    /// New tasks may only be planned for a day that has not started yet.
    pub fn accepts_tasks(self) -> bool {
        matches!(self, Self::Accepting | Self::FirstDay)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Pending,
    Dilate,
    NotDone,
    Done,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dilate => "dilate",
            Self::NotDone => "not-done",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueKind {
    Pending,
    Dilate,
}

impl QueueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dilate => "dilate",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub starting_time: NaiveTime,
    pub closing_time: NaiveTime,
    /// Grace period after `closing_time`, in minutes.
    pub closing_time_tolerance: u32,
    pub max_categories: u32,
    pub max_tasks: u32,
    pub notify_closing_time: bool,
    pub creation_date: DateTime<Utc>,
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Day {
    pub id: String,
    pub project_id: String,
    pub date: NaiveDate,
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub day_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub category_id: String,
    pub name: String,
    pub note: Option<String>,
    pub state: TaskState,
    pub completion_percentage: f64,
    /// Completion recorded when the task entered its current day.
    pub initial_completion_percentage: f64,
    pub creation_date: DateTime<Utc>,
    pub migrated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCategory {
    pub id: String,
    pub project_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BucketEntry {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub priority: i32,
    pub creation_date: DateTime<Utc>,
    pub utc_offset_minutes: i32,
}

/// The fields carried forward when a task is duplicated into another day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub name: String,
    pub note: Option<String>,
    pub category_name: String,
}

impl TaskSnapshot {
    pub fn of(task: &Task, category: &Category) -> Self {
        Self {
            name: task.name.clone(),
            note: task.note.clone(),
            category_name: category.name.clone(),
        }
    }
}

/// A task that has not been attached to a category yet.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub name: String,
    pub note: Option<String>,
    pub state: TaskState,
    pub completion_percentage: f64,
    pub initial_completion_percentage: f64,
    pub creation_date: DateTime<Utc>,
}

impl TaskDraft {
    pub fn new(name: &str, note: Option<&str>, state: TaskState, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            note: note.map(ToString::to_string),
            state,
            completion_percentage: 0.0,
            initial_completion_percentage: 0.0,
            creation_date: now,
        }
    }

    /// Fresh pending copy of `snapshot`; progress starts over in the new day.
    pub fn carried_from(snapshot: &TaskSnapshot, now: DateTime<Utc>) -> Self {
        Self::new(&snapshot.name, snapshot.note.as_deref(), TaskState::Pending, now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub default_starting_time: NaiveTime,
    pub default_closing_time: NaiveTime,
    pub default_closing_time_tolerance: u32,
    pub default_max_categories: u32,
    pub default_max_tasks: u32,
    pub default_notify_closing_time: bool,
    pub default_utc_offset_minutes: i32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_starting_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            default_closing_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
            default_closing_time_tolerance: 30,
            default_max_categories: 10,
            default_max_tasks: 50,
            default_notify_closing_time: true,
            default_utc_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectPayload {
    pub name: String,
    pub starting_time: Option<NaiveTime>,
    pub closing_time: Option<NaiveTime>,
    pub closing_time_tolerance: Option<u32>,
    pub max_categories: Option<u32>,
    pub max_tasks: Option<u32>,
    pub notify_closing_time: Option<bool>,
    pub utc_offset_minutes: Option<i32>,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskPayload {
    pub category: String,
    pub name: String,
    pub note: Option<String>,
    pub initial_state: Option<TaskState>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectOverview {
    pub project: Project,
    pub status: ProjectStatus,
    pub success_rate: f64,
    pub pending_queue_len: usize,
    pub dilate_queue_len: usize,
}

/// What one `reconcile` call did to a single task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub eligible: bool,
    pub abandoned: bool,
    pub queued: Option<QueueKind>,
    pub already_queued: bool,
    pub migrated_to: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub examined: usize,
    pub abandoned: usize,
    pub queued_pending: usize,
    pub queued_dilate: usize,
    pub migrated: usize,
    pub already_queued: usize,
}

impl PassReport {
    pub fn record(&mut self, outcome: &TaskOutcome) {
        self.examined += 1;
        if outcome.abandoned {
            self.abandoned += 1;
        }
        match outcome.queued {
            Some(QueueKind::Pending) => self.queued_pending += 1,
            Some(QueueKind::Dilate) => self.queued_dilate += 1,
            None => {}
        }
        if outcome.already_queued {
            self.already_queued += 1;
        }
        if outcome.migrated_to.is_some() {
            self.migrated += 1;
        }
    }
}
