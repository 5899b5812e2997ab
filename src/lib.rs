//! Working-day task tracker.
//!
//! Projects plan their tasks one day at a time. Once a day has elapsed, the reconciliation
//! pass settles what happened to each of its tasks: abandoned work is closed and carried into
//! the next day, and partially done or deferred work is queued for the next planning window.
//! Hosts drive everything through [`Tracker`] and decide when to call [`Tracker::refresh`].

pub mod admission;
pub mod clock;
pub mod db;
pub mod errors;
pub mod graph;
pub mod metrics;
pub mod models;
pub mod queue;
pub mod reconcile;
pub mod resolver;
pub mod status;
pub mod tracker;

pub use clock::{Clock, FixedClock, SystemClock};
pub use errors::{AdmissionError, AppError, AppResult};
pub use graph::{Graph, GraphStore};
pub use models::{
    AppSettings, BucketEntry, Category, CreateProjectPayload, CreateTaskPayload, Day, PassReport, Project,
    ProjectCategory, ProjectOverview, ProjectStatus, QueueKind, Task, TaskOutcome, TaskState,
};
pub use tracker::Tracker;

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs the JSON file logger under `<data_dir>/logs`. Fails if a global subscriber is
/// already set; hosts may ignore that.
pub fn init_tracing(data_dir: &Path) -> Result<(), String> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "workday.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
