use crate::errors::{AppError, AppResult};
use crate::graph::{Graph, GraphStore};
use crate::models::{
    AppSettings, BucketEntry, Category, Day, Project, ProjectCategory, QueueKind, Task, TaskDraft, TaskState,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const DATE_FORMAT: &str = "%Y-%m-%d";
const CLOCK_FORMAT: &str = "%H:%M:%S";

const PROJECT_COLUMNS: &str = "id, name, starting_time, closing_time, closing_time_tolerance, max_categories, max_tasks, notify_closing_time, creation_date, utc_offset_minutes";
const TASK_COLUMNS: &str = "t.id, t.category_id, t.name, t.note, t.state, t.completion_percentage, t.initial_completion_percentage, t.creation_date, t.migrated";

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::from)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.ensure_default_settings()?;
        Ok(db)
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    pub fn insert_project(&self, project: &Project, categories: &[String]) -> AppResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO projects (
               id, name, starting_time, closing_time, closing_time_tolerance, max_categories,
               max_tasks, notify_closing_time, creation_date, utc_offset_minutes
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                project.id,
                project.name,
                format_clock(project.starting_time),
                format_clock(project.closing_time),
                project.closing_time_tolerance,
                project.max_categories,
                project.max_tasks,
                if project.notify_closing_time { 1 } else { 0 },
                project.creation_date.to_rfc3339(),
                project.utc_offset_minutes,
            ],
        )?;
        for name in categories {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO project_categories (id, project_id, name) VALUES (?1, ?2, ?3)",
                params![Uuid::new_v4().to_string(), project.id, name],
            )?;
            if inserted == 0 {
                return Err(AppError::Conflict(format!("category '{}' is listed twice", name)));
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_projects(&self) -> AppResult<Vec<Project>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM projects ORDER BY creation_date ASC, name ASC",
            PROJECT_COLUMNS
        ))?;
        let projects = stmt
            .query_map([], parse_project_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    pub fn delete_project(&self, project_id: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM projects WHERE id = ?1", [project_id])?;
        Ok(deleted > 0)
    }

    /// Removes a category template. Refused while any day of the project still holds tasks
    /// under that name.
    pub fn remove_project_category(&self, project_id: &str, name: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let tasks_in_use: i64 = conn.query_row(
            "SELECT COUNT(1)
             FROM tasks t
             JOIN categories c ON c.id = t.category_id
             JOIN days d ON d.id = c.day_id
             WHERE d.project_id = ?1 AND c.name = ?2",
            params![project_id, name],
            |row| row.get(0),
        )?;
        if tasks_in_use > 0 {
            return Err(AppError::Conflict(format!(
                "category '{}' still holds {} task(s)",
                name, tasks_in_use
            )));
        }
        let deleted = conn.execute(
            "DELETE FROM project_categories WHERE project_id = ?1 AND name = ?2",
            params![project_id, name],
        )?;
        Ok(deleted > 0)
    }

    pub fn insert_bucket_entry(&self, entry: &BucketEntry) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO bucket_entries (id, project_id, name, priority, creation_date, utc_offset_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id,
                entry.project_id,
                entry.name,
                entry.priority,
                entry.creation_date.to_rfc3339(),
                entry.utc_offset_minutes,
            ],
        )?;
        Ok(())
    }

    pub fn list_bucket_entries(&self, project_id: &str) -> AppResult<Vec<BucketEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, priority, creation_date, utc_offset_minutes
             FROM bucket_entries WHERE project_id = ?1
             ORDER BY priority DESC, creation_date ASC",
        )?;
        let entries = stmt
            .query_map([project_id], parse_bucket_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn get_bucket_entry(&self, entry_id: &str) -> AppResult<Option<BucketEntry>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, project_id, name, priority, creation_date, utc_offset_minutes
             FROM bucket_entries WHERE id = ?1",
            [entry_id],
            parse_bucket_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn delete_bucket_entry(&self, entry_id: &str) -> AppResult<bool> {
        self.atomically(|graph| graph.delete_bucket_entry(entry_id))
    }

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = 'app'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(serde_json::from_str::<AppSettings>(&raw)?),
            None => Ok(AppSettings::default()),
        }
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        let current = self.get_settings()?;
        let mut merged = serde_json::to_value(current)?;
        merge_json(&mut merged, update);
        let settings: AppSettings =
            serde_json::from_value(merged).map_err(|error| AppError::Invalid(error.to_string()))?;
        crate::status::validate_schedule(
            settings.default_starting_time,
            settings.default_closing_time,
            settings.default_closing_time_tolerance,
            settings.default_utc_offset_minutes,
        )
        .map_err(AppError::Invalid)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at)
             VALUES ('app', ?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![serde_json::to_string(&settings)?, Utc::now().to_rfc3339()],
        )?;

        Ok(settings)
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value_json, updated_at) VALUES ('app', ?1, ?2)",
            params![
                serde_json::to_string(&AppSettings::default())?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn validate_migration_consistency(&self) -> AppResult<()> {
        let conn = self.lock()?;
        let orphaned: i64 = conn.query_row(
            "SELECT COUNT(1)
             FROM tasks t
             JOIN categories c ON c.id = t.category_id
             JOIN days d ON d.id = c.day_id
             WHERE t.migrated = 1
               AND NOT EXISTS (
                 SELECT 1
                 FROM tasks t2
                 JOIN categories c2 ON c2.id = t2.category_id
                 JOIN days d2 ON d2.id = c2.day_id
                 WHERE d2.project_id = d.project_id
                   AND d2.date = date(d.date, '+1 day')
                   AND c2.name = c.name
                   AND t2.name = t.name
               )",
            [],
            |row| row.get(0),
        )?;
        if orphaned > 0 {
            return Err(AppError::Internal(format!(
                "migration invariant violated: {} migrated tasks without a successor",
                orphaned
            )));
        }
        Ok(())
    }
}

impl GraphStore for Database {
    fn atomically<T, F>(&self, work: F) -> AppResult<T>
    where
        F: FnOnce(&dyn Graph) -> AppResult<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let result = work(&SqlGraph { conn: &tx });
        match result {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = tx.rollback() {
                    tracing::error!(error = %rollback_error, "failed to roll back unit of work");
                }
                Err(error)
            }
        }
    }
}

/// `Graph` over one open SQLite transaction.
pub struct SqlGraph<'a> {
    conn: &'a Connection,
}

impl Graph for SqlGraph<'_> {
    fn project(&self, project_id: &str) -> AppResult<Option<Project>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
                [project_id],
                parse_project_row,
            )
            .optional()
            .map_err(AppError::from)
    }

    fn list_project_categories(&self, project_id: &str) -> AppResult<Vec<ProjectCategory>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, name FROM project_categories WHERE project_id = ?1 ORDER BY name ASC",
        )?;
        let categories = stmt
            .query_map([project_id], |row| {
                Ok(ProjectCategory {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    fn insert_project_category(&self, project_id: &str, name: &str) -> AppResult<ProjectCategory> {
        let id = Uuid::new_v4().to_string();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO project_categories (id, project_id, name) VALUES (?1, ?2, ?3)",
            params![id, project_id, name],
        )?;
        if inserted == 0 {
            return Err(AppError::Conflict(format!(
                "there is already a category named '{}'",
                name
            )));
        }
        Ok(ProjectCategory {
            id,
            project_id: project_id.to_string(),
            name: name.to_string(),
        })
    }

    fn day(&self, day_id: &str) -> AppResult<Option<Day>> {
        self.conn
            .query_row(
                "SELECT id, project_id, date, utc_offset_minutes FROM days WHERE id = ?1",
                [day_id],
                parse_day_row,
            )
            .optional()
            .map_err(AppError::from)
    }

    fn list_days(&self, project_id: &str) -> AppResult<Vec<Day>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, date, utc_offset_minutes FROM days WHERE project_id = ?1 ORDER BY date ASC",
        )?;
        let days = stmt
            .query_map([project_id], parse_day_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(days)
    }

    fn find_day(&self, project_id: &str, date: NaiveDate) -> AppResult<Option<Day>> {
        self.conn
            .query_row(
                "SELECT id, project_id, date, utc_offset_minutes FROM days WHERE project_id = ?1 AND date = ?2",
                params![project_id, format_date(date)],
                parse_day_row,
            )
            .optional()
            .map_err(AppError::from)
    }

    fn insert_day(&self, project_id: &str, date: NaiveDate, utc_offset_minutes: i32) -> AppResult<Day> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO days (id, project_id, date, utc_offset_minutes) VALUES (?1, ?2, ?3, ?4)",
            params![id, project_id, format_date(date), utc_offset_minutes],
        )?;
        Ok(Day {
            id,
            project_id: project_id.to_string(),
            date,
            utc_offset_minutes,
        })
    }

    fn category(&self, category_id: &str) -> AppResult<Option<Category>> {
        self.conn
            .query_row(
                "SELECT id, day_id, name FROM categories WHERE id = ?1",
                [category_id],
                parse_category_row,
            )
            .optional()
            .map_err(AppError::from)
    }

    fn list_categories(&self, day_id: &str) -> AppResult<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, day_id, name FROM categories WHERE day_id = ?1 ORDER BY name ASC")?;
        let categories = stmt
            .query_map([day_id], parse_category_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    fn find_category(&self, day_id: &str, name: &str) -> AppResult<Option<Category>> {
        self.conn
            .query_row(
                "SELECT id, day_id, name FROM categories WHERE day_id = ?1 AND name = ?2",
                params![day_id, name],
                parse_category_row,
            )
            .optional()
            .map_err(AppError::from)
    }

    fn insert_category(&self, day_id: &str, name: &str) -> AppResult<Category> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO categories (id, day_id, name) VALUES (?1, ?2, ?3)",
            params![id, day_id, name],
        )?;
        Ok(Category {
            id,
            day_id: day_id.to_string(),
            name: name.to_string(),
        })
    }

    fn task(&self, task_id: &str) -> AppResult<Option<Task>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM tasks t WHERE t.id = ?1", TASK_COLUMNS),
                [task_id],
                parse_task_row,
            )
            .optional()
            .map_err(AppError::from)
    }

    fn list_day_tasks(&self, day_id: &str) -> AppResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {}
             FROM tasks t
             JOIN categories c ON c.id = t.category_id
             WHERE c.day_id = ?1
             ORDER BY c.name ASC, t.creation_date ASC, t.rowid ASC",
            TASK_COLUMNS
        ))?;
        let tasks = stmt
            .query_map([day_id], parse_task_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    fn insert_task(&self, category_id: &str, draft: &TaskDraft) -> AppResult<Task> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO tasks (
               id, category_id, name, note, state, completion_percentage,
               initial_completion_percentage, creation_date, migrated
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
            params![
                id,
                category_id,
                draft.name,
                draft.note,
                draft.state.as_str(),
                draft.completion_percentage,
                draft.initial_completion_percentage,
                draft.creation_date.to_rfc3339(),
            ],
        )?;
        Ok(Task {
            id,
            category_id: category_id.to_string(),
            name: draft.name.clone(),
            note: draft.note.clone(),
            state: draft.state,
            completion_percentage: draft.completion_percentage,
            initial_completion_percentage: draft.initial_completion_percentage,
            creation_date: draft.creation_date,
            migrated: false,
        })
    }

    fn update_task(&self, task: &Task) -> AppResult<()> {
        let updated = self.conn.execute(
            "UPDATE tasks
             SET category_id = ?1, name = ?2, note = ?3, state = ?4, completion_percentage = ?5,
                 initial_completion_percentage = ?6, creation_date = ?7, migrated = ?8
             WHERE id = ?9",
            params![
                task.category_id,
                task.name,
                task.note,
                task.state.as_str(),
                task.completion_percentage,
                task.initial_completion_percentage,
                task.creation_date.to_rfc3339(),
                if task.migrated { 1 } else { 0 },
                task.id,
            ],
        )?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("task {}", task.id)));
        }
        Ok(())
    }

    fn enqueue(&self, project_id: &str, kind: QueueKind, task_id: &str) -> AppResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO queue_entries (project_id, kind, task_id, seq, enqueued_at)
             VALUES (
               ?1, ?2, ?3,
               (SELECT COALESCE(MAX(seq), 0) + 1 FROM queue_entries WHERE project_id = ?1 AND kind = ?2),
               ?4
             )",
            params![project_id, kind.as_str(), task_id, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted == 1)
    }

    fn dequeue(&self, project_id: &str, kind: QueueKind, task_id: &str) -> AppResult<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM queue_entries WHERE project_id = ?1 AND kind = ?2 AND task_id = ?3",
            params![project_id, kind.as_str(), task_id],
        )?;
        Ok(deleted > 0)
    }

    fn delete_bucket_entry(&self, entry_id: &str) -> AppResult<bool> {
        let deleted = self.conn.execute("DELETE FROM bucket_entries WHERE id = ?1", [entry_id])?;
        Ok(deleted > 0)
    }

    fn queued_tasks(&self, project_id: &str, kind: QueueKind) -> AppResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {}
             FROM queue_entries q
             JOIN tasks t ON t.id = q.task_id
             WHERE q.project_id = ?1 AND q.kind = ?2
             ORDER BY q.seq ASC",
            TASK_COLUMNS
        ))?;
        let tasks = stmt
            .query_map(params![project_id, kind.as_str()], parse_task_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }
}

fn parse_project_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        starting_time: parse_clock(&row.get::<_, String>(2)?)?,
        closing_time: parse_clock(&row.get::<_, String>(3)?)?,
        closing_time_tolerance: row.get(4)?,
        max_categories: row.get(5)?,
        max_tasks: row.get(6)?,
        notify_closing_time: row.get::<_, i32>(7)? != 0,
        creation_date: parse_time(&row.get::<_, String>(8)?)?,
        utc_offset_minutes: row.get(9)?,
    })
}

fn parse_day_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Day> {
    Ok(Day {
        id: row.get(0)?,
        project_id: row.get(1)?,
        date: parse_date(&row.get::<_, String>(2)?)?,
        utc_offset_minutes: row.get(3)?,
    })
}

fn parse_category_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        day_id: row.get(1)?,
        name: row.get(2)?,
    })
}

fn parse_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        category_id: row.get(1)?,
        name: row.get(2)?,
        note: row.get(3)?,
        state: parse_task_state(&row.get::<_, String>(4)?)?,
        completion_percentage: row.get(5)?,
        initial_completion_percentage: row.get(6)?,
        creation_date: parse_time(&row.get::<_, String>(7)?)?,
        migrated: row.get::<_, i32>(8)? != 0,
    })
}

fn parse_bucket_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BucketEntry> {
    Ok(BucketEntry {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        priority: row.get(3)?,
        creation_date: parse_time(&row.get::<_, String>(4)?)?,
        utc_offset_minutes: row.get(5)?,
    })
}

fn parse_task_state(raw: &str) -> rusqlite::Result<TaskState> {
    match raw {
        "pending" => Ok(TaskState::Pending),
        "dilate" => Ok(TaskState::Dilate),
        "not-done" => Ok(TaskState::NotDone),
        "done" => Ok(TaskState::Done),
        other => Err(invalid_data(format!("Unknown task state '{}'", other))),
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn format_clock(time: NaiveTime) -> String {
    time.format(CLOCK_FORMAT).to_string()
}

fn parse_date(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|error| invalid_data(error.to_string()))
}

fn parse_clock(raw: &str) -> rusqlite::Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, CLOCK_FORMAT).map_err(|error| invalid_data(error.to_string()))
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| invalid_data(error.to_string()))
}

fn invalid_data(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
