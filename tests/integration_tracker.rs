use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use workday_ledger::{
    AdmissionError, AppError, CreateProjectPayload, CreateTaskPayload, FixedClock, ProjectStatus, QueueKind,
    TaskState, Tracker,
};

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, day, hour, minute, 0)
        .single()
        .expect("valid instant")
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, day).expect("valid date")
}

fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
}

fn payload(name: &str, categories: &[&str]) -> CreateProjectPayload {
    CreateProjectPayload {
        name: name.to_string(),
        starting_time: Some(time(9, 0)),
        closing_time: Some(time(17, 0)),
        closing_time_tolerance: Some(30),
        categories: categories.iter().map(|c| c.to_string()).collect(),
        ..CreateProjectPayload::default()
    }
}

fn task(category: &str, name: &str, state: Option<TaskState>) -> CreateTaskPayload {
    CreateTaskPayload {
        category: category.to_string(),
        name: name.to_string(),
        note: None,
        initial_state: state,
    }
}

#[test]
fn working_day_cycle_closes_carries_and_measures() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(FixedClock::new(at(1, 8, 0)));
    let tracker = Tracker::open(dir.path().join("data"), clock.clone()).expect("open tracker");

    let project = tracker
        .create_project(payload("Day job", &["Work", "Home"]))
        .expect("create project");
    assert_eq!(tracker.project_status(&project.id).expect("status"), ProjectStatus::NotStarted);
    let err = tracker.can_add_task(&project.id).expect_err("not started");
    assert!(matches!(
        err,
        AppError::Admission(AdmissionError::InvalidProjectStatus(ProjectStatus::NotStarted))
    ));

    let first_day = tracker.start_project(&project.id).expect("start");
    assert_eq!(first_day.date, date(1));
    assert_eq!(tracker.project_status(&project.id).expect("status"), ProjectStatus::FirstDay);
    assert!(matches!(
        tracker.start_project(&project.id),
        Err(AppError::Conflict(_))
    ));

    let email = tracker.add_task(&project.id, task("work", "email", None)).expect("email");
    let report = tracker.add_task(&project.id, task("Work", "report", None)).expect("report");
    let read = tracker.add_task(&project.id, task("Work", "read", None)).expect("read");
    let errand = tracker
        .add_task(&project.id, task("Home", "errand", Some(TaskState::Dilate)))
        .expect("errand");
    assert!(matches!(
        tracker.add_task(&project.id, task("Garden", "weed", None)),
        Err(AppError::Invalid(_))
    ));

    clock.set(at(1, 12, 0));
    tracker.set_task_completion(&email.id, 100.0).expect("complete email");
    tracker.set_task_state(&email.id, TaskState::Done).expect("email done");
    tracker.set_task_completion(&report.id, 50.0).expect("half report");
    assert!(matches!(
        tracker.set_task_completion(&report.id, 120.0),
        Err(AppError::Invalid(_))
    ));

    // Grace period: nothing elapsed yet and no planning allowed.
    clock.set(at(1, 17, 10));
    assert_eq!(tracker.project_status(&project.id).expect("status"), ProjectStatus::Closed);
    assert!(tracker.can_add_task(&project.id).is_err());
    let (report_closed, carried) = tracker.refresh(&project.id).expect("refresh while closed");
    assert_eq!(report_closed.examined, 0);
    assert_eq!(carried, 0);

    // Evening: the first day elapses and tomorrow is being planned.
    clock.set(at(1, 17, 45));
    assert_eq!(tracker.project_status(&project.id).expect("status"), ProjectStatus::Accepting);
    let (pass, carried) = tracker.refresh(&project.id).expect("refresh in the evening");
    assert_eq!(pass.examined, 3);
    assert_eq!(pass.abandoned, 1);
    assert_eq!(pass.migrated, 1);
    assert_eq!(pass.queued_pending, 1);
    assert_eq!(pass.queued_dilate, 1);
    assert_eq!(carried, 2);
    assert!(tracker.queued_tasks(&project.id, QueueKind::Pending).expect("queue").is_empty());
    assert!(tracker.queued_tasks(&project.id, QueueKind::Dilate).expect("queue").is_empty());

    let mut tomorrow: Vec<_> = tracker
        .day_tasks(&project.id, date(2))
        .expect("tomorrow")
        .into_iter()
        .map(|task| task.name)
        .collect();
    tomorrow.sort();
    assert_eq!(tomorrow, vec!["errand", "read", "report"]);

    let carried_report = tracker
        .day_tasks(&project.id, date(2))
        .expect("tomorrow")
        .into_iter()
        .find(|task| task.id == report.id)
        .expect("report moved");
    assert_eq!(carried_report.initial_completion_percentage, 50.0);
    assert_eq!(carried_report.creation_date, at(1, 17, 45));

    let original_read = tracker
        .day_tasks(&project.id, date(1))
        .expect("history")
        .into_iter()
        .find(|task| task.id == read.id)
        .expect("read stays as history");
    assert_eq!(original_read.state, TaskState::NotDone);
    assert!(original_read.migrated);
    assert!(matches!(
        tracker.set_task_state(&read.id, TaskState::Done),
        Err(AppError::Conflict(_))
    ));
    assert!(tracker
        .day_tasks(&project.id, date(1))
        .expect("history")
        .iter()
        .all(|task| task.id != errand.id));

    let repeat = tracker.refresh(&project.id).expect("repeat refresh");
    assert_eq!(repeat.0.examined, 0);
    assert_eq!(repeat.1, 0);

    let planned = tracker.add_task(&project.id, task("Home", "plan", None)).expect("plan");
    let days = tracker.list_days(&project.id).expect("days");
    assert_eq!(days.len(), 2);
    assert!(tracker
        .day_tasks(&project.id, date(2))
        .expect("tomorrow")
        .iter()
        .any(|task| task.id == planned.id));

    clock.set(at(2, 10, 0));
    assert_eq!(tracker.project_status(&project.id).expect("status"), ProjectStatus::Running);
    let err = tracker
        .add_task(&project.id, task("Work", "late idea", None))
        .expect_err("running");
    assert!(matches!(
        err,
        AppError::Admission(AdmissionError::InvalidProjectStatus(ProjectStatus::Running))
    ));

    assert_eq!(tracker.day_success_rate(&project.id, date(1)).expect("day rate"), 100.0);
    assert_eq!(tracker.day_success_rate(&project.id, date(2)).expect("day rate"), 0.0);
    assert_eq!(tracker.project_success_rate(&project.id).expect("project rate"), 50.0);

    let overview = tracker.overview(&project.id).expect("overview");
    assert_eq!(overview.status, ProjectStatus::Running);
    assert_eq!(overview.success_rate, 50.0);
    assert_eq!(overview.pending_queue_len, 0);
    assert_eq!(overview.dilate_queue_len, 0);
}

#[test]
fn bucket_entries_are_ordered_and_promoted_into_the_planning_day() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(FixedClock::new(at(3, 8, 0)));
    let tracker = Tracker::open(dir.path().to_path_buf(), clock.clone()).expect("open tracker");
    let project = tracker
        .create_project(payload("Side project", &["Build"]))
        .expect("create project");
    tracker.start_project(&project.id).expect("start");

    let low = tracker.add_bucket_entry(&project.id, "write docs", 1).expect("low");
    let high = tracker.add_bucket_entry(&project.id, "ship beta", 5).expect("high");
    let names: Vec<_> = tracker
        .list_bucket_entries(&project.id)
        .expect("bucket")
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(names, vec!["ship beta", "write docs"]);

    // The following day, during working hours, promotion is refused and the entry kept.
    clock.set(at(4, 7, 0));
    tracker.refresh(&project.id).expect("morning refresh");
    tracker
        .add_task(&project.id, task("Build", "morning task", None))
        .expect("accepting before opening");
    clock.set(at(4, 10, 0));
    let err = tracker
        .promote_bucket_entry(&high.id, "Build", None)
        .expect_err("running");
    assert!(matches!(err, AppError::Admission(_)));
    assert_eq!(tracker.list_bucket_entries(&project.id).expect("bucket").len(), 2);

    clock.set(at(4, 18, 0));
    let promoted = tracker
        .promote_bucket_entry(&high.id, "build", Some(TaskState::Dilate))
        .expect("promote");
    assert_eq!(promoted.name, "ship beta");
    assert_eq!(promoted.state, TaskState::Dilate);
    assert!(tracker
        .day_tasks(&project.id, date(5))
        .expect("planning day")
        .iter()
        .any(|task| task.id == promoted.id));

    let remaining = tracker.list_bucket_entries(&project.id).expect("bucket");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, low.id);
    tracker.remove_bucket_entry(&low.id).expect("remove");
    assert!(matches!(
        tracker.remove_bucket_entry(&low.id),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn project_limits_and_categories_are_enforced() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(FixedClock::new(at(8, 8, 0)));
    let tracker = Tracker::open(dir.path().to_path_buf(), clock.clone()).expect("open tracker");

    let inverted = CreateProjectPayload {
        starting_time: Some(time(18, 0)),
        closing_time: Some(time(9, 0)),
        ..payload("Backwards", &[])
    };
    assert!(matches!(tracker.create_project(inverted), Err(AppError::Invalid(_))));

    let project = tracker
        .create_project(CreateProjectPayload {
            max_categories: Some(2),
            max_tasks: Some(1),
            ..payload("Tight", &[])
        })
        .expect("create project");
    tracker.start_project(&project.id).expect("start");

    let err = tracker.add_task(&project.id, task("Work", "first", None)).expect_err("no categories");
    assert!(matches!(err, AppError::Admission(AdmissionError::NoCategories)));

    tracker.add_project_category(&project.id, "Work").expect("work");
    assert!(matches!(
        tracker.add_project_category(&project.id, "WORK"),
        Err(AppError::Conflict(_))
    ));
    tracker.add_project_category(&project.id, "Home").expect("home");
    assert!(matches!(
        tracker.add_project_category(&project.id, "Garden"),
        Err(AppError::Admission(AdmissionError::CategoryLimitReached(2)))
    ));

    tracker.add_task(&project.id, task("Work", "first", None)).expect("first");
    assert!(matches!(
        tracker.add_task(&project.id, task("Home", "second", None)),
        Err(AppError::Admission(AdmissionError::TaskLimitReached(1)))
    ));
    assert!(matches!(
        tracker.add_task(&project.id, task("Home", "done already", Some(TaskState::Done))),
        Err(AppError::Invalid(_))
    ));

    assert!(matches!(
        tracker.remove_project_category(&project.id, "work"),
        Err(AppError::Conflict(_))
    ));
    tracker.remove_project_category(&project.id, "Home").expect("remove unused");
    let names: Vec<_> = tracker
        .list_project_categories(&project.id)
        .expect("categories")
        .into_iter()
        .map(|category| category.name)
        .collect();
    assert_eq!(names, vec!["Work"]);
}

#[test]
fn settings_supply_defaults_and_data_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(FixedClock::new(at(9, 8, 0)));
    let project_id = {
        let tracker = Tracker::open(dir.path().to_path_buf(), clock.clone()).expect("open tracker");
        let settings = tracker
            .update_settings(serde_json::json!({
                "defaultClosingTimeTolerance": 45,
                "defaultUtcOffsetMinutes": 120
            }))
            .expect("update settings");
        assert_eq!(settings.default_closing_time_tolerance, 45);

        let project = tracker
            .create_project(CreateProjectPayload {
                name: "Defaults".to_string(),
                categories: vec!["Work".to_string()],
                ..CreateProjectPayload::default()
            })
            .expect("create project");
        assert_eq!(project.closing_time_tolerance, 45);
        assert_eq!(project.utc_offset_minutes, 120);
        assert_eq!(project.starting_time, time(9, 0));
        assert_eq!(project.closing_time, time(17, 0));
        assert_eq!(project.max_tasks, 50);
        project.id
    };

    let reopened = Tracker::open(dir.path().to_path_buf(), clock).expect("reopen tracker");
    assert_eq!(reopened.get_settings().expect("settings").default_closing_time_tolerance, 45);
    let projects = reopened.list_projects().expect("projects");
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].id, project_id);

    reopened.delete_project(&project_id).expect("delete");
    assert!(matches!(reopened.get_project(&project_id), Err(AppError::NotFound(_))));
    assert!(matches!(reopened.delete_project(&project_id), Err(AppError::NotFound(_))));
}

#[test]
fn init_tracing_creates_the_log_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let _ = workday_ledger::init_tracing(dir.path());
    assert!(dir.path().join("logs").is_dir());
}
