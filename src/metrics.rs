use crate::models::{Task, TaskState};

/// Progress made during a day, as a percentage.
///
/// Averages `|completion - initial completion|` over the day's `done` and `pending` tasks.
/// Abandoned and deferred tasks do not count. A day with nothing to measure scores 0.
pub fn day_success_rate(tasks: &[Task]) -> f64 {
    let progress: Vec<f64> = tasks
        .iter()
        .filter(|task| matches!(task.state, TaskState::Done | TaskState::Pending))
        .map(|task| (task.completion_percentage - task.initial_completion_percentage).abs() / 100.0)
        .collect();
    mean(&progress) * 100.0
}

/// Mean of the per-day success rates.
pub fn project_success_rate(day_rates: &[f64]) -> f64 {
    mean(day_rates)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::{day_success_rate, project_success_rate};
    use crate::models::{Task, TaskState};
    use chrono::Utc;

    fn task(state: TaskState, cp: f64, icp: f64) -> Task {
        Task {
            id: format!("{}-{}", state, cp),
            category_id: "c".to_string(),
            name: "t".to_string(),
            note: None,
            state,
            completion_percentage: cp,
            initial_completion_percentage: icp,
            creation_date: Utc::now(),
            migrated: false,
        }
    }

    #[test]
    fn empty_inputs_score_zero() {
        assert_eq!(day_success_rate(&[]), 0.0);
        assert_eq!(project_success_rate(&[]), 0.0);
        assert_eq!(day_success_rate(&[task(TaskState::NotDone, 0.0, 0.0)]), 0.0);
    }

    #[test]
    fn day_rate_averages_progress_of_done_and_pending_tasks() {
        let tasks = [
            task(TaskState::Done, 100.0, 0.0),
            task(TaskState::Pending, 70.0, 20.0),
            task(TaskState::Dilate, 90.0, 0.0),
            task(TaskState::NotDone, 0.0, 0.0),
        ];
        assert!((day_success_rate(&tasks) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn project_rate_is_the_mean_of_day_rates() {
        assert!((project_success_rate(&[50.0, 100.0, 0.0]) - 50.0).abs() < 1e-9);
    }
}
