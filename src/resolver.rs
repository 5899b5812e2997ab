use crate::errors::AppResult;
use crate::graph::Graph;
use crate::models::{Category, Day, Project};
use chrono::NaiveDate;

/// Returns the project's day for `date`, creating it if the project has none yet.
pub fn resolve_or_create_day(graph: &dyn Graph, project: &Project, date: NaiveDate) -> AppResult<Day> {
    if let Some(day) = graph.find_day(&project.id, date)? {
        return Ok(day);
    }
    let day = graph.insert_day(&project.id, date, project.utc_offset_minutes)?;
    tracing::info!(project_id = %project.id, day_id = %day.id, date = %date, "created day");
    Ok(day)
}

/// Returns the category of `day` named `name`, ignoring case, creating it when missing.
pub fn resolve_or_create_category(graph: &dyn Graph, day: &Day, name: &str) -> AppResult<Category> {
    if let Some(category) = graph.find_category(&day.id, name)? {
        return Ok(category);
    }
    let category = graph.insert_category(&day.id, name)?;
    tracing::info!(day_id = %day.id, category_id = %category.id, name = %name, "created category");
    Ok(category)
}

#[cfg(test)]
mod tests {
    use super::{resolve_or_create_category, resolve_or_create_day};
    use crate::db::Database;
    use crate::graph::GraphStore;
    use crate::models::Project;
    use chrono::{NaiveDate, NaiveTime, Utc};

    fn project() -> Project {
        Project {
            id: "p-1".to_string(),
            name: "Writing".to_string(),
            starting_time: NaiveTime::from_hms_opt(9, 0, 0).expect("time"),
            closing_time: NaiveTime::from_hms_opt(17, 0, 0).expect("time"),
            closing_time_tolerance: 30,
            max_categories: 10,
            max_tasks: 50,
            notify_closing_time: true,
            creation_date: Utc::now(),
            utc_offset_minutes: 60,
        }
    }

    #[test]
    fn resolving_twice_returns_the_same_day_and_category() {
        let db = Database::open_in_memory().expect("db");
        let project = project();
        db.insert_project(&project, &[]).expect("insert project");
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).expect("date");

        let (first_day, second_day, first_cat, second_cat, days, categories) = db
            .atomically(|graph| {
                let first_day = resolve_or_create_day(graph, &project, date)?;
                let second_day = resolve_or_create_day(graph, &project, date)?;
                let first_cat = resolve_or_create_category(graph, &first_day, "Drafts")?;
                let second_cat = resolve_or_create_category(graph, &second_day, "DRAFTS")?;
                let days = graph.list_days(&project.id)?;
                let categories = graph.list_categories(&first_day.id)?;
                Ok((first_day, second_day, first_cat, second_cat, days, categories))
            })
            .expect("resolve");

        assert_eq!(first_day, second_day);
        assert_eq!(first_day.utc_offset_minutes, 60);
        assert_eq!(first_cat, second_cat);
        assert_eq!(first_cat.name, "Drafts");
        assert_eq!(days.len(), 1);
        assert_eq!(categories.len(), 1);
    }
}
