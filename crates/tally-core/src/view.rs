use tracing::trace;

use crate::state::{SortMode, State};
use crate::task::Task;

/// Derives the visible, ordered task list: scope to the effective
/// active project, narrow by the search string, then stable-sort.
pub fn visible_tasks<'a>(state: &'a State, query: Option<&str>, sort: SortMode) -> Vec<&'a Task> {
    let Some(project_id) = state.effective_active_project() else {
        return vec![];
    };

    let mut items: Vec<&Task> = state
        .tasks
        .iter()
        .filter(|t| t.project_id == Some(project_id))
        .collect();

    if let Some(query) = query {
        let needle = query.trim().to_lowercase();
        if !needle.is_empty() {
            items.retain(|t| matches_query(t, &needle));
        }
    }

    sort_tasks(&mut items, sort);
    trace!(count = items.len(), sort = sort.as_str(), "projected visible tasks");
    items
}

/// Case-insensitive substring match against the title or any tag.
fn matches_query(task: &Task, needle: &str) -> bool {
    task.title.to_lowercase().contains(needle)
        || task.tags.iter().any(|tag| tag.to_lowercase().contains(needle))
}

/// Stable sort: ties keep their prior relative order. Tasks without a
/// due date go last under both due orderings.
pub fn sort_tasks(items: &mut [&Task], sort: SortMode) {
    match sort {
        SortMode::CreatedAsc => items.sort_by_key(|t| t.created_at),
        SortMode::CreatedDesc => items.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortMode::DueAsc => items.sort_by_key(|t| {
            t.due_at.map(|d| d.timestamp_millis()).unwrap_or(i64::MAX)
        }),
        SortMode::DueDesc => items.sort_by(|a, b| {
            let ka = a.due_at.map(|d| d.timestamp_millis()).unwrap_or(i64::MIN);
            let kb = b.due_at.map(|d| d.timestamp_millis()).unwrap_or(i64::MIN);
            kb.cmp(&ka)
        }),
        SortMode::PriorityDesc => {
            items.sort_by(|a, b| b.priority.rank().cmp(&a.priority.rank()));
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use super::visible_tasks;
    use crate::project::Project;
    use crate::state::{SortMode, State};
    use crate::task::{Priority, Task};

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(millis).expect("valid millis")
    }

    fn fixture() -> (State, Uuid) {
        let project = Project::new("inbox".to_string());
        let project_id = project.id;
        let mut state = State::default();
        state.projects.push(project);
        state.settings.active_project_id = Some(project_id);
        (state, project_id)
    }

    fn task_in(project_id: Uuid, title: &str, created_millis: i64) -> Task {
        Task::new(title.to_string(), project_id, at(created_millis))
    }

    #[test]
    fn no_effective_project_means_empty() {
        let (mut state, project_id) = fixture();
        state.tasks.push(task_in(project_id, "A", 100));

        state.settings.active_project_id = None;
        assert!(visible_tasks(&state, None, SortMode::CreatedDesc).is_empty());

        // Stale reference reads the same as no reference.
        state.settings.active_project_id = Some(Uuid::new_v4());
        assert!(visible_tasks(&state, None, SortMode::CreatedDesc).is_empty());
    }

    #[test]
    fn created_desc_orders_newest_first() {
        let (mut state, project_id) = fixture();
        state.tasks.push(task_in(project_id, "A", 100));
        state.tasks.push(task_in(project_id, "B", 200));

        let visible = visible_tasks(&state, None, SortMode::CreatedDesc);
        let titles: Vec<&str> = visible.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["B", "A"]);
    }

    #[test]
    fn search_matches_title_and_tags_case_insensitively() {
        let (mut state, project_id) = fixture();

        let mut tagged = task_in(project_id, "errands", 100);
        tagged.tags = vec!["work".to_string(), "home".to_string()];
        state.tasks.push(tagged);
        state.tasks.push(task_in(project_id, "Workout", 200));
        state.tasks.push(task_in(project_id, "read", 300));

        let visible = visible_tasks(&state, Some("wor"), SortMode::CreatedAsc);
        let titles: Vec<&str> = visible.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["errands", "Workout"]);
    }

    #[test]
    fn other_projects_are_scoped_out() {
        let (mut state, project_id) = fixture();
        state.tasks.push(task_in(project_id, "mine", 100));
        state.tasks.push(task_in(Uuid::new_v4(), "theirs", 200));

        let mut unassigned = task_in(project_id, "orphan", 300);
        unassigned.project_id = None;
        state.tasks.push(unassigned);

        let visible = visible_tasks(&state, None, SortMode::CreatedAsc);
        let titles: Vec<&str> = visible.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["mine"]);
    }

    #[test]
    fn due_sorts_put_undated_tasks_last() {
        let (mut state, project_id) = fixture();

        let mut early = task_in(project_id, "early", 1);
        early.due_at = Some(at(1_000));
        let mut late = task_in(project_id, "late", 2);
        late.due_at = Some(at(9_000));
        let undated = task_in(project_id, "undated", 3);

        state.tasks.push(undated);
        state.tasks.push(late);
        state.tasks.push(early);

        let asc = visible_tasks(&state, None, SortMode::DueAsc);
        let titles: Vec<&str> = asc.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["early", "late", "undated"]);

        let desc = visible_tasks(&state, None, SortMode::DueDesc);
        let titles: Vec<&str> = desc.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["late", "early", "undated"]);
    }

    #[test]
    fn priority_ties_keep_prior_order() {
        let (mut state, project_id) = fixture();

        for (title, priority) in [
            ("first-medium", Priority::Medium),
            ("the-high", Priority::High),
            ("second-medium", Priority::Medium),
            ("the-none", Priority::None),
        ] {
            let mut task = task_in(project_id, title, 100);
            task.priority = priority;
            state.tasks.push(task);
        }

        let visible = visible_tasks(&state, None, SortMode::PriorityDesc);
        let titles: Vec<&str> = visible.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(
            titles,
            ["the-high", "first-medium", "second-medium", "the-none"]
        );
    }

    #[test]
    fn blank_query_is_no_filter() {
        let (mut state, project_id) = fixture();
        state.tasks.push(task_in(project_id, "A", 100));

        let visible = visible_tasks(&state, Some("   "), SortMode::CreatedAsc);
        assert_eq!(visible.len(), 1);
    }
}
