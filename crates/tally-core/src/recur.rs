use chrono::{DateTime, Days, Months, Utc};
use uuid::Uuid;

use crate::task::{Period, Recurrence, Subtask, Task};

/// Advances `base` by the rule's interval. The interval is clamped to
/// at least 1; monthly steps use calendar month arithmetic, clamping
/// the day-of-month where the target month is shorter.
pub fn next_due(base: DateTime<Utc>, rule: &Recurrence) -> DateTime<Utc> {
    let interval = rule.interval.max(1);
    let next = match rule.kind {
        Period::Daily => base.checked_add_days(Days::new(u64::from(interval))),
        Period::Weekly => base.checked_add_days(Days::new(u64::from(interval) * 7)),
        Period::Monthly => base.checked_add_months(Months::new(interval)),
    };
    next.unwrap_or(base)
}

/// Synthesizes the next occurrence of a recurring task: fresh id, same
/// title/priority/tags/project/rule, due advanced from the old due date
/// (or from `now` when there was none), subtasks copied by title with
/// completion reset. Returns `None` for non-recurring tasks.
pub fn next_occurrence(task: &Task, now: DateTime<Utc>) -> Option<Task> {
    let rule = task.recurrence.as_ref()?;
    let base = task.due_at.unwrap_or(now);

    Some(Task {
        id: Uuid::new_v4(),
        title: task.title.clone(),
        completed: false,
        created_at: now,
        due_at: Some(next_due(base, rule)),
        priority: task.priority,
        tags: task.tags.clone(),
        project_id: task.project_id,
        subtasks: task
            .subtasks
            .iter()
            .map(|s| Subtask {
                id: Uuid::new_v4(),
                title: s.title.clone(),
                completed: false,
            })
            .collect(),
        recurrence: Some(rule.clone()),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    use super::{next_due, next_occurrence};
    use crate::task::{Period, Recurrence, Subtask, Task};

    fn day(n: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(n * 86_400_000).expect("valid day")
    }

    #[test]
    fn weekly_interval_two_advances_fourteen_days() {
        let rule = Recurrence {
            kind: Period::Weekly,
            interval: 2,
            count: None,
        };
        assert_eq!(next_due(day(10), &rule), day(24));
    }

    #[test]
    fn zero_interval_is_clamped_to_one() {
        let rule = Recurrence {
            kind: Period::Daily,
            interval: 0,
            count: None,
        };
        assert_eq!(next_due(day(10), &rule), day(11));
    }

    #[test]
    fn monthly_step_clamps_day_of_month() {
        let rule = Recurrence {
            kind: Period::Monthly,
            interval: 1,
            count: None,
        };
        let jan_31 = Utc
            .with_ymd_and_hms(2026, 1, 31, 9, 0, 0)
            .single()
            .expect("valid date");
        let next = next_due(jan_31, &rule);
        assert_eq!(next.to_rfc3339(), "2026-02-28T09:00:00+00:00");
    }

    #[test]
    fn occurrence_copies_metadata_and_resets_subtasks() {
        let project_id = Uuid::new_v4();
        let mut task = Task::new("water plants".to_string(), project_id, day(0));
        task.due_at = Some(day(10));
        task.tags = vec!["chores".to_string()];
        task.subtasks = vec![Subtask {
            id: Uuid::new_v4(),
            title: "fill can".to_string(),
            completed: true,
        }];
        task.recurrence = Some(Recurrence {
            kind: Period::Weekly,
            interval: 2,
            count: Some(5),
        });
        task.completed = true;

        let next = next_occurrence(&task, day(12)).expect("recurring task");
        assert_ne!(next.id, task.id);
        assert_eq!(next.title, task.title);
        assert_eq!(next.tags, task.tags);
        assert_eq!(next.project_id, Some(project_id));
        assert_eq!(next.due_at, Some(day(24)));
        assert!(!next.completed);
        assert_eq!(next.created_at, day(12));
        assert_eq!(next.recurrence, task.recurrence);

        assert_eq!(next.subtasks.len(), 1);
        assert_eq!(next.subtasks[0].title, "fill can");
        assert!(!next.subtasks[0].completed);
        assert_ne!(next.subtasks[0].id, task.subtasks[0].id);
    }

    #[test]
    fn undated_task_advances_from_now() {
        let mut task = Task::new("stretch".to_string(), Uuid::new_v4(), day(0));
        task.recurrence = Some(Recurrence {
            kind: Period::Daily,
            interval: 3,
            count: None,
        });

        let next = next_occurrence(&task, day(7)).expect("recurring task");
        assert_eq!(next.due_at, Some(day(10)));
    }

    #[test]
    fn non_recurring_task_yields_nothing() {
        let task = Task::new("one-off".to_string(), Uuid::new_v4(), day(0));
        assert!(next_occurrence(&task, day(1)).is_none());
    }
}
