use std::fs;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tally_core::codec::{STATE_FILE_NAME, StateFile};
use tally_core::project::Project;
use tally_core::state::{SortMode, State};
use tally_core::task::{Period, Priority, Recurrence, Task};
use tempfile::tempdir;
use uuid::Uuid;

fn at(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).expect("valid millis")
}

fn sample_state() -> State {
    let project = Project::new("inbox".to_string());
    let project_id = project.id;

    let mut task = Task::new("write the codec".to_string(), project_id, at(1_000));
    task.due_at = Some(at(9_000));
    task.priority = Priority::High;
    task.tags = vec!["core".to_string()];
    task.recurrence = Some(Recurrence {
        kind: Period::Weekly,
        interval: 2,
        count: Some(4),
    });

    let mut state = State::default();
    state.tasks.push(task);
    state.projects.push(project);
    state.settings.theme = "sage".to_string();
    state.settings.sort = SortMode::DueAsc;
    state.settings.active_project_id = Some(project_id);
    state
}

#[test]
fn save_then_load_reproduces_the_state() {
    let temp = tempdir().expect("tempdir");
    let file = StateFile::open(temp.path()).expect("open state file");

    let state = sample_state();
    file.save(&state).expect("save");
    let loaded = file.load();

    assert_eq!(loaded.tasks.len(), 1);
    let (before, after) = (&state.tasks[0], &loaded.tasks[0]);
    assert_eq!(after.id, before.id);
    assert_eq!(after.title, before.title);
    assert_eq!(after.completed, before.completed);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.due_at, before.due_at);
    assert_eq!(after.priority, before.priority);
    assert_eq!(after.tags, before.tags);
    assert_eq!(after.project_id, before.project_id);
    assert_eq!(after.recurrence, before.recurrence);

    assert_eq!(loaded.projects.len(), 1);
    assert_eq!(loaded.projects[0].id, state.projects[0].id);
    assert_eq!(loaded.projects[0].name, "inbox");

    assert_eq!(loaded.settings.theme, "sage");
    assert_eq!(loaded.settings.sort, SortMode::DueAsc);
    assert_eq!(
        loaded.settings.active_project_id,
        state.settings.active_project_id
    );
}

#[test]
fn wire_layout_uses_the_documented_key_names() {
    let state = sample_state();
    let value = serde_json::to_value(&state).expect("serialize");

    let root = value.as_object().expect("object root");
    assert!(root.contains_key("todos"));
    assert!(root.contains_key("projects"));
    assert!(root.contains_key("settings"));

    let task = root["todos"][0].as_object().expect("task object");
    for key in [
        "id",
        "title",
        "completed",
        "createdAt",
        "dueAt",
        "priority",
        "tags",
        "projectId",
        "subtasks",
        "recurrence",
    ] {
        assert!(task.contains_key(key), "missing task key {key}");
    }
    assert_eq!(task["createdAt"], json!(1_000));
    assert_eq!(task["dueAt"], json!(9_000));
    assert_eq!(task["priority"], json!("high"));
    assert_eq!(task["recurrence"]["type"], json!("weekly"));
    assert_eq!(task["recurrence"]["count"], json!(4));

    let settings = root["settings"].as_object().expect("settings object");
    assert!(settings.contains_key("theme"));
    assert!(settings.contains_key("sort"));
    assert!(settings.contains_key("activeProjectId"));
    assert_eq!(settings["sort"], json!("due_asc"));
}

#[test]
fn missing_or_malformed_blobs_fall_back_to_the_empty_default() {
    let temp = tempdir().expect("tempdir");
    let file = StateFile::open(temp.path()).expect("open state file");

    // No file yet.
    let state = file.load();
    assert!(state.tasks.is_empty());
    assert!(state.projects.is_empty());

    // Not JSON at all.
    fs::write(temp.path().join(STATE_FILE_NAME), "{{not json").expect("write");
    let state = file.load();
    assert!(state.tasks.is_empty());

    // JSON, but not an object.
    fs::write(temp.path().join(STATE_FILE_NAME), "[1,2,3]").expect("write");
    let state = file.load();
    assert!(state.tasks.is_empty());
    assert_eq!(state.settings.theme, "dark");
    assert_eq!(state.settings.sort, SortMode::CreatedDesc);
}

#[test]
fn partial_task_objects_are_coerced_field_by_field() {
    let temp = tempdir().expect("tempdir");
    let file = StateFile::open(temp.path()).expect("open state file");

    let project_id = Uuid::new_v4();
    let blob = json!({
        "todos": [
            {
                "title": "bare minimum",
                "projectId": project_id.to_string(),
                // id, completed, createdAt, dueAt, priority, tags,
                // subtasks all absent.
            },
            {
                "id": "not-a-uuid",
                "title": "mangled fields",
                "priority": "urgent",
                "dueAt": "tomorrow",
                "tags": "work",
                "subtasks": [{"title": "kept"}, 42],
                "recurrence": {"type": "hourly", "interval": 1}
            },
            "garbage entry"
        ],
        "projects": [ {"id": project_id.to_string()} ],
        "settings": {"sort": "bogus", "activeProjectId": 42}
    });
    fs::write(
        temp.path().join(STATE_FILE_NAME),
        serde_json::to_string(&blob).expect("serialize blob"),
    )
    .expect("write");

    let state = file.load();

    // The string entry is dropped; the two objects survive.
    assert_eq!(state.tasks.len(), 2);

    let bare = &state.tasks[0];
    assert_eq!(bare.title, "bare minimum");
    assert!(!bare.completed);
    assert_eq!(bare.due_at, None);
    assert_eq!(bare.priority, Priority::None);
    assert!(bare.tags.is_empty());
    assert!(bare.subtasks.is_empty());
    assert_eq!(bare.project_id, Some(project_id));

    let mangled = &state.tasks[1];
    assert_eq!(mangled.priority, Priority::None);
    assert_eq!(mangled.due_at, None);
    assert!(mangled.tags.is_empty());
    assert_eq!(mangled.subtasks.len(), 1);
    assert_eq!(mangled.subtasks[0].title, "kept");
    assert!(mangled.recurrence.is_none(), "bad rule dropped, task kept");

    // Fresh ids are generated, and they differ.
    assert_ne!(state.tasks[0].id, state.tasks[1].id);

    assert_eq!(state.projects.len(), 1);
    assert_eq!(state.projects[0].name, "Untitled");

    assert_eq!(state.settings.sort, SortMode::CreatedDesc);
    assert_eq!(state.settings.active_project_id, None);
}

#[test]
fn saved_blob_is_a_single_json_document() {
    let temp = tempdir().expect("tempdir");
    let file = StateFile::open(temp.path()).expect("open state file");

    file.save(&sample_state()).expect("save");
    let raw = fs::read_to_string(temp.path().join(STATE_FILE_NAME)).expect("read");
    let value: Value = serde_json::from_str(&raw).expect("one valid document");
    assert!(value.is_object());
}
