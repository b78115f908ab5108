use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::codec::StateFile;
use crate::project::Project;
use crate::recur;
use crate::state::{SortMode, State};
use crate::task::{Priority, Recurrence, Subtask, Task};

/// Validation rejections. These surface to the user as warnings and
/// leave the state untouched; they are never process failures.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("a task needs a title")]
    EmptyTitle,
    #[error("create or select a project first")]
    NoActiveProject,
    #[error("a project needs a name")]
    EmptyProjectName,
}

/// Outcome of a completion toggle.
#[derive(Debug, Clone, Copy)]
pub struct ToggleOutcome {
    pub completed: bool,
    /// Id of the next occurrence, when completing a recurring task.
    pub spawned: Option<Uuid>,
}

/// Field-wise task update. `None` leaves a field alone; the inner
/// `Option` on due/recurrence distinguishes "set" from "clear".
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub due_at: Option<Option<DateTime<Utc>>>,
    pub priority: Option<Priority>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
    pub recurrence: Option<Option<Recurrence>>,
}

/// Owns the in-memory aggregate plus its backing file. Every mutation
/// persists the full blob before returning.
#[derive(Debug)]
pub struct Store {
    file: StateFile,
    pub state: State,
}

impl Store {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let file = StateFile::open(data_dir)?;
        let state = file.load();
        Ok(Self { file, state })
    }

    fn persist(&self) -> anyhow::Result<()> {
        self.file.save(&self.state)
    }

    #[tracing::instrument(skip(self, title, tags, recurrence))]
    pub fn add_task(
        &mut self,
        title: &str,
        due_at: Option<DateTime<Utc>>,
        priority: Priority,
        tags: Vec<String>,
        recurrence: Option<Recurrence>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Uuid> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(Rejection::EmptyTitle.into());
        }
        let project_id = self
            .state
            .effective_active_project()
            .ok_or(Rejection::NoActiveProject)?;

        let mut task = Task::new(trimmed.to_string(), project_id, now);
        task.due_at = due_at;
        task.priority = priority;
        task.tags = tags;
        task.recurrence = recurrence;

        let id = task.id;
        self.state.tasks.insert(0, task);
        self.persist()?;

        info!(task = %id, project = %project_id, "added task");
        Ok(id)
    }

    /// Flips completion. Completing a recurring task appends its next
    /// occurrence; reopening never does.
    #[tracing::instrument(skip(self), fields(task = %id))]
    pub fn toggle_task(&mut self, id: Uuid, now: DateTime<Utc>) -> anyhow::Result<Option<ToggleOutcome>> {
        let Some(idx) = self.state.tasks.iter().position(|t| t.id == id) else {
            return Ok(None);
        };

        self.state.tasks[idx].completed = !self.state.tasks[idx].completed;
        let completed = self.state.tasks[idx].completed;

        let mut spawned = None;
        if completed
            && let Some(next) = recur::next_occurrence(&self.state.tasks[idx], now)
        {
            spawned = Some(next.id);
            info!(task = %id, next = %next.id, due = ?next.due_at, "spawned next occurrence");
            self.state.tasks.push(next);
        }

        self.persist()?;
        Ok(Some(ToggleOutcome { completed, spawned }))
    }

    #[tracing::instrument(skip(self, patch), fields(task = %id))]
    pub fn edit_task(&mut self, id: Uuid, patch: TaskPatch) -> anyhow::Result<bool> {
        if let Some(title) = &patch.title
            && title.trim().is_empty()
        {
            return Err(Rejection::EmptyTitle.into());
        }

        let Some(task) = self.state.task_mut(id) else {
            return Ok(false);
        };

        if let Some(title) = patch.title {
            task.title = title.trim().to_string();
        }
        if let Some(due_at) = patch.due_at {
            task.due_at = due_at;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        for tag in patch.add_tags {
            if task.tags.iter().all(|existing| existing != &tag) {
                task.tags.push(tag);
            }
        }
        for tag in &patch.remove_tags {
            task.tags.retain(|existing| existing != tag);
        }
        if let Some(recurrence) = patch.recurrence {
            task.recurrence = recurrence;
        }

        self.persist()?;
        Ok(true)
    }

    #[tracing::instrument(skip(self), fields(task = %id))]
    pub fn delete_task(&mut self, id: Uuid) -> anyhow::Result<bool> {
        let before = self.state.tasks.len();
        self.state.tasks.retain(|t| t.id != id);
        if self.state.tasks.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Drops every completed task. Writes only when something was
    /// actually removed.
    #[tracing::instrument(skip(self))]
    pub fn clear_completed(&mut self) -> anyhow::Result<usize> {
        let before = self.state.tasks.len();
        self.state.tasks.retain(|t| !t.completed);
        let removed = before - self.state.tasks.len();
        if removed > 0 {
            self.persist()?;
        }
        debug!(removed, "cleared completed tasks");
        Ok(removed)
    }

    #[tracing::instrument(skip(self, task_id, title))]
    pub fn add_subtask(&mut self, task_id: Uuid, title: &str) -> anyhow::Result<Option<Uuid>> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(Rejection::EmptyTitle.into());
        }
        let Some(task) = self.state.task_mut(task_id) else {
            return Ok(None);
        };

        let subtask = Subtask {
            id: Uuid::new_v4(),
            title: trimmed.to_string(),
            completed: false,
        };
        let id = subtask.id;
        task.subtasks.push(subtask);
        self.persist()?;
        Ok(Some(id))
    }

    #[tracing::instrument(skip(self), fields(task = %task_id, subtask = %subtask_id))]
    pub fn toggle_subtask(
        &mut self,
        task_id: Uuid,
        subtask_id: Uuid,
    ) -> anyhow::Result<Option<bool>> {
        let Some(task) = self.state.task_mut(task_id) else {
            return Ok(None);
        };
        let Some(subtask) = task.subtasks.iter_mut().find(|s| s.id == subtask_id) else {
            return Ok(None);
        };

        subtask.completed = !subtask.completed;
        let completed = subtask.completed;
        self.persist()?;
        Ok(Some(completed))
    }

    /// Creates a project and makes it the active one.
    #[tracing::instrument(skip(self, name))]
    pub fn add_project(&mut self, name: &str) -> anyhow::Result<Uuid> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Rejection::EmptyProjectName.into());
        }

        let project = Project::new(trimmed.to_string());
        let id = project.id;
        self.state.projects.push(project);
        self.state.settings.active_project_id = Some(id);
        self.persist()?;

        info!(project = %id, name = %trimmed, "added project");
        Ok(id)
    }

    /// Removes a project. Tasks that referenced it become unassigned,
    /// and the active-project setting is cleared if it pointed here.
    #[tracing::instrument(skip(self), fields(project = %id))]
    pub fn delete_project(&mut self, id: Uuid) -> anyhow::Result<bool> {
        let before = self.state.projects.len();
        self.state.projects.retain(|p| p.id != id);
        if self.state.projects.len() == before {
            return Ok(false);
        }

        for task in &mut self.state.tasks {
            if task.project_id == Some(id) {
                task.project_id = None;
            }
        }
        if self.state.settings.active_project_id == Some(id) {
            self.state.settings.active_project_id = None;
        }

        self.persist()?;
        info!(project = %id, "deleted project");
        Ok(true)
    }

    /// Stores the selection without validating existence; every read
    /// goes through `State::effective_active_project`.
    #[tracing::instrument(skip(self))]
    pub fn set_active_project(&mut self, id: Option<Uuid>) -> anyhow::Result<()> {
        self.state.settings.active_project_id = id;
        self.persist()
    }

    #[tracing::instrument(skip(self))]
    pub fn set_sort(&mut self, mode: SortMode) -> anyhow::Result<()> {
        self.state.settings.sort = mode;
        self.persist()
    }

    #[tracing::instrument(skip(self, theme))]
    pub fn set_theme(&mut self, theme: &str) -> anyhow::Result<()> {
        self.state.settings.theme = theme.to_string();
        self.persist()
    }
}
