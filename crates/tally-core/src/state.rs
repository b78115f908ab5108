use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use crate::project::Project;
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    CreatedAsc,
    #[default]
    CreatedDesc,
    DueAsc,
    DueDesc,
    PriorityDesc,
}

impl SortMode {
    pub const ALL: [SortMode; 5] = [
        SortMode::CreatedAsc,
        SortMode::CreatedDesc,
        SortMode::DueAsc,
        SortMode::DueDesc,
        SortMode::PriorityDesc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::CreatedAsc => "created_asc",
            SortMode::CreatedDesc => "created_desc",
            SortMode::DueAsc => "due_asc",
            SortMode::DueDesc => "due_desc",
            SortMode::PriorityDesc => "priority_desc",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "created_asc" => Some(SortMode::CreatedAsc),
            "created_desc" => Some(SortMode::CreatedDesc),
            "due_asc" => Some(SortMode::DueAsc),
            "due_desc" => Some(SortMode::DueDesc),
            "priority_desc" => Some(SortMode::PriorityDesc),
            _ => None,
        }
    }
}

impl Serialize for SortMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SortMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(value
            .as_str()
            .and_then(Self::parse)
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_theme")]
    pub theme: String,

    #[serde(default)]
    pub sort: SortMode,

    #[serde(deserialize_with = "de_opt_id", default)]
    pub active_project_id: Option<Uuid>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            sort: SortMode::default(),
            active_project_id: None,
        }
    }
}

fn default_theme() -> String {
    "dark".to_string()
}

/// The whole tracked world: every store operation takes this aggregate
/// explicitly, and the codec persists it as one blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(rename = "todos", deserialize_with = "de_tasks", default)]
    pub tasks: Vec<Task>,

    #[serde(deserialize_with = "de_projects", default)]
    pub projects: Vec<Project>,

    #[serde(deserialize_with = "de_settings", default)]
    pub settings: Settings,
}

impl State {
    /// The stored active-project id counts only while the project still
    /// exists; a stale reference reads as "no active project".
    pub fn effective_active_project(&self) -> Option<Uuid> {
        let id = self.settings.active_project_id?;
        self.projects.iter().any(|p| p.id == id).then_some(id)
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: Uuid) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn project(&self, id: Uuid) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn project_task_count(&self, id: Uuid) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.project_id == Some(id))
            .count()
    }
}

// Collection-level leniency: a corrupt entry is skipped, a corrupt
// settings object falls back to defaults. The load path decodes through
// these so one bad record cannot take the whole blob down.

fn de_tasks<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Task>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(vec![]);
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

fn de_projects<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Project>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(vec![]);
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

fn de_settings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Settings, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn de_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Uuid>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().and_then(|s| Uuid::parse_str(s).ok()))
}
