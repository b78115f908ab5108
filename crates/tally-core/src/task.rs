use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use crate::datetime::epoch_millis_serde;

/// Ranked task priority. Anything unrecognized on the wire collapses to
/// `None` rather than failing the decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
            Priority::None => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::None => "none",
        }
    }

    pub fn from_input(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "high" | "h" => Priority::High,
            "medium" | "med" | "m" => Priority::Medium,
            "low" | "l" => Priority::Low,
            _ => Priority::None,
        }
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(value.as_str().map(Self::from_input).unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    pub fn noun(self) -> &'static str {
        match self {
            Period::Daily => "day",
            Period::Weekly => "week",
            Period::Monthly => "month",
        }
    }
}

/// Repeat-every-N-periods rule. `count` is carried on the wire for
/// forward compatibility; no operation enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    #[serde(rename = "type")]
    pub kind: Period,
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    #[serde(deserialize_with = "de_id", default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(deserialize_with = "de_id", default = "Uuid::new_v4")]
    pub id: Uuid,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub completed: bool,

    #[serde(
        serialize_with = "epoch_millis_serde::serialize",
        deserialize_with = "de_created_at",
        default = "Utc::now"
    )]
    pub created_at: DateTime<Utc>,

    #[serde(
        serialize_with = "epoch_millis_serde::option::serialize",
        deserialize_with = "de_due_at",
        default
    )]
    pub due_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(deserialize_with = "de_tags", default)]
    pub tags: Vec<String>,

    #[serde(deserialize_with = "de_opt_id", default)]
    pub project_id: Option<Uuid>,

    #[serde(deserialize_with = "de_subtasks", default)]
    pub subtasks: Vec<Subtask>,

    #[serde(
        deserialize_with = "de_recurrence",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub recurrence: Option<Recurrence>,
}

impl Task {
    pub fn new(title: String, project_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            completed: false,
            created_at: now,
            due_at: None,
            priority: Priority::None,
            tags: vec![],
            project_id: Some(project_id),
            subtasks: vec![],
            recurrence: None,
        }
    }

    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

// Lenient field decoders: the stored blob may predate this build or have
// been hand-edited, so a bad field degrades to its default instead of
// poisoning the task.

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4))
}

fn de_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Uuid>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().and_then(|s| Uuid::parse_str(s).ok()))
}

fn de_created_at<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_i64()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now))
}

fn de_due_at<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_i64()
        .and_then(DateTime::<Utc>::from_timestamp_millis))
}

fn de_tags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(vec![]);
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(tag) => Some(tag),
            _ => None,
        })
        .collect())
}

fn de_subtasks<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Subtask>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(vec![]);
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

fn de_recurrence<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Recurrence>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}
