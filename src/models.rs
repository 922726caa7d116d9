// Data models for todostore

use chrono::{DateTime, Utc};
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single to-do item
///
/// Field names match the persisted layout (`dueDate`, `createdAt`), so a list
/// written by an older build loads without translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredTask")]
pub struct Task {
    pub id: i64,
    pub text: String,
    pub completed: bool,
    pub priority: Priority,
    pub category: Category,
    /// Always serialized, as `null` when there is no due date
    pub due_date: Option<DateTime<Utc>>,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

/// Persisted form of a task; everything except `id` and `text` may be missing
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTask {
    id: i64,
    text: String,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    category: Category,
    #[serde(default)]
    due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    details: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl From<StoredTask> for Task {
    fn from(stored: StoredTask) -> Self {
        // Ids are creation timestamps in ms
        let created_at = stored
            .created_at
            .or_else(|| DateTime::from_timestamp_millis(stored.id))
            .unwrap_or_default();

        Self {
            id: stored.id,
            text: stored.text,
            completed: stored.completed,
            priority: stored.priority,
            category: stored.category,
            due_date: stored.due_date,
            details: stored.details,
            created_at,
        }
    }
}

impl Task {
    /// Whether this task is past its due date at `now`
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < now)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low importance",
            Self::Medium => "Important",
            Self::High => "Very important",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Low => "🟢",
            Self::Medium => "🟡",
            Self::High => "🔴",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(eyre!("invalid priority '{}': must be low, medium, or high", s)),
        }
    }
}

/// Task category
///
/// The Spanish names are accepted on load for lists written by the original
/// web front end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[default]
    Personal,
    #[serde(alias = "Trabajo")]
    Work,
    #[serde(alias = "Estudio")]
    Study,
    #[serde(alias = "Hogar")]
    Home,
    #[serde(alias = "Salud")]
    Health,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Personal,
        Category::Work,
        Category::Study,
        Category::Home,
        Category::Health,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "Personal",
            Self::Work => "Work",
            Self::Study => "Study",
            Self::Home => "Home",
            Self::Health => "Health",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Personal => "👤",
            Self::Work => "💼",
            Self::Study => "📚",
            Self::Home => "🏠",
            Self::Health => "❤️",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| eyre!("invalid category '{}': must be one of Personal, Work, Study, Home, Health", s))
    }
}

/// Input for `TaskStore::add`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTask {
    pub text: String,
    pub priority: Priority,
    pub category: Category,
    pub due_date: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn due(mut self, due_date: Option<DateTime<Utc>>) -> Self {
        self.due_date = due_date;
        self
    }
}

/// Replacement values for the editable fields of a task
///
/// Every field is applied; start from `TaskPatch::from(&task)` to change only
/// some of them.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskPatch {
    pub text: String,
    pub details: String,
    pub priority: Priority,
    pub category: Category,
    pub due_date: Option<DateTime<Utc>>,
}

impl From<&Task> for TaskPatch {
    fn from(task: &Task) -> Self {
        Self {
            text: task.text.clone(),
            details: task.details.clone(),
            priority: task.priority,
            category: task.category,
            due_date: task.due_date,
        }
    }
}

impl TaskPatch {
    /// Apply this patch, keeping `id`, `completed` and `created_at`
    pub fn apply_to(&self, task: &Task) -> Task {
        Task {
            text: self.text.clone(),
            details: self.details.clone(),
            priority: self.priority,
            category: self.category,
            due_date: self.due_date,
            ..task.clone()
        }
    }
}

/// Helper function to get current timestamp in milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
