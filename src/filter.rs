// View filtering for the task list

use crate::models::Task;
use std::fmt;

/// Selects which tasks a listing shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Filter {
    #[default]
    All,
    Active,     // completed == false
    Completed,  // completed == true
}

impl Filter {
    pub fn matches(self, task: &Task) -> bool {
        match self {
            Filter::All => true,
            Filter::Active => !task.completed,
            Filter::Completed => task.completed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Filter::All => "all",
            Filter::Active => "active",
            Filter::Completed => "completed",
        }
    }
}

/// Unrecognized names fall back to `Filter::All`
impl From<&str> for Filter {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "active" | "activas" => Filter::Active,
            "completed" | "done" | "completadas" => Filter::Completed,
            "all" | "todas" => Filter::All,
            _ => Filter::All,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
