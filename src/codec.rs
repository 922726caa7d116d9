// Persisted task list encoding

use crate::models::Task;
use eyre::{Context, Result, eyre};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Format version written beside the task list
pub const FORMAT_VERSION: u32 = 1;

/// Encode the full task list as a JSON array
pub fn encode_tasks(tasks: &[Task]) -> Result<String> {
    serde_json::to_string(tasks).context("Failed to serialize task list")
}

/// Decode a persisted task list
///
/// Fails if the value is not a JSON array. Entries that don't decode as a
/// task or have blank text are skipped, and for duplicate ids the first entry
/// wins.
pub fn decode_tasks(raw: &str) -> Result<Vec<Task>> {
    let value: Value = serde_json::from_str(raw).context("Persisted task list is not valid JSON")?;

    let entries = match value {
        Value::Array(entries) => entries,
        other => return Err(eyre!("Persisted task list is not an array (found {})", kind(&other))),
    };

    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let task: Task = match serde_json::from_value(entry) {
            Ok(t) => t,
            Err(e) => {
                warn!(index, error = ?e, "Failed to parse task, skipping");
                continue;
            }
        };

        if task.text.trim().is_empty() {
            warn!(index, id = task.id, "Task has blank text, skipping");
            continue;
        }

        if !seen.insert(task.id) {
            warn!(index, id = task.id, "Duplicate task id, skipping");
            continue;
        }

        tasks.push(task);
    }

    debug!(count = tasks.len(), "Decoded task list");
    Ok(tasks)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
