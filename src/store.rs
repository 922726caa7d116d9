// Task store: in-memory task list mirrored to a storage slot

use crate::clock::{Clock, SystemClock};
use crate::codec::{self, FORMAT_VERSION};
use crate::filter::Filter;
use crate::models::{NewTask, Task, TaskPatch};
use crate::storage::{Storage, validate_key};
use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

/// Slot key used when none is configured
pub const DEFAULT_KEY: &str = "tasks";

const VERSION_SUFFIX: &str = ".version";

/// Validate the key a task list is stored under
///
/// The list key must leave room for its `<key>.version` sibling and can't
/// itself name another list's version slot.
pub fn validate_list_key(key: &str) -> Result<()> {
    validate_key(key)?;
    if key.ends_with(VERSION_SUFFIX) {
        return Err(eyre!("Invalid task list key: {} (must not end in {})", key, VERSION_SUFFIX));
    }
    validate_key(&format!("{}{}", key, VERSION_SUFFIX))
        .with_context(|| format!("Task list key too long: {} (max {} chars)", key, 64 - VERSION_SUFFIX.len()))
}

/// Authoritative task list with a persisted mirror
///
/// Every successful mutation writes the whole list to the storage slot before
/// the in-memory list changes, so a failed write leaves both sides at the
/// previous state.
pub struct TaskStore<S: Storage, C: Clock = SystemClock> {
    storage: S,
    clock: C,
    key: String,
    tasks: Vec<Task>,
    last_id: i64,
}

impl<S: Storage> TaskStore<S> {
    /// Open the store under the default key
    pub fn open(storage: S) -> Result<Self> {
        Self::open_with(storage, SystemClock, DEFAULT_KEY)
    }
}

impl<S: Storage, C: Clock> TaskStore<S, C> {
    /// Open the store, loading whatever the slot under `key` holds
    ///
    /// A missing or unreadable list starts the store empty; only storage
    /// errors are returned.
    pub fn open_with(storage: S, clock: C, key: &str) -> Result<Self> {
        validate_list_key(key)?;

        let mut store = Self {
            storage,
            clock,
            key: key.to_string(),
            tasks: Vec::new(),
            last_id: 0,
        };

        store.tasks = store.load()?;
        store.last_id = store.tasks.iter().map(|t| t.id).max().unwrap_or(0);
        store.write_version()?;

        info!(key, count = store.tasks.len(), "Opened task store");
        Ok(store)
    }

    fn load(&self) -> Result<Vec<Task>> {
        let raw = match self.storage.load(&self.key)? {
            Some(raw) => raw,
            None => {
                debug!(key = %self.key, "No persisted task list, starting empty");
                return Ok(Vec::new());
            }
        };

        match codec::decode_tasks(&raw) {
            Ok(tasks) => Ok(tasks),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Persisted task list is unreadable, starting empty");
                Ok(Vec::new())
            }
        }
    }

    fn version_key(&self) -> String {
        format!("{}{}", self.key, VERSION_SUFFIX)
    }

    /// Write version slot
    fn write_version(&mut self) -> Result<()> {
        let version_key = self.version_key();
        match self.storage.load(&version_key)? {
            None => self.storage.save(&version_key, &FORMAT_VERSION.to_string())?,
            Some(found) if found.trim() != FORMAT_VERSION.to_string() => {
                warn!(found = %found.trim(), expected = FORMAT_VERSION, "Task list format version mismatch");
            }
            Some(_) => {}
        }
        Ok(())
    }

    // ========================================================================
    // Read API
    // ========================================================================

    /// Tasks matching `filter`, in insertion order
    pub fn list(&self, filter: Filter) -> Vec<&Task> {
        self.tasks.iter().filter(|t| filter.matches(t)).collect()
    }

    pub fn get(&self, id: i64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Add a task
    ///
    /// Returns `None` without writing anything when the text is blank.
    pub fn add(&mut self, new_task: NewTask) -> Result<Option<Task>> {
        if new_task.text.trim().is_empty() {
            debug!("Rejected task with blank text");
            return Ok(None);
        }

        let created_at = self.clock.now();
        let id = self.next_id(created_at.timestamp_millis())?;

        let task = Task {
            id,
            text: new_task.text,
            completed: false,
            priority: new_task.priority,
            category: new_task.category,
            due_date: new_task.due_date,
            details: String::new(),
            created_at,
        };

        let mut next = self.tasks.clone();
        next.push(task.clone());
        self.sync(next)?;
        self.last_id = id;

        info!(id, "Added task");
        Ok(Some(task))
    }

    /// Flip `completed` on a task; `None` if no task has `id`
    pub fn toggle(&mut self, id: i64) -> Result<Option<Task>> {
        self.replace(id, |task| Task {
            completed: !task.completed,
            ..task.clone()
        })
    }

    /// Overwrite the editable fields of a task
    ///
    /// Returns `None` without writing anything when `id` is unknown or the
    /// patch text is blank.
    pub fn edit(&mut self, id: i64, patch: TaskPatch) -> Result<Option<Task>> {
        if patch.text.trim().is_empty() {
            debug!(id, "Rejected edit with blank text");
            return Ok(None);
        }
        self.replace(id, |task| patch.apply_to(task))
    }

    /// Remove a task; `None` if no task has `id`
    pub fn delete(&mut self, id: i64) -> Result<Option<Task>> {
        let Some(index) = self.position(id) else {
            debug!(id, "delete: no such task");
            return Ok(None);
        };

        let mut next = self.tasks.clone();
        let removed = next.remove(index);
        self.sync(next)?;

        info!(id, "Deleted task");
        Ok(Some(removed))
    }

    // ========================================================================
    // Helper methods
    // ========================================================================

    fn position(&self, id: i64) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    fn replace<F>(&mut self, id: i64, update: F) -> Result<Option<Task>>
    where
        F: FnOnce(&Task) -> Task,
    {
        let Some(index) = self.position(id) else {
            debug!(id, "No such task");
            return Ok(None);
        };

        let updated = update(&self.tasks[index]);
        let mut next = self.tasks.clone();
        next[index] = updated.clone();
        self.sync(next)?;

        debug!(id, completed = updated.completed, "Updated task");
        Ok(Some(updated))
    }

    /// Millisecond timestamp, bumped past the last issued id on collision
    fn next_id(&self, now_ms: i64) -> Result<i64> {
        if now_ms > self.last_id {
            return Ok(now_ms);
        }
        self.last_id
            .checked_add(1)
            .ok_or_else(|| eyre!("Task id space exhausted (last id {})", self.last_id))
    }

    /// Persist `next` and make it the current list
    fn sync(&mut self, next: Vec<Task>) -> Result<()> {
        let encoded = codec::encode_tasks(&next)?;
        self.storage
            .save(&self.key, &encoded)
            .with_context(|| format!("Failed to persist task list under '{}'", self.key))?;
        self.tasks = next;
        debug!(key = %self.key, count = self.tasks.len(), "Synced task list");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{Category, Priority};
    use crate::storage::{FileStorage, MemoryStorage, SqliteStorage};
    use chrono::{TimeZone, Utc};
    use eyre::eyre;
    use std::collections::HashSet;
    use tempfile::TempDir;

    const T0: i64 = 1_717_000_000_000;

    fn new_store() -> TaskStore<MemoryStorage, ManualClock> {
        TaskStore::open_with(MemoryStorage::new(), ManualClock::at_ms(T0), DEFAULT_KEY).unwrap()
    }

    fn texts(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|t| t.text.clone()).collect()
    }

    /// Decoded slot contents must equal the in-memory list
    fn assert_mirrored<S: Storage, C: Clock>(store: &TaskStore<S, C>) {
        let raw = store.storage().load(store.key()).unwrap().unwrap();
        assert_eq!(codec::decode_tasks(&raw).unwrap(), store.tasks());
    }

    /// Storage whose writes can be made to fail
    #[derive(Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        fail_writes: bool,
    }

    impl Storage for FlakyStorage {
        fn load(&self, key: &str) -> Result<Option<String>> {
            self.inner.load(key)
        }

        fn save(&mut self, key: &str, value: &str) -> Result<()> {
            if self.fail_writes {
                return Err(eyre!("disk full"));
            }
            self.inner.save(key, value)
        }
    }

    #[test]
    fn test_open_empty_storage() {
        let store = new_store();
        assert!(store.is_empty());
        assert_eq!(store.list(Filter::All).len(), 0);
    }

    #[test]
    fn test_open_writes_version_slot() {
        let store = new_store();
        assert_eq!(store.storage().load("tasks.version").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_open_with_invalid_json_fails_open() {
        let storage = MemoryStorage::new().with_slot("tasks", "not valid json");
        let store = TaskStore::open(storage).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_open_with_non_array_fails_open() {
        let storage = MemoryStorage::new().with_slot("tasks", r#"{"id":1}"#);
        let store = TaskStore::open(storage).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_open_rejects_bad_key() {
        assert!(TaskStore::open_with(MemoryStorage::new(), SystemClock, "../tasks").is_err());
    }

    #[test]
    fn test_list_key_leaves_room_for_version_slot() {
        let longest = "a".repeat(64 - VERSION_SUFFIX.len());
        assert!(validate_list_key(&longest).is_ok());
        assert!(TaskStore::open_with(MemoryStorage::new(), SystemClock, &longest).is_ok());

        let too_long = "a".repeat(60);
        assert!(validate_list_key(&too_long).is_err());
        assert!(TaskStore::open_with(MemoryStorage::new(), SystemClock, &too_long).is_err());
    }

    #[test]
    fn test_list_key_cannot_be_a_version_slot() {
        assert!(validate_list_key("tasks.version").is_err());
        assert!(TaskStore::open_with(MemoryStorage::new(), SystemClock, "tasks.version").is_err());
        assert!(validate_list_key("tasks.v2").is_ok());
    }

    #[test]
    fn test_add_after_max_id_is_an_error() {
        let raw = format!(
            r#"[{{"id":{},"text":"Last","createdAt":"2024-01-01T00:00:00Z"}}]"#,
            i64::MAX
        );
        let storage = MemoryStorage::new().with_slot("tasks", &raw);
        let mut store = TaskStore::open_with(storage, ManualClock::at_ms(T0), DEFAULT_KEY).unwrap();

        assert!(store.add(NewTask::new("y")).is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.storage().load("tasks").unwrap().as_deref(), Some(raw.as_str()));
    }

    #[test]
    fn test_add_scenario() {
        let mut store = new_store();

        let task = store
            .add(NewTask::new("Buy milk").priority(Priority::Medium).category(Category::Personal).due(None))
            .unwrap()
            .unwrap();

        let all = store.list(Filter::All);
        assert_eq!(all.len(), 1);
        assert!(!all[0].completed);
        assert_eq!(all[0].text, "Buy milk");
        assert_eq!(all[0].details, "");
        assert_eq!(all[0].due_date, None);
        assert_eq!(task.id, T0);
        assert_eq!(task.created_at.timestamp_millis(), T0);
        assert_mirrored(&store);
    }

    #[test]
    fn test_add_blank_text_is_rejected() {
        let mut store = new_store();
        store.add(NewTask::new("Keep")).unwrap();
        let before = store.storage().load("tasks").unwrap();

        assert_eq!(store.add(NewTask::new("")).unwrap(), None);
        assert_eq!(store.add(NewTask::new("   \t\n")).unwrap(), None);

        assert_eq!(store.len(), 1);
        assert_eq!(store.storage().load("tasks").unwrap(), before);
    }

    #[test]
    fn test_add_grows_list_by_one() {
        let mut store = new_store();
        for (i, text) in ["a", "b", "c"].into_iter().enumerate() {
            let task = store.add(NewTask::new(text)).unwrap().unwrap();
            assert!(!task.completed);
            assert_eq!(store.len(), i + 1);
        }
    }

    #[test]
    fn test_same_millisecond_adds_get_distinct_ids() {
        let mut store = new_store();

        let a = store.add(NewTask::new("A")).unwrap().unwrap();
        let b = store.add(NewTask::new("B")).unwrap().unwrap();
        let c = store.add(NewTask::new("C")).unwrap().unwrap();

        assert_eq!(a.id, T0);
        assert_eq!(b.id, T0 + 1);
        assert_eq!(c.id, T0 + 2);
    }

    #[test]
    fn test_ids_follow_clock_when_it_moves_ahead() {
        let mut store = new_store();
        let a = store.add(NewTask::new("A")).unwrap().unwrap();
        store.clock.advance_ms(500);
        let b = store.add(NewTask::new("B")).unwrap().unwrap();
        assert_eq!(b.id, a.id + 500);
    }

    #[test]
    fn test_ids_never_collide_with_loaded_tasks() {
        // Persisted ids are ahead of the clock
        let raw = format!(
            r#"[{{"id":{},"text":"From the future","createdAt":"2030-01-01T00:00:00Z"}}]"#,
            T0 + 10_000
        );
        let storage = MemoryStorage::new().with_slot("tasks", &raw);
        let mut store = TaskStore::open_with(storage, ManualClock::at_ms(T0), DEFAULT_KEY).unwrap();

        let task = store.add(NewTask::new("Now")).unwrap().unwrap();
        assert_eq!(task.id, T0 + 10_001);
    }

    #[test]
    fn test_toggle_scenario() {
        let mut store = new_store();
        let a = store.add(NewTask::new("Task A")).unwrap().unwrap();
        store.add(NewTask::new("Task B")).unwrap();

        let toggled = store.toggle(a.id).unwrap().unwrap();
        assert!(toggled.completed);

        assert_eq!(texts(&store.list(Filter::Active)), vec!["Task B"]);
        assert_eq!(texts(&store.list(Filter::Completed)), vec!["Task A"]);
        assert_mirrored(&store);
    }

    #[test]
    fn test_toggle_twice_restores_state() {
        let mut store = new_store();
        let task = store.add(NewTask::new("Flip")).unwrap().unwrap();

        store.toggle(task.id).unwrap();
        store.toggle(task.id).unwrap();

        assert_eq!(store.get(task.id).unwrap(), &task);
        assert_mirrored(&store);
    }

    #[test]
    fn test_toggle_unknown_id_is_noop() {
        let mut store = new_store();
        store.add(NewTask::new("A")).unwrap();
        let before = store.tasks().to_vec();

        assert_eq!(store.toggle(42).unwrap(), None);
        assert_eq!(store.tasks(), before.as_slice());
    }

    #[test]
    fn test_delete_scenario() {
        let mut store = new_store();
        let x = store.add(NewTask::new("X")).unwrap().unwrap();

        let removed = store.delete(x.id).unwrap().unwrap();
        assert_eq!(removed, x);
        assert!(store.list(Filter::All).is_empty());
        assert_eq!(store.storage().load("tasks").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_delete_removes_exactly_one() {
        let mut store = new_store();
        let a = store.add(NewTask::new("A")).unwrap().unwrap();
        store.add(NewTask::new("B")).unwrap();
        store.add(NewTask::new("C")).unwrap();

        store.delete(a.id).unwrap();
        assert_eq!(texts(&store.list(Filter::All)), vec!["B", "C"]);

        assert_eq!(store.delete(a.id).unwrap(), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_edit_preserves_identity_and_applies_patch() {
        let mut store = new_store();
        let original = store.add(NewTask::new("Draft")).unwrap().unwrap();
        store.toggle(original.id).unwrap();
        store.clock.advance_ms(60_000);

        let due = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
        let patch = TaskPatch {
            text: "Final".to_string(),
            details: "send to Ana".to_string(),
            priority: Priority::High,
            category: Category::Work,
            due_date: Some(due),
        };

        let edited = store.edit(original.id, patch).unwrap().unwrap();
        assert_eq!(edited.id, original.id);
        assert!(edited.completed);
        assert_eq!(edited.created_at, original.created_at);
        assert_eq!(edited.text, "Final");
        assert_eq!(edited.details, "send to Ana");
        assert_eq!(edited.priority, Priority::High);
        assert_eq!(edited.category, Category::Work);
        assert_eq!(edited.due_date, Some(due));
        assert_mirrored(&store);
    }

    #[test]
    fn test_edit_can_clear_due_date() {
        let mut store = new_store();
        let due = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
        let task = store.add(NewTask::new("Due").due(Some(due))).unwrap().unwrap();

        let mut patch = TaskPatch::from(&task);
        patch.due_date = None;
        let edited = store.edit(task.id, patch).unwrap().unwrap();
        assert_eq!(edited.due_date, None);
    }

    #[test]
    fn test_edit_unknown_id_or_blank_text_is_noop() {
        let mut store = new_store();
        let task = store.add(NewTask::new("Keep me")).unwrap().unwrap();

        assert_eq!(store.edit(999, TaskPatch::from(&task)).unwrap(), None);

        let mut blank = TaskPatch::from(&task);
        blank.text = "  ".to_string();
        assert_eq!(store.edit(task.id, blank).unwrap(), None);

        assert_eq!(store.get(task.id).unwrap().text, "Keep me");
    }

    #[test]
    fn test_list_does_not_reorder() {
        let mut store = new_store();
        let a = store.add(NewTask::new("A")).unwrap().unwrap();
        store.add(NewTask::new("B").priority(Priority::High)).unwrap();
        store.add(NewTask::new("C")).unwrap();
        store.toggle(a.id).unwrap();

        assert_eq!(texts(&store.list(Filter::All)), vec!["A", "B", "C"]);
        assert_eq!(texts(&store.list(Filter::Active)), vec!["B", "C"]);
    }

    #[test]
    fn test_active_and_completed_partition_all() {
        let mut store = new_store();
        let ids: Vec<i64> = (0..6)
            .map(|i| store.add(NewTask::new(format!("t{}", i))).unwrap().unwrap().id)
            .collect();
        for id in ids.iter().step_by(2) {
            store.toggle(*id).unwrap();
        }

        let active: HashSet<i64> = store.list(Filter::Active).iter().map(|t| t.id).collect();
        let completed: HashSet<i64> = store.list(Filter::Completed).iter().map(|t| t.id).collect();
        let all: HashSet<i64> = store.list(Filter::All).iter().map(|t| t.id).collect();

        assert!(active.is_disjoint(&completed));
        assert_eq!(active.union(&completed).copied().collect::<HashSet<_>>(), all);
    }

    #[test]
    fn test_failed_write_leaves_state_unchanged() {
        let mut store = TaskStore::open_with(FlakyStorage::default(), ManualClock::at_ms(T0), DEFAULT_KEY).unwrap();
        let task = store.add(NewTask::new("Stable")).unwrap().unwrap();

        store.storage.fail_writes = true;

        assert!(store.add(NewTask::new("Lost")).is_err());
        assert!(store.toggle(task.id).is_err());
        assert!(store.delete(task.id).is_err());

        assert_eq!(store.tasks(), &[task]);
        assert_mirrored(&store);
    }

    #[test]
    fn test_reopen_restores_tasks() {
        let temp = TempDir::new().unwrap();
        let due = Utc.with_ymd_and_hms(2024, 9, 9, 12, 0, 0).unwrap();

        let saved = {
            let mut store = TaskStore::open(FileStorage::open(temp.path()).unwrap()).unwrap();
            store.add(NewTask::new("No due")).unwrap();
            let t = store.add(NewTask::new("With due").due(Some(due))).unwrap().unwrap();
            store.toggle(t.id).unwrap();
            store.tasks().to_vec()
        };

        let store = TaskStore::open(FileStorage::open(temp.path()).unwrap()).unwrap();
        assert_eq!(store.tasks(), saved.as_slice());
        assert_eq!(store.tasks()[0].due_date, None);
        assert_eq!(store.tasks()[1].due_date, Some(due));
    }

    #[test]
    fn test_sqlite_backed_store() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("todostore.db");

        {
            let mut store = TaskStore::open(SqliteStorage::open(&db_path).unwrap()).unwrap();
            store.add(NewTask::new("In SQLite")).unwrap();
        }

        let store = TaskStore::open(SqliteStorage::open(&db_path).unwrap()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.tasks()[0].text, "In SQLite");
    }

    #[test]
    fn test_custom_key_is_isolated() {
        let storage = MemoryStorage::new().with_slot("tasks", "[]");
        let mut store = TaskStore::open_with(storage, ManualClock::at_ms(T0), "work").unwrap();
        store.add(NewTask::new("Separate list")).unwrap();

        assert_eq!(store.storage().load("tasks").unwrap().as_deref(), Some("[]"));
        assert!(store.storage().load("work").unwrap().is_some());
        assert!(store.storage().load("work.version").unwrap().is_some());
    }

    #[test]
    fn test_blank_text_entries_are_not_loaded() {
        let raw = r#"[
            {"id":1,"text":"   ","createdAt":"2024-01-01T00:00:00Z"},
            {"id":2,"text":"Real","createdAt":"2024-01-01T00:00:00Z"}
        ]"#;
        let storage = MemoryStorage::new().with_slot("tasks", raw);
        let store = TaskStore::open_with(storage, ManualClock::at_ms(T0), DEFAULT_KEY).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.tasks().iter().all(|t| !t.text.trim().is_empty()));
    }

    #[test]
    fn test_entry_missing_created_at_survives_next_sync() {
        let raw = r#"[
            {"id":1718000000000,"text":"Old task without createdAt"},
            {"id":1718000000001,"text":"Current","createdAt":"2024-06-10T06:13:20Z"}
        ]"#;
        let storage = MemoryStorage::new().with_slot("tasks", raw);
        let mut store = TaskStore::open_with(storage, ManualClock::at_ms(T0), DEFAULT_KEY).unwrap();

        store.toggle(1_718_000_000_001).unwrap();

        let ids: Vec<i64> = store.tasks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1_718_000_000_000, 1_718_000_000_001]);
        assert_eq!(store.tasks()[0].created_at.timestamp_millis(), 1_718_000_000_000);
        assert_mirrored(&store);
    }

    #[test]
    fn test_legacy_list_is_rewritten_on_next_sync() {
        let raw = r#"[{"id":1,"text":"Informe","category":"Trabajo","createdAt":"2024-06-10T06:13:20.000Z"}]"#;
        let storage = MemoryStorage::new().with_slot("tasks", raw);
        let mut store = TaskStore::open_with(storage, ManualClock::at_ms(T0), DEFAULT_KEY).unwrap();

        assert_eq!(store.tasks()[0].category, Category::Work);
        assert_eq!(store.tasks()[0].details, "");

        store.toggle(1).unwrap();
        let rewritten = store.storage().load("tasks").unwrap().unwrap();
        assert!(rewritten.contains("\"category\":\"Work\""));
        assert!(rewritten.contains("\"details\":\"\""));
        assert!(rewritten.contains("\"dueDate\":null"));
    }
}
