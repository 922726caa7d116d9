// todostore - single-user to-do list with a persisted mirror

pub mod clock;
pub mod codec;
pub mod config;
pub mod filter;
pub mod models;
pub mod storage;
pub mod store;

// Re-export main types for convenience
pub use clock::{Clock, SystemClock};
pub use config::{Backend, Config};
pub use filter::Filter;
pub use models::{Category, NewTask, Priority, Task, TaskPatch, now_ms};
pub use storage::{FileStorage, MemoryStorage, SqliteStorage, Storage};
pub use store::{DEFAULT_KEY, TaskStore};
