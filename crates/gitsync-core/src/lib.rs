pub mod config;
pub mod error;
pub mod git;
pub mod logging;
pub mod model;
pub mod notebook;
pub mod signal;
pub mod storage;
pub mod token;

pub use config::Settings;
pub use error::{Result, SyncError};
pub use git::{GitCommand, GitOps, GitOutcome};
pub use model::{Content, CursorPosition, Origin, SyncStatus, VersionSet, Viewport};
pub use notebook::{Cell, Notebook};
pub use signal::{Signal, Subscription};
pub use storage::{ContentStore, FsContentStore, MemoryContentStore};
