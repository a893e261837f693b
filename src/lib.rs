//! Watches a git working tree and hands every written file to a sync action.

mod config;
mod dispatch;
mod error;
pub mod logging;
mod repo;
mod startup;
mod sync;
mod watcher;

pub use config::{load_config, SyncConfig, CONFIG_FILE};
pub use dispatch::{
    is_qualifying, is_write, DispatchStats, Dispatcher, DispatcherHandle, FailurePolicy,
    GIT_DIR_SUFFIX,
};
pub use error::{Error, Result};
pub use repo::{ensure_git_repo, is_git_repo, GIT_DIR};
pub use startup::{start, start_with};
pub use sync::{ConsoleSync, SyncAction};
pub use watcher::{watch_tree, TreeWatcher, WatchSet};
