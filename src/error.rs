//! Error types for the watcher.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Current directory is not a git repository")]
    NotARepository { path: PathBuf },

    #[error("failed to check for a git repository in {}", path.display())]
    RepoCheck {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read configuration file {}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The OS notification facility could not be created.
    #[error("failed to create file watcher")]
    Watcher(#[source] notify::Error),

    #[error("failed to walk directory tree")]
    Walk(#[from] walkdir::Error),

    #[error("failed to watch {}", path.display())]
    Register {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("failed to sync {}: {reason}", path.display())]
    Sync { path: PathBuf, reason: String },

    #[error("dispatcher thread panicked")]
    DispatcherPanicked,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
