use std::{
    path::{Path, PathBuf},
    sync::mpsc::Sender,
};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Files registered with the notification facility by the startup walk.
///
/// Fixed after the walk: files created later are not watched.
#[derive(Debug, Default, Clone)]
pub struct WatchSet {
    paths: Vec<PathBuf>,
}

impl WatchSet {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }
}

/// Walks `root` and registers every regular file with `watcher`.
///
/// Directories are descended into but not registered. Symlinks are neither
/// followed nor registered. The first traversal or registration error aborts
/// the walk.
pub fn watch_tree<W: Watcher + ?Sized>(watcher: &mut W, root: &Path) -> Result<WatchSet> {
    let mut set = WatchSet::default();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        watcher
            .watch(entry.path(), RecursiveMode::NonRecursive)
            .map_err(|source| Error::Register {
                path: entry.path().to_path_buf(),
                source,
            })?;
        tracing::trace!(path = %entry.path().display(), "watching");
        set.paths.push(entry.into_path());
    }
    Ok(set)
}

/// Owns the OS watch handle for a tree.
///
/// Events go to the sender given to [`TreeWatcher::new`]. Dropping the
/// `TreeWatcher` releases the handle and closes that channel.
#[derive(Debug)]
pub struct TreeWatcher<W = RecommendedWatcher> {
    _watcher: W,
    watched: WatchSet,
}

impl TreeWatcher {
    pub fn new(root: &Path, events: Sender<notify::Result<Event>>) -> Result<Self> {
        let watcher = notify::recommended_watcher(events).map_err(Error::Watcher)?;
        Self::with_watcher(root, watcher)
    }
}

impl<W: Watcher> TreeWatcher<W> {
    pub fn with_watcher(root: &Path, mut watcher: W) -> Result<Self> {
        let watched = watch_tree(&mut watcher, root)?;
        tracing::debug!(root = %root.display(), files = watched.len(), "tree registered");
        Ok(Self {
            _watcher: watcher,
            watched,
        })
    }

    pub fn watch_set(&self) -> &WatchSet {
        &self.watched
    }
}
