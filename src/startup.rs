use std::{path::Path, sync::mpsc::Sender};

use notify::{Event, RecommendedWatcher, Watcher};

use crate::{
    config::{load_config, SyncConfig, CONFIG_FILE},
    error::{Error, Result},
    repo::ensure_git_repo,
    watcher::TreeWatcher,
};

/// Repository guard, then `.rsync`, then the tree walk.
///
/// Each step runs only if the previous one succeeded, so a directory that is
/// not a repository never has its configuration read or any file watched.
pub fn start(
    root: &Path,
    events: Sender<notify::Result<Event>>,
) -> Result<(SyncConfig, TreeWatcher<RecommendedWatcher>)> {
    start_with(root, || notify::recommended_watcher(events))
}

/// [`start`] with a caller-supplied watch facility, built only after the
/// configuration has loaded.
pub fn start_with<W, F>(root: &Path, make_watcher: F) -> Result<(SyncConfig, TreeWatcher<W>)>
where
    W: Watcher,
    F: FnOnce() -> notify::Result<W>,
{
    ensure_git_repo(root)?;
    let config = load_config(root.join(CONFIG_FILE))?;
    let watcher = make_watcher().map_err(Error::Watcher)?;
    let tree = TreeWatcher::with_watcher(root, watcher)?;
    Ok((config, tree))
}
