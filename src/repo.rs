use std::{fs, io, path::Path};

use crate::error::{Error, Result};

/// Name of the version-control marker expected directly under the watched root.
pub const GIT_DIR: &str = ".git";

/// Reports whether `path` has a `.git` entry as an immediate child.
///
/// A `.git` file (worktrees, submodules) counts as well as a directory. Only a
/// missing entry yields `false`; any other I/O failure is returned so that an
/// unreadable directory is never mistaken for a repository.
pub fn is_git_repo(path: &Path) -> Result<bool> {
    let marker = path.join(GIT_DIR);
    match fs::metadata(&marker) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(Error::RepoCheck {
            path: marker,
            source,
        }),
    }
}

pub fn ensure_git_repo(path: &Path) -> Result<()> {
    if is_git_repo(path)? {
        Ok(())
    } else {
        Err(Error::NotARepository {
            path: path.to_path_buf(),
        })
    }
}
