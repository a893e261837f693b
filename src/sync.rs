use std::{
    io::{self, Write},
    path::Path,
};

use crate::{config::SyncConfig, error::Result};

/// Pushes one changed file to the remote side.
///
/// Implementations must never write `config.remote_pass` to any output,
/// including error messages.
pub trait SyncAction {
    fn sync(&mut self, path: &Path, config: &SyncConfig) -> Result<()>;
}

/// Placeholder transfer that only reports what would be synced.
#[derive(Debug)]
pub struct ConsoleSync<W> {
    out: W,
}

impl ConsoleSync<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleSync<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SyncAction for ConsoleSync<W> {
    fn sync(&mut self, path: &Path, config: &SyncConfig) -> Result<()> {
        let out = &mut self.out;
        writeln!(out, "Syncing remote file: {}", path.display())?;
        writeln!(out, "Remote host: {}", config.remote_host)?;
        writeln!(out, "Remote path: {}", config.remote_path)?;
        writeln!(out, "Remote user: {}", config.remote_user)?;
        writeln!(out, "Mirror folder: {}", config.mirror_folder)?;
        out.flush()?;
        Ok(())
    }
}
