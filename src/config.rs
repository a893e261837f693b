use std::{
    collections::BTreeMap,
    fmt,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use serde::{
    de::value::{Error as ValueError, MapDeserializer},
    Deserialize,
};

use crate::error::{Error, Result};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = ".rsync";

/// Remote connection parameters read from `.rsync`.
///
/// Every field defaults to an empty string. Nothing is validated here; a
/// missing host or path only matters once a [`crate::SyncAction`] uses it.
#[derive(Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "PascalCase")]
pub struct SyncConfig {
    pub remote_host: String,
    pub remote_path: String,
    pub remote_user: String,
    pub remote_pass: String,
    pub mirror_folder: String,
}

// Hand-written so the password never reaches a log line.
impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pass = if self.remote_pass.is_empty() {
            ""
        } else {
            "<redacted>"
        };
        f.debug_struct("SyncConfig")
            .field("remote_host", &self.remote_host)
            .field("remote_path", &self.remote_path)
            .field("remote_user", &self.remote_user)
            .field("remote_pass", &pass)
            .field("mirror_folder", &self.mirror_folder)
            .finish()
    }
}

impl SyncConfig {
    /// Parses `key=value` lines.
    ///
    /// Lines without `=` are skipped. Keys and values are trimmed and split on
    /// the first `=` only. Unknown keys are ignored, and when a key repeats the
    /// last occurrence wins.
    pub fn parse(text: &str) -> io::Result<Self> {
        Self::from_reader(text.as_bytes())
    }

    /// Reads lines as raw bytes, so a line with an unknown key is skipped
    /// whatever its encoding. Only a failed read fails the load.
    pub fn from_reader<R: BufRead>(mut reader: R) -> io::Result<Self> {
        let mut pairs = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if let Some(pair) = split_line(line) {
                pairs.push(pair);
            }
        }
        Self::from_pairs(pairs).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn from_pairs<I>(pairs: I) -> std::result::Result<Self, ValueError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let map: BTreeMap<String, String> = pairs.into_iter().collect();
        Self::deserialize(MapDeserializer::new(map.into_iter()))
    }
}

fn split_line(line: &[u8]) -> Option<(String, String)> {
    let eq = line.iter().position(|&b| b == b'=')?;
    let (key, value) = (&line[..eq], &line[eq + 1..]);
    Some((
        String::from_utf8_lossy(key).trim().to_string(),
        String::from_utf8_lossy(value).trim().to_string(),
    ))
}

/// Opens and parses the configuration file at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<SyncConfig> {
    let path = path.as_ref();
    let wrap = |source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(wrap)?;
    let config = SyncConfig::from_reader(BufReader::new(file)).map_err(wrap)?;
    tracing::debug!(path = %path.display(), ?config, "configuration loaded");
    Ok(config)
}
