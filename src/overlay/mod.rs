//! Status overlay: one small text file per annotated entry.
//!
//! Files live flat in a single directory and are named `status_<id>.txt`.
//! Their content is the raw status string. The overlay is keyed by entry id
//! but does not follow entry deletes; an annotation outlives its entry.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

mod writer;

pub use writer::{OverlayEvent, OverlayWriter};

const FILE_PREFIX: &str = "status_";
const FILE_EXTENSION: &str = "txt";
const TMP_EXTENSION: &str = "txt.tmp";

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("creating status directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("reading status directory {}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("reading status file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("writing status file {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// In-memory id → status map rebuilt from disk once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusIndex {
    statuses: HashMap<i64, String>,
}

impl StatusIndex {
    pub fn set(&mut self, id: i64, status: impl Into<String>) {
        self.statuses.insert(id, status.into());
    }

    /// Empty strings count as "no status".
    pub fn get(&self, id: i64) -> Option<&str> {
        self.statuses
            .get(&id)
            .map(String::as_str)
            .filter(|status| !status.is_empty())
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

impl FromIterator<(i64, String)> for StatusIndex {
    fn from_iter<I: IntoIterator<Item = (i64, String)>>(iter: I) -> Self {
        Self {
            statuses: iter.into_iter().collect(),
        }
    }
}

/// Result of one directory scan. Files that matched the naming scheme but
/// could not be read are listed instead of failing the scan.
#[derive(Debug, Clone, Default)]
pub struct StatusScan {
    pub index: StatusIndex,
    pub unreadable: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct StatusOverlayStore {
    dir: PathBuf,
}

impl StatusOverlayStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, OverlayError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| OverlayError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: i64) -> PathBuf {
        self.dir.join(file_name(id))
    }

    /// Overwrites the status for `id`. The new content lands under a
    /// temporary name first so a reader never sees a half-written file.
    pub fn put(&self, id: i64, status: &str) -> Result<(), OverlayError> {
        let final_path = self.path_for(id);
        let tmp_path = final_path.with_extension(TMP_EXTENSION);
        fs::write(&tmp_path, status.as_bytes()).map_err(|source| OverlayError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &final_path).map_err(|source| OverlayError::Write {
            path: final_path.clone(),
            source,
        })?;
        tracing::debug!(id, path = %final_path.display(), "persisted status");
        Ok(())
    }

    pub fn load_all(&self) -> Result<StatusIndex, OverlayError> {
        self.scan().map(|scan| scan.index)
    }

    /// Reads every `status_<id>.txt` in the directory. Content is decoded
    /// lossily; a file that cannot be read at all is skipped and reported.
    pub fn scan(&self) -> Result<StatusScan, OverlayError> {
        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(StatusScan::default()),
            Err(source) => {
                return Err(OverlayError::ReadDir {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut scan = StatusScan::default();
        for entry in dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(?err, "skipping unreadable status entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !name.starts_with(FILE_PREFIX) || name.ends_with(TMP_EXTENSION) {
                continue;
            }
            let Some(id) = parse_file_name(name) else {
                tracing::warn!(file = name, "skipping status file with malformed id");
                continue;
            };
            match fs::read(&path) {
                Ok(bytes) => scan.index.set(id, String::from_utf8_lossy(&bytes)),
                Err(err) => {
                    tracing::warn!(?err, path = %path.display(), "skipping unreadable status file");
                    scan.unreadable.push(path);
                }
            }
        }
        tracing::info!(
            count = scan.index.len(),
            unreadable = scan.unreadable.len(),
            "loaded entry statuses"
        );
        Ok(scan)
    }
}

pub fn file_name(id: i64) -> String {
    format!("{FILE_PREFIX}{id}.{FILE_EXTENSION}")
}

/// Recovers the id from `status_<id>.txt`; anything else is `None`.
/// Only the canonical spelling counts, so `status_007.txt` or
/// `status_+7.txt` never shadow `status_7.txt`.
pub fn parse_file_name(name: &str) -> Option<i64> {
    let digits = name
        .strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_EXTENSION)?
        .strip_suffix('.')?;
    let id: i64 = digits.parse().ok()?;
    (id.to_string() == digits).then_some(id)
}
