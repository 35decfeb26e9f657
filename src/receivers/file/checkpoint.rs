// SPDX-License-Identifier: Apache-2.0

//! Per-file offset checkpoints.
//!
//! Each monitored file has one record in the checkpoint directory with the same
//! name. The record holds the decimal byte offset followed by a newline. Writes go
//! to a temp file that is synced and then renamed over the record, so a reader
//! never observes a partially written offset.
//!
//! The record's modification time is part of the state. The sweeper stamps it with
//! the monitored file's modification time as seen when the file was listed, or an
//! earlier one when the file still has unread lines, and only tails files that were
//! modified after their record.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::receivers::file::error::{Error, Result};
use crate::receivers::file::finder;

/// Suffix of in-progress checkpoint writes. Records with this suffix are ignored.
pub const TEMP_SUFFIX: &str = ".linetail-tmp";

/// A persisted checkpoint record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Directory holding the record
    pub dir: PathBuf,
    /// Name of the monitored file this record belongs to
    pub name: String,
    /// Modification time of the record itself
    pub modified: SystemTime,
}

impl Checkpoint {
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }
}

/// Reads and writes checkpoint records in a single directory
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open the store, creating the directory if it does not exist yet
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| Error::Persistence {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(Self { dir })
    }

    /// List every checkpoint record in the store
    pub fn list(&self) -> Result<BTreeMap<String, Checkpoint>> {
        finder::list_checkpoints(&self.dir)
    }

    /// Read the persisted offset for `name`, 0 when no record exists yet.
    pub fn read_offset(&self, name: &str) -> Result<u64> {
        let path = self.dir.join(name);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::CheckpointUnavailable { path, source: e }),
        };

        parse_offset(&bytes).ok_or_else(|| Error::CorruptCheckpoint {
            path,
            content: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    /// Durably persist `offset` for `name`, stamping the record with `modified`.
    pub fn write_offset(&self, name: &str, offset: u64, modified: SystemTime) -> Result<Checkpoint> {
        let path = self.dir.join(name);
        let persistence = |e: io::Error| Error::Persistence {
            path: path.clone(),
            source: e,
        };

        atomic_write(
            &self.dir,
            &path,
            format!("{}\n", offset).as_bytes(),
            modified,
        )
        .map_err(persistence)?;

        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(persistence)?;

        debug!(checkpoint = %path.display(), offset, "Saved checkpoint");

        Ok(Checkpoint {
            dir: self.dir.clone(),
            name: name.to_string(),
            modified,
        })
    }
}

fn parse_offset(bytes: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(bytes).ok()?.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn atomic_write(
    dir: &Path,
    path: &Path,
    contents: &[u8],
    modified: SystemTime,
) -> io::Result<()> {
    use portable_atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid checkpoint name"))?;

    let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_path = dir.join(format!(
        ".{}.{}.{}{}",
        file_name,
        std::process::id(),
        unique_id,
        TEMP_SUFFIX
    ));

    let result = write_and_rename(&temp_path, path, contents, modified);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result?;

    sync_dir(dir)
}

fn write_and_rename(
    temp_path: &Path,
    path: &Path,
    contents: &[u8],
    modified: SystemTime,
) -> io::Result<()> {
    let mut file = File::create(temp_path)?;
    file.write_all(contents)?;
    file.set_modified(modified)?;
    file.sync_all()?;
    drop(file);

    fs::rename(temp_path, path)
}

// Makes the rename itself durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    OpenOptions::new().read(true).open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
