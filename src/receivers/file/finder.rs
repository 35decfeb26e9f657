// SPDX-License-Identifier: Apache-2.0

use regex::Regex;
use std::collections::BTreeMap;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

use crate::receivers::file::checkpoint::{Checkpoint, TEMP_SUFFIX};
use crate::receivers::file::error::{Error, Result};

/// A log file selected for tailing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorFile {
    /// Directory containing the file
    pub dir: PathBuf,
    /// File name, the identity shared with its checkpoint
    pub name: String,
    /// Last modification time
    pub modified: SystemTime,
    /// Size in bytes at scan time
    pub size: u64,
}

impl MonitorFile {
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }
}

/// FileFinder lists the regular files in a directory whose name matches a pattern
#[derive(Debug, Clone)]
pub struct FileFinder {
    dir: PathBuf,
    pattern: Regex,
}

impl FileFinder {
    /// Create a new FileFinder, compiling the name pattern up front
    pub fn new(dir: impl AsRef<Path>, pattern: &str) -> Result<Self> {
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            pattern: Regex::new(pattern)?,
        })
    }

    /// Find all matching files, keyed and ordered by file name
    pub fn find_files(&self) -> Result<BTreeMap<String, MonitorFile>> {
        let mut files = BTreeMap::new();

        for (name, metadata) in regular_files(&self.dir)? {
            if !self.pattern.is_match(&name) {
                continue;
            }

            files.insert(
                name.clone(),
                MonitorFile {
                    dir: self.dir.clone(),
                    name,
                    modified: modified(&metadata, &self.dir)?,
                    size: metadata.len(),
                },
            );
        }

        Ok(files)
    }
}

/// List the checkpoint records found in `dir`, keyed and ordered by file name
pub fn list_checkpoints(dir: &Path) -> Result<BTreeMap<String, Checkpoint>> {
    let mut checkpoints = BTreeMap::new();

    for (name, metadata) in regular_files(dir)? {
        if name.ends_with(TEMP_SUFFIX) {
            continue;
        }

        checkpoints.insert(
            name.clone(),
            Checkpoint {
                dir: dir.to_path_buf(),
                name,
                modified: modified(&metadata, dir)?,
            },
        );
    }

    Ok(checkpoints)
}

fn regular_files(dir: &Path) -> Result<Vec<(String, Metadata)>> {
    let unavailable = |e: io::Error| Error::DirectoryUnavailable {
        path: dir.to_path_buf(),
        source: e,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(unavailable)? {
        let entry = entry.map_err(unavailable)?;

        let metadata = match entry.metadata() {
            Ok(m) => m,
            // Removed between listing and stat
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(unavailable(e)),
        };

        // Symlinks are not followed
        if !metadata.file_type().is_file() {
            continue;
        }

        match entry.file_name().into_string() {
            Ok(name) => files.push((name, metadata)),
            Err(name) => debug!(file = ?name, "Skipping file with non UTF-8 name"),
        }
    }

    Ok(files)
}

fn modified(metadata: &Metadata, dir: &Path) -> Result<SystemTime> {
    metadata.modified().map_err(|e| Error::DirectoryUnavailable {
        path: dir.to_path_buf(),
        source: e,
    })
}
