// SPDX-License-Identifier: Apache-2.0

//! Resumable line reader for a single file.
//!
//! A tailer is either closed or holds an open session: the file handle, the line
//! scanner and the offset of everything consumed so far. A line returned by
//! [`Tailer::next_line`] is staged, not consumed. It only counts towards the offset
//! once [`Tailer::ack`] is called, so a line whose delivery failed is read again by
//! the next session.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::receivers::file::error::{Error, Result};
use crate::receivers::file::scanner::{DEFAULT_MAX_LINE_BYTES, LineScanner, ScannedLine};

struct Session {
    path: PathBuf,
    scanner: LineScanner<BufReader<File>>,
    offset: u64,
    staged: Option<ScannedLine>,
}

enum TailerState {
    Closed,
    Open(Session),
}

/// Reads complete lines from a file starting at a byte offset
pub struct Tailer {
    state: TailerState,
    max_line_bytes: usize,
}

impl Default for Tailer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tailer {
    pub fn new() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }

    /// Tailer that truncates lines longer than `max_line_bytes`
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            state: TailerState::Closed,
            max_line_bytes,
        }
    }

    /// Open `path` positioned at `start_offset`
    pub fn open(&mut self, path: impl AsRef<Path>, start_offset: u64) -> Result<()> {
        if let TailerState::Open(session) = &self.state {
            return Err(Error::AlreadyOpen(session.path.clone()));
        }

        let path = path.as_ref().to_path_buf();
        let unavailable = |e| Error::FileUnavailable {
            path: path.clone(),
            source: e,
        };

        let mut file = File::open(&path).map_err(unavailable)?;
        let size = file.metadata().map_err(unavailable)?.len();
        if start_offset > size {
            warn!(
                file = %path.display(),
                offset = start_offset,
                size,
                "Checkpoint is beyond the end of the file, it may have been truncated"
            );
        }
        file.seek(SeekFrom::Start(start_offset))
            .map_err(unavailable)?;

        self.state = TailerState::Open(Session {
            path,
            scanner: LineScanner::with_max_line_bytes(BufReader::new(file), self.max_line_bytes),
            offset: start_offset,
            staged: None,
        });
        Ok(())
    }

    #[cfg(test)]
    fn is_open(&self) -> bool {
        matches!(self.state, TailerState::Open(_))
    }

    #[cfg(test)]
    fn path(&self) -> Option<&Path> {
        match &self.state {
            TailerState::Open(session) => Some(&session.path),
            TailerState::Closed => None,
        }
    }

    /// Stage the next complete line. Returns the staged line again until it is acked.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        let session = self.session_mut()?;

        if let Some(staged) = &session.staged {
            return Ok(Some(staged.text.clone()));
        }

        match session.scanner.next_line()? {
            Some(line) => {
                let text = line.text.clone();
                session.staged = Some(line);
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    /// Mark the staged line as consumed and return the new offset
    pub fn ack(&mut self) -> Result<u64> {
        let session = self.session_mut()?;
        if let Some(line) = session.staged.take() {
            session.offset += line.consumed;
        }
        Ok(session.offset)
    }

    /// Offset just past the last consumed line
    pub fn offset(&self) -> Result<u64> {
        match &self.state {
            TailerState::Open(session) => Ok(session.offset),
            TailerState::Closed => Err(Error::NotOpen),
        }
    }

    /// Release the file handle and return the final offset
    pub fn close(&mut self) -> Result<u64> {
        match std::mem::replace(&mut self.state, TailerState::Closed) {
            TailerState::Open(session) => Ok(session.offset),
            TailerState::Closed => Err(Error::NotOpen),
        }
    }

    fn session_mut(&mut self) -> Result<&mut Session> {
        match &mut self.state {
            TailerState::Open(session) => Ok(session),
            TailerState::Closed => Err(Error::NotOpen),
        }
    }
}
