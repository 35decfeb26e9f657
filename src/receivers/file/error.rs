// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;
use tower::BoxError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Directory unavailable: {path}: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid file pattern: {0}")]
    PatternInvalid(#[from] regex::Error),

    #[error("File unavailable: {path}: {source}")]
    FileUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Tailer already open: {0}")]
    AlreadyOpen(PathBuf),

    #[error("Tailer not open")]
    NotOpen,

    #[error("Checkpoint unavailable: {path}: {source}")]
    CheckpointUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt checkpoint {path}: {content:?}")]
    CorruptCheckpoint { path: PathBuf, content: String },

    #[error("Persistence error: {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Delivery failed: {0}")]
    Delivery(#[source] BoxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Errors that abort the remainder of a sweep under the default policy.
    pub fn is_delivery(&self) -> bool {
        matches!(self, Error::Delivery(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
