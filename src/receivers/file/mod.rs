// SPDX-License-Identifier: Apache-2.0

//! File tailer with offset checkpoints.
//!
//! Periodically sweeps a directory for log files matching a pattern, reads the
//! lines appended since the last sweep and hands them to a dispatcher. How far
//! each file was consumed is stored as a checkpoint so a restart resumes where the
//! previous run stopped.
//!
//! Features:
//! - Only complete, newline terminated lines are consumed
//! - Atomic, synced checkpoint writes
//! - Cooperative cancellation between files and between lines

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod finder;
pub mod scanner;
pub mod sweeper;
pub mod tailer;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use config::{SweepErrorPolicy, TailConfig};
pub use error::{Error, Result};
pub use finder::{FileFinder, MonitorFile, list_checkpoints};
pub use scanner::{LineScanner, ScannedLine};
pub use sweeper::{SweepSummary, Sweeper};
pub use tailer::Tailer;
