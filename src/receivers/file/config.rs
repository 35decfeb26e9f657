// SPDX-License-Identifier: Apache-2.0

//! Configuration for the file tailer.

use std::path::PathBuf;
use std::time::Duration;

use crate::receivers::file::scanner::DEFAULT_MAX_LINE_BYTES;

/// What a sweep does when delivering a line fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SweepErrorPolicy {
    /// Stop the whole sweep; remaining files wait for the next one
    #[default]
    AbortSweep,
    /// Stop only the failing file and continue with the rest of the sweep
    IsolateFile,
}

/// Configuration for the sweeper
#[derive(Debug, Clone)]
pub struct TailConfig {
    /// Directory containing the log files to tail
    pub monitor_path: PathBuf,
    /// Directory holding one checkpoint record per monitored file
    pub checkpoint_path: PathBuf,
    /// Regular expression matched against file names in `monitor_path`
    pub file_pattern: String,
    /// Time to sleep between sweeps
    pub check_interval: Duration,
    /// Log offsets instead of persisting them
    pub dry_run: bool,
    /// How delivery errors propagate within a sweep
    pub sweep_error_policy: SweepErrorPolicy,
    /// Longer lines are delivered truncated to this many bytes
    pub max_line_bytes: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            monitor_path: PathBuf::new(),
            checkpoint_path: PathBuf::new(),
            file_pattern: ".*".to_string(),
            check_interval: Duration::from_secs(60),
            dry_run: false,
            sweep_error_policy: SweepErrorPolicy::AbortSweep,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl TailConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.monitor_path.as_os_str().is_empty() {
            return Err("A monitor path must be specified".to_string());
        }

        if self.checkpoint_path.as_os_str().is_empty() {
            return Err("A checkpoint path must be specified".to_string());
        }

        if self.monitor_path == self.checkpoint_path {
            return Err("The monitor and checkpoint paths must be different directories".to_string());
        }

        if self.check_interval.is_zero() {
            return Err("The check interval must be greater than zero".to_string());
        }

        if self.max_line_bytes == 0 {
            return Err("The maximum line length must be greater than zero".to_string());
        }

        Ok(())
    }
}
