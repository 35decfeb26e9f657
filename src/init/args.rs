// SPDX-License-Identifier: Apache-2.0

use crate::exporters::{HttpDeliveryConfig, TokenBucket};
use crate::init::parse;
use crate::receivers::file::{SweepErrorPolicy, TailConfig};
use clap::{Args, ValueEnum};
use http::Uri;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Args, Clone)]
pub struct TailArgs {
    /// Directory containing the log files to tail
    #[arg(long, env = "LINETAIL_MONITOR_PATH")]
    pub monitor_path: PathBuf,

    /// Directory where per-file offsets are recorded
    #[arg(long, env = "LINETAIL_CHECKPOINT_PATH")]
    pub checkpoint_path: PathBuf,

    /// Regular expression selecting file names in the monitor path
    #[arg(long, env = "LINETAIL_FILE_PATTERN", default_value = ".*")]
    pub file_pattern: String,

    /// Destination URL for delivered lines
    #[arg(
        long,
        env = "LINETAIL_URL",
        value_parser = parse::parse_url,
        required_unless_present = "dry_run"
    )]
    pub url: Option<Uri>,

    /// Content-Type header sent with each line
    #[arg(
        long,
        env = "LINETAIL_CONTENT_TYPE",
        default_value = "application/json",
        value_parser = parse::parse_content_type
    )]
    pub content_type: String,

    /// Maximum deliveries per second
    #[arg(
        long,
        env = "LINETAIL_RATE_LIMIT",
        default_value = "60",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub rate_limit: u32,

    /// Deliveries allowed back to back before the rate limit applies. Defaults to the rate limit
    #[arg(
        long,
        env = "LINETAIL_BURST",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub burst: Option<u32>,

    /// Seconds to wait between sweeps of the monitor path
    #[arg(
        long,
        env = "LINETAIL_CHECK_INTERVAL",
        default_value = "60",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub check_interval: u64,

    /// Request timeout in seconds for HTTP delivery
    #[arg(
        long,
        env = "LINETAIL_REQUEST_TIMEOUT",
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub request_timeout: u64,

    /// Lines longer than this many bytes are delivered truncated
    #[arg(
        long,
        env = "LINETAIL_MAX_LINE_BYTES",
        default_value = "65536",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub max_line_bytes: u64,

    /// Log lines instead of sending them, and don't record offsets
    #[arg(long, env = "LINETAIL_DRY_RUN", default_value = "false")]
    pub dry_run: bool,

    /// What a sweep does when a delivery fails
    #[arg(
        value_enum,
        long,
        env = "LINETAIL_SWEEP_ERROR_POLICY",
        default_value = "abort-sweep"
    )]
    pub sweep_error_policy: SweepErrorPolicyArg,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SweepErrorPolicyArg {
    /// Stop the sweep at the first failed delivery
    #[default]
    AbortSweep,
    /// Skip the rest of the failing file and continue with the others
    IsolateFile,
}

impl From<SweepErrorPolicyArg> for SweepErrorPolicy {
    fn from(p: SweepErrorPolicyArg) -> Self {
        match p {
            SweepErrorPolicyArg::AbortSweep => SweepErrorPolicy::AbortSweep,
            SweepErrorPolicyArg::IsolateFile => SweepErrorPolicy::IsolateFile,
        }
    }
}

impl TailArgs {
    pub fn tail_config(&self) -> TailConfig {
        TailConfig {
            monitor_path: self.monitor_path.clone(),
            checkpoint_path: self.checkpoint_path.clone(),
            file_pattern: self.file_pattern.clone(),
            check_interval: Duration::from_secs(self.check_interval),
            dry_run: self.dry_run,
            sweep_error_policy: self.sweep_error_policy.into(),
            max_line_bytes: usize::try_from(self.max_line_bytes).unwrap_or(usize::MAX),
        }
    }

    /// HTTP delivery settings, or None when no URL was given
    pub fn http_config(&self) -> Option<HttpDeliveryConfig> {
        self.url.as_ref().map(|url| HttpDeliveryConfig {
            url: url.clone(),
            content_type: self.content_type.clone(),
            request_timeout: Duration::from_secs(self.request_timeout),
        })
    }

    pub fn rate_limiter(&self) -> TokenBucket {
        TokenBucket::new(self.rate_limit, self.burst.unwrap_or(self.rate_limit))
    }
}
