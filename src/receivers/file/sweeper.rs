// SPDX-License-Identifier: Apache-2.0

//! Poll loop driving the tailer.
//!
//! Each sweep lists the monitored files and the existing checkpoints, tails every
//! file that is new or was modified after its checkpoint was written, delivers the
//! new lines and persists how far each file was consumed. Sweeps repeat every
//! `check_interval` until the cancellation token fires.

use std::time::{Duration, SystemTime};

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::exporters::Dispatcher;
use crate::receivers::file::checkpoint::CheckpointStore;
use crate::receivers::file::config::{SweepErrorPolicy, TailConfig};
use crate::receivers::file::error::{Error, Result};
use crate::receivers::file::finder::{FileFinder, MonitorFile};
use crate::receivers::file::tailer::Tailer;

/// Counters for a single sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub new_files: usize,
    pub updated_files: usize,
    pub skipped_files: usize,
    pub failed_files: usize,
    pub lines_delivered: u64,
}

pub struct Sweeper {
    config: TailConfig,
    finder: FileFinder,
    store: CheckpointStore,
    dispatcher: Dispatcher,
    tailer: Tailer,
}

impl Sweeper {
    pub fn new(config: TailConfig, dispatcher: Dispatcher) -> Result<Self> {
        config.validate().map_err(Error::Config)?;

        let finder = FileFinder::new(&config.monitor_path, &config.file_pattern)?;
        let store = CheckpointStore::open(&config.checkpoint_path)?;
        let tailer = Tailer::with_max_line_bytes(config.max_line_bytes);

        Ok(Self {
            config,
            finder,
            store,
            dispatcher,
            tailer,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run sweeps until `cancel` fires
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            monitor_path = %self.config.monitor_path.display(),
            checkpoint_path = %self.config.checkpoint_path.display(),
            file_pattern = %self.config.file_pattern,
            check_interval = ?self.config.check_interval,
            dry_run = self.config.dry_run,
            "Starting sweeper"
        );

        loop {
            match self.run_sweep(&cancel).await {
                Ok(summary) => info!(
                    new_files = summary.new_files,
                    updated_files = summary.updated_files,
                    skipped_files = summary.skipped_files,
                    failed_files = summary.failed_files,
                    lines_delivered = summary.lines_delivered,
                    "Sweep finished"
                ),
                Err(e) => warn!(error = %e, "Sweep aborted, retrying on the next sweep"),
            }

            if cancel.is_cancelled() {
                break;
            }

            debug!(interval = ?self.config.check_interval, "Sleeping until the next sweep");
            select! {
                _ = tokio::time::sleep(self.config.check_interval) => {},
                _ = cancel.cancelled() => {
                    info!("Sleep interrupted by shutdown");
                    break;
                }
            }
        }

        info!(
            lines_delivered = self.dispatcher.delivered(),
            "Sweeper stopped"
        );
        Ok(())
    }

    /// Run a single sweep over every monitored file
    pub async fn run_sweep(&mut self, cancel: &CancellationToken) -> Result<SweepSummary> {
        let files = self.finder.find_files()?;
        let checkpoints = self.store.list()?;

        let mut summary = SweepSummary::default();

        for (name, file) in &files {
            if cancel.is_cancelled() {
                info!("Shutdown requested, not processing the remaining files");
                break;
            }

            let offset = match checkpoints.get(name) {
                None => {
                    info!(file = %name, "New file, reading from the beginning");
                    summary.new_files += 1;
                    0
                }
                Some(checkpoint) if checkpoint.modified < file.modified => {
                    match self.store.read_offset(name) {
                        Ok(offset) => {
                            info!(file = %name, offset, "File updated, resuming");
                            summary.updated_files += 1;
                            offset
                        }
                        Err(e) => {
                            error!(file = %name, error = %e, "Unable to read checkpoint, skipping file");
                            summary.failed_files += 1;
                            continue;
                        }
                    }
                }
                Some(_) => {
                    debug!(file = %name, "File not modified since last checkpoint, skipping");
                    summary.skipped_files += 1;
                    continue;
                }
            };

            match self.tail_file(file, offset, cancel).await {
                Ok(delivered) => summary.lines_delivered += delivered,
                Err(e) if e.is_delivery() => {
                    summary.failed_files += 1;
                    match self.config.sweep_error_policy {
                        SweepErrorPolicy::AbortSweep => return Err(e),
                        SweepErrorPolicy::IsolateFile => {
                            warn!(file = %name, error = %e, "Delivery failed, continuing with the next file");
                        }
                    }
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "Failed to tail file");
                    summary.failed_files += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Tail one file from `start_offset`, returning the number of lines delivered.
    ///
    /// The consumed offset is saved whether the attempt finished, was cancelled or
    /// failed part way. The record is stamped with the file's listed modification
    /// time only when every complete line was consumed. Otherwise it is stamped
    /// earlier, so the next sweep sees the file as updated and resumes it.
    async fn tail_file(
        &mut self,
        file: &MonitorFile,
        start_offset: u64,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.tailer.open(file.path(), start_offset)?;

        let result = self.deliver_lines(cancel).await;

        let offset = self.tailer.offset()?;
        let record_modified = match &result {
            Ok(progress) if progress.drained => file.modified,
            _ => before(file.modified),
        };
        let saved = self.save_offset(&file.name, offset, record_modified);
        self.tailer.close()?;

        match (result, saved) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(progress), Ok(())) => Ok(progress.delivered),
        }
    }

    async fn deliver_lines(&mut self, cancel: &CancellationToken) -> Result<Progress> {
        let mut progress = Progress::default();

        while !cancel.is_cancelled() {
            let Some(line) = self.tailer.next_line()? else {
                progress.drained = true;
                break;
            };

            // Blank lines are consumed without being sent
            if !line.is_empty() {
                self.dispatcher.deliver(&line).await?;
                progress.delivered += 1;
            }
            self.tailer.ack()?;
        }

        Ok(progress)
    }

    fn save_offset(&self, name: &str, offset: u64, record_modified: SystemTime) -> Result<()> {
        if self.config.dry_run {
            info!(file = %name, offset, "(dry run) Not saving offset");
            return Ok(());
        }

        match self.store.write_offset(name, offset, record_modified) {
            Ok(_) => {
                info!(file = %name, offset, "Saved offset");
                Ok(())
            }
            Err(e) => {
                error!(file = %name, offset, error = %e, "Failed to save offset, lines may be delivered again");
                Err(e)
            }
        }
    }
}

/// How far a tailing session got
#[derive(Debug, Default)]
struct Progress {
    delivered: u64,
    /// Reached the end of the complete lines
    drained: bool,
}

/// A time strictly before `modified`, even on filesystems with one second resolution
fn before(modified: SystemTime) -> SystemTime {
    modified
        .checked_sub(Duration::from_secs(1))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporters::{Delivery, DeliveryFuture, NoopDelivery, TokenBucket};
    use std::fs::{self, File};
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    struct TestDirs {
        _root: TempDir,
        monitor: std::path::PathBuf,
        checkpoints: std::path::PathBuf,
    }

    fn test_dirs() -> TestDirs {
        let root = TempDir::new().unwrap();
        let monitor = root.path().join("monitor");
        let checkpoints = root.path().join("checkpoints");
        fs::create_dir(&monitor).unwrap();
        TestDirs {
            _root: root,
            monitor,
            checkpoints,
        }
    }

    fn test_config(dirs: &TestDirs) -> TailConfig {
        TailConfig {
            monitor_path: dirs.monitor.clone(),
            checkpoint_path: dirs.checkpoints.clone(),
            file_pattern: r"\.log$".to_string(),
            check_interval: Duration::from_millis(50),
            ..Default::default()
        }
    }

    fn build_sweeper(config: TailConfig, delivery: impl Delivery + 'static) -> Sweeper {
        let dispatcher = Dispatcher::new(TokenBucket::new(10_000, 10_000), Box::new(delivery));
        Sweeper::new(config, dispatcher).unwrap()
    }

    fn set_mtime(path: &Path, mtime: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    fn an_hour_ago() -> SystemTime {
        SystemTime::now() - Duration::from_secs(3600)
    }

    /// Fails every delivery after the first `succeed` ones
    struct FailAfter {
        succeed: usize,
        calls: Arc<AtomicUsize>,
    }

    impl Delivery for FailAfter {
        fn deliver<'a>(&'a self, _line: &'a str) -> DeliveryFuture<'a> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let succeed = self.succeed;
            Box::pin(async move {
                if n < succeed {
                    Ok(())
                } else {
                    Err("sink rejected line".into())
                }
            })
        }
    }

    #[tokio::test]
    async fn test_new_file_is_read_from_start() {
        let dirs = test_dirs();
        fs::write(dirs.monitor.join("app.log"), "a\nb\nc\n").unwrap();

        let noop = NoopDelivery::new();
        let mut sweeper = build_sweeper(test_config(&dirs), noop.clone());

        let summary = sweeper.run_sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.new_files, 1);
        assert_eq!(summary.lines_delivered, 3);
        assert_eq!(noop.lines(), vec!["a", "b", "c"]);
        assert_eq!(
            fs::read_to_string(dirs.checkpoints.join("app.log")).unwrap(),
            "6\n"
        );
    }

    #[tokio::test]
    async fn test_unmodified_file_is_skipped() {
        let dirs = test_dirs();
        let log = dirs.monitor.join("app.log");
        fs::write(&log, "a\n").unwrap();
        set_mtime(&log, an_hour_ago());

        let noop = NoopDelivery::new();
        let mut sweeper = build_sweeper(test_config(&dirs), noop.clone());
        let cancel = CancellationToken::new();

        sweeper.run_sweep(&cancel).await.unwrap();
        noop.clear();

        let summary = sweeper.run_sweep(&cancel).await.unwrap();
        assert_eq!(summary.skipped_files, 1);
        assert_eq!(summary.lines_delivered, 0);
        assert!(noop.lines().is_empty());
    }

    #[tokio::test]
    async fn test_blank_lines_are_consumed_not_delivered() {
        let dirs = test_dirs();
        fs::write(dirs.monitor.join("app.log"), "a\n\n\nb\n").unwrap();

        let noop = NoopDelivery::new();
        let mut sweeper = build_sweeper(test_config(&dirs), noop.clone());

        let summary = sweeper.run_sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.lines_delivered, 2);
        assert_eq!(noop.lines(), vec!["a", "b"]);
        assert_eq!(
            fs::read_to_string(dirs.checkpoints.join("app.log")).unwrap(),
            "6\n"
        );
    }

    #[tokio::test]
    async fn test_pattern_filters_files() {
        let dirs = test_dirs();
        fs::write(dirs.monitor.join("app.log"), "a\n").unwrap();
        fs::write(dirs.monitor.join("notes.txt"), "ignored\n").unwrap();

        let noop = NoopDelivery::new();
        let mut sweeper = build_sweeper(test_config(&dirs), noop.clone());

        sweeper.run_sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(noop.lines(), vec!["a"]);
        assert!(!dirs.checkpoints.join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_dry_run_does_not_persist() {
        let dirs = test_dirs();
        fs::write(dirs.monitor.join("app.log"), "a\nb\n").unwrap();

        let noop = NoopDelivery::new();
        let config = TailConfig {
            dry_run: true,
            ..test_config(&dirs)
        };
        let mut sweeper = build_sweeper(config, noop.clone());

        sweeper.run_sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(noop.lines(), vec!["a", "b"]);
        assert!(!dirs.checkpoints.join("app.log").exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_sweep_processes_nothing() {
        let dirs = test_dirs();
        fs::write(dirs.monitor.join("app.log"), "a\n").unwrap();

        let noop = NoopDelivery::new();
        let mut sweeper = build_sweeper(test_config(&dirs), noop.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = sweeper.run_sweep(&cancel).await.unwrap();
        assert_eq!(summary, SweepSummary::default());
        assert!(noop.lines().is_empty());
        assert!(!dirs.checkpoints.join("app.log").exists());
    }

    #[tokio::test]
    async fn test_delivery_error_aborts_sweep() {
        let dirs = test_dirs();
        fs::write(dirs.monitor.join("a.log"), "one\ntwo\n").unwrap();
        fs::write(dirs.monitor.join("b.log"), "three\n").unwrap();

        let delivery = FailAfter {
            succeed: 1,
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let mut sweeper = build_sweeper(test_config(&dirs), delivery);

        let err = sweeper
            .run_sweep(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_delivery());
        assert_eq!(
            fs::read_to_string(dirs.checkpoints.join("a.log")).unwrap(),
            "4\n"
        );
        assert!(!dirs.checkpoints.join("b.log").exists());
    }

    #[tokio::test]
    async fn test_isolate_file_policy_continues_sweep() {
        let dirs = test_dirs();
        fs::write(dirs.monitor.join("a.log"), "one\ntwo\n").unwrap();
        fs::write(dirs.monitor.join("b.log"), "three\n").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let delivery = FailAfter {
            succeed: 1,
            calls: calls.clone(),
        };
        let config = TailConfig {
            sweep_error_policy: SweepErrorPolicy::IsolateFile,
            ..test_config(&dirs)
        };
        let mut sweeper = build_sweeper(config, delivery);

        let summary = sweeper.run_sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.failed_files, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            fs::read_to_string(dirs.checkpoints.join("a.log")).unwrap(),
            "4\n"
        );
        assert_eq!(
            fs::read_to_string(dirs.checkpoints.join("b.log")).unwrap(),
            "0\n"
        );
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_skips_only_that_file() {
        let dirs = test_dirs();
        fs::create_dir(&dirs.checkpoints).unwrap();

        let a = dirs.monitor.join("a.log");
        fs::write(&a, "one\n").unwrap();
        fs::write(dirs.checkpoints.join("a.log"), "garbage\n").unwrap();
        set_mtime(&dirs.checkpoints.join("a.log"), an_hour_ago());
        fs::write(dirs.monitor.join("b.log"), "two\n").unwrap();

        let noop = NoopDelivery::new();
        let mut sweeper = build_sweeper(test_config(&dirs), noop.clone());

        let summary = sweeper.run_sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.failed_files, 1);
        assert_eq!(noop.lines(), vec!["two"]);
        assert_eq!(
            fs::read_to_string(dirs.checkpoints.join("a.log")).unwrap(),
            "garbage\n"
        );
    }

    #[tokio::test]
    async fn test_missing_monitor_directory_aborts_sweep() {
        let dirs = test_dirs();
        let mut sweeper = build_sweeper(test_config(&dirs), NoopDelivery::new());
        fs::remove_dir(&dirs.monitor).unwrap();

        let result = sweeper.run_sweep(&CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::DirectoryUnavailable { .. })));
    }

    #[test]
    fn test_invalid_pattern_rejected_at_construction() {
        let dirs = test_dirs();
        let config = TailConfig {
            file_pattern: "[".to_string(),
            ..test_config(&dirs)
        };
        let dispatcher = Dispatcher::new(TokenBucket::new(1, 1), Box::new(NoopDelivery::new()));
        assert!(matches!(
            Sweeper::new(config, dispatcher),
            Err(Error::PatternInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let dirs = test_dirs();
        fs::write(dirs.monitor.join("app.log"), "a\n").unwrap();

        let noop = NoopDelivery::new();
        let mut sweeper = build_sweeper(test_config(&dirs), noop.clone());
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            sweeper.run(token).await.unwrap();
            sweeper
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let sweeper = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sweeper.dispatcher().delivered(), 1);
        assert_eq!(noop.lines(), vec!["a"]);
    }

    /// Cancels the sweep from inside the first delivery
    struct CancelOnDeliver {
        cancel: CancellationToken,
    }

    impl Delivery for CancelOnDeliver {
        fn deliver<'a>(&'a self, _line: &'a str) -> DeliveryFuture<'a> {
            self.cancel.cancel();
            Box::pin(async { Ok(()) })
        }
    }

    fn mtime(path: &Path) -> SystemTime {
        fs::metadata(path).unwrap().modified().unwrap()
    }

    #[tokio::test]
    async fn test_record_stamped_with_listed_file_mtime() {
        let dirs = test_dirs();
        let log = dirs.monitor.join("app.log");
        fs::write(&log, "a\n").unwrap();

        let mut sweeper = build_sweeper(test_config(&dirs), NoopDelivery::new());
        sweeper.run_sweep(&CancellationToken::new()).await.unwrap();

        // Any later write to the file makes it newer than its record
        assert_eq!(mtime(&dirs.checkpoints.join("app.log")), mtime(&log));
    }

    #[tokio::test]
    async fn test_failed_file_is_resumed_by_next_sweep() {
        let dirs = test_dirs();
        let log = dirs.monitor.join("app.log");
        fs::write(&log, "x\ny\n").unwrap();

        let failing = FailAfter {
            succeed: 0,
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let mut sweeper = build_sweeper(test_config(&dirs), failing);
        assert!(sweeper.run_sweep(&CancellationToken::new()).await.is_err());
        assert_eq!(
            fs::read_to_string(dirs.checkpoints.join("app.log")).unwrap(),
            "0\n"
        );
        assert!(mtime(&dirs.checkpoints.join("app.log")) < mtime(&log));

        let noop = NoopDelivery::new();
        let mut sweeper = build_sweeper(test_config(&dirs), noop.clone());
        let summary = sweeper.run_sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.updated_files, 1);
        assert_eq!(noop.lines(), vec!["x", "y"]);
        assert_eq!(
            fs::read_to_string(dirs.checkpoints.join("app.log")).unwrap(),
            "4\n"
        );

        // Drained now, so the file is left alone until it changes
        let summary = sweeper.run_sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.skipped_files, 1);
    }

    #[tokio::test]
    async fn test_cancelled_file_is_resumed_after_restart() {
        let dirs = test_dirs();
        fs::write(dirs.monitor.join("app.log"), "a\nb\n").unwrap();

        let cancel = CancellationToken::new();
        let delivery = CancelOnDeliver {
            cancel: cancel.clone(),
        };
        let mut sweeper = build_sweeper(test_config(&dirs), delivery);
        sweeper.run_sweep(&cancel).await.unwrap();
        assert_eq!(
            fs::read_to_string(dirs.checkpoints.join("app.log")).unwrap(),
            "2\n"
        );

        let noop = NoopDelivery::new();
        let mut restarted = build_sweeper(test_config(&dirs), noop.clone());
        restarted.run_sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(noop.lines(), vec!["b"]);
        assert_eq!(
            fs::read_to_string(dirs.checkpoints.join("app.log")).unwrap(),
            "4\n"
        );
    }

    #[tokio::test]
    async fn test_long_lines_are_truncated() {
        let dirs = test_dirs();
        fs::write(dirs.monitor.join("app.log"), format!("{}\nok\n", "q".repeat(40))).unwrap();

        let noop = NoopDelivery::new();
        let config = TailConfig {
            max_line_bytes: 4,
            ..test_config(&dirs)
        };
        let mut sweeper = build_sweeper(config, noop.clone());
        sweeper.run_sweep(&CancellationToken::new()).await.unwrap();

        assert_eq!(noop.lines(), vec!["qqqq", "ok"]);
        assert_eq!(
            fs::read_to_string(dirs.checkpoints.join("app.log")).unwrap(),
            "44\n"
        );
    }
}
