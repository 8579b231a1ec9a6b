//! Run reporter
//!
//! Receives the five event streams from the engine, mirrors them to
//! `tracing` and the per-channel log files, tracks the changed-directory
//! set and the error counters that decide the process exit code, and
//! hands out throttled progress bars for file-content copies.

use crate::fs::operations::CopyProgress;
use crate::fs::path::parent_dir;
use crate::report::sinks::{Channel, LogSinks};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Event reporter shared across one mirror run
pub struct Reporter {
    /// Per-channel append-only files; absent when no log directory is set
    sinks: Option<LogSinks>,
    /// Target directories that received at least one change
    changed_dirs: Mutex<BTreeSet<PathBuf>>,
    /// Change events seen
    changes: AtomicU64,
    /// Error events seen
    errors: AtomicU64,
    /// Critical-error events seen
    critical_errors: AtomicU64,
    /// Draw progress bars for content copies
    show_progress: bool,
}

impl Reporter {
    /// Create a reporter, opening channel sinks when a log dir is given
    pub fn new(log_dir: Option<&Path>) -> crate::error::Result<Self> {
        let sinks = match log_dir {
            Some(dir) => Some(LogSinks::create(dir)?),
            None => None,
        };
        Ok(Self {
            sinks,
            changed_dirs: Mutex::new(BTreeSet::new()),
            changes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            critical_errors: AtomicU64::new(0),
            show_progress: false,
        })
    }

    /// Reporter without sinks or bars, for quiet runs and tests
    pub fn disabled() -> Self {
        Self {
            sinks: None,
            changed_dirs: Mutex::new(BTreeSet::new()),
            changes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            critical_errors: AtomicU64::new(0),
            show_progress: false,
        }
    }

    /// Enable or disable progress bars for content copies
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    fn emit(&self, channel: Channel, message: &str) {
        if let Some(sinks) = &self.sinks {
            sinks.append(channel, message);
        }
        match channel {
            Channel::Action | Channel::Change => {
                tracing::info!("[{}] {}", channel.label(), message)
            }
            Channel::Error | Channel::Critical => {
                tracing::error!("[{}] {}", channel.label(), message)
            }
            Channel::Debug => tracing::debug!("[{}] {}", channel.label(), message),
        }
    }

    /// A mutation is about to happen
    pub fn action(&self, message: &str) {
        self.emit(Channel::Action, message);
    }

    /// A divergence was detected; a non-null path records its parent
    /// directory into the changed set
    pub fn change(&self, path: Option<&Path>, message: &str) {
        self.changes.fetch_add(1, Ordering::Relaxed);
        if let Some(path) = path {
            if let Some(parent) = parent_dir(path) {
                if let Ok(mut dirs) = self.changed_dirs.lock() {
                    dirs.insert(parent);
                }
            }
        }
        self.emit(Channel::Change, message);
    }

    /// An expected failure
    pub fn error(&self, message: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.emit(Channel::Error, message);
    }

    /// A should-be-unreachable code path fired
    pub fn critical(&self, message: &str) {
        self.critical_errors.fetch_add(1, Ordering::Relaxed);
        self.emit(Channel::Critical, message);
    }

    /// Diagnostic detail
    pub fn debug(&self, message: &str) {
        self.emit(Channel::Debug, message);
    }

    /// Change events seen so far
    pub fn change_count(&self) -> u64 {
        self.changes.load(Ordering::Relaxed)
    }

    /// Error events seen so far
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Critical-error events seen so far
    pub fn critical_count(&self) -> u64 {
        self.critical_errors.load(Ordering::Relaxed)
    }

    /// Directories with at least one change, sorted
    pub fn changed_dirs(&self) -> Vec<PathBuf> {
        self.changed_dirs
            .lock()
            .map(|dirs| dirs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Process exit code: 2 on any critical error, 1 on any error, else 0
    pub fn exit_code(&self) -> i32 {
        if self.critical_count() > 0 {
            2
        } else if self.error_count() > 0 {
            1
        } else {
            0
        }
    }

    /// Throttled progress handle for one content copy
    pub fn copy_progress(&self, label: &str) -> ProgressThrottle {
        ProgressThrottle::new(self.show_progress, label)
    }
}

/// Samples per-chunk copy progress down to one visible update per 100 ms.
/// The first and last updates always pass.
pub struct ProgressThrottle {
    bar: Option<ProgressBar>,
    label: String,
    enabled: bool,
    last_emit: Option<Instant>,
    emitted: u64,
}

impl ProgressThrottle {
    /// Minimum interval between visible updates
    pub const INTERVAL: Duration = Duration::from_millis(100);

    fn new(enabled: bool, label: &str) -> Self {
        Self {
            bar: None,
            label: label.to_string(),
            enabled,
            last_emit: None,
            emitted: 0,
        }
    }

    /// Feed one progress sample; emits only when the throttle allows
    pub fn update(&mut self, progress: CopyProgress) {
        let now = Instant::now();
        let due = match self.last_emit {
            None => true,
            Some(last) => {
                progress.copied >= progress.total || now.duration_since(last) >= Self::INTERVAL
            }
        };
        if !due {
            return;
        }
        self.last_emit = Some(now);
        self.emitted += 1;

        if !self.enabled {
            return;
        }
        let bar = self.bar.get_or_insert_with(|| {
            let bar = ProgressBar::new(progress.total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{prefix:.dim} [{bar:30.green/white}] {bytes}/{total_bytes} ({bytes_per_sec})")
                    .expect("Invalid template")
                    .progress_chars("=> "),
            );
            bar.set_prefix(self.label.clone());
            bar
        });
        bar.set_position(progress.copied);
    }

    /// Tear down the bar once the copy is over
    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for ProgressThrottle {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_exit_code() {
        let reporter = Reporter::disabled();
        assert_eq!(reporter.exit_code(), 0);

        reporter.change(None, "new file: a.txt");
        assert_eq!(reporter.change_count(), 1);
        assert_eq!(reporter.exit_code(), 0);

        reporter.error("could not open b.txt");
        assert_eq!(reporter.exit_code(), 1);

        reporter.critical("phase loop saw an impossible kind");
        assert_eq!(reporter.exit_code(), 2);
    }

    #[test]
    fn test_changed_dirs_records_parent() {
        let reporter = Reporter::disabled();
        reporter.change(Some(Path::new("/tgt/photos/a.jpg")), "modified file");
        reporter.change(Some(Path::new("/tgt/photos/b.jpg")), "modified file");
        reporter.change(Some(Path::new("/tgt/docs/c.txt")), "new file");
        reporter.change(None, "summary-only change");

        let dirs = reporter.changed_dirs();
        assert_eq!(
            dirs,
            vec![PathBuf::from("/tgt/docs"), PathBuf::from("/tgt/photos")]
        );
    }

    #[test]
    fn test_throttle_samples_bursts() {
        let mut throttle = ProgressThrottle::new(false, "copy");
        // A burst of chunk updates inside the window collapses to the
        // first and the final sample.
        throttle.update(CopyProgress { total: 100, copied: 0 });
        throttle.update(CopyProgress { total: 100, copied: 10 });
        throttle.update(CopyProgress { total: 100, copied: 20 });
        assert_eq!(throttle.emitted, 1);

        throttle.update(CopyProgress { total: 100, copied: 100 });
        assert_eq!(throttle.emitted, 2);
    }

    #[test]
    fn test_logs_to_sinks() {
        let dir = tempfile::TempDir::new().unwrap();
        let reporter = Reporter::new(Some(dir.path())).unwrap();
        reporter.action("delete: /tgt/old.txt");
        reporter.debug("listing /src");

        let action = std::fs::read_to_string(dir.path().join("action.log")).unwrap();
        assert!(action.contains("delete: /tgt/old.txt"));
        let debug = std::fs::read_to_string(dir.path().join("debug.log")).unwrap();
        assert!(debug.contains("listing /src"));
    }
}
