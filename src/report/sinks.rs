//! Append-only log sinks
//!
//! One text file per event channel, created under the configured log
//! directory. Lines are timestamped and flushed as they are written so a
//! killed run still leaves a usable record.

use crate::error::{IoResultExt, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// The five reporter channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// A mutation is about to happen (or has just happened)
    Action,
    /// A source/target divergence was detected
    Change,
    /// Expected failure path
    Error,
    /// A code path that should be unreachable was reached
    Critical,
    /// Diagnostic detail
    Debug,
}

impl Channel {
    /// Short channel label used in console lines
    pub fn label(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Change => "change",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Debug => "debug",
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            Self::Action => "action.log",
            Self::Change => "change.log",
            Self::Error => "error.log",
            Self::Critical => "critical.log",
            Self::Debug => "debug.log",
        }
    }

    const ALL: [Channel; 5] = [
        Channel::Action,
        Channel::Change,
        Channel::Error,
        Channel::Critical,
        Channel::Debug,
    ];
}

/// Per-channel append-only files
pub struct LogSinks {
    writers: Mutex<Vec<BufWriter<File>>>,
}

impl LogSinks {
    /// Open (creating if needed) the five channel files under `dir`
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).with_path(dir)?;
        let mut writers = Vec::with_capacity(Channel::ALL.len());
        for channel in Channel::ALL {
            let path = dir.join(channel.file_name());
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_path(&path)?;
            writers.push(BufWriter::new(file));
        }
        Ok(Self {
            writers: Mutex::new(writers),
        })
    }

    /// Append one timestamped line to a channel's file
    pub fn append(&self, channel: Channel, message: &str) {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        if let Ok(mut writers) = self.writers.lock() {
            let writer = &mut writers[channel as usize];
            let _ = writeln!(writer, "{stamp}  {message}");
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sinks_create_and_append() {
        let dir = TempDir::new().unwrap();
        let sinks = LogSinks::create(dir.path()).unwrap();

        sinks.append(Channel::Change, "modified file: a.txt");
        sinks.append(Channel::Error, "could not open b.txt");

        let change = std::fs::read_to_string(dir.path().join("change.log")).unwrap();
        assert!(change.contains("modified file: a.txt"));
        let error = std::fs::read_to_string(dir.path().join("error.log")).unwrap();
        assert!(error.contains("could not open b.txt"));
        // All five files exist even when unused.
        assert!(dir.path().join("action.log").exists());
        assert!(dir.path().join("critical.log").exists());
        assert!(dir.path().join("debug.log").exists());
    }

    #[test]
    fn test_append_is_additive() {
        let dir = TempDir::new().unwrap();
        {
            let sinks = LogSinks::create(dir.path()).unwrap();
            sinks.append(Channel::Action, "first");
        }
        {
            let sinks = LogSinks::create(dir.path()).unwrap();
            sinks.append(Channel::Action, "second");
        }
        let log = std::fs::read_to_string(dir.path().join("action.log")).unwrap();
        assert!(log.contains("first"));
        assert!(log.contains("second"));
    }
}
