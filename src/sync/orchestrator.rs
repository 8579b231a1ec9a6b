//! Per-task orchestration
//!
//! Validates the guard file on every target before any work starts,
//! resolves each source root to its snapshot-space path, and drives the
//! engine over each `(source, target)` pair. Destructive mirroring never
//! begins against a target that has not opted in.

use crate::error::{MirrorError, Result};
use crate::fs::path::SnapshotPathMap;
use crate::report::Reporter;
use crate::sync::engine::{EngineOptions, SyncEngine, GUARD_FILE_NAME};
use std::path::{Path, PathBuf};

/// Approval word the guard file must contain (case-insensitive)
const GUARD_APPROVAL: &str = "allow";

/// One `(source, target)` mirroring pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTask {
    /// Live source root to mirror from
    pub source_root: PathBuf,
    /// Target root to make equal to the source
    pub target_root: PathBuf,
}

impl MirrorTask {
    /// Parse a `SOURCE=TARGET` pair
    pub fn parse(spec: &str) -> Result<Self> {
        let (from, to) = spec
            .split_once('=')
            .ok_or_else(|| MirrorError::config(format!("expected SOURCE=TARGET, got '{spec}'")))?;
        if from.is_empty() || to.is_empty() {
            return Err(MirrorError::config(format!(
                "both sides of '{spec}' must be non-empty"
            )));
        }
        Ok(Self {
            source_root: PathBuf::from(from),
            target_root: PathBuf::from(to),
        })
    }
}

/// Supplier of read-only point-in-time source roots. The volume
/// snapshotting subsystem lives outside the engine; it only has to answer
/// "where do I read this root from".
pub trait Snapshotter {
    /// Snapshot-space path for `original_root`
    fn snapshot_root(&self, original_root: &Path) -> Result<PathBuf>;
}

/// Reads the live volume directly; used when snapshots are unavailable
/// or disabled
pub struct DirectAccess;

impl Snapshotter for DirectAccess {
    fn snapshot_root(&self, original_root: &Path) -> Result<PathBuf> {
        Ok(original_root.to_path_buf())
    }
}

/// Check that `target_root` opted into destructive mirroring: the guard
/// file must exist and contain the approval word
pub fn verify_guard_file(target_root: &Path) -> Result<()> {
    let guard_path = target_root.join(GUARD_FILE_NAME);
    let contents = std::fs::read_to_string(&guard_path)
        .map_err(|_| MirrorError::GuardFile(target_root.to_path_buf()))?;
    if contents.to_lowercase().contains(GUARD_APPROVAL) {
        Ok(())
    } else {
        Err(MirrorError::GuardFile(target_root.to_path_buf()))
    }
}

/// Drives the engine over a list of tasks
pub struct Orchestrator<'a> {
    options: &'a EngineOptions,
    reporter: &'a Reporter,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator reporting into `reporter`
    pub fn new(options: &'a EngineOptions, reporter: &'a Reporter) -> Self {
        Self { options, reporter }
    }

    /// Run every task. Guard files are checked for ALL targets before the
    /// first mutation; a single bad target aborts the whole run.
    pub fn run_all(&self, tasks: &[MirrorTask], snapshotter: &dyn Snapshotter) -> Result<()> {
        if tasks.is_empty() {
            return Err(MirrorError::config("no SOURCE=TARGET pairs given"));
        }
        for task in tasks {
            let meta = std::fs::metadata(&task.target_root)
                .map_err(|_| MirrorError::GuardFile(task.target_root.clone()))?;
            if !meta.is_dir() {
                return Err(MirrorError::config(format!(
                    "target '{}' is not a directory",
                    task.target_root.display()
                )));
            }
            verify_guard_file(&task.target_root)?;
        }

        for task in tasks {
            self.run_task(task, snapshotter);
        }
        Ok(())
    }

    /// Execute one mirroring pair; all outcomes flow through the reporter
    pub fn run_task(&self, task: &MirrorTask, snapshotter: &dyn Snapshotter) {
        self.reporter.debug(&format!(
            "task: mirror '{}' onto '{}'",
            task.source_root.display(),
            task.target_root.display()
        ));
        let snapshot_root = match snapshotter.snapshot_root(&task.source_root) {
            Ok(root) => root,
            Err(error) => {
                self.reporter.error(&format!(
                    "could not snapshot '{}': {error}",
                    task.source_root.display()
                ));
                return;
            }
        };
        let map = SnapshotPathMap::new(snapshot_root.clone(), task.source_root.clone());
        let engine = SyncEngine::new(self.options, self.reporter, map);
        engine.sync_tree(&snapshot_root, &task.target_root);
    }
}
