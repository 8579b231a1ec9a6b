//! Error-guarded executor
//!
//! Every primitive call the engine makes goes through one of these
//! wrappers: the failure is classified, reported, and swallowed, so no
//! single entry can abort a phase loop. Action-labeled wrappers emit the
//! Action event before touching anything; in dry-run mode they stop
//! right after it.

use crate::error::{ErrorKind, MirrorError, Result};
use crate::report::Reporter;
use std::path::Path;

/// Wraps primitive calls with classify-report-contain semantics
pub struct Guarded<'a> {
    reporter: &'a Reporter,
    dry_run: bool,
}

impl<'a> Guarded<'a> {
    /// Create an executor reporting into `reporter`
    pub fn new(reporter: &'a Reporter, dry_run: bool) -> Self {
        Self { reporter, dry_run }
    }

    /// Whether mutations are suppressed
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run a value-returning primitive; on failure report and yield `None`
    pub fn run<T>(&self, label: &str, path: &Path, f: impl FnOnce() -> Result<T>) -> Option<T> {
        match f() {
            Ok(value) => Some(value),
            Err(error) => {
                self.report_failure(label, path, &error);
                None
            }
        }
    }

    /// Run a mutation, announcing it on the Action channel first
    pub fn act(&self, label: &str, path: &Path, f: impl FnOnce() -> Result<()>) -> bool {
        self.reporter.action(&format!("{label}: {}", path.display()));
        if self.is_dry_run() {
            return false;
        }
        self.run(label, path, f).is_some()
    }

    /// Like [`Guarded::act`] with a custom Action line; error messages
    /// still reference `path`
    pub fn act_detail(
        &self,
        label: &str,
        detail: &str,
        path: &Path,
        f: impl FnOnce() -> Result<()>,
    ) -> bool {
        self.reporter.action(&format!("{label}: {detail}"));
        if self.is_dry_run() {
            return false;
        }
        self.run(label, path, f).is_some()
    }

    fn report_failure(&self, label: &str, path: &Path, error: &MirrorError) {
        let message = format!("could not {label} '{}': {error}", path.display());
        self.reporter.error(&message);
        if error.kind() == ErrorKind::Unreachable {
            self.reporter.critical(&message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_run_contains_failures() {
        let reporter = Reporter::disabled();
        let guard = Guarded::new(&reporter, false);

        let value = guard.run("read", Path::new("/x"), || Ok(7));
        assert_eq!(value, Some(7));
        assert_eq!(reporter.error_count(), 0);

        let value: Option<()> = guard.run("read", Path::new("/x"), || {
            Err(MirrorError::NotFound(PathBuf::from("/x")))
        });
        assert!(value.is_none());
        assert_eq!(reporter.error_count(), 1);
        assert_eq!(reporter.critical_count(), 0);
    }

    #[test]
    fn test_unreachable_is_also_critical() {
        let reporter = Reporter::disabled();
        let guard = Guarded::new(&reporter, false);

        let _: Option<()> = guard.run("reconcile", Path::new("/x"), || {
            Err(MirrorError::unreachable("impossible kind"))
        });
        assert_eq!(reporter.error_count(), 1);
        assert_eq!(reporter.critical_count(), 1);
    }

    #[test]
    fn test_act_announces_then_runs() {
        let reporter = Reporter::disabled();
        let guard = Guarded::new(&reporter, false);

        let mut ran = false;
        assert!(guard.act("delete", Path::new("/x"), || {
            ran = true;
            Ok(())
        }));
        assert!(ran);
    }

    #[test]
    fn test_dry_run_skips_mutation() {
        let reporter = Reporter::disabled();
        let guard = Guarded::new(&reporter, true);

        let mut ran = false;
        let ok = guard.act("delete", Path::new("/x"), || {
            ran = true;
            Ok(())
        });
        assert!(!ok);
        assert!(!ran);
        assert_eq!(reporter.error_count(), 0);
    }
}
