//! # HoboMirror - Point-in-Time Directory Mirroring
//!
//! HoboMirror replicates a live directory tree onto another directory so
//! the destination becomes a byte-identical mirror of a point-in-time
//! snapshot of the source: file contents, timestamps, attribute bits,
//! security descriptors, junctions, and symbolic links.
//!
//! ## Features
//!
//! - **Four-phase reconciliation**: removals and kind changes, same-kind
//!   syncs, additions, then attribute/ACL refresh - composing correctly
//!   when an entry changes type between runs
//! - **Reparse-point safety**: junctions and symlinks are mirrored as
//!   opaque entries; no link is ever followed, listed through, or deleted
//!   through
//! - **Crash-safe replacement**: file content lands in a temporary
//!   sibling and goes live through an atomic rename
//! - **Failure containment**: one bad entry is reported and skipped;
//!   siblings and sibling subtrees continue
//! - **Guard-file gate**: a target is only ever mutated after opting in
//!
//! ## Quick Start
//!
//! ```no_run
//! use hobomirror::report::Reporter;
//! use hobomirror::sync::{DirectAccess, EngineOptions, MirrorTask, Orchestrator};
//!
//! let options = EngineOptions::default();
//! let reporter = Reporter::disabled();
//! let orchestrator = Orchestrator::new(&options, &reporter);
//!
//! let tasks = vec![MirrorTask::parse(r"C:\data=D:\mirror\data").unwrap()];
//! orchestrator.run_all(&tasks, &DirectAccess).unwrap();
//!
//! for dir in reporter.changed_dirs() {
//!     println!("changed: {}", dir.display());
//! }
//! std::process::exit(reporter.exit_code());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod fs;
pub mod report;
pub mod sync;

// Re-export commonly used types
pub use config::{MirrorConfig, Settings};
pub use error::{ErrorKind, IoResultExt, MirrorError, Result};
pub use report::Reporter;
pub use sync::{EngineOptions, MirrorTask, Orchestrator, SyncEngine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use hobomirror::prelude::*;
    //! ```

    pub use crate::config::{CliArgs, MirrorConfig, Settings};
    pub use crate::error::{IoResultExt, MirrorError, Result};
    pub use crate::fs::{Item, ItemKind, SnapshotPathMap};
    pub use crate::report::Reporter;
    pub use crate::sync::{
        DirectAccess, EngineOptions, MirrorTask, Orchestrator, Snapshotter, SyncEngine,
    };
}
