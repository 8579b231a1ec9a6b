//! Error types for HoboMirror
//!
//! This module defines all error types used throughout the application.
//! The engine never lets an error from one entry escape past the enclosing
//! phase loop; classification into [`ErrorKind`] drives that containment.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for HoboMirror operations
#[derive(Error, Debug)]
pub enum MirrorError {
    /// I/O error during a filesystem operation
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File or directory vanished between listing and use
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// ACLs block the operation despite backup privileges
    #[error("Access denied: {0}")]
    AccessDenied(PathBuf),

    /// Reparse tag is neither MOUNT_POINT nor SYMLINK
    #[error("Unrecognized reparse tag {tag:#010x} on '{path}'")]
    UnrecognizedReparseTag { path: PathBuf, tag: u32 },

    /// A precondition the engine believed held did not
    #[error("Unreachable state: {0}")]
    Unreachable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The target is missing its guard file or the guard file does not approve mirroring
    #[error("Target '{0}' has no valid guard file; refusing to mirror onto it")]
    GuardFile(PathBuf),

    /// Settings file could not be read or parsed
    #[error("Settings error: {0}")]
    Settings(String),
}

/// Broad failure classification used by the error-guarded executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Entry vanished between listing and use
    NotFound,
    /// ACLs blocked the operation
    AccessDenied,
    /// Any other OS-level failure
    IoOther,
    /// Reparse tag outside the recognized set
    UnrecognizedReparseTag,
    /// Engine invariant violated; reported as CriticalError as well
    Unreachable,
    /// Fatal configuration problem; aborts the run before work starts
    FatalConfig,
}

impl MirrorError {
    /// Create an I/O error with path context, folding well-known causes
    /// into their dedicated variants
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            std::io::ErrorKind::PermissionDenied => Self::AccessDenied(path),
            _ => Self::Io { path, source },
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an unreachable-state error
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable(message.into())
    }

    /// Classify this error for the executor's reporting decision
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AccessDenied(_) => ErrorKind::AccessDenied,
            Self::Io { .. } => ErrorKind::IoOther,
            Self::UnrecognizedReparseTag { .. } => ErrorKind::UnrecognizedReparseTag,
            Self::Unreachable(_) => ErrorKind::Unreachable,
            Self::Config(_) | Self::GuardFile(_) | Self::Settings(_) => ErrorKind::FatalConfig,
        }
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. }
            | Self::NotFound(path)
            | Self::AccessDenied(path)
            | Self::UnrecognizedReparseTag { path, .. }
            | Self::GuardFile(path) => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for HoboMirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

impl From<serde_json::Error> for MirrorError {
    fn from(err: serde_json::Error) -> Self {
        MirrorError::Settings(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| MirrorError::io(path, e))
    }
}
