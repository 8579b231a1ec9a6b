//! Mirroring module
//!
//! The four-phase reconciliation engine, the error-guarded executor it
//! routes every primitive call through, and the per-task orchestration
//! (guard-file gate, snapshot resolution, task loop).

mod engine;
mod executor;
mod orchestrator;

pub use engine::{
    is_guard_file, temp_file_name, EngineOptions, SyncEngine, GUARD_FILE_NAME, TEMP_FILE_PREFIX,
};
pub use executor::Guarded;
pub use orchestrator::{verify_guard_file, DirectAccess, MirrorTask, Orchestrator, Snapshotter};
