//! Configuration module for HoboMirror
//!
//! CLI arguments, runtime configuration, and the persisted settings
//! store that schedules ACL refreshes between runs.

mod settings;

pub use settings::*;
