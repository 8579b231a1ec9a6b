//! Event reporting module
//!
//! Five append-only channels (Action, Change, Error, CriticalError,
//! Debug), the changed-directory set, exit-code mapping, and throttled
//! progress display for content copies.

mod reporter;
mod sinks;

pub use reporter::{ProgressThrottle, Reporter};
pub use sinks::{Channel, LogSinks};
