//! # tyscope Utilities
//!
//! Shared logging setup for the tyscope workspace.
//!
//! The engine crates only emit `tracing` events; installing a subscriber is
//! left to binaries, which call [`init_logging`] once at startup.

pub mod logging;

pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
