//! Shared helpers

pub mod logger;
mod timer;

pub use logger::{init_logger, LogLevel};
pub use timer::{format_duration, Timer};
