//! Output formatting
//!
//! Renders plans, instance reports and failure lists for the terminal.

mod formatter;

pub use formatter::{OutputFormat, ReportFormatter};
