//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Target;
use crate::output::OutputFormat;
use crate::utils::LogLevel;

/// Sharded integration test runner with live rerun of failures
#[derive(Parser, Debug)]
#[command(name = "testshard")]
#[command(version)]
#[command(about = "Split integration tests across CI instances and recover flaky failures")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level, overrides --verbose
    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run this instance's share of the tests
    Run(RunArgs),

    /// Show how modules are split across instances
    Plan(PlanArgs),

    /// List failed tests and their recordings from a report
    Failures(FailuresArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Flags shared by `run` and `plan`
#[derive(clap::Args, Debug, Default, Clone)]
pub struct ScheduleArgs {
    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of parallel instances
    #[arg(short = 'n', long)]
    pub instance_count: Option<usize>,

    /// Engine profile
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Modules to run serially (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub serial_modules: Option<Vec<String>>,

    /// Working tree holding the tests and recordings
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub schedule: ScheduleArgs,

    /// One-based index of this instance
    #[arg(short, long)]
    pub instance_index: Option<usize>,

    /// Rerun failed tests live and publish refreshed recordings
    #[arg(long)]
    pub live_rerun: bool,

    /// What to run
    #[arg(short, long, value_enum)]
    pub target: Option<Target>,

    /// Directory for reports and ledgers
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub schedule: ScheduleArgs,

    /// Only show this one-based instance
    #[arg(short, long)]
    pub instance_index: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct FailuresArgs {
    /// JUnit report written by the engine
    pub report: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "./testshard.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON instead of YAML
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration file
    Validate {
        /// File to validate (default: first one found)
        file: Option<PathBuf>,
    },

    /// Print the JSON Schema of the configuration file
    Schema,

    /// Show environment variables and their current values
    Env,
}
