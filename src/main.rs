//! testshard - sharded integration test runner
//!
//! Splits a suite of test modules across parallel CI instances by historical
//! runtime, runs one instance's share through an external test engine, and
//! recovers failures by rerunning them live.
//!
//! ## Features
//!
//! - Greedy longest-first balancing of modules across instances
//! - Serial batches for modules that mutate shared state
//! - Live rerun of failed tests with recording refresh
//! - Publishing of refreshed recordings with fetch/rebase/push retry
//! - Multiple output formats (Table, JSON, CSV)
//!
//! ## Usage
//!
//! ```bash
//! # Show the split of all modules across 8 instances
//! testshard plan --instance-count 8
//!
//! # Run instance 3 of 8 and recover failures live
//! testshard run --instance-count 8 --instance-index 3 --live-rerun
//!
//! # Inspect a report
//! testshard failures test_results/test_results_latest_3.parallel.xml
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

mod cli;
mod config;
mod discovery;
mod error;
mod executor;
mod models;
mod output;
mod recovery;
mod report;
mod schedule;
#[cfg(test)]
mod testing;
mod utils;
mod vcs;

use cli::{Args, ScheduleArgs};
use config::{ConfigFile, EnvConfig};
use discovery::{CommandDiscovery, ManifestDiscovery, ModuleDiscovery, StaticDiscovery};
use executor::{CommandEngine, InstanceRunner, InstanceSettings, TestRunner};
use models::Partition;
use output::{OutputFormat, ReportFormatter};
use recovery::{RecoveryCoordinator, RecoverySettings};
use report::{FailureExtractor, FailureLedger};
use schedule::{BatchClassifier, GreedyPartitioner, WeightedJobSet};
use utils::{init_logger, LogLevel};
use vcs::{GitCli, Publisher};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let env = EnvConfig::load();

    let level = args
        .log_level
        .unwrap_or_else(|| LogLevel::verbose(args.verbose || env.verbose == Some(true)));
    init_logger(level);

    match args.command {
        cli::Command::Run(run_args) => run_instance(run_args, &env).await,
        cli::Command::Plan(plan_args) => show_plan(plan_args, &env).await,
        cli::Command::Failures(failures_args) => {
            show_failures(failures_args, &env)?;
            Ok(ExitCode::SUCCESS)
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, &env)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// File, then environment, then flags
fn load_config(args: &ScheduleArgs, env: &EnvConfig) -> Result<ConfigFile> {
    let path = args.config.clone().or_else(|| env.config_file.clone());
    let mut config = ConfigFile::load_or_default(path.as_deref())?;
    env.apply_to(&mut config);

    if let Some(count) = args.instance_count {
        config.scheduling.instance_count = count;
    }
    if let Some(profile) = &args.profile {
        config.scheduling.profile = profile.clone();
    }
    if let Some(modules) = &args.serial_modules {
        config.scheduling.serial_modules = modules.clone();
    }
    Ok(config)
}

fn resolve_workdir(args: &ScheduleArgs, env: &EnvConfig) -> Result<PathBuf> {
    let workdir = args
        .workdir
        .clone()
        .or_else(|| env.workdir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    workdir
        .canonicalize()
        .with_context(|| format!("Working tree not found: {}", workdir.display()))
}

fn resolve_format(args: &ScheduleArgs, env: &EnvConfig) -> OutputFormat {
    if let Some(format) = args.format {
        return format;
    }
    match env.format.as_deref().map(str::parse::<OutputFormat>) {
        Some(Ok(format)) => format,
        Some(Err(e)) => {
            warn!("Ignoring TESTSHARD_FORMAT: {}", e);
            OutputFormat::Table
        }
        None => OutputFormat::Table,
    }
}

/// One-based index within `1..=count`
fn check_instance_index(index: usize, count: usize) -> Result<()> {
    if index == 0 || index > count {
        bail!("Instance index {index} is outside 1..={count}");
    }
    Ok(())
}

fn discovery_for(config: &ConfigFile, workdir: &Path) -> Box<dyn ModuleDiscovery> {
    if let Some(manifest) = &config.discovery.manifest {
        return Box::new(ManifestDiscovery::new(workdir.join(manifest)));
    }
    if let Some(command) = &config.discovery.command {
        return Box::new(CommandDiscovery::new(command.clone(), workdir));
    }
    warn!("No discovery source configured, scheduling the modules of the cost table");
    Box::new(StaticDiscovery::from_ids(config.costs.keys().cloned()))
}

async fn compute_partition(config: &ConfigFile, workdir: &Path) -> Result<Partition> {
    let universe = discovery_for(config, workdir).discover().await?;
    info!("Discovered {} module(s)", universe.len());

    let jobs = WeightedJobSet::build(&config.costs, universe.keys())?;
    info!(
        "Estimated {}m in total, {}m for modules without history",
        jobs.total_cost(),
        jobs.default_cost()
    );
    let partitioner = GreedyPartitioner::new(config.scheduling.instance_count)?;
    let partition = partitioner.partition(jobs.jobs());
    info!(
        "Planned {} module(s) on {} instance(s), makespan {}m",
        partition.job_count(),
        partition.worker_count(),
        partition.makespan()
    );
    Ok(partition)
}

async fn show_plan(args: cli::PlanArgs, env: &EnvConfig) -> Result<ExitCode> {
    let config = load_config(&args.schedule, env)?;
    config.validate()?;
    let workdir = resolve_workdir(&args.schedule, env)?;

    let only = match args.instance_index {
        Some(index) => {
            check_instance_index(index, config.scheduling.instance_count)?;
            Some(index - 1)
        }
        None => None,
    };

    let partition = compute_partition(&config, &workdir).await?;
    let classifier = BatchClassifier::new(config.scheduling.serial_modules.iter().cloned());
    let formatter = terminal_formatter(resolve_format(&args.schedule, env));
    println!("{}", formatter.format_plan(&partition, &classifier, only)?);
    Ok(ExitCode::SUCCESS)
}

async fn run_instance(args: cli::RunArgs, env: &EnvConfig) -> Result<ExitCode> {
    let mut config = load_config(&args.schedule, env)?;
    if args.live_rerun {
        config.recovery.live_rerun = true;
    }
    if let Some(target) = args.target {
        config.scheduling.target = target;
    }
    if let Some(dir) = &args.report_dir {
        config.recovery.report_dir = dir.clone();
    }
    config.validate()?;

    let instance_index = args.instance_index.or(env.instance_index).unwrap_or(1);
    check_instance_index(instance_index, config.scheduling.instance_count)?;

    let workdir = resolve_workdir(&args.schedule, env)?;
    let report_dir = workdir.join(&config.recovery.report_dir);
    std::fs::create_dir_all(&report_dir)
        .with_context(|| format!("Failed to create report directory: {}", report_dir.display()))?;

    let partition = compute_partition(&config, &workdir).await?;
    let assignment = partition
        .worker(instance_index - 1)
        .cloned()
        .context("Partition has fewer workers than instances")?;

    let git = GitCli::new(&workdir);
    if config.recovery.live_rerun && !git.is_clean().await.unwrap_or(true) {
        warn!(
            "{} has local changes, pull --rebase may refuse to publish",
            git.workdir().display()
        );
    }
    let vcs = Arc::new(git);
    let ledger = FailureLedger::new(&report_dir, instance_index);

    if config.engine.ignores_fanout(config.scheduling.fanout) {
        warn!(
            "scheduling.fanout = {} has no effect without engine.fanout_flag",
            config.scheduling.fanout
        );
    }
    let engine = Arc::new(CommandEngine::new(config.engine.clone(), &workdir));
    let publisher = Publisher::new(vcs.clone())
        .with_policy(config.publish.retry_policy())
        .with_remote(&config.publish.remote)
        .with_branch_prefix(&config.publish.branch_prefix);

    let coordinator = RecoveryCoordinator::new(
        TestRunner::new(engine),
        FailureExtractor::new(config.recovery.fixture_layout()),
        vcs.clone(),
        publisher,
        ledger.clone(),
        RecoverySettings {
            live_rerun: config.recovery.live_rerun,
            profile: config.scheduling.profile.clone(),
            rerun_extra_flags: config.engine.rerun_extra_flags.clone(),
            workdir: workdir.clone(),
        },
    );

    let runner = InstanceRunner::new(
        coordinator,
        BatchClassifier::new(config.scheduling.serial_modules.iter().cloned()),
        vcs,
        InstanceSettings {
            instance_index,
            instance_count: config.scheduling.instance_count,
            profile: config.scheduling.profile.clone(),
            target: config.scheduling.target,
            fanout: config.scheduling.fanout,
            report_dir,
            report_tag: config.recovery.report_tag.clone(),
            extra_flags: config.engine.extra_flags.clone(),
            base_branch: config.publish.base_branch(),
            build_id: config.publish.build_id.clone(),
        },
    );

    let report = runner.run(&assignment).await?;
    log_ledgers(&ledger)?;

    let formatter = terminal_formatter(resolve_format(&args.schedule, env));
    println!("{}", formatter.format_instance(&report)?);

    Ok(ExitCode::from(report.exit_code()))
}

fn log_ledgers(ledger: &FailureLedger) -> Result<()> {
    let crashed = ledger.crashed_modules()?;
    if !crashed.is_empty() {
        warn!(
            "{} module(s) listed in {}",
            crashed.len(),
            ledger.error_modules_path().display()
        );
    }
    let confirmed = ledger.confirmed_failures()?;
    if !confirmed.is_empty() {
        warn!(
            "{} confirmed failure(s) listed in {}",
            confirmed.len(),
            ledger.failure_tests_path().display()
        );
    }
    Ok(())
}

/// Drop ANSI colors when stdout is piped
fn terminal_formatter(format: OutputFormat) -> ReportFormatter {
    let formatter = ReportFormatter::new(format);
    if std::io::stdout().is_terminal() {
        formatter
    } else {
        formatter.no_color()
    }
}

fn show_failures(args: cli::FailuresArgs, env: &EnvConfig) -> Result<()> {
    let config = ConfigFile::load_or_default(env.config_file.as_deref())?;
    let extractor = FailureExtractor::new(config.recovery.fixture_layout());
    let failures = extractor.extract(&args.report)?;
    print!("{}", terminal_formatter(args.format).format_failures(&failures)?);
    Ok(())
}

fn manage_config(args: cli::ConfigArgs, env: &EnvConfig) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { output, force } => {
            if output.exists() && !force {
                bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    output.display()
                );
            }
            ConfigFile::example().save(&output)?;
            println!("✓ Configuration file created: {}", output.display());
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { config, json } => {
            let path = config.or_else(|| env.config_file.clone());
            let mut loaded = ConfigFile::load_or_default(path.as_deref())?;
            env.apply_to(&mut loaded);
            let output = if json {
                serde_json::to_string_pretty(&loaded)?
            } else {
                serde_yaml::to_string(&loaded)?
            };
            println!("{output}");
        }

        cli::ConfigAction::Validate { file } => {
            let path = file
                .or_else(ConfigFile::find)
                .unwrap_or_else(|| PathBuf::from("./testshard.yaml"));

            match ConfigFile::load(&path) {
                Ok(_) => println!("✓ Configuration file is valid: {}", path.display()),
                Err(e) => {
                    println!("✗ Configuration file is invalid: {}", path.display());
                    println!("  Error: {e:#}");
                    return Err(e);
                }
            }
        }

        cli::ConfigAction::Schema => {
            println!("{}", ConfigFile::schema()?);
        }

        cli::ConfigAction::Env => {
            config::print_env_help();
            println!();
            if env.has_any() {
                env.print_summary();
            } else {
                println!("No TESTSHARD or CI variables are set.");
            }
        }
    }
    Ok(())
}
