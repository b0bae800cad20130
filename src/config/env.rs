//! Environment overrides
//!
//! `TESTSHARD_*` overrides plus the variables a CI agent already sets.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use super::{ConfigFile, Target};

const ENV_PREFIX: &str = "TESTSHARD";

const CI_BUILD_ID: &str = "BUILD_BUILDID";
const CI_PYTHON_VERSION: &str = "PYTHON_VERSION";
const CI_SOURCES_DIR: &str = "BUILD_SOURCESDIRECTORY";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvConfig {
    pub config_file: Option<PathBuf>,
    pub instance_count: Option<usize>,
    /// One-based
    pub instance_index: Option<usize>,
    pub profile: Option<String>,
    pub serial_modules: Option<Vec<String>>,
    pub live_rerun: Option<bool>,
    pub target: Option<String>,
    pub report_dir: Option<PathBuf>,
    pub fanout: Option<usize>,
    pub verbose: Option<bool>,
    pub format: Option<String>,
    pub build_id: Option<String>,
    pub report_tag: Option<String>,
    pub workdir: Option<PathBuf>,
}

impl EnvConfig {
    pub fn load() -> Self {
        Self {
            config_file: var("CONFIG").map(PathBuf::from),
            instance_count: parsed("INSTANCE_COUNT"),
            instance_index: parsed("INSTANCE_INDEX"),
            profile: var("PROFILE"),
            serial_modules: var("SERIAL_MODULES")
                .map(|v| v.split_whitespace().map(str::to_string).collect()),
            live_rerun: flag("LIVE_RERUN"),
            target: var("TARGET"),
            report_dir: var("REPORT_DIR").map(PathBuf::from),
            fanout: parsed("FANOUT"),
            verbose: flag("VERBOSE"),
            format: var("FORMAT"),
            build_id: ci_var(CI_BUILD_ID),
            report_tag: ci_var(CI_PYTHON_VERSION),
            workdir: ci_var(CI_SOURCES_DIR).map(PathBuf::from),
        }
    }

    /// Whether any variable was set at all
    pub fn has_any(&self) -> bool {
        *self != Self::default()
    }

    /// Layer the overrides on top of a loaded file
    pub fn apply_to(&self, config: &mut ConfigFile) {
        if let Some(count) = self.instance_count {
            config.scheduling.instance_count = count;
        }
        if let Some(profile) = &self.profile {
            config.scheduling.profile = profile.clone();
        }
        if let Some(modules) = &self.serial_modules {
            config.scheduling.serial_modules = modules.clone();
        }
        if let Some(fanout) = self.fanout {
            config.scheduling.fanout = fanout;
        }
        if let Some(target) = &self.target {
            match target.parse::<Target>() {
                Ok(target) => config.scheduling.target = target,
                Err(e) => warn!("Ignoring {ENV_PREFIX}_TARGET: {e}"),
            }
        }
        if let Some(live) = self.live_rerun {
            config.recovery.live_rerun = live;
        }
        if let Some(dir) = &self.report_dir {
            config.recovery.report_dir = dir.clone();
        }
        if let Some(tag) = &self.report_tag {
            config.recovery.report_tag = Some(tag.clone());
        }
        if let Some(build) = &self.build_id {
            config.publish.build_id = Some(build.clone());
        }
    }

    /// Current value of every recognized variable
    pub fn print_summary(&self) {
        let values = [
            ("CONFIG", show(&self.config_file)),
            ("INSTANCE_COUNT", show(&self.instance_count)),
            ("INSTANCE_INDEX", show(&self.instance_index)),
            ("PROFILE", show(&self.profile)),
            ("SERIAL_MODULES", show(&self.serial_modules)),
            ("LIVE_RERUN", show(&self.live_rerun)),
            ("TARGET", show(&self.target)),
            ("REPORT_DIR", show(&self.report_dir)),
            ("FANOUT", show(&self.fanout)),
            ("VERBOSE", show(&self.verbose)),
            ("FORMAT", show(&self.format)),
        ];
        println!("Environment overrides:");
        for (name, value) in values {
            println!("  {:<28} {}", format!("{ENV_PREFIX}_{name}"), value);
        }
        for (name, value) in [
            (CI_BUILD_ID, show(&self.build_id)),
            (CI_PYTHON_VERSION, show(&self.report_tag)),
            (CI_SOURCES_DIR, show(&self.workdir)),
        ] {
            println!("  {:<28} {}", name, value);
        }
    }
}

fn show<T: std::fmt::Debug>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map_or_else(|| "-".to_string(), |v| format!("{v:?}"))
}

/// Raw value of `TESTSHARD_<name>`
fn var(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

fn parsed<T: FromStr>(name: &str) -> Option<T> {
    var(name)?.trim().parse().ok()
}

fn flag(name: &str) -> Option<bool> {
    var(name).map(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

/// Unprefixed CI variable, blank counts as unset
fn ci_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Sets variables for a test and restores them afterwards
#[cfg(test)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

#[cfg(test)]
impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    /// Set `TESTSHARD_<name>`
    pub fn var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value.into()));
        self
    }

    /// Set an unprefixed CI variable
    pub fn ci(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((name.to_string(), value.into()));
        self
    }

    /// Set the variables until the returned guard drops
    pub fn apply_scoped(self) -> EnvGuard {
        let mut saved = Vec::with_capacity(self.vars.len());
        for (name, value) in self.vars {
            saved.push((name.clone(), env::var(&name).ok()));
            env::set_var(name, value);
        }
        EnvGuard { saved }
    }
}

#[cfg(test)]
pub struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (name, old) in self.saved.drain(..).rev() {
            match old {
                Some(value) => env::set_var(name, value),
                None => env::remove_var(name),
            }
        }
    }
}

/// Print all TESTSHARD environment variables
pub fn print_env_help() {
    println!("Overrides (flags still win):");
    println!();
    println!("  {ENV_PREFIX}_CONFIG          Path to configuration file");
    println!("  {ENV_PREFIX}_INSTANCE_COUNT  Number of parallel instances");
    println!("  {ENV_PREFIX}_INSTANCE_INDEX  One-based index of this instance");
    println!("  {ENV_PREFIX}_PROFILE         Engine profile (e.g. latest)");
    println!("  {ENV_PREFIX}_SERIAL_MODULES  Whitespace separated modules run serially");
    println!("  {ENV_PREFIX}_LIVE_RERUN      Rerun failures live (true/false)");
    println!("  {ENV_PREFIX}_TARGET          cli or extension");
    println!("  {ENV_PREFIX}_REPORT_DIR      Directory for reports and ledgers");
    println!("  {ENV_PREFIX}_FANOUT          Worker degree of parallel batches");
    println!("  {ENV_PREFIX}_VERBOSE         Enable verbose output (true/false)");
    println!("  {ENV_PREFIX}_FORMAT          Output format (table, json, csv, summary)");
    println!("  {CI_BUILD_ID}              CI build id, used in branch names");
    println!("  {CI_PYTHON_VERSION}             Included in report file names");
    println!("  {CI_SOURCES_DIR}     Working tree holding the tests");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_INSTANCE_COUNT=8");
    println!("  export {ENV_PREFIX}_INSTANCE_INDEX=3");
    println!("  testshard run --live-rerun");
}
