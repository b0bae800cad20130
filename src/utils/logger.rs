//! Logging setup

use tracing_subscriber::EnvFilter;

/// Verbosity of the `testshard` target, selectable with `--log-level`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[value(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    /// Level for the `-v` / `TESTSHARD_VERBOSE` shorthand
    pub fn verbose(enabled: bool) -> Self {
        if enabled {
            LogLevel::Debug
        } else {
            LogLevel::Info
        }
    }

    fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "testshard=trace",
            LogLevel::Debug => "testshard=debug",
            LogLevel::Info => "testshard=info",
            LogLevel::Warn => "testshard=warn",
            LogLevel::Error => "testshard=error",
        }
    }
}

/// Install the global subscriber on stderr.
///
/// `RUST_LOG` wins over `level` when set.
pub fn init_logger(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::ValueEnum;

    #[test]
    fn test_level_names() {
        assert_eq!(LogLevel::from_str("debug", true), Ok(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("WARNING", true), Ok(LogLevel::Warn));
        assert!(LogLevel::from_str("loud", true).is_err());
    }

    #[test]
    fn test_verbose_shorthand() {
        assert_eq!(LogLevel::verbose(true), LogLevel::Debug);
        assert_eq!(LogLevel::verbose(false), LogLevel::default());
        assert_eq!(LogLevel::Warn.directive(), "testshard=warn");
    }
}
