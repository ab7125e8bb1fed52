//! Logging setup for the `hotwire` binary and embedders.
//!
//! Events go to stderr with a compact `HH:MM:SS.mmm` timestamp so stdout
//! stays free for command output (`hotwire manifest` prints JSON there).
//!
//! Levels come from `[logging]` in `.hotwire/settings.toml`. Keys under
//! `[logging.modules]` name a subsystem of this crate (`compiler`,
//! `watcher`, `registry`, `session`, `pipeline`, `manifest`) and are
//! expanded to its tracing target, so `watcher = "trace"` becomes
//! `hotwire::watcher=trace`. A key containing `::` is used as written.
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! registry = "debug"
//! ```
//!
//! `RUST_LOG` replaces the configured filter entirely:
//! `RUST_LOG=hotwire::watcher=trace hotwire watch`.

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

const CRATE_TARGET: &str = "hotwire";

struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// How much the CLI was asked to say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// `--quiet`: errors only, per-subsystem overrides ignored.
    Quiet,
    #[default]
    Normal,
    /// `--verbose`: debug for everything not set lower explicitly.
    Verbose,
}

impl Verbosity {
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, true) => Self::Verbose,
            _ => Self::Normal,
        }
    }

    /// Logging config after applying this verbosity to `config`.
    pub fn apply(self, config: &LoggingConfig) -> LoggingConfig {
        let mut effective = config.clone();
        match self {
            Self::Quiet => {
                effective.default = "error".to_string();
                effective.modules.clear();
            }
            Self::Verbose => effective.default = "debug".to_string(),
            Self::Normal => {}
        }
        effective
    }
}

/// Tracing target for a `[logging.modules]` key.
fn target_for(key: &str) -> String {
    if key.contains("::") || key == CRATE_TARGET {
        key.to_string()
    } else {
        format!("{CRATE_TARGET}::{key}")
    }
}

/// Filter directives for `config`, subsystem overrides sorted by target.
fn filter_directives(config: &LoggingConfig) -> String {
    let mut overrides: Vec<(String, &str)> = config
        .modules
        .iter()
        .map(|(key, level)| (target_for(key), level.as_str()))
        .collect();
    overrides.sort();

    let mut directives = config.default.clone();
    for (target, level) in overrides {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Install the global subscriber. Only the first call has an effect.
///
/// A config that does not parse as a filter falls back to `warn`, and the
/// problem is reported once the subscriber is up.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let mut rejected = None;
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            let directives = filter_directives(config);
            EnvFilter::try_new(&directives).unwrap_or_else(|e| {
                rejected = Some(format!("'{directives}': {e}"));
                EnvFilter::new("warn")
            })
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_filter(filter);
        tracing_subscriber::registry().with(fmt_layer).init();

        if let Some(reason) = rejected {
            tracing::warn!("[logging] invalid log filter {reason}, using 'warn'");
        }
    });
}

/// Install the subscriber with `--quiet` / `--verbose` applied.
pub fn init_for_cli(config: &LoggingConfig, quiet: bool, verbose: bool) {
    init_with_config(&Verbosity::from_flags(quiet, verbose).apply(config));
}

/// Info-level event tagged with a component: `[component] event: args`.
///
/// ```ignore
/// log_event!("compiler", "build", "{}", result.summary());
/// log_event!("watcher", "stopped");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-level twin of [`log_event!`].
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(default: &str, modules: &[(&str, &str)]) -> LoggingConfig {
        LoggingConfig {
            default: default.to_string(),
            modules: modules
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn subsystem_keys_expand_to_crate_targets() {
        let config = config("warn", &[("watcher", "trace"), ("compiler", "debug")]);
        assert_eq!(
            filter_directives(&config),
            "warn,hotwire::compiler=debug,hotwire::watcher=trace"
        );
    }

    #[test]
    fn qualified_keys_are_kept() {
        let config = config("info", &[("notify", "debug"), ("tower::x", "off")]);
        assert_eq!(
            filter_directives(&config),
            "info,hotwire::notify=debug,tower::x=off"
        );
        assert_eq!(target_for(CRATE_TARGET), "hotwire");
    }

    #[test]
    fn quiet_drops_overrides_and_verbose_keeps_them() {
        let base = config("warn", &[("registry", "trace")]);

        let quiet = Verbosity::from_flags(true, true).apply(&base);
        assert_eq!(quiet.default, "error");
        assert!(quiet.modules.is_empty());

        let verbose = Verbosity::from_flags(false, true).apply(&base);
        assert_eq!(verbose.default, "debug");
        assert_eq!(verbose.modules["registry"], "trace");

        assert_eq!(Verbosity::from_flags(false, false).apply(&base).default, "warn");
    }

    #[test]
    fn configured_directives_parse() {
        let config = config("warn", &[("session", "debug")]);
        assert!(EnvFilter::try_new(filter_directives(&config)).is_ok());
    }
}
