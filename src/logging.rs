//! Tracing subscriber setup for the `mvdkit` binary.
//!
//! Filter priority (highest to lowest):
//!
//! 1. `MVDKIT_LOG` env var (directives, e.g. `mvd_store=debug,warn`)
//! 2. `RUST_LOG` env var
//! 3. CLI flags (`-v` → debug, `-q` → error)
//! 4. Default level: `warn`
//!
//! Logs go to stderr so that command output on stdout stays machine-readable.

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Project-specific filter variable.
pub const ENV_LOG: &str = "MVDKIT_LOG";

/// Crates whose targets are raised to debug under `-v`.
const CRATE_TARGETS: &[&str] = &["matvird_ingest", "mvd_store", "mvd_model"];

/// Verbosity level derived from CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    /// `verbose` wins when both flags are given.
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    pub const fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::DEBUG,
        }
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_subscriber(verbosity: Verbosity) {
    let filter = build_env_filter(
        verbosity,
        std::env::var(ENV_LOG).ok(),
        std::env::var("RUST_LOG").ok(),
    );

    let use_ansi = std::io::IsTerminal::is_terminal(&std::io::stderr());
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(use_ansi)
        .with_target(true);

    let result = if verbosity == Verbosity::Verbose {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.with_timer(fmt::time::uptime()))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.without_time().compact())
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Unparseable directives fall through to the next source.
fn build_env_filter(
    verbosity: Verbosity,
    project_directives: Option<String>,
    rust_log: Option<String>,
) -> EnvFilter {
    for directives in [project_directives, rust_log].into_iter().flatten() {
        if let Ok(filter) = EnvFilter::try_new(&directives) {
            return filter;
        }
    }

    let level = verbosity.default_level();
    let directive = if verbosity == Verbosity::Verbose {
        let crates: Vec<String> = CRATE_TARGETS
            .iter()
            .map(|target| format!("{}=debug", target))
            .collect();
        format!("{},{}", Level::INFO, crates.join(","))
    } else {
        level.to_string()
    };

    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}
