//! # hydrate-telemetry
//!
//! `tracing` subscriber setup: an `EnvFilter` built from the configured level
//! and per-module overrides (`RUST_LOG` wins when set), feeding either a JSON
//! or a human-readable fmt layer.

#![deny(unsafe_code)]

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by `RUST_LOG`.
    pub log_level: Level,
    /// Per-module level overrides (e.g. `"hydrate_server"` => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from string settings, skipping level names that do not parse.
    pub fn from_names<'a>(
        level: &str,
        modules: impl IntoIterator<Item = (&'a str, &'a str)>,
        json: bool,
    ) -> Self {
        let log_level = level.parse().unwrap_or(Level::INFO);
        let module_levels = modules
            .into_iter()
            .filter_map(|(module, lvl)| Some((module.to_string(), lvl.parse().ok()?)))
            .collect();
        Self {
            log_level,
            module_levels,
            json,
        }
    }

    /// The filter directive string, e.g. `info,hydrate_server=debug`.
    pub fn filter_directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

/// Initialize the global subscriber. Call once at startup.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
        .is_ok()
}
