//! Structured logging setup
//!
//! The pipeline logs through `tracing` macros; this module gives the
//! embedding service an opt-in way to install a subscriber that honors
//! [`LoggingConfig`]. Libraries embedding the pipeline into an existing
//! subscriber setup can skip [`init`] entirely.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Build filter directives string from LoggingConfig
///
/// Constructs a tracing filter string that includes the base log level
/// and any component-specific log levels configured in the LoggingConfig.
///
/// # Examples
///
/// ```
/// use wisdom::config::LoggingConfig;
/// use wisdom::logging::build_filter_directives;
/// use std::collections::HashMap;
///
/// let mut component_levels = HashMap::new();
/// component_levels.insert("retry".to_string(), "debug".to_string());
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: wisdom::config::LogFormat::Pretty,
///     component_levels: Some(component_levels),
/// };
///
/// let filter_str = build_filter_directives(&config);
/// assert_eq!(filter_str, "info,wisdom::retry=debug");
/// ```
pub fn build_filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.level.clone();

    if let Some(component_levels) = &config.component_levels {
        for (component, level) in component_levels {
            filter_str.push_str(&format!(",wisdom::{}={}", component, level));
        }
    }

    filter_str
}

/// Install a global tracing subscriber for the configured level and format.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_new(build_filter_directives(config))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .try_init()
                .ok();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .try_init()
                .ok();
        }
    }
}
