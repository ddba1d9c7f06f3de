//! Structured logging helpers
//!
//! Builds the `tracing` filter used by the `serve` command from [`LoggingConfig`],
//! so operators can raise the level of a single component (for example
//! `relay` or `persistence`) without flooding the rest of the output.
//!
//! [`LoggingConfig`]: crate::config::LoggingConfig

/// Build filter directives string from LoggingConfig
///
/// The result has the form `"base_level,edgewatch::component=level,..."`.
/// Component directives are sorted so the output is stable across runs.
///
/// # Examples
///
/// ```
/// use edgewatch::config::{LogFormat, LoggingConfig};
/// use edgewatch::logging::build_filter_directives;
/// use std::collections::HashMap;
///
/// let mut component_levels = HashMap::new();
/// component_levels.insert("relay".to_string(), "debug".to_string());
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Pretty,
///     component_levels: Some(component_levels),
/// };
///
/// assert_eq!(build_filter_directives(&config), "info,edgewatch::relay=debug");
/// ```
pub fn build_filter_directives(config: &crate::config::LoggingConfig) -> String {
    let mut filter_str = config.level.clone();

    if let Some(component_levels) = &config.component_levels {
        let mut components: Vec<_> = component_levels.iter().collect();
        components.sort();
        for (component, level) in components {
            filter_str.push_str(&format!(",edgewatch::{}={}", component, level));
        }
    }

    filter_str
}

/// Render a payload size for log lines without logging the payload itself.
pub fn payload_size_label(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KiB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MiB", bytes as f64 / (1024.0 * 1024.0))
    }
}
