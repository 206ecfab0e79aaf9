use mock_core::MockError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration for the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Whether to include file and line number information
    pub include_file_info: bool,

    /// Whether to enable colored output
    pub enable_colors: bool,

    /// Module-specific log levels
    pub module_levels: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_levels = HashMap::new();
        module_levels.insert("mock_core".to_string(), "info".to_string());
        module_levels.insert("reqwest".to_string(), "warn".to_string());
        module_levels.insert("hyper".to_string(), "warn".to_string());

        Self {
            level: "info".to_string(),
            include_file_info: false,
            enable_colors: true,
            module_levels,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: impl Into<String>) -> Self {
        let level = level.into();
        let mut config = Self::default();
        // an explicit level applies to our own crate as well
        config.module_levels.insert("mock_core".to_string(), level.clone());
        config.level = level;
        config
    }
}

/// Build the filter for `config`. `RUST_LOG` directives, when set, are added
/// on top.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, MockError> {
    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| MockError::Configuration(format!("Invalid log level '{}': {}", config.level, e)))?;

    for (module, level) in &config.module_levels {
        let directive = format!("{}={}", module, level);
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| MockError::Configuration(format!("Invalid log directive: {}", e)))?,
        );
    }

    if let Ok(extra) = std::env::var("RUST_LOG") {
        for directive in extra.split(',').filter(|d| !d.trim().is_empty()) {
            match directive.parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => eprintln!("Ignoring RUST_LOG directive '{}': {}", directive, e),
            }
        }
    }

    Ok(filter)
}

/// Initialize logging; a second call is a no-op.
pub fn init_logging(config: &LoggingConfig) -> Result<(), MockError> {
    let filter = build_filter(config)?;

    // Logs go to stderr, stdout carries command output.
    let result = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(config.include_file_info)
                .with_line_number(config.include_file_info)
                .with_ansi(config.enable_colors),
        )
        .try_init();

    match result {
        Ok(_) => tracing::debug!("Logging initialized with level: {}", config.level),
        Err(_) => tracing::debug!("Logging already initialized, skipping"),
    }

    Ok(())
}
