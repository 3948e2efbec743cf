// RUNTIME PREFERENCES (User Experience)

use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerPreferences {
    /// Whether to log every finalized top-level aggregation
    pub log_aggregation_details: bool,

    /// Whether to log cache hits, misses and invalidations
    pub log_cache_decisions: bool,
}

impl Default for CompilerPreferences {
    fn default() -> Self {
        Self {
            log_aggregation_details: env::var("BI_COMPILER_LOG_AGGREGATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            log_cache_decisions: env::var("BI_COMPILER_LOG_CACHE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorPreferences {
    /// Maximum number of rows a table request returns
    pub row_limit: usize,

    /// Whether to log every status fetch with its host count
    pub log_status_fetches: bool,
}

impl Default for EvaluatorPreferences {
    fn default() -> Self {
        Self {
            row_limit: env::var("BI_EVALUATOR_ROW_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(crate::config::compile_time::evaluation::DEFAULT_ROW_LIMIT),
            log_status_fetches: env::var("BI_EVALUATOR_LOG_STATUS_FETCHES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingPreferences {
    /// Whether to use structured JSON logging (user preference)
    pub use_structured_logging: bool,

    /// Whether to print events directly instead of handing them to the `log` facade
    pub enable_console_logging: bool,

    /// User preferred minimum log level
    pub min_log_level: LogLevel,
}

impl Default for LoggingPreferences {
    fn default() -> Self {
        Self {
            use_structured_logging: env::var("BI_LOGGING_USE_STRUCTURED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            enable_console_logging: env::var("BI_LOGGING_ENABLE_CONSOLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            min_log_level: env::var("BI_LOGGING_MIN_LEVEL")
                .ok()
                .and_then(|v| parse_log_level(&v))
                .unwrap_or_else(|| {
                    LogLevel::from_u8(crate::config::compile_time::logging::MIN_LOG_LEVEL)
                }),
        }
    }
}

/// Parse log level from string (used for environment variables)
pub fn parse_log_level(level: &str) -> Option<LogLevel> {
    match level.to_lowercase().as_str() {
        "error" | "0" => Some(LogLevel::Error),
        "warning" | "warn" | "1" => Some(LogLevel::Warning),
        "info" | "2" => Some(LogLevel::Info),
        "debug" | "3" => Some(LogLevel::Debug),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub compiler: CompilerPreferences,
    pub evaluator: EvaluatorPreferences,
    pub logging: LoggingPreferences,
}

impl RuntimeConfig {
    /// Load preferences from the environment
    pub fn from_env() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("WARN"), Some(LogLevel::Warning));
        assert_eq!(parse_log_level("3"), Some(LogLevel::Debug));
        assert_eq!(parse_log_level("verbose"), None);
    }

    #[test]
    fn test_runtime_config_serializes() {
        let config = RuntimeConfig::from_env();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("row_limit"));
    }
}
