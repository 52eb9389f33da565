//! `[logger]` section: level, console output and journald.
//!
//! ```toml
//! [logger]
//! level = "info"
//!
//! [logger.console]
//! enabled = true
//! format = "compact"
//!
//! [logger.journald]
//! enabled = false
//! identifier = "camlink"
//! ```

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Console output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Timestamp rendering for console entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimestampFormat {
    #[default]
    Rfc3339,
    Unix,
    /// A `time` format description, e.g. `"[hour]:[minute]:[second]"`.
    Custom(String),
}

/// Top-level logging configuration.
///
/// Controls global log level, timestamp format, and output targets (console and/or journald).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggerConfig {
    /// Global log level. Valid values: trace, debug, info, warn, error (case-insensitive).
    #[validate(custom(function = "validate_log_level"))]
    pub level: String,

    /// Optional console output configuration.
    #[validate(nested)]
    pub console: Option<ConsoleConfig>,

    /// Optional systemd journald output configuration.
    #[validate(nested)]
    pub journald: Option<JournaldConfig>,

    /// Timestamp format used across all outputs.
    #[validate(custom(function = "validate_timestamp_format"))]
    pub timestamp_format: TimestampFormat,
}

/// A custom timestamp format must be a non-empty, parseable `time` format
/// description.
fn validate_timestamp_format(format: &TimestampFormat) -> Result<(), ValidationError> {
    match format {
        TimestampFormat::Custom(s) if s.is_empty() => {
            let mut err = ValidationError::new("invalid_timestamp_format");
            err.message = Some("Custom timestamp format cannot be empty".into());
            Err(err)
        }
        TimestampFormat::Custom(s) => match time::format_description::parse(s) {
            Ok(_) => Ok(()),
            Err(e) => {
                let mut err = ValidationError::new("invalid_timestamp_format");
                err.message = Some(format!("Invalid timestamp format '{}': {}", s, e).into());
                Err(err)
            }
        },
        _ => Ok(()),
    }
}

/// Validates that the provided log level is one of the supported values.
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("invalid_log_level");
            err.message = Some(format!("Invalid log level: {}", level).into());
            Err(err)
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: "info".to_string(),
            timestamp_format: TimestampFormat::default(),
            console: Some(ConsoleConfig::default()),
            journald: Some(JournaldConfig::default()),
        }
    }
}

/// Configuration for console log output.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Whether console output is enabled.
    pub enabled: bool,

    /// Output format for console logs.
    #[serde(default)]
    pub format: LogFormat,

    /// Include the log target (module path) in output.
    pub show_target: bool,

    /// Include thread IDs in output.
    pub show_thread_ids: bool,

    /// Include span entry/exit events in output.
    pub show_spans: bool,

    /// Enable ANSI color codes in console output.
    pub ansi_colors: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            enabled: true,
            format: LogFormat::default(),
            show_target: false,
            show_thread_ids: false,
            show_spans: false,
            ansi_colors: true,
        }
    }
}

/// Configuration for systemd journald output (Unix only).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JournaldConfig {
    /// Whether journald output is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Identifier used for journal entries. Must be non-empty.
    #[validate(length(min = 1))]
    pub identifier: String,
}

impl Default for JournaldConfig {
    fn default() -> Self {
        JournaldConfig {
            enabled: false,
            identifier: "camlink".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = LoggerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.journald.map(|j| j.identifier), Some("camlink".into()));
    }

    #[test]
    fn test_invalid_level_rejected() {
        let config = LoggerConfig {
            level: "loud".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_timestamp_format_must_parse() {
        let config = LoggerConfig {
            timestamp_format: TimestampFormat::Custom("[hour]:[minute]".into()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = LoggerConfig {
            timestamp_format: TimestampFormat::Custom("[nonsense".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_console_format_from_toml() {
        let config: LoggerConfig = toml::from_str(
            r#"
            level = "debug"
            [console]
            enabled = true
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.console.map(|c| c.format), Some(LogFormat::Json));
    }
}
