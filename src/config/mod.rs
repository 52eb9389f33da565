//! Application configuration loading and validation.
//!
//! The top-level `Config` aggregates the `[logger]`, `[device]` and `[capture]`
//! sections. It is loaded once from TOML at startup, validated as a whole, and
//! treated as immutable afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use time::{macros::format_description, OffsetDateTime};
use validator::Validate;

use self::{capture::CaptureConfig, logger::LoggerConfig};

pub mod capture;
pub mod logger;

/// Environment variable that overrides the configuration file location.
pub const CONFIG_ENV: &str = "CAMLINK_CONFIG";

/// Used when `CAMLINK_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/camlink/config.toml";

/// Timestamp prefix for the `print_*` macros.
#[doc(hidden)]
pub fn early_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
        ))
        .unwrap_or_default()
}

/// Timestamped console output for use before the tracing subscriber exists.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("INFO").green(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("WARN").yellow(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        eprintln!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("ERROR").red(),
            format_args!($($arg)*)
        );
    };
}

/// Errors raised while locating, reading, parsing or validating the
/// configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Top-level application configuration.
///
/// ```toml
/// [logger]
/// level = "info"
///
/// [device]
/// product_key = "a1B2c3D4e5F"
/// device_name = "cam-01"
/// device_secret = "..."
/// host = "a1B2c3D4e5F.iot-as-mqtt.cn-shanghai.aliyuncs.com"
///
/// [capture]
/// enabled = true
/// interval = 60
/// ```
#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub logger: LoggerConfig,

    /// Broker identity, endpoint and messaging-core timings.
    #[validate(nested)]
    pub device: camlink_iot::Config,

    #[validate(nested)]
    pub capture: CaptureConfig,
}

impl Config {
    /// Locates and loads the configuration file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be found, read, parsed, or
    /// validated.
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Self::load(&config_path)
    }

    /// Priority:
    /// 1. `CAMLINK_CONFIG` environment variable
    /// 2. `/etc/camlink/config.toml`
    fn get_config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(config_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(config_path);
            print_info!("Using config from {}: {}", CONFIG_ENV, path.display());
            return Ok(path);
        }

        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            print_info!("Using default config path: {}", fallback.display());
            return Ok(fallback.to_path_buf());
        }

        Err(ConfigError::Config(
            "No configuration file found.".to_string(),
        ))
    }

    /// Loads and validates configuration from `path`.
    ///
    /// # Errors
    ///
    /// Propagates IO, parsing, and validation errors as `ConfigError`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let config_str = fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&config_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            r#"
            [logger]
            level = "debug"

            [device]
            product_key = "PK1"
            device_name = "DN1"
            device_secret = "s3cr3t"
            host = "broker.local"
            port = 1883

            [capture]
            enabled = true
            interval = 30
            public_url = "https://cdn.example.com/pictures"
            "#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.logger.level, "debug");
        assert_eq!(config.device.product_key, "PK1");
        assert_eq!(config.device.host, "broker.local");
        assert!(config.capture.enabled);
        assert_eq!(config.capture.interval, 30);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/camlink.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Config(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let file = write_config("[device\nport = ");
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_nested_validation_failure() {
        let file = write_config(
            r#"
            [device]
            product_key = "PK1"
            device_name = "DN1"
            device_secret = "s3cr3t"
            host = "broker.local"
            port = 0
            "#,
        );
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_early_timestamp_shape() {
        let ts = early_timestamp();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000000Z".len());
    }
}
