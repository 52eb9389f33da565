//! Logging initialization.
//!
//! `LoggerManager` validates the `[logger]` section and installs the global
//! `tracing` subscriber: a console layer (compact, pretty or JSON) and an
//! optional systemd journald layer, each behind an `EnvFilter` seeded from
//! `RUST_LOG` or the configured level.

use std::{
    fmt::{self as std_fmt, Write as _},
    io,
};

use thiserror::Error;
use time::{format_description::OwnedFormatItem, OffsetDateTime};
use tracing::instrument;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, format::Writer, time::FormatTime},
    prelude::*,
    EnvFilter, Layer,
};
use validator::{Validate, ValidationErrors};

use crate::{
    config::logger::{ConsoleConfig, LogFormat, LoggerConfig, TimestampFormat},
    print_info, print_warn,
};

/// Errors that can occur during logger configuration or initialization.
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Logger initialization error: {0}")]
    InitializationError(String),

    #[error("Logger configuration validation error: {0}")]
    ValidationError(#[from] ValidationErrors),

    /// IO error, typically during journald socket operations.
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("No logging layers were configured or successfully initialized")]
    NoLayersConfigured,

    /// Journald failed while console output is also enabled; refuse to start
    /// with half the configured outputs.
    #[error(
        "Failed to initialize journald logger while console logging is enabled. Please check your configuration."
    )]
    JournaldFailedWithConsoleEnabled,
}

/// Renders event timestamps according to `TimestampFormat`.
#[derive(Clone)]
pub struct LogTimer {
    format: TimestampFormat,
    custom: Option<OwnedFormatItem>,
}

impl LogTimer {
    pub fn new(format: &TimestampFormat) -> Result<Self, LoggerError> {
        let custom = match format {
            TimestampFormat::Custom(description) => Some(
                time::format_description::parse_owned::<1>(description)
                    .map_err(|e| LoggerError::InitializationError(e.to_string()))?,
            ),
            _ => None,
        };
        Ok(Self {
            format: format.clone(),
            custom,
        })
    }

    fn render(&self, now: OffsetDateTime) -> String {
        match (&self.format, &self.custom) {
            (TimestampFormat::Unix, _) => {
                format!("{}.{:03}", now.unix_timestamp(), now.millisecond())
            }
            (TimestampFormat::Custom(_), Some(items)) => now.format(items).unwrap_or_default(),
            _ => now
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
        }
    }
}

impl FormatTime for LogTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std_fmt::Result {
        write!(w, "{}", self.render(OffsetDateTime::now_utc()))
    }
}

/// Manages logging configuration and global subscriber initialization.
pub struct LoggerManager {
    config: LoggerConfig,
}

impl LoggerManager {
    /// # Errors
    ///
    /// Returns `LoggerError::ValidationError` if configuration validation fails.
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;

        Ok(LoggerManager { config })
    }

    /// Installs the global subscriber. Call once, before anything logs through
    /// `tracing`.
    ///
    /// # Errors
    ///
    /// Returns an error if no layer could be built, or if journald failed while
    /// console output was also requested.
    #[instrument(skip(self))]
    pub fn init(&mut self) -> Result<(), LoggerError> {
        let mut layers = Vec::new();
        match &self.config.console {
            Some(console_config) if console_config.enabled => {
                let console_layer = self.init_console_logger(console_config, self.filter())?;
                layers.push(console_layer);
            }
            _ => {}
        }
        // Journald layer (Linux/systemd only)
        match &self.config.journald {
            Some(journald_config) if journald_config.enabled => {
                match self.init_journald_logger(&journald_config.identifier, self.filter()) {
                    Ok(journald_layer) => {
                        layers.push(journald_layer);
                        print_info!(
                            "Systemd journald logger initialized with identifier: {}",
                            journald_config.identifier
                        );
                    }
                    Err(e) => {
                        print_warn!("Failed to initialize systemd journald logger: {}", e);
                        if self.config.console.as_ref().is_some_and(|c| c.enabled) {
                            return Err(LoggerError::JournaldFailedWithConsoleEnabled);
                        }
                    }
                }
            }
            _ => {}
        }
        if layers.is_empty() {
            print_warn!("No logging layers were initialized. Please check your configuration.");
            return Err(LoggerError::NoLayersConfigured);
        }
        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .map_err(|e| LoggerError::InitializationError(e.to_string()))
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.config.level))
    }

    fn init_console_logger(
        &self,
        config: &ConsoleConfig,
        filter: EnvFilter,
    ) -> Result<Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>, LoggerError> {
        let timer = LogTimer::new(&self.config.timestamp_format)?;
        let span_events = if config.show_spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = fmt::layer()
            .with_timer(timer)
            .with_target(config.show_target)
            .with_thread_ids(config.show_thread_ids)
            .with_span_events(span_events)
            .with_ansi(config.ansi_colors)
            .with_writer(io::stdout);

        let layer = match config.format {
            LogFormat::Json => layer.json().with_filter(filter).boxed(),
            LogFormat::Pretty => layer.pretty().with_filter(filter).boxed(),
            LogFormat::Compact => layer.compact().with_filter(filter).boxed(),
        };

        Ok(layer)
    }

    fn init_journald_logger(
        &self,
        identifier: &str,
        filter: EnvFilter,
    ) -> Result<Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>, LoggerError> {
        let journald_layer = tracing_journald::layer()?.with_syslog_identifier(identifier.to_string());
        Ok(journald_layer.with_filter(filter).boxed())
    }
}
