//! Device and broker configuration for the messaging core.
//!
//! Loaded as the `[device]` table of the application config. Every field has
//! a default except the device triple and the host, which must be supplied.
//!
//! ```toml
//! [device]
//! product_key = "a1B2c3D4e5F"
//! device_name = "camera-01"
//! device_secret = "..."
//! host = "a1B2c3D4e5F.iot-as-mqtt.cn-shanghai.aliyuncs.com"
//! port = 1883
//! keep_alive = 60
//! ```

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::{credentials::DeviceIdentity, transport::SessionOptions};

#[derive(Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_pump_interval"))]
pub struct Config {
    #[validate(length(min = 1, max = 64, message = "Product key must be 1-64 characters"))]
    pub product_key: String,

    #[validate(length(min = 1, max = 64, message = "Device name must be 1-64 characters"))]
    pub device_name: String,

    #[validate(length(min = 1, message = "Device secret must not be empty"))]
    pub device_secret: String,

    #[validate(length(
        min = 1,
        max = 255,
        message = "Host must be between 1 and 255 characters"
    ))]
    pub host: String,

    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Keep-alive interval in seconds, sent in CONNECT.
    #[validate(range(
        min = 5,
        max = 3600,
        message = "Keep alive must be between 5 and 3600 seconds"
    ))]
    pub keep_alive: u64,

    /// Upper bound for a single packet in either direction, in bytes.
    ///
    /// Outbound payloads above this are rejected; inbound ones are dropped.
    #[validate(range(
        min = 64,
        max = 65535,
        message = "Max packet size must be between 64 and 65535 bytes"
    ))]
    pub max_packet_size: u32,

    /// Seconds to wait for CONNACK.
    #[validate(range(
        min = 1,
        max = 300,
        message = "Connection timeout must be between 1 and 300 seconds"
    ))]
    pub connection_timeout: u64,

    /// Seconds a single publish may wait for room in the request channel.
    #[validate(range(
        min = 1,
        max = 60,
        message = "Publish timeout must be between 1 and 60 seconds"
    ))]
    pub publish_timeout: u64,

    /// Seconds between health checks (reconnect if down).
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Health check interval must be between 1 and 3600 seconds"
    ))]
    pub health_check_interval: u64,

    /// Seconds between outbound queue drains.
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Queue drain interval must be between 1 and 3600 seconds"
    ))]
    pub queue_drain_interval: u64,

    /// Milliseconds between inbound pumps.
    #[validate(range(
        min = 10,
        max = 60000,
        message = "Pump interval must be between 10 and 60000 milliseconds"
    ))]
    pub pump_interval_ms: u64,

    #[validate(range(
        min = 1,
        max = 65535,
        message = "Queue capacity must be between 1 and 65535"
    ))]
    pub queue_capacity: usize,

    #[validate(range(
        min = 1,
        max = 255,
        message = "Request channel capacity must be between 1 and 255"
    ))]
    pub request_channel_capacity: usize,

    /// Inbound messages buffered between pumps; extras are dropped.
    #[validate(range(
        min = 1,
        max = 4096,
        message = "Inbound capacity must be between 1 and 4096"
    ))]
    pub inbound_capacity: usize,

    pub clean_session: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            product_key: String::new(),
            device_name: String::new(),
            device_secret: String::new(),
            host: "localhost".to_string(),
            port: 1883,
            keep_alive: 60,
            max_packet_size: 1024,
            connection_timeout: 10,
            publish_timeout: 5,
            health_check_interval: 10,
            queue_drain_interval: 5,
            pump_interval_ms: 500,
            queue_capacity: 256,
            request_channel_capacity: 10,
            inbound_capacity: 64,
            clean_session: true,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("product_key", &self.product_key)
            .field("device_name", &self.device_name)
            .field("device_secret", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("keep_alive", &self.keep_alive)
            .field("max_packet_size", &self.max_packet_size)
            .field("connection_timeout", &self.connection_timeout)
            .field("publish_timeout", &self.publish_timeout)
            .field("health_check_interval", &self.health_check_interval)
            .field("queue_drain_interval", &self.queue_drain_interval)
            .field("pump_interval_ms", &self.pump_interval_ms)
            .field("queue_capacity", &self.queue_capacity)
            .field("request_channel_capacity", &self.request_channel_capacity)
            .field("inbound_capacity", &self.inbound_capacity)
            .field("clean_session", &self.clean_session)
            .finish()
    }
}

impl Config {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(
            self.product_key.clone(),
            self.device_name.clone(),
            self.device_secret.clone(),
        )
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            host: self.host.clone(),
            port: self.port,
            keep_alive: Duration::from_secs(self.keep_alive),
            max_packet_size: self.max_packet_size as usize,
            clean_session: self.clean_session,
            connection_timeout: Duration::from_secs(self.connection_timeout),
            publish_timeout: Duration::from_secs(self.publish_timeout),
            request_channel_capacity: self.request_channel_capacity,
            inbound_capacity: self.inbound_capacity,
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval)
    }

    pub fn queue_drain_interval(&self) -> Duration {
        Duration::from_secs(self.queue_drain_interval)
    }

    pub fn pump_interval(&self) -> Duration {
        Duration::from_millis(self.pump_interval_ms)
    }
}

/// The event loop only sends keep-alive pings while it is being pumped.
fn validate_pump_interval(config: &Config) -> Result<(), ValidationError> {
    if config.pump_interval_ms.saturating_mul(2) >= config.keep_alive.saturating_mul(1000) {
        return Err(ValidationError::new("pump_interval").with_message(
            format!(
                "Pump interval ({} ms) must be below half the keep alive ({} s)",
                config.pump_interval_ms, config.keep_alive
            )
            .into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            product_key: "PK1".into(),
            device_name: "DN1".into(),
            device_secret: "s3cr3t".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 1883);
        assert_eq!(config.keep_alive, 60);
        assert_eq!(config.max_packet_size, 1024);
        assert_eq!(config.health_check_interval, 10);
        assert_eq!(config.queue_drain_interval, 5);
        assert_eq!(config.queue_capacity, 256);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", valid());
        assert!(rendered.contains("PK1"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("s3cr3t"));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_missing_identity_fails() {
        let errors = Config::default().validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("product_key"));
        assert!(fields.contains_key("device_name"));
        assert!(fields.contains_key("device_secret"));
    }

    #[test]
    fn test_keep_alive_range() {
        let config = Config {
            keep_alive: 2,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pump_interval_must_beat_keep_alive() {
        let config = Config {
            keep_alive: 5,
            pump_interval_ms: 3000,
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = Config {
            keep_alive: 5,
            pump_interval_ms: 2000,
            ..valid()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_from_toml() {
        let config: Config = toml::from_str(
            r#"
            product_key = "PK1"
            device_name = "DN1"
            device_secret = "s3cr3t"
            host = "broker.local"
            queue_capacity = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.host, "broker.local");
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.keep_alive, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_options_conversion() {
        let opts = valid().session_options();
        assert_eq!(opts.keep_alive, Duration::from_secs(60));
        assert_eq!(opts.max_packet_size, 1024);
        assert_eq!(opts.connection_timeout, Duration::from_secs(10));
    }
}
