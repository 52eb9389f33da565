//! Capture pipeline configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Settings for the periodic capture, store, upload and report cycle.
///
/// ```toml
/// [capture]
/// enabled = true
/// interval = 60
/// frame_path = "/run/camlink/frame.jpg"
/// store_dir = "/var/lib/camlink/pictures"
/// public_url = "https://cdn.example.com/pictures"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CaptureConfig {
    /// Whether the capture executor runs at all.
    pub enabled: bool,

    /// Seconds between cycles.
    #[validate(range(
        min = 1,
        max = 86400,
        message = "Capture interval must be between 1 and 86400 seconds"
    ))]
    pub interval: u64,

    /// File the camera driver keeps overwriting with its latest frame.
    #[validate(length(min = 1, message = "Frame path must not be empty"))]
    pub frame_path: String,

    /// Directory for stored images. Created on first save.
    #[validate(length(min = 1, message = "Store directory must not be empty"))]
    pub store_dir: String,

    /// Property reported with the upload URL (or `"error"`).
    #[validate(length(min = 1, max = 64, message = "Property key must be 1-64 characters"))]
    pub property_key: String,

    /// Base URL under which stored images are published. Without it nothing is
    /// uploaded and no property is reported.
    #[validate(url(message = "Public URL must be a valid URL"))]
    pub public_url: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            enabled: false,
            interval: 60,
            frame_path: "/run/camlink/frame.jpg".to_string(),
            store_dir: "/var/lib/camlink/pictures".to_string(),
            property_key: "image_url".to_string(),
            public_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CaptureConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = CaptureConfig {
            interval: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_public_url_must_parse() {
        let config = CaptureConfig {
            public_url: Some("not a url".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CaptureConfig {
            public_url: Some("https://cdn.example.com/pictures".into()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
