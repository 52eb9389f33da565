//! # camlink-iot: device-to-cloud messaging core
//!
//! Speaks the Alink topic and envelope conventions over MQTT 3.1.1 (via
//! `rumqttc`) on behalf of a single device:
//!
//! - **Signed credentials**: a fresh HMAC-SHA256 password per connect attempt,
//!   bound to the clock reading taken at that moment
//! - **Supervised session**: one connect attempt per health-check tick, never a
//!   hidden retry loop
//! - **Property queue**: `send_property` only enqueues; a periodic drain posts
//!   each update once (at-most-once)
//! - **Message routing**: inbound property-set commands and topic messages are
//!   dispatched to handlers bound by key
//!
//! # Quick Start
//!
//! ```ignore
//! use camlink_iot::{Config, IotManager};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config: Config = toml::from_str(&std::fs::read_to_string("device.toml")?)?;
//!     let mut manager = IotManager::new(config)?;
//!
//!     manager.bind_data("LightSwitch", Box::new(|value| {
//!         println!("LightSwitch set to {}", value);
//!     }))?;
//!
//!     let handle = manager.handle();
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(manager.run(cancel.clone()));
//!
//!     handle.send_property("Temperature", 21.5).await?;
//!     handle.send_event("boot").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Topics
//!
//! For product key `PK` and device name `DN`:
//!
//! ```text
//! /sys/PK/DN/thing/event/property/post     property reports (outbound)
//! /sys/PK/DN/thing/service/property/set    property commands (inbound)
//! /sys/PK/DN/thing/event/{id}/post         events (outbound)
//! /sys/PK/DN/thing/event/user/{suffix}     user topics
//! ```
//!
//! # Connection lifecycle
//!
//! ```text
//! Disconnected ──health tick──► Connecting ──CONNACK──► Connected
//!      ▲                            │                      │
//!      └──────── refused / timeout ─┘                      │
//!      └──────────────── session lost (seen on next tick) ─┘
//! ```
//!
//! Failures are mapped onto [`ConnectReason`] and logged with their numeric
//! code (`-4` timeout through `5` not authorized).

pub mod client;
pub mod clock;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod message;
pub mod queue;
pub mod registry;
pub mod router;
pub mod signer;
pub mod state;
pub mod supervisor;
pub mod topic;
pub mod transport;

// Re-exports: Configuration
pub use config::Config;
// Re-exports: Connection management
//
// Used by applications that need to run a session without the manager
pub use connection::ConnectionKernel;
pub use supervisor::ConnectionSupervisor;
pub use transport::{InboundMessage, SessionOptions, Transport};
// Re-exports: Credentials
pub use clock::{Clock, SystemClock};
pub use credentials::{Credentials, DeviceIdentity};
pub use signer::CredentialSigner;
// Re-exports: Error handling
//
// Every result returns TransferError
pub use error::TransferError;
// Re-exports: High-level types
//
// These are the most common entry points for applications
pub use manager::{IotHandle, IotManager};
pub use queue::{PropertyMessage, PropertyValue};
pub use registry::Handler;
pub use topic::TopicSet;
// Re-exports: State monitoring
pub use state::{ConnectReason, ConnectionState};

/// Result type for messaging-core operations.
pub type Result<T> = std::result::Result<T, TransferError>;
