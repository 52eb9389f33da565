//! Error handling for the device messaging core.
//!
//! `TransferError` is the single error type returned by every fallible
//! operation in this crate. The variants fall into three groups:
//!
//! **Session errors** (repaired by the next health-check tick):
//! - `Connect`: the broker refused or dropped the session, with the mapped reason
//! - `NotConnected`: an operation needed a live session and there was none
//! - `Timeout`: a connect or publish did not finish within its deadline
//!
//! **Per-message errors** (logged, never affect the session):
//! - `Publish` / `Subscribe`: the transport rejected a single request
//! - `PayloadTooLarge`: the encoded payload exceeds `max_packet_size`
//! - `Parse` / `InvalidPayload`: inbound or caller-supplied JSON is malformed
//!
//! **Setup errors** (fail fast):
//! - `Signing`: the HMAC backend rejected the device secret
//! - `InvalidBinding`: a callback was registered under an empty key
//! - `ConfigError`: configuration validation failed
//! - `Stopped`: a handle was used after the manager shut down
//!
//! # Usage
//!
//! ```ignore
//! match manager.send_event("error").await {
//!     Ok(()) => {}
//!     Err(TransferError::NotConnected) => {
//!         // the health-check tick will reconnect
//!     }
//!     Err(e) => warn!("event dropped: {}", e),
//! }
//! ```

use std::time::Duration;

use thiserror::Error;

use super::state::ConnectReason;

/// The unified error type for messaging-core operations.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The broker refused the session or the session was lost.
    ///
    /// Recovery: none at the call site. The next health-check tick performs
    /// exactly one fresh `connect()` with newly derived credentials.
    #[error("Connection error: {0}")]
    Connect(ConnectReason),

    /// No session is currently established.
    #[error("Not connected to broker")]
    NotConnected,

    /// The transport refused a publish request.
    ///
    /// No further detail is available from the broker at QoS 0. The message
    /// is not retried.
    #[error("Publish error: {0}")]
    Publish(String),

    /// The transport refused a subscribe or unsubscribe request.
    #[error("Subscribe error: {0}")]
    Subscribe(String),

    /// Encoded payload is larger than the configured packet bound.
    ///
    /// Payloads are never truncated; the caller gets this error instead.
    #[error("Payload too large: {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    /// Inbound payload could not be parsed as JSON.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Caller-supplied JSON fragment is not valid JSON.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The MAC backend failed while deriving the broker password.
    ///
    /// Treated as fatal for the current connect attempt: a session is never
    /// opened with an empty or partial signature.
    #[error("Signing error: {0}")]
    Signing(String),

    /// Callback binding was rejected (empty routing key).
    #[error("Invalid binding: {0}")]
    InvalidBinding(String),

    /// Configuration validation failed.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] validator::ValidationErrors),

    /// The local MQTT client could not queue a request (client shut down,
    /// request channel closed).
    #[error("Client transfer error: {0}")]
    ClientTransfer(#[from] rumqttc::ClientError),

    /// An operation did not complete within its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The manager's run loop has exited; handles can no longer reach it.
    #[error("Messaging core is not running")]
    Stopped,
}

impl From<ConnectReason> for TransferError {
    fn from(reason: ConnectReason) -> Self {
        TransferError::Connect(reason)
    }
}
