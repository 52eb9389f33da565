//! Connection state and connect-failure reasons.
//!
//! `ConnectionState` is owned by the supervisor and published on a watch
//! channel so other tasks (readiness gating, diagnostics) can observe it.
//! `ConnectReason` is the mapped, human-readable cause of a failed or lost
//! session.
//!
//! # Examples
//!
//! ```ignore
//! use camlink_iot::{ConnectReason, ConnectionState};
//!
//! let reason = ConnectReason::from_code(4);
//! assert_eq!(reason, ConnectReason::BadCredentials);
//! println!("{}", ConnectionState::Disconnected); // "Disconnected"
//! ```

use std::fmt;

use rumqttc::ConnectReturnCode;

/// Lifecycle state of the broker session.
///
/// - `Disconnected` -> `Connecting` (health-check tick calls `connect()`)
/// - `Connecting` -> `Connected` (CONNACK accepted)
/// - `Connecting` -> `Disconnected` (refused, timed out, transport error)
/// - `Connected` -> `Disconnected` (session dropped, discovered on the next tick)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session. The next health-check tick will attempt one connect.
    #[default]
    Disconnected,

    /// A connect attempt with freshly derived credentials is in flight.
    Connecting,

    /// The broker accepted the session.
    Connected,
}

impl ConnectionState {
    /// Returns a short static identifier for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        }
    }

    /// Returns true only in `Connected`.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connect attempt failed or an established session ended.
///
/// The numeric codes follow the convention of small-device MQTT clients:
/// negative values are client-side conditions, positive values are the
/// CONNACK return codes of MQTT 3.1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReason {
    /// The broker did not answer within the connection timeout.
    Timeout,
    /// An established session was dropped by the network.
    ConnectionLost,
    /// The transport could not reach the broker at all.
    ConnectFailed,
    /// The session was closed cleanly (by us or by the broker).
    Disconnected,
    /// CONNACK 1: unacceptable protocol version.
    BadProtocol,
    /// CONNACK 2: client identifier rejected.
    BadClientId,
    /// CONNACK 3: server unavailable.
    Unavailable,
    /// CONNACK 4: bad username or password.
    BadCredentials,
    /// CONNACK 5: not authorized.
    Unauthorized,
    /// Anything not covered above.
    Unknown,
}

impl ConnectReason {
    /// Maps a numeric client/broker code to a reason.
    pub fn from_code(code: i32) -> Self {
        match code {
            -4 => ConnectReason::Timeout,
            -3 => ConnectReason::ConnectionLost,
            -2 => ConnectReason::ConnectFailed,
            -1 => ConnectReason::Disconnected,
            1 => ConnectReason::BadProtocol,
            2 => ConnectReason::BadClientId,
            3 => ConnectReason::Unavailable,
            4 => ConnectReason::BadCredentials,
            5 => ConnectReason::Unauthorized,
            _ => ConnectReason::Unknown,
        }
    }

    /// Returns the numeric code for this reason (`0` for `Unknown`).
    pub fn code(&self) -> i32 {
        match self {
            ConnectReason::Timeout => -4,
            ConnectReason::ConnectionLost => -3,
            ConnectReason::ConnectFailed => -2,
            ConnectReason::Disconnected => -1,
            ConnectReason::BadProtocol => 1,
            ConnectReason::BadClientId => 2,
            ConnectReason::Unavailable => 3,
            ConnectReason::BadCredentials => 4,
            ConnectReason::Unauthorized => 5,
            ConnectReason::Unknown => 0,
        }
    }

    /// Human-readable description used in log lines.
    pub fn describe(&self) -> &'static str {
        match self {
            ConnectReason::Timeout => "connection timed out",
            ConnectReason::ConnectionLost => "connection lost",
            ConnectReason::ConnectFailed => "connect request failed",
            ConnectReason::Disconnected => "disconnected",
            ConnectReason::BadProtocol => "unsupported protocol version",
            ConnectReason::BadClientId => "client identifier rejected",
            ConnectReason::Unavailable => "server unavailable",
            ConnectReason::BadCredentials => "invalid username or password",
            ConnectReason::Unauthorized => "not authorized",
            ConnectReason::Unknown => "unknown error",
        }
    }
}

impl fmt::Display for ConnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

impl From<ConnectReturnCode> for ConnectReason {
    fn from(code: ConnectReturnCode) -> Self {
        match code {
            ConnectReturnCode::RefusedProtocolVersion => ConnectReason::BadProtocol,
            ConnectReturnCode::BadClientId => ConnectReason::BadClientId,
            ConnectReturnCode::ServiceUnavailable => ConnectReason::Unavailable,
            ConnectReturnCode::BadUserNamePassword => ConnectReason::BadCredentials,
            ConnectReturnCode::NotAuthorized => ConnectReason::Unauthorized,
            // Success never reaches this mapping
            _ => ConnectReason::Unknown,
        }
    }
}
