//! The broker session seam.
//!
//! `ConnectionSupervisor` talks to the broker only through [`Transport`]. The
//! production implementation is
//! [`ConnectionKernel`](crate::connection::ConnectionKernel), backed by
//! rumqttc; tests substitute an in-memory transport.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{credentials::Credentials, error::TransferError, state::ConnectReason};

/// A publish received from the broker, buffered until the next pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Fixed per-session parameters. Credentials are supplied per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    pub max_packet_size: usize,
    pub clean_session: bool,
    pub connection_timeout: Duration,
    pub publish_timeout: Duration,
    pub request_channel_capacity: usize,
    pub inbound_capacity: usize,
}

#[async_trait]
pub trait Transport: Send {
    /// Opens a new session with the given credentials, replacing any previous
    /// one. Returns once the broker accepted or refused the session.
    ///
    /// Refusals and timeouts surface as `TransferError::Connect(reason)`.
    async fn open(&mut self, credentials: &Credentials) -> Result<(), TransferError>;

    /// Whether the current session is still up.
    fn is_connected(&self) -> bool;

    /// Why the last session ended, if it has.
    fn last_reason(&self) -> Option<ConnectReason>;

    /// Publishes at QoS 0.
    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), TransferError>;

    async fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), TransferError>;

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransferError>;

    /// Returns every inbound message buffered since the previous call.
    fn poll_inbound(&mut self) -> Vec<InboundMessage>;

    /// Closes the session. Best effort; never fails.
    async fn close(&mut self);
}
