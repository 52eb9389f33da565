//! Session lifecycle: credential derivation, connect and health check.
//!
//! The supervisor owns the device identity and the transport. It is the only
//! place that derives credentials, and it derives them again on every
//! attempt from the current clock reading. It never retries on its own:
//! `check_connection()` performs at most one `connect()` per call, and the
//! manager calls it once per health-check tick.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{
    clock::Clock,
    credentials::{Credentials, DeviceIdentity},
    error::TransferError,
    signer::CredentialSigner,
    state::{ConnectReason, ConnectionState},
    transport::{InboundMessage, Transport},
};

pub struct ConnectionSupervisor {
    identity: DeviceIdentity,
    signer: CredentialSigner,
    transport: Box<dyn Transport>,
    clock: Arc<dyn Clock>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionSupervisor {
    pub fn new(
        identity: DeviceIdentity,
        transport: Box<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let signer = identity.signer();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            identity,
            signer,
            transport,
            clock,
            state_tx,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Returns a receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected() && self.transport.is_connected()
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            info!("Connection state changed to: {}", state);
        }
    }

    /// Opens a session with freshly derived credentials.
    ///
    /// On failure the state returns to `Disconnected` and the mapped reason
    /// is logged together with its numeric code.
    pub async fn connect(&mut self) -> Result<(), TransferError> {
        self.set_state(ConnectionState::Connecting);

        let timestamp = self.clock.timestamp_millis().to_string();
        let credentials = match Credentials::derive(&self.identity, &self.signer, &timestamp) {
            Ok(credentials) => credentials,
            Err(e) => {
                error!("Credential derivation failed, connect aborted: {}", e);
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        debug!("Derived credentials for {}", credentials.client_id);

        match self.transport.open(&credentials).await {
            Ok(()) => {
                info!("Connected to broker as {}", self.identity.brief_id());
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                let reason = match &e {
                    TransferError::Connect(reason) => *reason,
                    TransferError::Timeout(_) => ConnectReason::Timeout,
                    _ => ConnectReason::Unknown,
                };
                error!(
                    "Connect failed ({}, code {}): {}",
                    reason,
                    reason.code(),
                    e
                );
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Reconciles the published state with the transport.
    ///
    /// Returns true if the session is up.
    fn sync_state(&self) -> bool {
        if self.transport.is_connected() {
            return true;
        }
        if self.state().is_connected() {
            let reason = self
                .transport
                .last_reason()
                .unwrap_or(ConnectReason::ConnectionLost);
            warn!(
                "Session lost ({}, code {})",
                reason,
                reason.code()
            );
            self.set_state(ConnectionState::Disconnected);
        }
        false
    }

    /// Health check.
    ///
    /// Disconnected: exactly one `connect()` attempt, no inbound messages.
    /// Connected: one pump of the session, returning buffered inbound messages.
    pub async fn check_connection(&mut self) -> Result<Vec<InboundMessage>, TransferError> {
        if !self.sync_state() {
            info!("Not connected, attempting to connect");
            self.connect().await?;
            return Ok(Vec::new());
        }
        Ok(self.transport.poll_inbound())
    }

    /// Pumps the session without attempting to reconnect.
    pub fn pump(&mut self) -> Vec<InboundMessage> {
        if !self.sync_state() {
            return Vec::new();
        }
        self.transport.poll_inbound()
    }

    pub async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), TransferError> {
        if !self.sync_state() {
            return Err(TransferError::NotConnected);
        }
        self.transport.publish(topic, payload, retain).await
    }

    pub async fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), TransferError> {
        if !self.sync_state() {
            return Err(TransferError::NotConnected);
        }
        self.transport.subscribe(topic, qos).await
    }

    pub async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransferError> {
        if !self.sync_state() {
            return Err(TransferError::NotConnected);
        }
        self.transport.unsubscribe(topic).await
    }

    /// Closes the session and publishes `Disconnected`.
    pub async fn shutdown(&mut self) {
        self.transport.close().await;
        self.set_state(ConnectionState::Disconnected);
        info!("Broker session closed");
    }
}
