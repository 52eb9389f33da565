//! Readiness gating for the capture executor.
//!
//! Readiness follows the broker session: `Connected` is `Ready`, anything else
//! is `NotReadyYet` with a short reason.

use std::fmt;

use tokio::sync::watch;
use tracing::{debug, warn};

/// Whether the agent may start producing reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessState {
    /// The system is fully operational and ready to perform its primary tasks.
    Ready,
    /// The system is not ready, with an optional reason describing the cause.
    NotReadyYet(String),
    /// The readiness state has not yet been determined.
    Unknown,
}

impl ReadinessState {
    /// Returns true if the system is ready.
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessState::Ready)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ReadinessState::Ready => "Ready",
            ReadinessState::NotReadyYet(_) => "NotReadyYet",
            ReadinessState::Unknown => "Unknown",
        }
    }

    /// Returns the reason string if the state is `NotReadyYet`, otherwise an empty string.
    pub fn reason(&self) -> &str {
        match self {
            ReadinessState::NotReadyYet(reason) => reason,
            _ => "",
        }
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessState::Ready => write!(f, "Ready"),
            ReadinessState::NotReadyYet(reason) => write!(f, "NotReadyYet: {}", reason),
            ReadinessState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Translates broker connection state into readiness.
pub mod listener {
    use camlink_iot::ConnectionState;

    use super::*;

    /// Mirrors every connection-state change into `state_tx` until either side
    /// goes away.
    pub async fn listen(
        mut connection_state_rx: watch::Receiver<ConnectionState>,
        state_tx: watch::Sender<ReadinessState>,
    ) {
        debug!("Launching ConnectionState listening");

        {
            let conn_state = *connection_state_rx.borrow();
            let readiness_state = adapt_connection_state(conn_state);
            debug!("Initial broker state: {}", conn_state);
            let _ = state_tx.send(readiness_state.clone());
            debug!("Initial readiness status: {}", readiness_state);
        }

        while connection_state_rx.changed().await.is_ok() {
            let conn_state = *connection_state_rx.borrow();
            let readiness_state = adapt_connection_state(conn_state);
            debug!(
                "Transition: broker {} -> readiness {}",
                conn_state, readiness_state
            );

            if state_tx.send(readiness_state).is_err() {
                warn!("No subscribers to readiness status");
                break;
            }
        }

        debug!("ConnectionState channel closed, listening stopped");
    }

    pub(crate) fn adapt_connection_state(state: ConnectionState) -> ReadinessState {
        match state {
            ConnectionState::Connected => ReadinessState::Ready,
            ConnectionState::Connecting => ReadinessState::NotReadyYet("Connecting...".to_string()),
            ConnectionState::Disconnected => {
                ReadinessState::NotReadyYet("Disconnected".to_string())
            }
        }
    }
}

/// Shared readiness tracker that allows multiple components to observe state changes.
#[derive(Debug, Clone)]
pub struct Readiness {
    state_tx: watch::Sender<ReadinessState>,
    state_rx: watch::Receiver<ReadinessState>,
}

impl Readiness {
    /// Starts in `Unknown`.
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(ReadinessState::Unknown);
        Self { state_tx, state_rx }
    }

    /// Returns a receiver that can be used to subscribe to readiness changes.
    pub fn subscribe(&self) -> watch::Receiver<ReadinessState> {
        self.state_rx.clone()
    }

    /// Returns the current readiness state without subscribing.
    pub fn current_state(&self) -> ReadinessState {
        self.state_rx.borrow().clone()
    }

    /// Spawns the listener that follows the broker connection state.
    pub fn start_listening(
        &self,
        connection_state_rx: watch::Receiver<camlink_iot::ConnectionState>,
    ) {
        let state_tx = self.state_tx.clone();
        tokio::spawn(async move {
            listener::listen(connection_state_rx, state_tx).await;
        });
    }

    /// Manually updates the readiness state.
    ///
    /// Logs the transition at debug level.
    pub fn set_state(&self, state: ReadinessState) {
        let old_state = self.state_rx.borrow().clone();
        let _ = self.state_tx.send(state.clone());
        debug!(
            "The readiness status has changed: {} -> {}",
            old_state, state
        );
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}
