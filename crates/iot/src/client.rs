//! rumqttc client construction for a single session.
//!
//! A new client and event loop are built for every connect attempt, because
//! the client id and password embed the attempt's timestamp.
//!
//! # Examples
//!
//! ```ignore
//! let (client, event_loop) = ClientBuilder::for_session(&options, &credentials).build();
//! ```

use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, MqttOptions};

use super::{credentials::Credentials, transport::SessionOptions};

/// Incoming packet limit handed to rumqttc. It sits well above any configured
/// `max_packet_size` so oversized publishes reach the router and are dropped
/// there instead of failing the event loop.
pub const INBOUND_PACKET_LIMIT: usize = 256 * 1024;

/// Fluent wrapper around `MqttOptions`.
///
/// The builder is consumed by `build()`, which returns the client (for
/// requests) and the event loop (which must be polled for anything to move).
pub struct ClientBuilder {
    opts: MqttOptions,

    /// Capacity of the client-to-event-loop request channel.
    cap: usize,
}

impl ClientBuilder {
    pub fn new(client_id: impl Into<String>, host: impl Into<String>, port: u16, cap: usize) -> Self {
        Self {
            opts: MqttOptions::new(client_id, host, port),
            cap: cap.max(1),
        }
    }

    /// Applies the fixed session options and the attempt's credentials.
    pub fn for_session(options: &SessionOptions, credentials: &Credentials) -> Self {
        Self::new(
            credentials.client_id.clone(),
            options.host.clone(),
            options.port,
            options.request_channel_capacity,
        )
        .keep_alive(options.keep_alive)
        .max_packet_size(
            INBOUND_PACKET_LIMIT.max(options.max_packet_size),
            options.max_packet_size,
        )
        .clean_session(options.clean_session)
        .credentials(credentials.username.clone(), credentials.password.clone())
    }

    /// The broker drops the session after 1.5x this interval without traffic;
    /// rumqttc sends PINGREQ on its own as long as the event loop is polled.
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.opts.set_keep_alive(interval);
        self
    }

    pub fn max_packet_size(mut self, incoming: usize, outgoing: usize) -> Self {
        self.opts.set_max_packet_size(incoming, outgoing);
        self
    }

    pub fn clean_session(mut self, clean: bool) -> Self {
        self.opts.set_clean_session(clean);
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.opts.set_credentials(username, password);
        self
    }

    pub fn options(&self) -> &MqttOptions {
        &self.opts
    }

    pub fn build(self) -> (AsyncClient, EventLoop) {
        AsyncClient::new(self.opts, self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::DeviceIdentity;

    fn session_options() -> SessionOptions {
        SessionOptions {
            host: "localhost".into(),
            port: 1883,
            keep_alive: Duration::from_secs(60),
            max_packet_size: 1024,
            clean_session: true,
            connection_timeout: Duration::from_secs(5),
            publish_timeout: Duration::from_secs(5),
            request_channel_capacity: 10,
            inbound_capacity: 16,
        }
    }

    #[test]
    fn test_for_session_applies_credentials() {
        let id = DeviceIdentity::new("PK1", "DN1", "s3cr3t");
        let creds = Credentials::derive(&id, &id.signer(), "1700000000").unwrap();
        let builder = ClientBuilder::for_session(&session_options(), &creds);
        let opts = builder.options();

        assert_eq!(opts.client_id(), creds.client_id);
        assert_eq!(opts.keep_alive(), Duration::from_secs(60));
        assert!(opts.clean_session());
        assert_eq!(
            opts.credentials(),
            Some((creds.username.clone(), creds.password.clone()))
        );
        assert_eq!(opts.broker_address(), ("localhost".to_string(), 1883));
    }

    #[test]
    fn test_incoming_limit_exceeds_router_bound() {
        let id = DeviceIdentity::new("PK1", "DN1", "s3cr3t");
        let creds = Credentials::derive(&id, &id.signer(), "1700000000").unwrap();
        let builder = ClientBuilder::for_session(&session_options(), &creds);

        assert_eq!(builder.options().max_packet_size(), INBOUND_PACKET_LIMIT);
        assert!(INBOUND_PACKET_LIMIT > u16::MAX as usize);
    }

    #[tokio::test]
    async fn test_build_tcp_client() {
        let (client, _event_loop) = ClientBuilder::new("test_client", "localhost", 1883, 10)
            .keep_alive(Duration::from_secs(30))
            .max_packet_size(1024, 1024)
            .clean_session(true)
            .credentials("user", "pass")
            .build();
        assert!(!format!("{:?}", client).is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let builder = ClientBuilder::new("c", "localhost", 1883, 0);
        assert_eq!(builder.cap, 1);
    }
}
