//! rumqttc-backed broker session.
//!
//! `ConnectionKernel` is the production [`Transport`]. Each `open()` builds a
//! fresh client and event loop, waits for CONNACK under the connection
//! timeout, and then hands the event loop to a driver task:
//!
//! ```text
//! IotManager ──► ConnectionSupervisor ──► ConnectionKernel
//!                                           │  AsyncClient (requests)
//!                                           ▼
//!                                         driver task (polls EventLoop)
//!                                           │  inbound publishes (bounded, try_send)
//!                                           ▼
//!                                         poll_inbound() on the next pump
//! ```
//!
//! The driver never reconnects. When the event loop errors it records the
//! mapped reason and exits; the supervisor notices on its next health check
//! and opens a new session with new credentials.

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Outgoing, Packet, QoS,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{
    client::ClientBuilder,
    credentials::Credentials,
    error::TransferError,
    message::publish_packet_size,
    state::ConnectReason,
    transport::{InboundMessage, SessionOptions, Transport},
};

/// Liveness of one session as seen by its driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    Up,
    Down(ConnectReason),
}

struct Session {
    client: AsyncClient,
    status: watch::Receiver<SessionStatus>,
    inbound: mpsc::Receiver<InboundMessage>,
    cancel: CancellationToken,
    driver: JoinHandle<()>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct ConnectionKernel {
    options: SessionOptions,
    session: Option<Session>,
    last_reason: Option<ConnectReason>,
}

impl ConnectionKernel {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            session: None,
            last_reason: None,
        }
    }

    /// Polls the event loop until CONNACK arrives or the loop errors.
    async fn handshake(event_loop: &mut EventLoop) -> Result<(), ConnectReason> {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    return match ack.code {
                        ConnectReturnCode::Success => Ok(()),
                        code => Err(ConnectReason::from(code)),
                    };
                }
                Ok(event) => trace!("Pre-CONNACK event: {:?}", event),
                Err(e) => {
                    debug!("Handshake failed: {}", root_cause(&e));
                    return Err(connect_reason(&e));
                }
            }
        }
    }

    fn session(&self) -> Result<&Session, TransferError> {
        match &self.session {
            Some(s) if *s.status.borrow() == SessionStatus::Up => Ok(s),
            _ => Err(TransferError::NotConnected),
        }
    }
}

#[async_trait]
impl Transport for ConnectionKernel {
    async fn open(&mut self, credentials: &Credentials) -> Result<(), TransferError> {
        self.close().await;

        let (client, mut event_loop) = ClientBuilder::for_session(&self.options, credentials).build();
        info!(
            "Connecting to {}:{} as {}",
            self.options.host, self.options.port, credentials.client_id
        );

        let handshake = Self::handshake(&mut event_loop);
        let outcome = match tokio::time::timeout(self.options.connection_timeout, handshake).await {
            Ok(result) => result,
            Err(_) => Err(ConnectReason::Timeout),
        };
        if let Err(reason) = outcome {
            self.last_reason = Some(reason);
            return Err(TransferError::Connect(reason));
        }

        let (status_tx, status_rx) = watch::channel(SessionStatus::Up);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.options.inbound_capacity.max(1));
        let cancel = CancellationToken::new();
        let driver = tokio::spawn(drive(event_loop, inbound_tx, status_tx, cancel.clone()));

        self.last_reason = None;
        self.session = Some(Session {
            client,
            status: status_rx,
            inbound: inbound_rx,
            cancel,
            driver,
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session().is_ok()
    }

    fn last_reason(&self) -> Option<ConnectReason> {
        match &self.session {
            Some(s) => match *s.status.borrow() {
                SessionStatus::Down(reason) => Some(reason),
                SessionStatus::Up => None,
            },
            None => self.last_reason,
        }
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), TransferError> {
        let client = self.session()?.client.clone();
        let size = publish_packet_size(topic, payload.len());
        if size > self.options.max_packet_size {
            return Err(TransferError::PayloadTooLarge {
                size,
                max: self.options.max_packet_size,
            });
        }
        let deadline = self.options.publish_timeout;
        tokio::time::timeout(
            deadline,
            client.publish(topic, QoS::AtMostOnce, retain, payload),
        )
        .await
        .map_err(|_| TransferError::Timeout(deadline))??;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), TransferError> {
        let qos = qos_from_u8(qos)?;
        let client = self.session()?.client.clone();
        client
            .subscribe(topic, qos)
            .await
            .map_err(|e| TransferError::Subscribe(e.to_string()))
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransferError> {
        let client = self.session()?.client.clone();
        client
            .unsubscribe(topic)
            .await
            .map_err(|e| TransferError::Subscribe(e.to_string()))
    }

    fn poll_inbound(&mut self) -> Vec<InboundMessage> {
        let mut messages = Vec::new();
        if let Some(session) = self.session.as_mut() {
            while let Ok(message) = session.inbound.try_recv() {
                messages.push(message);
            }
        }
        messages
    }

    async fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if *session.status.borrow() == SessionStatus::Up {
            if let Err(e) = session.client.try_disconnect() {
                warn!("Error sending disconnect packet: {:?}", e);
            }
            // Give the driver a chance to flush DISCONNECT before it is cancelled.
            let grace = self.options.publish_timeout;
            if tokio::time::timeout(grace, &mut session.driver).await.is_err() {
                debug!("Driver did not stop within {:?}, cancelling", grace);
            }
        }
        self.last_reason = Some(ConnectReason::Disconnected);
        session.cancel.cancel();
    }
}

/// Driver task: pumps the event loop for one session.
async fn drive(
    mut event_loop: EventLoop,
    inbound: mpsc::Sender<InboundMessage>,
    status: watch::Sender<SessionStatus>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Session driver cancelled");
                break;
            }

            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = InboundMessage {
                        topic: publish.topic,
                        payload: publish.payload,
                    };
                    match inbound.try_send(message) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(dropped)) => {
                            warn!("Inbound buffer full, dropping message on '{}'", dropped.topic);
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("Disconnected by broker");
                    status.send_replace(SessionStatus::Down(ConnectReason::Disconnected));
                    break;
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    debug!("Disconnect sent");
                    status.send_replace(SessionStatus::Down(ConnectReason::Disconnected));
                    break;
                }
                Ok(event) => trace!("Session event: {:?}", event),
                Err(e) => {
                    let reason = lost_reason(&e);
                    error!(
                        "Session dropped ({}, code {}): {}",
                        reason,
                        reason.code(),
                        root_cause(&e)
                    );
                    status.send_replace(SessionStatus::Down(reason));
                    break;
                }
            }
        }
    }
}

/// Maps a failure before CONNACK.
fn connect_reason(err: &ConnectionError) -> ConnectReason {
    match err {
        ConnectionError::ConnectionRefused(code) => ConnectReason::from(*code),
        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => ConnectReason::Timeout,
        ConnectionError::Io(_) => ConnectReason::ConnectFailed,
        _ => ConnectReason::Unknown,
    }
}

/// Maps a failure on an established session.
fn lost_reason(err: &ConnectionError) -> ConnectReason {
    match err {
        ConnectionError::ConnectionRefused(code) => ConnectReason::from(*code),
        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => ConnectReason::Timeout,
        _ => ConnectReason::ConnectionLost,
    }
}

fn qos_from_u8(qos: u8) -> Result<QoS, TransferError> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(TransferError::Subscribe(format!(
            "invalid QoS {}, must be 0, 1 or 2",
            other
        ))),
    }
}

/// Extracts the innermost error message from an error chain.
fn root_cause(e: &dyn std::error::Error) -> String {
    let mut current = e;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string().trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use std::{io, time::Duration};

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        time::{sleep, Instant},
    };

    use super::*;
    use crate::credentials::DeviceIdentity;

    const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

    fn encode_publish(topic: &str, payload: &[u8]) -> Vec<u8> {
        let mut remaining = 2 + topic.len() + payload.len();
        let mut packet = vec![0x30];
        loop {
            let mut byte = (remaining % 128) as u8;
            remaining /= 128;
            if remaining > 0 {
                byte |= 0x80;
            }
            packet.push(byte);
            if remaining == 0 {
                break;
            }
        }
        packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        packet.extend_from_slice(topic.as_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    /// Accepts one client, answers CONNECT, writes `after_connack`, then
    /// swallows whatever the client sends.
    async fn local_broker(after_connack: Vec<u8>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(&CONNACK_ACCEPTED).await.unwrap();
            socket.write_all(&after_connack).await.unwrap();
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        });
        port
    }

    fn options(port: u16) -> SessionOptions {
        SessionOptions {
            host: "127.0.0.1".into(),
            port,
            keep_alive: Duration::from_secs(30),
            max_packet_size: 1024,
            clean_session: true,
            connection_timeout: Duration::from_secs(2),
            publish_timeout: Duration::from_secs(1),
            request_channel_capacity: 10,
            inbound_capacity: 4,
        }
    }

    fn credentials() -> Credentials {
        let id = DeviceIdentity::new("PK1", "DN1", "s3cr3t");
        Credentials::derive(&id, &id.signer(), "1700000000000").unwrap()
    }

    #[test]
    fn test_connect_reason_mapping() {
        assert_eq!(
            connect_reason(&ConnectionError::ConnectionRefused(
                ConnectReturnCode::BadUserNamePassword
            )),
            ConnectReason::BadCredentials
        );
        assert_eq!(
            connect_reason(&ConnectionError::ConnectionRefused(
                ConnectReturnCode::NotAuthorized
            )),
            ConnectReason::Unauthorized
        );
        assert_eq!(
            connect_reason(&ConnectionError::NetworkTimeout),
            ConnectReason::Timeout
        );
        assert_eq!(
            connect_reason(&ConnectionError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "refused"
            ))),
            ConnectReason::ConnectFailed
        );
        assert_eq!(
            connect_reason(&ConnectionError::RequestsDone),
            ConnectReason::Unknown
        );
    }

    #[test]
    fn test_lost_reason_mapping() {
        assert_eq!(
            lost_reason(&ConnectionError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "reset"
            ))),
            ConnectReason::ConnectionLost
        );
        assert_eq!(
            lost_reason(&ConnectionError::FlushTimeout),
            ConnectReason::Timeout
        );
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(qos_from_u8(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(qos_from_u8(2).unwrap(), QoS::ExactlyOnce);
        assert!(matches!(qos_from_u8(3), Err(TransferError::Subscribe(_))));
    }

    #[tokio::test]
    async fn test_new_kernel_is_disconnected() {
        let mut kernel = ConnectionKernel::new(options(1883));
        assert!(!kernel.is_connected());
        assert!(kernel.last_reason().is_none());
        assert!(kernel.poll_inbound().is_empty());
        assert!(matches!(
            kernel.publish("t", b"{}".to_vec(), false).await,
            Err(TransferError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_open_against_closed_port_fails() {
        // Nothing listens on port 1 in the test environment.
        let mut kernel = ConnectionKernel::new(options(1));
        let err = kernel.open(&credentials()).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::Connect(ConnectReason::ConnectFailed | ConnectReason::Timeout)
        ));
        assert!(!kernel.is_connected());
        assert!(kernel.last_reason().is_some());
    }

    #[tokio::test]
    async fn test_oversized_inbound_reaches_router_and_session_survives() {
        let port = local_broker(encode_publish("/t", &[b'x'; 2000])).await;
        let mut kernel = ConnectionKernel::new(options(port));
        kernel.open(&credentials()).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut inbound = Vec::new();
        while inbound.is_empty() && Instant::now() < deadline {
            sleep(Duration::from_millis(20)).await;
            inbound.extend(kernel.poll_inbound());
        }

        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].topic, "/t");
        assert_eq!(inbound[0].payload.len(), 2000);
        assert!(kernel.is_connected());
        kernel.close().await;
    }

    #[tokio::test]
    async fn test_publish_over_packet_limit_keeps_session() {
        let port = local_broker(Vec::new()).await;
        let mut kernel = ConnectionKernel::new(options(port));
        kernel.open(&credentials()).await.unwrap();
        let topic = "/sys/PK1/DN1/thing/event/property/post";

        let err = kernel
            .publish(topic, vec![b'x'; 1000], false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::PayloadTooLarge {
                size: 1043,
                max: 1024
            }
        ));

        kernel.publish(topic, vec![b'x'; 981], false).await.unwrap();
        sleep(Duration::from_millis(200)).await;
        assert!(kernel.is_connected());
        assert!(kernel.last_reason().is_none());
        kernel.close().await;
    }

    #[test]
    fn test_root_cause_unwraps_chain() {
        let err = ConnectionError::Io(io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(root_cause(&err).ends_with("boom"));
    }
}
