//! High-level entry point for the device messaging core.
//!
//! `IotManager` owns every piece of mutable state (supervisor, callback
//! registry, outbound queue) by value. Nothing is shared behind a lock:
//! during setup the application configures it through `&mut self`, and once
//! `run()` takes ownership all further interaction goes through an
//! [`IotHandle`] command channel.
//!
//! # Run loop
//!
//! ```text
//! select! {
//!     cancel            => close the session, exit
//!     health tick       => reconnect if down, else pump and route
//!     drain tick        => publish and clear every queued property
//!     pump tick         => route inbound messages
//!     command           => enqueue property / publish event
//! }
//! ```
//!
//! # Typical Usage
//!
//! ```ignore
//! let mut manager = IotManager::new(config.device.clone())?;
//! manager.bind_data("LightSwitch", Box::new(|v| info!("switch -> {}", v)))?;
//!
//! let handle = manager.handle();
//! let cancel = CancellationToken::new();
//! tokio::spawn(manager.run(cancel.clone()));
//!
//! handle.send_property("image_url", "http://...").await?;
//! ```

use std::sync::Arc;

use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use validator::Validate;

use super::{
    clock::{Clock, SystemClock},
    config::Config,
    connection::ConnectionKernel,
    error::TransferError,
    message::{event_payload, publish_packet_size, PropertyEnvelope},
    queue::{OutboundQueue, PropertyMessage, PropertyValue},
    registry::{CallbackRegistry, Handler},
    router::MessageRouter,
    state::ConnectionState,
    supervisor::ConnectionSupervisor,
    topic::TopicSet,
    transport::{InboundMessage, Transport},
};

/// Params used by `send_event` when the caller supplies none.
pub const EMPTY_PARAMS: &str = "{}";

/// Requests accepted by a running manager.
#[derive(Debug)]
enum Command {
    SendProperty(PropertyMessage),
    SendEvent {
        event_id: String,
        params: String,
        reply: oneshot::Sender<Result<(), TransferError>>,
    },
    Publish {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
        reply: oneshot::Sender<Result<(), TransferError>>,
    },
}

/// Cloneable handle for talking to a running [`IotManager`] from other tasks.
#[derive(Debug, Clone)]
pub struct IotHandle {
    tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl IotHandle {
    /// Queues a property update for the next drain tick.
    pub async fn send_property(
        &self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Result<(), TransferError> {
        self.tx
            .send(Command::SendProperty(PropertyMessage::new(key, value)))
            .await
            .map_err(|_| TransferError::Stopped)
    }

    pub async fn send_event(&self, event_id: &str) -> Result<(), TransferError> {
        self.send_event_with(event_id, EMPTY_PARAMS).await
    }

    /// Publishes an event immediately and waits for the outcome.
    pub async fn send_event_with(&self, event_id: &str, params: &str) -> Result<(), TransferError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::SendEvent {
                event_id: event_id.to_string(),
                params: params.to_string(),
                reply,
            })
            .await
            .map_err(|_| TransferError::Stopped)?;
        rx.await.map_err(|_| TransferError::Stopped)?
    }

    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        retain: bool,
    ) -> Result<(), TransferError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Publish {
                topic: topic.to_string(),
                payload: payload.into(),
                retain,
                reply,
            })
            .await
            .map_err(|_| TransferError::Stopped)?;
        rx.await.map_err(|_| TransferError::Stopped)?
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

pub struct IotManager {
    config: Config,
    supervisor: ConnectionSupervisor,
    registry: CallbackRegistry,
    queue: OutboundQueue,
    router: MessageRouter,
    topics: TopicSet,
    clock: Arc<dyn Clock>,
    commands: mpsc::Receiver<Command>,
    command_tx: mpsc::Sender<Command>,
}

impl IotManager {
    /// Creates a manager backed by rumqttc and the system clock.
    ///
    /// # Errors
    /// `TransferError::ConfigError` if `config` fails validation.
    pub fn new(config: Config) -> Result<Self, TransferError> {
        let transport = Box::new(ConnectionKernel::new(config.session_options()));
        Self::with_transport(config, transport, Arc::new(SystemClock))
    }

    /// Creates a manager over an arbitrary transport and clock.
    pub fn with_transport(
        config: Config,
        transport: Box<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TransferError> {
        config.validate()?;

        let identity = config.identity();
        let topics = TopicSet::new(&identity.product_key, &identity.device_name);
        let router = MessageRouter::new(&topics, config.max_packet_size as usize);
        let queue = OutboundQueue::new(config.queue_capacity);
        let supervisor = ConnectionSupervisor::new(identity, transport, clock.clone());
        let (command_tx, commands) = mpsc::channel(config.queue_capacity.max(1));

        Ok(Self {
            config,
            supervisor,
            registry: CallbackRegistry::new(),
            queue,
            router,
            topics,
            clock,
            commands,
            command_tx,
        })
    }

    pub fn handle(&self) -> IotHandle {
        IotHandle {
            tx: self.command_tx.clone(),
            state_rx: self.supervisor.subscribe_state(),
        }
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.supervisor.subscribe_state()
    }

    /// Number of property updates waiting for the next drain.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub async fn connect(&mut self) -> Result<(), TransferError> {
        self.supervisor.connect().await
    }

    /// Appends a property update to the outbound queue. Nothing is published
    /// until the next drain.
    pub fn send_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.enqueue(PropertyMessage::new(key, value));
    }

    fn enqueue(&mut self, message: PropertyMessage) {
        debug!("Queued property '{}' = '{}'", message.key, message.value);
        self.queue.push(message);
    }

    /// Posts event `event_id` with empty params.
    pub async fn send_event(&mut self, event_id: &str) -> Result<(), TransferError> {
        self.send_event_with(event_id, EMPTY_PARAMS).await
    }

    /// Posts event `event_id` with `params` embedded verbatim.
    ///
    /// # Errors
    /// - `InvalidPayload` if `params` is not valid JSON
    /// - `NotConnected` / transport errors from the publish
    pub async fn send_event_with(&mut self, event_id: &str, params: &str) -> Result<(), TransferError> {
        let body = event_payload(event_id, params)?;
        let topic = self.topics.event_post(event_id);
        self.publish(&topic, body.into_bytes(), false).await
    }

    /// Publishes a raw payload at QoS 0.
    ///
    /// # Errors
    /// `PayloadTooLarge` if the encoded packet (header, topic and payload)
    /// exceeds `max_packet_size`; nothing is sent in that case.
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        retain: bool,
    ) -> Result<(), TransferError> {
        let payload = payload.into();
        let max = self.config.max_packet_size as usize;
        let size = publish_packet_size(topic, payload.len());
        if size > max {
            return Err(TransferError::PayloadTooLarge { size, max });
        }
        self.supervisor.publish(topic, payload, retain).await
    }

    /// Publishes under the user topic base.
    pub async fn publish_user(
        &mut self,
        suffix: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), TransferError> {
        let topic = self.topics.user_topic(suffix);
        self.publish(&topic, payload, false).await
    }

    /// Subscribes at the broker, then binds `handler` to the full topic.
    ///
    /// The handler is bound only if the subscribe request succeeded.
    pub async fn subscribe(
        &mut self,
        topic: &str,
        qos: u8,
        handler: Handler,
    ) -> Result<(), TransferError> {
        if topic.is_empty() {
            return Err(TransferError::InvalidBinding("topic must not be empty".into()));
        }
        self.supervisor.subscribe(topic, qos).await?;
        self.registry.bind(topic, handler)?;
        info!("Subscribed to topic: {}", topic);
        Ok(())
    }

    pub async fn subscribe_user(&mut self, suffix: &str, handler: Handler) -> Result<(), TransferError> {
        let topic = self.topics.user_topic(suffix);
        self.subscribe(&topic, 0, handler).await
    }

    /// Unsubscribes at the broker, then removes the first binding for `topic`.
    pub async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransferError> {
        self.supervisor.unsubscribe(topic).await?;
        if !self.registry.unbind(topic) {
            debug!("No handler was bound to {}", topic);
        }
        info!("Unsubscribed from topic: {}", topic);
        Ok(())
    }

    pub async fn unsubscribe_user(&mut self, suffix: &str) -> Result<(), TransferError> {
        let topic = self.topics.user_topic(suffix);
        self.unsubscribe(&topic).await
    }

    /// Binds a handler to a property identifier or topic without touching the
    /// broker.
    pub fn bind_data(&mut self, key: &str, handler: Handler) -> Result<(), TransferError> {
        self.registry.bind(key, handler)
    }

    pub fn unbind_data(&mut self, key: &str) -> bool {
        self.registry.unbind(key)
    }

    /// Clears the first handler bound to `key`, keeping its slot for reuse.
    pub fn detach_data(&mut self, key: &str) -> bool {
        self.registry.detach(key)
    }

    /// Publishes every queued property to the property-post topic.
    ///
    /// Each entry is removed regardless of its publish outcome, including
    /// while disconnected; failures are logged and the update is lost.
    /// Returns the number of entries drained.
    pub async fn drain_queue(&mut self) -> usize {
        if self.queue.is_empty() {
            return 0;
        }

        let topic = self.topics.property_post.clone();
        let entries = self.queue.take_all();
        let drained = entries.len();
        for message in entries {
            let id = self.clock.timestamp_millis().to_string();
            let result = match PropertyEnvelope::new(id, &message).to_bytes() {
                Ok(bytes) => self.publish(&topic, bytes, false).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => debug!("Reported property '{}'", message.key),
                Err(e) => warn!("Property '{}' lost: {}", message.key, e),
            }
        }
        drained
    }

    /// Health-check tick: one connect attempt if down, else pump and route.
    pub async fn check_connection(&mut self) {
        match self.supervisor.check_connection().await {
            Ok(inbound) => self.route_all(inbound),
            Err(e) => debug!("Health check connect failed: {}", e),
        }
    }

    /// Routes whatever the session buffered since the last pump.
    pub fn pump(&mut self) {
        let inbound = self.supervisor.pump();
        self.route_all(inbound);
    }

    fn route_all(&mut self, inbound: Vec<InboundMessage>) {
        for message in inbound {
            self.router
                .route(&mut self.registry, &message.topic, &message.payload);
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SendProperty(message) => self.enqueue(message),
            Command::SendEvent {
                event_id,
                params,
                reply,
            } => {
                let result = self.send_event_with(&event_id, &params).await;
                if let Err(e) = &result {
                    warn!("Event '{}' not sent: {}", event_id, e);
                }
                let _ = reply.send(result);
            }
            Command::Publish {
                topic,
                payload,
                retain,
                reply,
            } => {
                let result = self.publish(&topic, payload, retain).await;
                let _ = reply.send(result);
            }
        }
    }

    /// Runs until `cancel` fires, then closes the session.
    ///
    /// Connects once up front. The health-check tick is armed regardless of
    /// that outcome, so a failed first attempt is retried on the next tick.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "Messaging core starting for {} ({}:{})",
            self.supervisor.identity().brief_id(),
            self.config.host,
            self.config.port
        );

        if let Err(e) = self.supervisor.connect().await {
            warn!("Initial connect failed, retrying on next health check: {}", e);
        }

        let now = Instant::now();
        let health_period = self.config.health_check_interval();
        let drain_period = self.config.queue_drain_interval();
        let pump_period = self.config.pump_interval();
        let mut health = interval_at(now + health_period, health_period);
        let mut drain = interval_at(now + drain_period, drain_period);
        let mut pump = interval_at(now + pump_period, pump_period);
        for ticker in [&mut health, &mut drain, &mut pump] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown signal received, closing broker session...");
                    break;
                }

                _ = health.tick() => self.check_connection().await,

                _ = drain.tick() => {
                    let drained = self.drain_queue().await;
                    if drained > 0 {
                        debug!("Drained {} queued properties", drained);
                    }
                }

                _ = pump.tick() => self.pump(),

                Some(command) = self.commands.recv() => self.handle_command(command).await,
            }
        }

        self.shutdown().await;
    }

    pub async fn shutdown(&mut self) {
        if !self.queue.is_empty() {
            warn!(
                "Discarding {} undelivered properties on shutdown",
                self.queue.len()
            );
        }
        self.supervisor.shutdown().await;
        info!("Messaging core stopped");
    }
}
