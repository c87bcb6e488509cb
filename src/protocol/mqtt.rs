// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! rumqttc-backed [`Transport`].
//!
//! A single background task polls the rumqttc [`EventLoop`]. The first
//! `ConnAck` completes [`Transport::connect`]; after that the task keeps
//! polling through link failures, waiting between attempts as dictated by
//! the [`ReconnectPolicy`], and rumqttc re-establishes the connection on the
//! next poll.
//!
//! Acknowledgements are manual: rumqttc sends the PUBACK for an
//! at-least-once message only when [`Transport::acknowledge`] is called.
//!
//! # Examples
//!
//! ```no_run
//! use ttn_bridge::protocol::{MqttTransport, Transport};
//!
//! # async fn example() -> ttn_bridge::Result<()> {
//! let transport = MqttTransport::builder()
//!     .broker("tcp://eu1.cloud.thethings.network:1883")
//!     .client_id("my-bridge")
//!     .credentials("my-app@ttn", "NNSXS.XXXXXXXX")
//!     .build()?;
//!
//! transport.start_consuming();
//! let session = transport.connect().await?;
//! println!("session present: {}", session.session_present);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, Publish, QoS,
    SubscribeFilter,
};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::command::OutboundCommand;
use crate::error::{ProtocolError, ValueError};

use super::{
    Delivery, DeliveryGuarantee, InboundMessage, ReconnectPolicy, SessionInfo, TopicFilter,
    Transport,
};

/// Default MQTT port.
const DEFAULT_PORT: u16 = 1883;

/// Capacity of the rumqttc request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Default capacity of the inbound queue.
const DEFAULT_INBOUND_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsumerState {
    Idle,
    Consuming,
    Closed,
}

/// Items queued by the event-loop task for the consumer.
#[derive(Debug)]
enum Inbound {
    Message(InboundMessage),
    Resumed(SessionInfo),
    LinkLost,
}

/// State shared with the event-loop task.
struct Shared {
    inbound_tx: mpsc::Sender<Inbound>,
    consumer: watch::Sender<ConsumerState>,
    connected: AtomicBool,
    closing: AtomicBool,
}

impl Shared {
    /// Queues an item for the consumer, dropping it if the consumer is not
    /// armed. Blocks while the queue is full so a slow consumer slows the
    /// network side down instead of losing messages.
    async fn forward(&self, item: Inbound) {
        let mut state_rx = self.consumer.subscribe();
        if *state_rx.borrow_and_update() != ConsumerState::Consuming {
            tracing::trace!(?item, "Consumer not armed, dropping inbound item");
            return;
        }

        tokio::select! {
            result = self.inbound_tx.send(item) => {
                if result.is_err() {
                    tracing::debug!("Inbound queue closed");
                }
            }
            () = wait_until_closed(&mut state_rx) => {
                tracing::debug!("Consumer closed while forwarding, item dropped");
            }
        }
    }
}

/// Resolves once the consumer leaves the consuming state.
async fn wait_until_closed(state_rx: &mut watch::Receiver<ConsumerState>) {
    while *state_rx.borrow_and_update() == ConsumerState::Consuming {
        if state_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Connection settings for [`MqttTransport`].
#[derive(Debug, Clone)]
struct MqttTransportConfig {
    host: String,
    port: u16,
    client_id: String,
    connection_timeout: Duration,
    clean_session: bool,
    reconnect: ReconnectPolicy,
}

/// MQTT transport built on rumqttc.
///
/// Requests a persistent session by default and reconnects automatically
/// after link loss.
pub struct MqttTransport {
    client: AsyncClient,
    event_loop: parking_lot::Mutex<Option<EventLoop>>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    inbound_rx: Mutex<mpsc::Receiver<Inbound>>,
    shared: Arc<Shared>,
    config: MqttTransportConfig,
}

impl MqttTransport {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> MqttTransportBuilder {
        MqttTransportBuilder::default()
    }

    /// Returns the broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Returns the broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Returns the MQTT client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    /// Returns whether the link to the broker is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn timeout_ms(&self) -> u64 {
        self.config.connection_timeout.as_millis() as u64
    }
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("client_id", &self.config.client_id)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

fn qos(guarantee: DeliveryGuarantee) -> QoS {
    match guarantee {
        DeliveryGuarantee::AtMostOnce => QoS::AtMostOnce,
        DeliveryGuarantee::AtLeastOnce => QoS::AtLeastOnce,
    }
}

/// Converts a received PUBLISH, keeping the packet id when an
/// acknowledgement is owed.
fn inbound_message(publish: &Publish) -> InboundMessage {
    let message = InboundMessage::new(publish.topic.clone(), publish.payload.to_vec());
    match publish.qos {
        QoS::AtMostOnce => message,
        QoS::AtLeastOnce | QoS::ExactlyOnce => message.with_packet_id(publish.pkid),
    }
}

impl Transport for MqttTransport {
    fn start_consuming(&self) {
        self.shared.consumer.send_if_modified(|state| {
            if *state == ConsumerState::Idle {
                *state = ConsumerState::Consuming;
                true
            } else {
                false
            }
        });
    }

    fn stop_consuming(&self) {
        let previous = self.shared.consumer.send_replace(ConsumerState::Closed);
        if previous != ConsumerState::Closed {
            tracing::debug!("Stopped consuming");
        }
    }

    fn is_consumer_closed(&self) -> bool {
        *self.shared.consumer.borrow() != ConsumerState::Consuming
    }

    fn is_session_persistent(&self) -> bool {
        !self.config.clean_session
    }

    async fn connect(&self) -> Result<SessionInfo, ProtocolError> {
        let event_loop = self.event_loop.lock().take().ok_or_else(|| {
            ProtocolError::ConnectionFailed("transport was already connected".to_string())
        })?;

        tracing::info!(
            host = %self.config.host,
            port = %self.config.port,
            client_id = %self.config.client_id,
            clean_session = self.config.clean_session,
            "Connecting to MQTT broker"
        );

        let (connack_tx, connack_rx) = oneshot::channel();
        let abort = {
            // Checked under the task lock so close either finds the task or
            // connect sees the close.
            let mut task = self.task.lock();
            if self.shared.closing.load(Ordering::Acquire) {
                return Err(ProtocolError::ConnectionFailed(
                    "transport was closed".to_string(),
                ));
            }
            let handle = tokio::spawn(run_event_loop(
                event_loop,
                Arc::clone(&self.shared),
                self.config.reconnect,
                connack_tx,
            ));
            let abort = handle.abort_handle();
            *task = Some(handle);
            abort
        };

        match tokio::time::timeout(self.config.connection_timeout, connack_rx).await {
            Ok(Ok(Ok(session))) => {
                tracing::info!(
                    host = %self.config.host,
                    session_present = session.session_present,
                    "Connected to MQTT broker"
                );
                Ok(session)
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(ProtocolError::ConnectionFailed(
                "MQTT event loop terminated unexpectedly".to_string(),
            )),
            Err(_) => {
                abort.abort();
                Err(ProtocolError::Timeout(self.timeout_ms()))
            }
        }
    }

    async fn subscribe(&self, filters: &[TopicFilter]) -> Result<(), ProtocolError> {
        if filters.is_empty() {
            return Ok(());
        }
        let requests: Vec<SubscribeFilter> = filters
            .iter()
            .map(|f| SubscribeFilter::new(f.path().to_string(), qos(f.guarantee())))
            .collect();

        self.client
            .subscribe_many(requests)
            .await
            .map_err(ProtocolError::Mqtt)?;

        for filter in filters {
            tracing::debug!(
                filter = %filter.path(),
                guarantee = ?filter.guarantee(),
                "Subscribed"
            );
        }
        Ok(())
    }

    async fn unsubscribe(&self, filters: &[TopicFilter]) -> Result<(), ProtocolError> {
        for filter in filters {
            self.client
                .unsubscribe(filter.path())
                .await
                .map_err(ProtocolError::Mqtt)?;
            tracing::debug!(filter = %filter.path(), "Unsubscribed");
        }
        Ok(())
    }

    async fn receive(&self) -> Option<Delivery> {
        let mut state_rx = self.shared.consumer.subscribe();
        if *state_rx.borrow_and_update() != ConsumerState::Consuming {
            return None;
        }

        let mut inbound = self.inbound_rx.lock().await;
        let item = tokio::select! {
            item = inbound.recv() => item,
            () = wait_until_closed(&mut state_rx) => return None,
        };

        match item {
            Some(Inbound::Message(message)) => Some(Delivery::Message(message)),
            Some(Inbound::Resumed(session)) => Some(Delivery::Resumed(session)),
            Some(Inbound::LinkLost) => None,
            None => {
                self.shared.consumer.send_replace(ConsumerState::Closed);
                None
            }
        }
    }

    async fn acknowledge(&self, message: &InboundMessage) -> Result<(), ProtocolError> {
        let Some(pkid) = message.packet_id else {
            return Ok(());
        };
        let mut publish = Publish::new(message.topic.as_str(), QoS::AtLeastOnce, Vec::new());
        publish.pkid = pkid;

        self.client.ack(&publish).await.map_err(ProtocolError::Mqtt)?;
        tracing::trace!(topic = %message.topic, pkid, "Acknowledged message");
        Ok(())
    }

    async fn publish(&self, command: &OutboundCommand) -> Result<(), ProtocolError> {
        tracing::debug!(
            topic = %command.topic,
            device = %command.target_device,
            bytes = command.payload.len(),
            "Publishing downlink"
        );

        self.client
            .publish(
                command.topic.as_str(),
                qos(command.guarantee),
                false,
                command.payload.clone(),
            )
            .await
            .map_err(ProtocolError::Mqtt)
    }

    async fn close(&self) -> Result<(), ProtocolError> {
        self.stop_consuming();
        if self.shared.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let task = self.task.lock().take();
        let Some(mut task) = task else {
            return Ok(());
        };

        tracing::info!(host = %self.config.host, "Disconnecting from MQTT broker");

        if !self.is_connected() {
            task.abort();
            return Ok(());
        }

        let result = self
            .client
            .disconnect()
            .await
            .map_err(ProtocolError::Mqtt);

        if tokio::time::timeout(self.config.connection_timeout, &mut task)
            .await
            .is_err()
        {
            tracing::warn!("MQTT event loop did not stop in time, aborting");
            task.abort();
        }
        self.shared.connected.store(false, Ordering::Release);
        result
    }
}

/// Polls the rumqttc event loop until the transport is closed.
async fn run_event_loop(
    mut event_loop: EventLoop,
    shared: Arc<Shared>,
    policy: ReconnectPolicy,
    connack_tx: oneshot::Sender<Result<SessionInfo, ProtocolError>>,
) {
    let mut connack_tx = Some(connack_tx);
    let mut backoff = policy.backoff();

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                if connack.code != ConnectReturnCode::Success {
                    let reason = format!("{:?}", connack.code);
                    if let Some(tx) = connack_tx.take() {
                        let _ = tx.send(Err(ProtocolError::ConnectionRefused(reason)));
                        break;
                    }
                    tracing::warn!(code = %reason, "Broker refused reconnect");
                    continue;
                }

                let session = SessionInfo {
                    session_present: connack.session_present,
                };
                backoff.reset();
                shared.connected.store(true, Ordering::Release);

                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(Ok(session));
                } else {
                    tracing::info!(
                        session_present = session.session_present,
                        "Reconnected to MQTT broker"
                    );
                    shared.forward(Inbound::Resumed(session)).await;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::debug!(
                    topic = %publish.topic,
                    bytes = publish.payload.len(),
                    pkid = publish.pkid,
                    "MQTT message received"
                );
                shared.forward(Inbound::Message(inbound_message(&publish))).await;
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if shared.closing.load(Ordering::Acquire) {
                    break;
                }

                if let Some(tx) = connack_tx.take() {
                    let error = match e {
                        rumqttc::ConnectionError::ConnectionRefused(code) => {
                            ProtocolError::ConnectionRefused(format!("{code:?}"))
                        }
                        other => ProtocolError::ConnectionFailed(other.to_string()),
                    };
                    let _ = tx.send(Err(error));
                    break;
                }

                if shared.connected.swap(false, Ordering::AcqRel) {
                    tracing::warn!(error = %e, "MQTT link lost, reconnecting automatically");
                    shared.forward(Inbound::LinkLost).await;
                }

                let delay = backoff.next_delay();
                #[allow(clippy::cast_possible_truncation)]
                let delay_ms = delay.as_millis() as u64;
                tracing::debug!(error = %e, delay_ms, "Waiting before reconnect attempt");
                tokio::time::sleep(delay).await;
            }
        }
    }

    shared.connected.store(false, Ordering::Release);
}

/// Parses an MQTT URL into host and port.
///
/// Accepts `mqtt://host:port`, `tcp://host:port` and bare `host[:port]`;
/// the port defaults to 1883.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidAddress`] if the host is empty or the
/// port is not a number.
///
/// # Examples
///
/// ```
/// use ttn_bridge::protocol::parse_mqtt_url;
///
/// let (host, port) = parse_mqtt_url("tcp://eu1.cloud.thethings.network:1883").unwrap();
/// assert_eq!(host, "eu1.cloud.thethings.network");
/// assert_eq!(port, 1883);
/// ```
pub fn parse_mqtt_url(url: &str) -> Result<(String, u16), ProtocolError> {
    let url = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port) = if let Some((h, p)) = url.rsplit_once(':') {
        let port = p
            .parse()
            .map_err(|_| ProtocolError::InvalidAddress(format!("invalid port: {p}")))?;
        (h.to_string(), port)
    } else {
        (url.to_string(), DEFAULT_PORT)
    };

    if host.is_empty() {
        return Err(ProtocolError::InvalidAddress(
            "broker host is empty".to_string(),
        ));
    }

    Ok((host, port))
}

/// Builder for [`MqttTransport`].
#[derive(Debug)]
pub struct MqttTransportBuilder {
    broker: Option<String>,
    client_id: Option<String>,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    connection_timeout: Duration,
    clean_session: bool,
    reconnect: ReconnectPolicy,
    inbound_capacity: usize,
}

impl Default for MqttTransportBuilder {
    fn default() -> Self {
        Self {
            broker: None,
            client_id: None,
            credentials: None,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            clean_session: false,
            reconnect: ReconnectPolicy::default(),
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
        }
    }
}

impl MqttTransportBuilder {
    /// Sets the broker URL (e.g. `tcp://eu1.cloud.thethings.network:1883`).
    #[must_use]
    pub fn broker(mut self, broker: impl Into<String>) -> Self {
        self.broker = Some(broker.into());
        self
    }

    /// Sets the client id. It must stay stable across runs for a persistent
    /// session to be resumed.
    #[must_use]
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Sets the MQTT username and password.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = duration;
        self
    }

    /// Sets the connect timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.connection_timeout = duration;
        self
    }

    /// Requests a clean session instead of a persistent one (default: `false`).
    #[must_use]
    pub fn clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    /// Sets the automatic reconnect policy (default: 2s doubling to 30s).
    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Sets how many inbound messages may queue before the network side
    /// waits for the consumer (default: 64).
    #[must_use]
    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity;
        self
    }

    /// Builds the transport. No network activity happens until
    /// [`Transport::connect`].
    ///
    /// # Errors
    ///
    /// Returns error if the broker or client id is missing, the broker URL is
    /// invalid, or a duration or capacity is zero.
    pub fn build(self) -> crate::Result<MqttTransport> {
        let broker = self
            .broker
            .ok_or_else(|| ProtocolError::InvalidAddress("broker is required".to_string()))?;
        let (host, port) = parse_mqtt_url(&broker)?;

        let client_id = self
            .client_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(ValueError::Missing("client id"))?;

        if self.keep_alive < Duration::from_secs(1) {
            return Err(ValueError::ZeroDuration("keep-alive").into());
        }
        if self.connection_timeout.is_zero() {
            return Err(ValueError::ZeroDuration("connection timeout").into());
        }
        if self.inbound_capacity == 0 {
            return Err(ValueError::ZeroCapacity("inbound capacity").into());
        }

        let mut mqtt_options = MqttOptions::new(&client_id, &host, port);
        mqtt_options.set_keep_alive(self.keep_alive);
        mqtt_options.set_clean_session(self.clean_session);
        mqtt_options.set_manual_acks(true);
        if let Some((username, password)) = self.credentials {
            mqtt_options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.inbound_capacity);
        let (consumer, _) = watch::channel(ConsumerState::Idle);

        Ok(MqttTransport {
            client,
            event_loop: parking_lot::Mutex::new(Some(event_loop)),
            task: parking_lot::Mutex::new(None),
            inbound_rx: Mutex::new(inbound_rx),
            shared: Arc::new(Shared {
                inbound_tx,
                consumer,
                connected: AtomicBool::new(false),
                closing: AtomicBool::new(false),
            }),
            config: MqttTransportConfig {
                host,
                port,
                client_id,
                connection_timeout: self.connection_timeout,
                clean_session: self.clean_session,
                reconnect: self.reconnect,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> MqttTransport {
        MqttTransport::builder()
            .broker("mqtt://127.0.0.1:1883")
            .client_id("test-client")
            .build()
            .unwrap()
    }

    #[test]
    fn parse_mqtt_url_with_port() {
        let (host, port) = parse_mqtt_url("mqtt://192.168.1.50:1883").unwrap();
        assert_eq!(host, "192.168.1.50");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_default_port() {
        let (host, port) = parse_mqtt_url("eu1.cloud.thethings.network").unwrap();
        assert_eq!(host, "eu1.cloud.thethings.network");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_tcp_scheme() {
        let (host, port) = parse_mqtt_url("tcp://broker.local:8883").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 8883);
    }

    #[test]
    fn parse_mqtt_url_rejects_bad_port_and_empty_host() {
        assert!(matches!(
            parse_mqtt_url("tcp://broker:abc"),
            Err(ProtocolError::InvalidAddress(_))
        ));
        assert!(matches!(
            parse_mqtt_url("tcp://:1883"),
            Err(ProtocolError::InvalidAddress(_))
        ));
    }

    #[test]
    fn builder_defaults() {
        let builder = MqttTransportBuilder::default();
        assert!(!builder.clean_session);
        assert_eq!(builder.keep_alive, Duration::from_secs(30));
        assert_eq!(builder.connection_timeout, Duration::from_secs(10));
        assert_eq!(builder.inbound_capacity, DEFAULT_INBOUND_CAPACITY);
        assert_eq!(builder.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn build_requires_broker() {
        let result = MqttTransport::builder().client_id("id").build();
        assert!(matches!(
            result,
            Err(crate::Error::Protocol(ProtocolError::InvalidAddress(_)))
        ));
    }

    #[test]
    fn build_requires_client_id() {
        let result = MqttTransport::builder().broker("localhost").build();
        assert!(matches!(
            result,
            Err(crate::Error::Value(ValueError::Missing("client id")))
        ));

        let blank = MqttTransport::builder()
            .broker("localhost")
            .client_id("  ")
            .build();
        assert!(blank.is_err());
    }

    #[test]
    fn build_rejects_zero_capacity() {
        let result = MqttTransport::builder()
            .broker("localhost")
            .client_id("id")
            .inbound_capacity(0)
            .build();
        assert!(matches!(
            result,
            Err(crate::Error::Value(ValueError::ZeroCapacity(_)))
        ));
    }

    #[test]
    fn built_transport_reports_settings() {
        let transport = transport();
        assert_eq!(transport.host(), "127.0.0.1");
        assert_eq!(transport.port(), 1883);
        assert_eq!(transport.client_id(), "test-client");
        assert!(!transport.is_connected());
    }

    #[test]
    fn persistent_session_follows_clean_session() {
        assert!(transport().is_session_persistent());

        let clean = MqttTransport::builder()
            .broker("localhost")
            .client_id("id")
            .clean_session(true)
            .build()
            .unwrap();
        assert!(!clean.is_session_persistent());
    }

    #[test]
    fn at_least_once_publish_keeps_packet_id() {
        let mut publish = Publish::new("v3/app@ttn/devices/dev-1/up", QoS::AtLeastOnce, "{}");
        publish.pkid = 42;

        let message = inbound_message(&publish);
        assert_eq!(message.topic, "v3/app@ttn/devices/dev-1/up");
        assert_eq!(message.payload, b"{}");
        assert_eq!(message.packet_id, Some(42));
    }

    #[test]
    fn at_most_once_publish_owes_no_ack() {
        let publish = Publish::new("data", QoS::AtMostOnce, "hello");
        assert_eq!(inbound_message(&publish).packet_id, None);
    }

    #[tokio::test]
    async fn acknowledge_queues_puback_request() {
        let transport = transport();
        transport
            .acknowledge(&InboundMessage::new("data", "x"))
            .await
            .unwrap();
        transport
            .acknowledge(&InboundMessage::new("data", "x").with_packet_id(3))
            .await
            .unwrap();
    }

    #[test]
    fn consumer_lifecycle() {
        let transport = transport();
        assert!(transport.is_consumer_closed());

        transport.start_consuming();
        assert!(!transport.is_consumer_closed());

        transport.stop_consuming();
        assert!(transport.is_consumer_closed());

        // Closed is terminal.
        transport.start_consuming();
        assert!(transport.is_consumer_closed());
    }

    #[tokio::test]
    async fn receive_returns_none_when_not_consuming() {
        let transport = transport();
        assert_eq!(transport.receive().await, None);
    }

    #[tokio::test]
    async fn forwarded_items_are_delivered_in_order() {
        let transport = transport();
        transport.start_consuming();

        transport
            .shared
            .forward(Inbound::Message(InboundMessage::new("a", "1")))
            .await;
        transport.shared.forward(Inbound::LinkLost).await;
        transport
            .shared
            .forward(Inbound::Resumed(SessionInfo {
                session_present: true,
            }))
            .await;

        assert_eq!(
            transport.receive().await,
            Some(Delivery::Message(InboundMessage::new("a", "1")))
        );
        assert_eq!(transport.receive().await, None);
        assert!(!transport.is_consumer_closed());
        assert_eq!(
            transport.receive().await,
            Some(Delivery::Resumed(SessionInfo {
                session_present: true
            }))
        );
    }

    #[tokio::test]
    async fn items_before_arming_are_dropped() {
        let transport = transport();
        transport
            .shared
            .forward(Inbound::Message(InboundMessage::new("early", "x")))
            .await;

        transport.start_consuming();
        transport
            .shared
            .forward(Inbound::Message(InboundMessage::new("late", "y")))
            .await;

        assert_eq!(
            transport.receive().await,
            Some(Delivery::Message(InboundMessage::new("late", "y")))
        );
    }

    #[tokio::test]
    async fn stop_consuming_wakes_pending_receive() {
        let transport = Arc::new(transport());
        transport.start_consuming();

        let pending = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.receive().await })
        };
        tokio::task::yield_now().await;
        transport.stop_consuming();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("receive should wake up")
            .unwrap();
        assert_eq!(result, None);
        assert!(transport.is_consumer_closed());
    }

    #[tokio::test]
    async fn connect_after_close_is_refused() {
        let transport = transport();
        transport.close().await.unwrap();

        assert!(matches!(
            transport.connect().await,
            Err(ProtocolError::ConnectionFailed(_))
        ));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn close_without_connect_is_ok_and_idempotent() {
        let transport = transport();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(transport.is_consumer_closed());
    }
}
