// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pub/sub transport used by the bridge.
//!
//! The bridge talks to the broker only through the [`Transport`] trait, so the
//! consumption loop can be driven by the rumqttc-backed [`MqttTransport`] in
//! production and by a scripted double in tests.
//!
//! # Consumer model
//!
//! A transport owns one inbound queue with three states: idle, consuming and
//! closed. Messages that arrive while the consumer is not consuming are
//! dropped, so [`Transport::start_consuming`] must be called before
//! [`Transport::connect`] when a persistent session may redeliver a backlog
//! as soon as the connection completes.
//!
//! [`Transport::receive`] returns `None` in two situations, told apart by
//! [`Transport::is_consumer_closed`]:
//!
//! - the consumer is still open: the link was lost and the transport is
//!   reconnecting on its own;
//! - the consumer is closed: consumption has ended.
//!
//! # Acknowledgements
//!
//! At-least-once messages are acknowledged only when the consumer calls
//! [`Transport::acknowledge`] after processing them. Messages still queued or
//! dropped when the consumer closes stay unacknowledged, so a persistent
//! session redelivers them on the next connection.

#[cfg(feature = "mqtt")]
mod mqtt;
mod reconnect;
mod topics;

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttTransport, MqttTransportBuilder, parse_mqtt_url};
pub use reconnect::{Backoff, ReconnectPolicy};
pub use topics::{TopicFilter, TopicScheme};

use std::future::Future;

use crate::command::OutboundCommand;
use crate::error::ProtocolError;

/// Delivery guarantee requested from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeliveryGuarantee {
    /// Fire and forget (MQTT QoS 0).
    AtMostOnce,
    /// Acknowledged delivery, duplicates possible (MQTT QoS 1).
    #[default]
    AtLeastOnce,
}

/// Result of a successful connect handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    /// Whether the broker resumed a session stored from a previous connection.
    pub session_present: bool,
}

/// A message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// Packet id to acknowledge, set for at-least-once deliveries.
    pub packet_id: Option<u16>,
}

impl InboundMessage {
    /// Creates an inbound message that owes no acknowledgement.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            packet_id: None,
        }
    }

    /// Marks the message as an at-least-once delivery with `packet_id`.
    #[must_use]
    pub fn with_packet_id(mut self, packet_id: u16) -> Self {
        self.packet_id = Some(packet_id);
        self
    }

    /// Returns the payload as text, replacing invalid UTF-8.
    #[must_use]
    pub fn payload_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// One item pulled from the inbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// An application message.
    Message(InboundMessage),
    /// The link came back after an automatic reconnect.
    Resumed(SessionInfo),
}

/// A pub/sub client the bridge can consume from and publish through.
///
/// Connection options (credentials, persistent session, reconnect policy)
/// are fixed when the transport is built.
pub trait Transport: Send + Sync + 'static {
    /// Arms the inbound queue. Messages received from now on are kept.
    fn start_consuming(&self);

    /// Closes the inbound queue and wakes any pending [`receive`](Self::receive).
    ///
    /// Idempotent.
    fn stop_consuming(&self);

    /// Returns `true` unless the inbound queue is currently consuming.
    fn is_consumer_closed(&self) -> bool;

    /// Returns `true` if the broker keeps the session, and with it the
    /// subscriptions, after disconnect.
    fn is_session_persistent(&self) -> bool;

    /// Performs the connect handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the broker cannot be reached, refuses the
    /// connection, or does not answer in time.
    fn connect(&self) -> impl Future<Output = Result<SessionInfo, ProtocolError>> + Send;

    /// Subscribes to every filter in `filters`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the request cannot be issued.
    fn subscribe(
        &self,
        filters: &[TopicFilter],
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Releases every filter in `filters`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the request cannot be issued.
    fn unsubscribe(
        &self,
        filters: &[TopicFilter],
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Waits for the next inbound item.
    ///
    /// Returns `None` on link loss or once the consumer is closed; see the
    /// module documentation.
    fn receive(&self) -> impl Future<Output = Option<Delivery>> + Send;

    /// Acknowledges a processed message. No-op for messages without a
    /// packet id.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the acknowledgement cannot be queued.
    fn acknowledge(
        &self,
        message: &InboundMessage,
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Publishes a downlink command.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the request cannot be issued.
    fn publish(
        &self,
        command: &OutboundCommand,
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Disconnects from the broker. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the disconnect request fails.
    fn close(&self) -> impl Future<Output = Result<(), ProtocolError>> + Send;
}
