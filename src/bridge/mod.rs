// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The message bridge: connects, subscribes and runs the consumption loop.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> SubscribingIfNeeded -> Consuming -> Draining -> Closed
//!                                                        |   ^
//!                                             link lost  v   | message / resumed
//!                                                   ReconnectPending
//! ```
//!
//! [`MessageBridge::start`] arms the transport's consumer before connecting,
//! because a persistent session may redeliver a backlog as soon as the
//! handshake completes. Subscriptions are issued only when the broker did not
//! resume a stored session.
//!
//! The consumption loop runs on its own task and processes one message at a
//! time: decode, apply to [`DeviceState`], notify observers, then pull the
//! next one. Malformed uplinks are skipped. Link loss is reported and the loop
//! keeps waiting while the transport reconnects.
//!
//! Each message is acknowledged only after it has been applied, so anything
//! still queued when the consumer closes is redelivered by a persistent
//! session.
//!
//! [`MessageBridge::shutdown`] stops the consumer, waits for the loop to
//! finish the message in hand and disconnects. Subscriptions are released
//! only for clean sessions; a persistent session keeps them for the next run.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use ttn_bridge::bridge::{BridgeOptions, MessageBridge};
//! use ttn_bridge::protocol::{MqttTransport, TopicScheme};
//! use ttn_bridge::state::DeviceState;
//!
//! # async fn example() -> ttn_bridge::Result<()> {
//! let transport = Arc::new(
//!     MqttTransport::builder()
//!         .broker("tcp://eu1.cloud.thethings.network:1883")
//!         .client_id("my-bridge")
//!         .credentials("my-app@ttn", "NNSXS.XXXXXXXX")
//!         .build()?,
//! );
//! let topics = TopicScheme::new("my-app@ttn", "my-device")?;
//! let state = Arc::new(DeviceState::new());
//!
//! let bridge = MessageBridge::new(transport, Arc::clone(&state), &topics, BridgeOptions::default());
//! let mut events = bridge.subscribe();
//! bridge.start().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! bridge.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod stats;

pub use stats::BridgeStats;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::error::{ProtocolError, StartupError};
use crate::event::{BridgeEvent, EventBus};
use crate::protocol::{
    Delivery, DeliveryGuarantee, InboundMessage, SessionInfo, TopicFilter, TopicScheme, Transport,
};
use crate::state::DeviceState;
use crate::telemetry::{self, TelemetryEvent};

use stats::StatsCounters;

/// Lifecycle phase of a [`MessageBridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgePhase {
    /// Not started.
    Disconnected,
    /// Connect handshake in progress.
    Connecting,
    /// Connected; subscribing unless the session was resumed.
    SubscribingIfNeeded,
    /// Consumption loop running.
    Consuming,
    /// Link lost; the transport is reconnecting.
    ReconnectPending,
    /// Shutdown in progress.
    Draining,
    /// Shut down.
    Closed,
}

impl BridgePhase {
    /// Returns a short label for display.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::SubscribingIfNeeded => "subscribing",
            Self::Consuming => "online",
            Self::ReconnectPending => "reconnecting",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for BridgePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription settings for a [`MessageBridge`].
#[derive(Debug, Clone, Default)]
pub struct BridgeOptions {
    /// Delivery guarantee for the device uplink subscription.
    pub uplink_guarantee: DeliveryGuarantee,
    /// Additional topic filters; their messages are echoed as
    /// [`BridgeEvent::Raw`].
    pub extra_filters: Vec<TopicFilter>,
}

/// State shared between the bridge handle and its consumption task.
struct Shared<T> {
    transport: Arc<T>,
    state: Arc<DeviceState>,
    events: EventBus,
    uplink_topic: String,
    filters: Vec<TopicFilter>,
    phase: watch::Sender<BridgePhase>,
    stats: StatsCounters,
}

/// Consumes device uplinks from a [`Transport`] into a [`DeviceState`].
pub struct MessageBridge<T: Transport> {
    shared: Arc<Shared<T>>,
    consume_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    shutdown_started: AtomicBool,
}

impl<T: Transport> std::fmt::Debug for MessageBridge<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBridge")
            .field("uplink_topic", &self.shared.uplink_topic)
            .field("phase", &self.phase())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> MessageBridge<T> {
    /// Creates a bridge for the device named by `topics`.
    ///
    /// The subscription set is the device uplink topic followed by
    /// `options.extra_filters`.
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        state: Arc<DeviceState>,
        topics: &TopicScheme,
        options: BridgeOptions,
    ) -> Self {
        let uplink_topic = topics.uplink();
        let mut filters = Vec::with_capacity(options.extra_filters.len() + 1);
        // Topic segments were validated by TopicScheme, so the path is non-empty.
        if let Ok(uplink) = TopicFilter::new(uplink_topic.clone(), options.uplink_guarantee) {
            filters.push(uplink);
        }
        for filter in options.extra_filters {
            if !filters.iter().any(|f| f.path() == filter.path()) {
                filters.push(filter);
            }
        }

        let (phase, _) = watch::channel(BridgePhase::Disconnected);

        Self {
            shared: Arc::new(Shared {
                transport,
                state,
                events: EventBus::new(),
                uplink_topic,
                filters,
                phase,
                stats: StatsCounters::default(),
            }),
            consume_task: parking_lot::Mutex::new(None),
            started: AtomicBool::new(false),
            shutdown_started: AtomicBool::new(false),
        }
    }

    /// Returns the current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> BridgePhase {
        *self.shared.phase.borrow()
    }

    /// Returns a receiver that follows phase changes.
    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<BridgePhase> {
        self.shared.phase.subscribe()
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        self.shared.stats.snapshot()
    }

    /// Returns the event bus observers subscribe to.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    /// Subscribes to bridge events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.shared.events.subscribe()
    }

    /// Returns the subscription set.
    #[must_use]
    pub fn filters(&self) -> &[TopicFilter] {
        &self.shared.filters
    }

    /// Returns the device state the bridge writes to.
    #[must_use]
    pub fn state(&self) -> &Arc<DeviceState> {
        &self.shared.state
    }

    /// Connects, subscribes if needed and starts the consumption loop.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`StartupError::Connect`] if the initial connection fails.
    /// - [`StartupError::Subscribe`] if the subscriptions cannot be issued.
    /// - [`StartupError::AlreadyStarted`] on a second call.
    /// - [`StartupError::Interrupted`] if [`shutdown`](Self::shutdown) began
    ///   before startup finished.
    pub async fn start(&self) -> Result<SessionInfo, StartupError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(StartupError::AlreadyStarted);
        }
        let shared = &self.shared;

        shared.transition(BridgePhase::Disconnected, BridgePhase::Connecting);
        // Armed before connecting: a resumed session may redeliver a backlog
        // as soon as the handshake completes.
        shared.transport.start_consuming();

        let connected = shared.transport.connect().await;
        if self.is_shutting_down() {
            return Err(StartupError::Interrupted);
        }
        let session = match connected {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "Initial connection failed");
                shared.transport.stop_consuming();
                shared.transition(BridgePhase::Connecting, BridgePhase::Disconnected);
                return Err(StartupError::Connect(e));
            }
        };
        shared.events.publish(BridgeEvent::Connected {
            session_present: session.session_present,
        });

        shared.transition(BridgePhase::Connecting, BridgePhase::SubscribingIfNeeded);
        if let Err(e) = shared.subscribe_if_needed(session).await {
            if self.is_shutting_down() {
                return Err(StartupError::Interrupted);
            }
            tracing::error!(error = %e, "Initial subscription failed");
            shared.transport.stop_consuming();
            if let Err(close_err) = shared.transport.close().await {
                tracing::debug!(error = %close_err, "Close after failed subscribe");
            }
            shared.set_phase(BridgePhase::Closed);
            return Err(StartupError::Subscribe(e));
        }

        {
            // Checked under the task lock so shutdown either sees the task or
            // start sees the shutdown.
            let mut task = self.consume_task.lock();
            if self.is_shutting_down() {
                return Err(StartupError::Interrupted);
            }
            shared.transition(BridgePhase::SubscribingIfNeeded, BridgePhase::Consuming);
            *task = Some(tokio::spawn(Arc::clone(shared).consume()));
        }

        tracing::info!(
            topic = %shared.uplink_topic,
            session_present = session.session_present,
            "Bridge started"
        );
        Ok(session)
    }

    /// Stops consumption and disconnects.
    ///
    /// Runs, in order: stop the consumer, wait for the loop to finish the
    /// message in hand, unsubscribe (clean sessions only), disconnect. Every
    /// step runs even if an earlier one fails; the first failure is returned.
    /// A second call waits for the first to finish and returns `Ok(())`.
    ///
    /// A `start` still in progress returns [`StartupError::Interrupted`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if unsubscribing or disconnecting fails.
    pub async fn shutdown(&self) -> Result<(), ProtocolError> {
        if self.shutdown_started.swap(true, Ordering::AcqRel) {
            let mut phase = self.shared.phase.subscribe();
            while *phase.borrow_and_update() != BridgePhase::Closed {
                if phase.changed().await.is_err() {
                    break;
                }
            }
            return Ok(());
        }

        let shared = &self.shared;
        tracing::info!("Shutting down bridge");
        shared.set_phase(BridgePhase::Draining);
        shared.transport.stop_consuming();

        let task = self.consume_task.lock().take();
        let was_running = task.is_some();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Consumption task ended abnormally");
        }

        let mut first_error = None;
        if was_running && shared.transport.is_session_persistent() {
            tracing::debug!("Keeping subscriptions in the persistent session");
        } else if was_running
            && let Err(e) = shared.transport.unsubscribe(&shared.filters).await
        {
            tracing::warn!(error = %e, "Failed to release subscriptions");
            first_error.get_or_insert(e);
        }
        if let Err(e) = shared.transport.close().await {
            tracing::warn!(error = %e, "Failed to disconnect");
            first_error.get_or_insert(e);
        }

        shared.set_phase(BridgePhase::Closed);
        shared.events.publish(BridgeEvent::Closed);
        tracing::info!(stats = ?shared.stats.snapshot(), "Bridge closed");

        first_error.map_or(Ok(()), Err)
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown_started.load(Ordering::Acquire)
    }
}

impl<T: Transport> Shared<T> {
    fn set_phase(&self, phase: BridgePhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            tracing::debug!(from = %previous, to = %phase, "Bridge phase changed");
        }
    }

    /// Moves from `from` to `to`, leaving any other phase (a shutdown in
    /// progress in particular) untouched.
    fn transition(&self, from: BridgePhase, to: BridgePhase) {
        self.phase.send_if_modified(|phase| {
            if *phase == from {
                *phase = to;
                true
            } else {
                false
            }
        });
    }

    async fn subscribe_if_needed(&self, session: SessionInfo) -> Result<(), ProtocolError> {
        if session.session_present {
            tracing::info!("Session resumed, subscriptions still active");
            return Ok(());
        }
        self.transport.subscribe(&self.filters).await?;
        tracing::info!(count = self.filters.len(), "Subscribed");
        Ok(())
    }

    async fn consume(self: Arc<Self>) {
        loop {
            match self.transport.receive().await {
                Some(Delivery::Message(message)) => {
                    self.handle_message(&message);
                    if let Err(e) = self.transport.acknowledge(&message).await {
                        tracing::warn!(topic = %message.topic, error = %e, "Failed to acknowledge message");
                    }
                }
                Some(Delivery::Resumed(session)) => self.handle_resumed(session).await,
                None if self.transport.is_consumer_closed() => break,
                None => self.handle_link_lost(),
            }
        }
        tracing::debug!("Consumption loop finished");
    }

    fn handle_message(&self, message: &InboundMessage) {
        self.stats.received();
        self.transition(BridgePhase::ReconnectPending, BridgePhase::Consuming);

        if message.topic != self.uplink_topic {
            self.stats.raw();
            let payload = message.payload_lossy().into_owned();
            tracing::debug!(topic = %message.topic, payload = %payload, "Raw message");
            self.events.publish(BridgeEvent::Raw {
                topic: message.topic.clone(),
                payload,
            });
            return;
        }

        let event = match telemetry::decode(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                self.stats.decode_error();
                tracing::warn!(topic = %message.topic, error = %e, "Skipping undecodable uplink");
                self.events.publish(BridgeEvent::DecodeFailed {
                    topic: message.topic.clone(),
                    error: e.to_string(),
                });
                return;
            }
        };

        if let TelemetryEvent::Unknown { .. } = event {
            tracing::debug!(topic = %message.topic, "Ignoring uplink with unknown type");
        }

        if self.state.apply_event(&event) {
            self.stats.applied();
            let view = self.state.snapshot();
            tracing::debug!(kind = event.kind(), state = ?view, "Device state changed");
            self.events.publish(BridgeEvent::StateChanged(view));
        } else {
            self.stats.ignored();
            tracing::trace!(kind = event.kind(), "Uplink left state unchanged");
        }
    }

    async fn handle_resumed(&self, session: SessionInfo) {
        self.transition(BridgePhase::ReconnectPending, BridgePhase::Consuming);
        tracing::info!(session_present = session.session_present, "Link resumed");
        self.events.publish(BridgeEvent::Resumed {
            session_present: session.session_present,
        });

        if let Err(e) = self.subscribe_if_needed(session).await {
            tracing::warn!(error = %e, "Resubscribe after reconnect failed");
        }
    }

    fn handle_link_lost(&self) {
        self.stats.link_lost();
        self.transition(BridgePhase::Consuming, BridgePhase::ReconnectPending);
        tracing::warn!("Link to broker lost, waiting for automatic reconnect");
        self.events.publish(BridgeEvent::LinkLost);
    }
}
