// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! User-initiated commands and state observation.
//!
//! Each command is encoded synchronously and then published on its own tokio
//! task, so a slow or failing publish never blocks the caller's render loop.
//! Repeated presses produce independent publishes; nothing is de-duplicated.
//! A failed publish is logged, reported as [`BridgeEvent::PublishFailed`]
//! and dropped.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::command::{CommandEncoder, OutboundCommand};
use crate::error::PublishError;
use crate::event::{BridgeEvent, EventBus};
use crate::protocol::Transport;
use crate::state::{DeviceState, DeviceStateView};

/// Handle returned for each dispatched command.
pub type PublishHandle = JoinHandle<Result<(), PublishError>>;

/// Issues downlink commands and exposes device state to a front end.
pub struct ControlSurface<T: Transport> {
    transport: Arc<T>,
    state: Arc<DeviceState>,
    encoder: CommandEncoder,
    events: EventBus,
}

impl<T: Transport> std::fmt::Debug for ControlSurface<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlSurface")
            .field("encoder", &self.encoder)
            .field("state", &self.state.snapshot())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ControlSurface<T> {
    /// Creates a control surface.
    ///
    /// `events` should be the bridge's bus so [`changes`](Self::changes)
    /// wakes on every state change.
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        state: Arc<DeviceState>,
        encoder: CommandEncoder,
        events: EventBus,
    ) -> Self {
        Self {
            transport,
            state,
            encoder,
            events,
        }
    }

    /// Returns the current device state.
    #[must_use]
    pub fn view(&self) -> DeviceStateView {
        self.state.snapshot()
    }

    /// Returns a receiver woken on every bridge event.
    #[must_use]
    pub fn changes(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Requests the LED to be switched on or off.
    ///
    /// Returns immediately; the publish runs on a background task. Must be
    /// called from within a tokio runtime.
    pub fn set_led(&self, on: bool) -> PublishHandle {
        tracing::info!(on, "LED command requested");
        self.dispatch(self.encoder.encode_set_led(on))
    }

    /// Requests the inverse of the last reported LED state.
    pub fn toggle_led(&self) -> PublishHandle {
        self.set_led(!self.state.snapshot().led_on)
    }

    fn dispatch(&self, command: OutboundCommand) -> PublishHandle {
        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        tokio::spawn(async move {
            match transport.publish(&command).await {
                Ok(()) => {
                    tracing::debug!(topic = %command.topic, "Downlink handed to transport");
                    Ok(())
                }
                Err(source) => {
                    let error = PublishError {
                        topic: command.topic,
                        source,
                    };
                    tracing::warn!(error = %error, "Downlink dropped");
                    events.publish(BridgeEvent::PublishFailed {
                        topic: error.topic.clone(),
                        error: error.source.to_string(),
                    });
                    Err(error)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::protocol::TopicScheme;
    use crate::telemetry::TelemetryEvent;
    use crate::testing::ScriptedTransport;

    fn surface(transport: &Arc<ScriptedTransport>) -> ControlSurface<ScriptedTransport> {
        let topics = TopicScheme::new("app@ttn", "dev-1").unwrap();
        ControlSurface::new(
            Arc::clone(transport),
            Arc::new(DeviceState::new()),
            CommandEncoder::new(topics),
            EventBus::new(),
        )
    }

    fn led_value(cmd: &OutboundCommand) -> u64 {
        let json: serde_json::Value = serde_json::from_slice(&cmd.payload).unwrap();
        json["downlinks"][0]["decoded_payload"]["led"]
            .as_u64()
            .unwrap()
    }

    #[tokio::test]
    async fn set_led_publishes_encoded_command() {
        let transport = Arc::new(ScriptedTransport::new(false, vec![]));
        let control = surface(&transport);

        control.set_led(true).await.unwrap().unwrap();

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "v3/app@ttn/devices/dev-1/down/push");
        assert_eq!(led_value(&published[0]), 1);
    }

    #[tokio::test]
    async fn toggle_inverts_last_known_state() {
        let transport = Arc::new(ScriptedTransport::new(false, vec![]));
        let control = surface(&transport);

        control.toggle_led().await.unwrap().unwrap();
        control
            .state
            .apply_event(&TelemetryEvent::LedStatus { on: true });
        control.toggle_led().await.unwrap().unwrap();

        let published = transport.published();
        assert_eq!(led_value(&published[0]), 1);
        assert_eq!(led_value(&published[1]), 0);
    }

    #[tokio::test]
    async fn publish_failure_is_reported_not_raised() {
        let transport = Arc::new(ScriptedTransport::new(false, vec![]));
        transport.set_fail_publish(true);
        let control = surface(&transport);

        let mut changes = control.changes();

        let error = control.set_led(false).await.unwrap().unwrap_err();

        assert_eq!(error.topic, "v3/app@ttn/devices/dev-1/down/push");
        assert_eq!(control.view(), DeviceStateView::default());
        assert_eq!(
            changes.recv().await.unwrap(),
            BridgeEvent::PublishFailed {
                topic: "v3/app@ttn/devices/dev-1/down/push".to_string(),
                error: "transport is not connected".to_string(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_does_not_block_caller() {
        let transport = Arc::new(
            ScriptedTransport::new(false, vec![]).with_publish_delay(Duration::from_secs(10)),
        );
        let control = surface(&transport);

        let first = control.set_led(true);
        let second = control.set_led(true);
        assert!(transport.published().is_empty());

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(transport.published().len(), 2);
    }

    #[tokio::test]
    async fn changes_follow_event_bus() {
        let transport = Arc::new(ScriptedTransport::new(false, vec![]));
        let control = surface(&transport);
        let mut changes = control.changes();

        control.events.publish(BridgeEvent::LinkLost);

        assert_eq!(changes.recv().await.unwrap(), BridgeEvent::LinkLost);
    }
}
