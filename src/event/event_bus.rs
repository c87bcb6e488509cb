// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fan-out of bridge events to observers.

use tokio::sync::broadcast;

use super::BridgeEvent;

/// Events buffered per observer before it starts lagging.
const OBSERVER_BACKLOG: usize = 256;

/// Broadcasts [`BridgeEvent`]s from the bridge and the control surface to
/// every observer.
///
/// Cloning yields another handle on the same channel. An observer that falls
/// more than the backlog behind receives `RecvError::Lagged` and skips ahead;
/// since every state event carries a full snapshot, nothing is lost by
/// lagging except intermediate states.
///
/// # Examples
///
/// ```
/// use ttn_bridge::event::{BridgeEvent, EventBus};
///
/// let bus = EventBus::new();
/// let mut ui = bus.subscribe();
/// let mut logger = bus.subscribe();
///
/// bus.publish(BridgeEvent::LinkLost);
/// assert_eq!(ui.try_recv().unwrap(), BridgeEvent::LinkLost);
/// assert_eq!(logger.try_recv().unwrap(), BridgeEvent::LinkLost);
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    /// Creates a bus with room for 256 pending events per observer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backlog(OBSERVER_BACKLOG)
    }

    /// Creates a bus with room for `backlog` pending events per observer
    /// (at least one).
    #[must_use]
    pub fn with_backlog(backlog: usize) -> Self {
        let (sender, _) = broadcast::channel(backlog.max(1));
        Self { sender }
    }

    /// Registers an observer. It sees every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    /// Returns how many observers are registered.
    #[must_use]
    pub fn observers(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Sends `event` to every observer. Never blocks.
    pub fn publish(&self, event: BridgeEvent) {
        if let Err(broadcast::error::SendError(event)) = self.sender.send(event) {
            tracing::trace!(?event, "No observers for bridge event");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
