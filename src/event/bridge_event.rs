// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge event types.

use crate::state::DeviceStateView;

/// Events emitted by the message bridge.
///
/// Observers (the terminal UI, the log-mode runner) subscribe through the
/// [`EventBus`](super::EventBus) and re-render or log on each event.
///
/// # Examples
///
/// ```
/// use ttn_bridge::event::BridgeEvent;
/// use ttn_bridge::state::DeviceStateView;
///
/// let event = BridgeEvent::StateChanged(DeviceStateView::default());
/// assert!(event.is_state_change());
/// assert!(!BridgeEvent::LinkLost.is_state_change());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// The initial connection was established.
    Connected {
        /// Whether the broker resumed a stored session.
        session_present: bool,
    },

    /// Device state changed; carries the new snapshot.
    StateChanged(DeviceStateView),

    /// The link to the broker was lost. The transport reconnects on its own.
    LinkLost,

    /// The link came back after an automatic reconnect.
    Resumed {
        /// Whether the broker resumed a stored session.
        session_present: bool,
    },

    /// An uplink could not be decoded and was skipped.
    DecodeFailed {
        /// Topic the message arrived on.
        topic: String,
        /// Decoder diagnostic.
        error: String,
    },

    /// A downlink could not be handed to the transport and was dropped.
    PublishFailed {
        /// Topic the downlink was addressed to.
        topic: String,
        /// Transport diagnostic.
        error: String,
    },

    /// A message on a topic other than the device uplink.
    Raw {
        /// Topic the message arrived on.
        topic: String,
        /// Payload as text.
        payload: String,
    },

    /// The bridge has shut down.
    Closed,
}

impl BridgeEvent {
    /// Returns `true` if this is a state change event.
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        matches!(self, Self::StateChanged(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_snapshots_are_state_changes() {
        assert!(BridgeEvent::StateChanged(DeviceStateView::default()).is_state_change());
        assert!(!BridgeEvent::LinkLost.is_state_change());
        assert!(
            !BridgeEvent::PublishFailed {
                topic: "down".to_string(),
                error: "not connected".to_string(),
            }
            .is_state_change()
        );
    }
}
