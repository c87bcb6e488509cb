// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Downlink envelope accepted by The Things Network on `down/push`.

use serde::{Deserialize, Serialize};

/// Scheduling priority of a downlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Lowest priority.
    Lowest,
    /// Low priority.
    Low,
    /// Below normal priority.
    BelowNormal,
    /// Normal priority.
    #[default]
    Normal,
    /// Above normal priority.
    AboveNormal,
    /// High priority.
    High,
    /// Highest priority.
    Highest,
}

/// Application command carried in `decoded_payload`.
///
/// The device firmware dispatches on `app` and `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DecodedCommand {
    /// Switch the LED (`led` is 1 for on, 0 for off).
    Led {
        /// Application tag.
        app: String,
        /// Target state as 0/1.
        led: u8,
    },
}

/// One queued downlink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downlink {
    /// LoRaWAN application port.
    pub f_port: u8,
    /// Command decoded by the device's payload formatter.
    pub decoded_payload: DecodedCommand,
    /// Scheduling priority.
    pub priority: Priority,
}

/// Top-level downlink message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownlinkEnvelope {
    /// Downlinks to queue, in order.
    pub downlinks: Vec<Downlink>,
}

impl DownlinkEnvelope {
    /// Wraps a single downlink.
    #[must_use]
    pub fn single(downlink: Downlink) -> Self {
        Self {
            downlinks: vec![downlink],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&Priority::BelowNormal).unwrap(),
            "\"BELOW_NORMAL\""
        );
        assert_eq!(serde_json::to_string(&Priority::Normal).unwrap(), "\"NORMAL\"");
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn envelope_matches_ttn_shape() {
        let envelope = DownlinkEnvelope::single(Downlink {
            f_port: 1,
            decoded_payload: DecodedCommand::Led {
                app: "itp".to_string(),
                led: 1,
            },
            priority: Priority::Normal,
        });

        let json: serde_json::Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "downlinks": [{
                    "f_port": 1,
                    "decoded_payload": {"type": "led", "app": "itp", "led": 1},
                    "priority": "NORMAL"
                }]
            })
        );
    }
}
