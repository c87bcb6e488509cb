// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Downlink command encoding.
//!
//! [`CommandEncoder`] turns a user action into an [`OutboundCommand`]: the
//! target device, the downlink topic and a JSON payload in the shape The
//! Things Network expects on `down/push`:
//!
//! ```json
//! {"downlinks":[{"f_port":1,"decoded_payload":{"type":"led","app":"itp","led":1},"priority":"NORMAL"}]}
//! ```
//!
//! # Examples
//!
//! ```
//! use ttn_bridge::command::CommandEncoder;
//! use ttn_bridge::protocol::TopicScheme;
//!
//! let topics = TopicScheme::new("itp-project-1@ttn", "uno-0004a30b001c1b03").unwrap();
//! let encoder = CommandEncoder::new(topics);
//!
//! let cmd = encoder.encode_set_led(true);
//! assert_eq!(cmd.target_device, "uno-0004a30b001c1b03");
//! assert!(cmd.topic.ends_with("/down/push"));
//! ```

mod downlink;

pub use downlink::{DecodedCommand, Downlink, DownlinkEnvelope, Priority};

use crate::protocol::{DeliveryGuarantee, TopicScheme};

/// Default LoRaWAN port for application downlinks.
pub const DEFAULT_F_PORT: u8 = 1;

/// Default application tag the device firmware filters on.
pub const DEFAULT_APP_TAG: &str = "itp";

/// A downlink ready to be handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCommand {
    /// Device the command is addressed to.
    pub target_device: String,
    /// Topic to publish on.
    pub topic: String,
    /// Encoded payload.
    pub payload: Vec<u8>,
    /// Delivery guarantee for the publish.
    pub guarantee: DeliveryGuarantee,
}

/// Downlink settings used by [`CommandEncoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownlinkSettings {
    /// LoRaWAN application port.
    pub f_port: u8,
    /// Application tag.
    pub app: String,
    /// Scheduling priority.
    pub priority: Priority,
    /// Delivery guarantee for the publish.
    pub guarantee: DeliveryGuarantee,
    /// Publish on `down/replace` instead of `down/push`.
    pub replace_queue: bool,
}

impl Default for DownlinkSettings {
    fn default() -> Self {
        Self {
            f_port: DEFAULT_F_PORT,
            app: DEFAULT_APP_TAG.to_string(),
            priority: Priority::Normal,
            guarantee: DeliveryGuarantee::AtLeastOnce,
            replace_queue: false,
        }
    }
}

/// Builds downlink commands for one device. Pure: no network access.
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    topics: TopicScheme,
    settings: DownlinkSettings,
}

impl CommandEncoder {
    /// Creates an encoder with default downlink settings.
    #[must_use]
    pub fn new(topics: TopicScheme) -> Self {
        Self::with_settings(topics, DownlinkSettings::default())
    }

    /// Creates an encoder with explicit downlink settings.
    #[must_use]
    pub fn with_settings(topics: TopicScheme, settings: DownlinkSettings) -> Self {
        Self { topics, settings }
    }

    /// Returns the downlink settings.
    #[must_use]
    pub fn settings(&self) -> &DownlinkSettings {
        &self.settings
    }

    /// Encodes a "set LED" command.
    #[must_use]
    pub fn encode_set_led(&self, on: bool) -> OutboundCommand {
        let envelope = DownlinkEnvelope::single(Downlink {
            f_port: self.settings.f_port,
            decoded_payload: DecodedCommand::Led {
                app: self.settings.app.clone(),
                led: u8::from(on),
            },
            priority: self.settings.priority,
        });
        self.command(&envelope)
    }

    fn command(&self, envelope: &DownlinkEnvelope) -> OutboundCommand {
        let topic = if self.settings.replace_queue {
            self.topics.downlink_replace()
        } else {
            self.topics.downlink_push()
        };

        OutboundCommand {
            target_device: self.topics.device_id().to_string(),
            topic,
            // Serializing plain structs with string keys cannot fail.
            payload: serde_json::to_vec(envelope).unwrap_or_default(),
            guarantee: self.settings.guarantee,
        }
    }
}
