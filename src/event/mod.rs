// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Notification path from the message bridge to its observers.
//!
//! The bridge publishes [`BridgeEvent`]s on an [`EventBus`] backed by tokio's
//! broadcast channel, so a UI running on another task wakes up as soon as
//! device state changes.
//!
//! # Examples
//!
//! ```
//! use ttn_bridge::event::{BridgeEvent, EventBus};
//!
//! let bus = EventBus::new();
//!
//! // Subscribe to events
//! let mut rx = bus.subscribe();
//!
//! // Publish an event
//! bus.publish(BridgeEvent::LinkLost);
//! ```

mod bridge_event;
mod event_bus;

pub use bridge_event::BridgeEvent;
pub use event_bus::EventBus;
