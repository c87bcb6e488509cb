// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `ttn_bridge` - a telemetry bridge for one The Things Network device.
//!
//! The bridge consumes the device's uplinks from the TTN MQTT integration,
//! keeps the latest temperature and LED state, and publishes LED downlinks
//! on user request.
//!
//! # Components
//!
//! - [`telemetry`]: decodes an uplink into a [`TelemetryEvent`]
//! - [`state`]: [`DeviceState`], the latest values, safe to read while the
//!   bridge writes
//! - [`command`]: encodes downlinks into [`OutboundCommand`]s
//! - [`bridge`]: [`MessageBridge`], the connect/subscribe/consume state machine
//! - [`control`]: [`ControlSurface`], user commands and state observation
//! - [`protocol`]: the [`Transport`](protocol::Transport) abstraction, topic
//!   naming, reconnect policy and the rumqttc-backed transport
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ttn_bridge::config::{ApiKey, BridgeConfig, API_KEY_ENV};
//! use ttn_bridge::{ControlSurface, DeviceState, MessageBridge};
//!
//! #[tokio::main]
//! async fn main() -> ttn_bridge::Result<()> {
//!     let api_key = ApiKey::from_env(API_KEY_ENV)?;
//!     let config = BridgeConfig::builder().build()?;
//!
//!     let transport = Arc::new(config.transport(&api_key)?);
//!     let state = Arc::new(DeviceState::new());
//!     let bridge = MessageBridge::new(
//!         Arc::clone(&transport),
//!         Arc::clone(&state),
//!         config.topics(),
//!         config.bridge_options(),
//!     );
//!     let control = ControlSurface::new(
//!         transport,
//!         state,
//!         config.encoder(),
//!         bridge.events().clone(),
//!     );
//!
//!     bridge.start().await?;
//!
//!     // Switch the LED on; the publish runs in the background.
//!     control.set_led(true);
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     bridge.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `mqtt`: the rumqttc transport ([`protocol::MqttTransport`])
//! - `tui`: the ratatui dashboard ([`ui`])
//! - `cli`: the `ttn-bridge` binary

pub mod bridge;
pub mod command;
pub mod config;
pub mod control;
pub mod error;
pub mod event;
pub mod protocol;
pub mod state;
pub mod telemetry;
#[cfg(feature = "tui")]
pub mod ui;

#[cfg(test)]
mod testing;

pub use bridge::{BridgeOptions, BridgePhase, BridgeStats, MessageBridge};
pub use command::{CommandEncoder, OutboundCommand};
pub use control::ControlSurface;
pub use error::{
    DecodeError, Error, ProtocolError, PublishError, Result, StartupError, ValueError,
};
pub use event::{BridgeEvent, EventBus};
pub use state::{DeviceState, DeviceStateView};
pub use telemetry::{TelemetryEvent, decode};
