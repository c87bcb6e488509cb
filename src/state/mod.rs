// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state tracking.
//!
//! [`DeviceState`] holds the latest temperature and LED values reported by
//! the remote device. It is shared by reference between the message bridge
//! (the only writer) and the control surface (a reader).
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use ttn_bridge::state::DeviceState;
//! use ttn_bridge::telemetry::TelemetryEvent;
//!
//! let state = Arc::new(DeviceState::new());
//!
//! let changed = state.apply_event(&TelemetryEvent::TemperatureReading { value: 21.5 });
//! assert!(changed);
//! assert_eq!(state.snapshot().last_temperature, Some(21.5));
//! ```

mod device_state;

pub use device_state::{DeviceState, DeviceStateView};
