// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Latest known device values.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::telemetry::TelemetryEvent;

/// Shared, latest-value state of the remote device.
///
/// The consumption loop is the only writer (through [`apply_event`]); the
/// control surface reads through [`snapshot`]. Each event is applied inside
/// one short write-locked section, so a snapshot never sees a temperature
/// without its matching timestamp.
///
/// No history is kept: each field holds only its latest value.
///
/// [`apply_event`]: DeviceState::apply_event
/// [`snapshot`]: DeviceState::snapshot
///
/// # Examples
///
/// ```
/// use ttn_bridge::state::DeviceState;
/// use ttn_bridge::telemetry::TelemetryEvent;
///
/// let state = DeviceState::new();
/// assert!(state.apply_event(&TelemetryEvent::LedStatus { on: true }));
/// assert!(!state.apply_event(&TelemetryEvent::LedStatus { on: true }));
///
/// assert!(state.snapshot().led_on);
/// ```
#[derive(Debug, Default)]
pub struct DeviceState {
    inner: RwLock<DeviceStateView>,
}

/// Read-only copy of [`DeviceState`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct DeviceStateView {
    /// Last reported temperature.
    pub last_temperature: Option<f64>,
    /// When the last temperature was received by the bridge.
    pub last_temperature_at: Option<DateTime<Utc>>,
    /// Last reported LED state. `false` until the device reports otherwise.
    pub led_on: bool,
}

impl DeviceState {
    /// Creates a state with every value unknown.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a decoded event, stamping readings with the current time.
    ///
    /// Returns `true` if the observable state changed.
    pub fn apply_event(&self, event: &TelemetryEvent) -> bool {
        self.apply_event_at(event, Utc::now())
    }

    /// Applies a decoded event, stamping readings with `received_at`.
    ///
    /// A temperature reading always counts as a change because its
    /// timestamp moves, even if the value repeats.
    pub fn apply_event_at(&self, event: &TelemetryEvent, received_at: DateTime<Utc>) -> bool {
        match event {
            TelemetryEvent::TemperatureReading { value } => {
                let mut state = self.inner.write();
                state.last_temperature = Some(*value);
                state.last_temperature_at = Some(received_at);
                true
            }
            TelemetryEvent::LedStatus { on } => {
                let mut state = self.inner.write();
                if state.led_on == *on {
                    false
                } else {
                    state.led_on = *on;
                    true
                }
            }
            TelemetryEvent::Unknown { .. } => false,
        }
    }

    /// Returns a consistent copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> DeviceStateView {
        *self.inner.read()
    }
}

impl DeviceStateView {
    /// Returns how long ago the last temperature was received.
    #[must_use]
    pub fn temperature_age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.last_temperature_at.map(|at| now - at)
    }

    /// Returns `true` if no temperature was received within `max_age`.
    #[must_use]
    pub fn is_temperature_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        self.temperature_age(now).is_none_or(|age| age > max_age)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn new_state_is_unknown() {
        let view = DeviceState::new().snapshot();
        assert_eq!(view.last_temperature, None);
        assert_eq!(view.last_temperature_at, None);
        assert!(!view.led_on);
    }

    #[test]
    fn temperature_updates_value_and_timestamp() {
        let state = DeviceState::new();
        assert!(state.apply_event_at(&TelemetryEvent::TemperatureReading { value: 20.0 }, at(0)));

        let view = state.snapshot();
        assert_eq!(view.last_temperature, Some(20.0));
        assert_eq!(view.last_temperature_at, Some(at(0)));
    }

    #[test]
    fn repeated_temperature_refreshes_timestamp() {
        let state = DeviceState::new();
        let reading = TelemetryEvent::TemperatureReading { value: 20.0 };
        state.apply_event_at(&reading, at(0));

        assert!(state.apply_event_at(&reading, at(60)));
        assert_eq!(state.snapshot().last_temperature_at, Some(at(60)));
    }

    #[test]
    fn same_led_status_twice_changes_once() {
        let state = DeviceState::new();
        let on = TelemetryEvent::LedStatus { on: true };

        assert!(state.apply_event(&on));
        assert!(!state.apply_event(&on));
        assert!(state.snapshot().led_on);
    }

    #[test]
    fn led_off_on_fresh_state_is_not_a_change() {
        let state = DeviceState::new();
        assert!(!state.apply_event(&TelemetryEvent::LedStatus { on: false }));
    }

    #[test]
    fn unknown_event_is_a_no_op() {
        let state = DeviceState::new();
        let before = state.snapshot();

        assert!(!state.apply_event(&TelemetryEvent::Unknown { raw: b"{}".to_vec() }));
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn ordered_sequence_keeps_latest_values() {
        let state = DeviceState::new();
        state.apply_event(&TelemetryEvent::TemperatureReading { value: 20.0 });
        state.apply_event(&TelemetryEvent::LedStatus { on: true });
        state.apply_event(&TelemetryEvent::TemperatureReading { value: 21.5 });

        let view = state.snapshot();
        assert_eq!(view.last_temperature, Some(21.5));
        assert!(view.led_on);
    }

    #[test]
    fn staleness() {
        let state = DeviceState::new();
        let max_age = chrono::Duration::seconds(300);
        assert!(state.snapshot().is_temperature_stale(at(0), max_age));

        state.apply_event_at(&TelemetryEvent::TemperatureReading { value: 1.0 }, at(0));
        let view = state.snapshot();
        assert!(!view.is_temperature_stale(at(300), max_age));
        assert!(view.is_temperature_stale(at(301), max_age));
        assert_eq!(view.temperature_age(at(90)), Some(chrono::Duration::seconds(90)));
    }

    #[test]
    fn snapshots_never_tear() {
        let state = Arc::new(DeviceState::new());

        let writer = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                for i in 0..2_000_i64 {
                    #[allow(clippy::cast_precision_loss)]
                    let value = i as f64;
                    state.apply_event_at(&TelemetryEvent::TemperatureReading { value }, at(i));
                }
            })
        };

        for _ in 0..2_000 {
            let view = state.snapshot();
            if let (Some(value), Some(ts)) = (view.last_temperature, view.last_temperature_at) {
                #[allow(clippy::cast_possible_truncation)]
                let expected = at(value as i64);
                assert_eq!(ts, expected);
            } else {
                assert_eq!(view.last_temperature, None);
                assert_eq!(view.last_temperature_at, None);
            }
        }

        writer.join().unwrap();
    }
}
