// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Uplink payload decoding.
//!
//! The remote device reports two kinds of application payload through the
//! network server's payload formatter, discriminated by `decoded_payload.type`:
//!
//! - `"temp"` with a numeric `value`
//! - `"ledstatus"` with `led` set to `0` or `1`
//!
//! Any other discriminant decodes to [`TelemetryEvent::Unknown`] so that new
//! payload types on the device side do not break the bridge.
//!
//! # Examples
//!
//! ```
//! use ttn_bridge::telemetry::{TelemetryEvent, decode};
//!
//! let payload = br#"{"uplink_message":{"decoded_payload":{"type":"temp","value":21.5}}}"#;
//!
//! match decode(payload).unwrap() {
//!     TelemetryEvent::TemperatureReading { value } => assert_eq!(value, 21.5),
//!     other => panic!("unexpected event {other:?}"),
//! }
//! ```

mod uplink;

pub use uplink::UplinkEnvelope;

use serde_json::{Map, Value};

use crate::error::DecodeError;

use uplink::{LedStatusFields, TemperatureFields};

/// Discriminant of a temperature reading.
pub const TYPE_TEMPERATURE: &str = "temp";

/// Discriminant of an LED status report.
pub const TYPE_LED_STATUS: &str = "ledstatus";

/// A typed event decoded from one uplink message.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    /// Temperature reported by the device.
    TemperatureReading {
        /// Temperature value as sent by the device.
        value: f64,
    },

    /// LED state reported by the device.
    LedStatus {
        /// Whether the LED is lit.
        on: bool,
    },

    /// A well-formed payload with a discriminant this bridge does not know.
    Unknown {
        /// The original payload bytes.
        raw: Vec<u8>,
    },
}

impl TelemetryEvent {
    /// Returns a short label for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TemperatureReading { .. } => "temperature",
            Self::LedStatus { .. } => "led_status",
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// Decodes a raw uplink envelope into a [`TelemetryEvent`].
///
/// This is a pure function of its input.
///
/// # Errors
///
/// - [`DecodeError::Json`] if the payload is not JSON.
/// - [`DecodeError::Malformed`] if the envelope has no decoded payload, the
///   `type` field is missing or not a string, or a known type lacks its
///   fields.
pub fn decode(raw: &[u8]) -> Result<TelemetryEvent, DecodeError> {
    let envelope: UplinkEnvelope = serde_json::from_slice(raw)?;
    let fields = envelope.decoded_payload()?;
    decode_fields(fields, raw)
}

/// Decodes the application payload once it has been extracted.
fn decode_fields(fields: &Map<String, Value>, raw: &[u8]) -> Result<TelemetryEvent, DecodeError> {
    let kind = match fields.get("type") {
        Some(Value::String(kind)) => kind.as_str(),
        Some(other) => {
            return Err(DecodeError::malformed(format!(
                "type must be a string, got {other}"
            )));
        }
        None => return Err(DecodeError::malformed("missing type")),
    };

    match kind {
        TYPE_TEMPERATURE => {
            let fields: TemperatureFields = variant_fields(fields, kind)?;
            Ok(TelemetryEvent::TemperatureReading {
                value: fields.value,
            })
        }
        TYPE_LED_STATUS => {
            let fields: LedStatusFields = variant_fields(fields, kind)?;
            Ok(TelemetryEvent::LedStatus {
                on: fields.is_on()?,
            })
        }
        _ => Ok(TelemetryEvent::Unknown { raw: raw.to_vec() }),
    }
}

fn variant_fields<T: serde::de::DeserializeOwned>(
    fields: &Map<String, Value>,
    kind: &str,
) -> Result<T, DecodeError> {
    serde_json::from_value(Value::Object(fields.clone()))
        .map_err(|e| DecodeError::malformed(format!("invalid {kind} payload: {e}")))
}
