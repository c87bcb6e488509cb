// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Serde model of a The Things Network v3 uplink message.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Uplink envelope as published on `v3/<namespace>/devices/<device>/up`.
///
/// Only the fields the bridge uses are modelled; everything else the
/// network server adds (gateway metadata, session keys, ...) is ignored.
///
/// # Examples
///
/// ```
/// use ttn_bridge::telemetry::UplinkEnvelope;
///
/// let json = r#"{
///     "end_device_ids": {"device_id": "uno-1"},
///     "uplink_message": {"f_port": 1, "decoded_payload": {"type": "temp", "value": 21.5}}
/// }"#;
/// let envelope: UplinkEnvelope = serde_json::from_str(json).unwrap();
///
/// assert_eq!(envelope.device_id(), Some("uno-1"));
/// assert_eq!(envelope.f_port(), Some(1));
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UplinkEnvelope {
    /// Identifiers of the device that sent the uplink.
    #[serde(default)]
    end_device_ids: Option<EndDeviceIds>,

    /// The uplink itself.
    #[serde(default)]
    uplink_message: Option<UplinkMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EndDeviceIds {
    #[serde(default)]
    device_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct UplinkMessage {
    #[serde(default)]
    f_port: Option<u8>,

    /// Output of the application's payload formatter.
    #[serde(default)]
    decoded_payload: Option<Map<String, Value>>,
}

impl UplinkEnvelope {
    /// Returns the device id reported by the network server.
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        self.end_device_ids.as_ref()?.device_id.as_deref()
    }

    /// Returns the LoRaWAN application port.
    #[must_use]
    pub fn f_port(&self) -> Option<u8> {
        self.uplink_message.as_ref()?.f_port
    }

    /// Returns the decoded application payload.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] if the envelope has no
    /// `uplink_message.decoded_payload` object.
    pub fn decoded_payload(&self) -> Result<&Map<String, Value>, DecodeError> {
        let message = self
            .uplink_message
            .as_ref()
            .ok_or_else(|| DecodeError::malformed("missing uplink_message"))?;
        message
            .decoded_payload
            .as_ref()
            .ok_or_else(|| DecodeError::malformed("missing uplink_message.decoded_payload"))
    }
}

/// Fields of a `"temp"` payload.
#[derive(Debug, Deserialize)]
pub(crate) struct TemperatureFields {
    pub value: f64,
}

/// Fields of a `"ledstatus"` payload.
#[derive(Debug, Deserialize)]
pub(crate) struct LedStatusFields {
    pub led: Value,
}

impl LedStatusFields {
    /// Interprets `led` as `0|1`, also accepting JSON booleans.
    pub(crate) fn is_on(&self) -> Result<bool, DecodeError> {
        match &self.led {
            Value::Bool(on) => Ok(*on),
            Value::Number(n) => match n.as_u64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(DecodeError::malformed(format!("led must be 0 or 1, got {n}"))),
            },
            other => Err(DecodeError::malformed(format!(
                "led must be 0 or 1, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_ignores_unknown_fields() {
        let json = r#"{
            "end_device_ids": {"device_id": "uno-1", "application_ids": {"application_id": "app"}},
            "received_at": "2024-05-01T10:00:00Z",
            "uplink_message": {"f_port": 2, "frm_payload": "AQ==", "decoded_payload": {"type": "temp"}}
        }"#;
        let envelope: UplinkEnvelope = serde_json::from_str(json).unwrap();

        assert_eq!(envelope.device_id(), Some("uno-1"));
        assert_eq!(envelope.f_port(), Some(2));
        assert!(envelope.decoded_payload().is_ok());
    }

    #[test]
    fn missing_uplink_message_is_malformed() {
        let envelope: UplinkEnvelope = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            envelope.decoded_payload(),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn missing_decoded_payload_is_malformed() {
        let envelope: UplinkEnvelope =
            serde_json::from_str(r#"{"uplink_message": {"f_port": 1}}"#).unwrap();
        let err = envelope.decoded_payload().unwrap_err();
        assert!(err.to_string().contains("decoded_payload"));
    }

    #[test]
    fn led_flag_accepts_integers_and_booleans() {
        let on = LedStatusFields {
            led: serde_json::json!(1),
        };
        let off = LedStatusFields {
            led: serde_json::json!(false),
        };
        assert!(on.is_on().unwrap());
        assert!(!off.is_on().unwrap());
    }

    #[test]
    fn led_flag_rejects_other_values() {
        for led in [serde_json::json!(2), serde_json::json!("on"), serde_json::json!(-1)] {
            let fields = LedStatusFields { led };
            assert!(matches!(fields.is_on(), Err(DecodeError::Malformed(_))));
        }
    }
}
