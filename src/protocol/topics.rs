// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic naming for The Things Network v3 MQTT integration.
//!
//! Topics are derived from the account namespace (`<application>@<tenant>`,
//! which is also the MQTT username) and the device id:
//!
//! ```text
//! v3/<namespace>/devices/<device>/up            uplinks
//! v3/<namespace>/devices/<device>/down/push     downlinks appended to the queue
//! v3/<namespace>/devices/<device>/down/replace  downlinks replacing the queue
//! ```

use crate::error::ValueError;

use super::DeliveryGuarantee;

/// Topic derivation for one device.
///
/// # Examples
///
/// ```
/// use ttn_bridge::protocol::TopicScheme;
///
/// let topics = TopicScheme::new("itp-project-1@ttn", "uno-0004a30b001c1b03").unwrap();
/// assert_eq!(
///     topics.uplink(),
///     "v3/itp-project-1@ttn/devices/uno-0004a30b001c1b03/up"
/// );
/// assert_eq!(
///     topics.downlink_push(),
///     "v3/itp-project-1@ttn/devices/uno-0004a30b001c1b03/down/push"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    namespace: String,
    device_id: String,
}

impl TopicScheme {
    /// Creates a topic scheme for `device_id` within `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidTopicSegment`] if either part is empty or
    /// contains `/`, `+` or `#`.
    pub fn new(namespace: impl Into<String>, device_id: impl Into<String>) -> Result<Self, ValueError> {
        let namespace = validate_segment(namespace.into())?;
        let device_id = validate_segment(device_id.into())?;
        Ok(Self {
            namespace,
            device_id,
        })
    }

    /// Returns the account namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the device id.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    fn device_prefix(&self) -> String {
        format!("v3/{}/devices/{}", self.namespace, self.device_id)
    }

    /// Topic the device's uplinks are published on.
    #[must_use]
    pub fn uplink(&self) -> String {
        format!("{}/up", self.device_prefix())
    }

    /// Topic that appends a downlink to the device's queue.
    #[must_use]
    pub fn downlink_push(&self) -> String {
        format!("{}/down/push", self.device_prefix())
    }

    /// Topic that replaces the device's downlink queue.
    #[must_use]
    pub fn downlink_replace(&self) -> String {
        format!("{}/down/replace", self.device_prefix())
    }
}

fn validate_segment(segment: String) -> Result<String, ValueError> {
    if segment.is_empty() || segment.contains(['/', '+', '#']) {
        Err(ValueError::InvalidTopicSegment(segment))
    } else {
        Ok(segment)
    }
}

/// One subscription: a topic filter at a delivery guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    path: String,
    guarantee: DeliveryGuarantee,
}

impl TopicFilter {
    /// Creates a topic filter. Wildcards (`+`, `#`) are allowed.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::EmptyTopicFilter`] if `path` is empty.
    pub fn new(path: impl Into<String>, guarantee: DeliveryGuarantee) -> Result<Self, ValueError> {
        let path = path.into();
        if path.is_empty() {
            return Err(ValueError::EmptyTopicFilter);
        }
        Ok(Self { path, guarantee })
    }

    /// Returns the filter string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the requested delivery guarantee.
    #[must_use]
    pub fn guarantee(&self) -> DeliveryGuarantee {
        self.guarantee
    }
}
