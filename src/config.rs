// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge configuration and credentials.
//!
//! # Examples
//!
//! ```
//! use ttn_bridge::config::{ApiKey, BridgeConfig};
//!
//! let config = BridgeConfig::builder()
//!     .device_id("uno-0004a30b001c1b03")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.server(), "tcp://eu1.cloud.thethings.network:1883");
//! assert_eq!(
//!     config.topics().uplink(),
//!     "v3/itp-project-1@ttn/devices/uno-0004a30b001c1b03/up"
//! );
//!
//! let key = ApiKey::new("NNSXS.ABCDEFGHIJKLMNOP");
//! assert_eq!(key.redacted(), "NNSXS.AB...");
//! ```

use std::time::Duration;

use crate::bridge::BridgeOptions;
use crate::command::{CommandEncoder, DEFAULT_APP_TAG, DEFAULT_F_PORT, DownlinkSettings, Priority};
use crate::error::{StartupError, ValueError};
use crate::protocol::{DeliveryGuarantee, ReconnectPolicy, TopicFilter, TopicScheme};

/// Default broker address.
pub const DEFAULT_SERVER: &str = "tcp://eu1.cloud.thethings.network:1883";

/// Default MQTT client id.
pub const DEFAULT_CLIENT_ID: &str = "itp-team-1b0123314213124123";

/// Default account namespace (also the MQTT username).
pub const DEFAULT_NAMESPACE: &str = "itp-project-1@ttn";

/// Default device id.
pub const DEFAULT_DEVICE_ID: &str = "uno-0004a30b001c1b03";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "TTN_API_KEY";

/// Number of API key characters that may appear in logs.
const REDACTED_PREFIX_LEN: usize = 8;

/// The Things Network API key, used as the MQTT password.
///
/// Neither `Debug` nor [`redacted`](Self::redacted) reveal more than the
/// first eight characters.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Reads the key from the environment variable `var`.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::MissingCredential`] if the variable is unset,
    /// empty or not valid Unicode.
    pub fn from_env(var: &str) -> Result<Self, StartupError> {
        Self::from_lookup(var, |name| std::env::var(name).ok())
    }

    fn from_lookup(
        var: &str,
        lookup: impl FnOnce(&str) -> Option<String>,
    ) -> Result<Self, StartupError> {
        match lookup(var) {
            Some(key) if !key.trim().is_empty() => Ok(Self(key)),
            _ => Err(StartupError::MissingCredential {
                var: var.to_string(),
            }),
        }
    }

    /// Returns the full secret. Never log this.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns the first eight characters followed by `...`.
    #[must_use]
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(REDACTED_PREFIX_LEN).collect();
        format!("{prefix}...")
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ApiKey").field(&self.redacted()).finish()
    }
}

/// Validated bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    server: String,
    client_id: String,
    topics: TopicScheme,
    keep_alive: Duration,
    connection_timeout: Duration,
    clean_session: bool,
    reconnect: ReconnectPolicy,
    inbound_capacity: usize,
    uplink_guarantee: DeliveryGuarantee,
    extra_filters: Vec<TopicFilter>,
    downlink: DownlinkSettings,
}

impl BridgeConfig {
    /// Creates a builder populated with the defaults.
    #[must_use]
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Returns the broker URL.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Returns the MQTT client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the MQTT username (the account namespace).
    #[must_use]
    pub fn username(&self) -> &str {
        self.topics.namespace()
    }

    /// Returns the topic scheme for the configured device.
    #[must_use]
    pub fn topics(&self) -> &TopicScheme {
        &self.topics
    }

    /// Returns the keep-alive interval.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Returns the connect timeout.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Returns whether a clean session is requested.
    #[must_use]
    pub fn clean_session(&self) -> bool {
        self.clean_session
    }

    /// Returns the automatic reconnect policy.
    #[must_use]
    pub fn reconnect(&self) -> ReconnectPolicy {
        self.reconnect
    }

    /// Returns the inbound queue capacity.
    #[must_use]
    pub fn inbound_capacity(&self) -> usize {
        self.inbound_capacity
    }

    /// Returns the downlink settings.
    #[must_use]
    pub fn downlink(&self) -> &DownlinkSettings {
        &self.downlink
    }

    /// Returns the subscription settings for the bridge.
    #[must_use]
    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            uplink_guarantee: self.uplink_guarantee,
            extra_filters: self.extra_filters.clone(),
        }
    }

    /// Returns a command encoder for the configured device.
    #[must_use]
    pub fn encoder(&self) -> CommandEncoder {
        CommandEncoder::with_settings(self.topics.clone(), self.downlink.clone())
    }

    /// Builds the rumqttc transport, authenticating with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns error if the server URL is invalid.
    #[cfg(feature = "mqtt")]
    pub fn transport(&self, api_key: &ApiKey) -> crate::Result<crate::protocol::MqttTransport> {
        crate::protocol::MqttTransport::builder()
            .broker(&self.server)
            .client_id(&self.client_id)
            .credentials(self.username(), api_key.expose())
            .keep_alive(self.keep_alive)
            .connection_timeout(self.connection_timeout)
            .clean_session(self.clean_session)
            .reconnect_policy(self.reconnect)
            .inbound_capacity(self.inbound_capacity)
            .build()
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug, Clone)]
pub struct BridgeConfigBuilder {
    server: String,
    client_id: String,
    namespace: String,
    device_id: String,
    keep_alive: Duration,
    connection_timeout: Duration,
    clean_session: bool,
    reconnect_initial: Duration,
    reconnect_max: Duration,
    inbound_capacity: usize,
    uplink_guarantee: DeliveryGuarantee,
    extra_filters: Vec<String>,
    extra_guarantee: DeliveryGuarantee,
    downlink: DownlinkSettings,
}

impl Default for BridgeConfigBuilder {
    fn default() -> Self {
        let reconnect = ReconnectPolicy::default();
        Self {
            server: DEFAULT_SERVER.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            clean_session: false,
            reconnect_initial: reconnect.initial_delay(),
            reconnect_max: reconnect.max_delay(),
            inbound_capacity: 64,
            uplink_guarantee: DeliveryGuarantee::AtLeastOnce,
            extra_filters: Vec::new(),
            extra_guarantee: DeliveryGuarantee::AtLeastOnce,
            downlink: DownlinkSettings {
                f_port: DEFAULT_F_PORT,
                app: DEFAULT_APP_TAG.to_string(),
                priority: Priority::Normal,
                guarantee: DeliveryGuarantee::AtLeastOnce,
                replace_queue: false,
            },
        }
    }
}

impl BridgeConfigBuilder {
    /// Sets the broker URL.
    #[must_use]
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Sets the MQTT client id.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Sets the account namespace (`<application>@<tenant>`).
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the device id.
    #[must_use]
    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    /// Sets the keep-alive interval.
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = duration;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.connection_timeout = duration;
        self
    }

    /// Requests a clean session instead of a persistent one.
    #[must_use]
    pub fn clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    /// Sets the reconnect delay bounds.
    #[must_use]
    pub fn reconnect(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_initial = initial;
        self.reconnect_max = max;
        self
    }

    /// Sets the inbound queue capacity.
    #[must_use]
    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity;
        self
    }

    /// Sets the delivery guarantee of the uplink subscription.
    #[must_use]
    pub fn uplink_guarantee(mut self, guarantee: DeliveryGuarantee) -> Self {
        self.uplink_guarantee = guarantee;
        self
    }

    /// Adds an extra subscription whose messages are echoed raw.
    #[must_use]
    pub fn extra_filter(mut self, filter: impl Into<String>) -> Self {
        self.extra_filters.push(filter.into());
        self
    }

    /// Sets the delivery guarantee of the extra subscriptions.
    #[must_use]
    pub fn extra_guarantee(mut self, guarantee: DeliveryGuarantee) -> Self {
        self.extra_guarantee = guarantee;
        self
    }

    /// Sets the downlink LoRaWAN port.
    #[must_use]
    pub fn downlink_port(mut self, f_port: u8) -> Self {
        self.downlink.f_port = f_port;
        self
    }

    /// Sets the application tag carried in downlinks.
    #[must_use]
    pub fn app_tag(mut self, app: impl Into<String>) -> Self {
        self.downlink.app = app.into();
        self
    }

    /// Sets the downlink priority.
    #[must_use]
    pub fn downlink_priority(mut self, priority: Priority) -> Self {
        self.downlink.priority = priority;
        self
    }

    /// Sets the downlink publish guarantee.
    #[must_use]
    pub fn downlink_guarantee(mut self, guarantee: DeliveryGuarantee) -> Self {
        self.downlink.guarantee = guarantee;
        self
    }

    /// Publishes downlinks on `down/replace` instead of `down/push`.
    #[must_use]
    pub fn replace_queue(mut self, replace: bool) -> Self {
        self.downlink.replace_queue = replace;
        self
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError`] if the namespace or device id is not a valid
    /// topic segment, the server or client id is empty, a duration or the
    /// inbound capacity is zero, the reconnect range is inverted, or an extra
    /// filter is empty.
    pub fn build(self) -> Result<BridgeConfig, ValueError> {
        if self.server.trim().is_empty() {
            return Err(ValueError::Missing("server"));
        }
        if self.client_id.trim().is_empty() {
            return Err(ValueError::Missing("client id"));
        }
        let topics = TopicScheme::new(self.namespace, self.device_id)?;
        if self.keep_alive < Duration::from_secs(1) {
            return Err(ValueError::ZeroDuration("keep-alive"));
        }
        if self.connection_timeout.is_zero() {
            return Err(ValueError::ZeroDuration("connection timeout"));
        }
        if self.inbound_capacity == 0 {
            return Err(ValueError::ZeroCapacity("inbound capacity"));
        }
        let reconnect = ReconnectPolicy::new(self.reconnect_initial, self.reconnect_max)?;
        let extra_filters = self
            .extra_filters
            .into_iter()
            .map(|path| TopicFilter::new(path, self.extra_guarantee))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BridgeConfig {
            server: self.server,
            client_id: self.client_id,
            topics,
            keep_alive: self.keep_alive,
            connection_timeout: self.connection_timeout,
            clean_session: self.clean_session,
            reconnect,
            inbound_capacity: self.inbound_capacity,
            uplink_guarantee: self.uplink_guarantee,
            extra_filters,
            downlink: self.downlink,
        })
    }
}
