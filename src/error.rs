// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the bridge.
//!
//! Errors are split by how they are handled:
//!
//! - [`StartupError`] is fatal: the process cannot run without credentials or
//!   an initial broker connection.
//! - [`DecodeError`] is recovered locally: the offending message is skipped.
//! - [`PublishError`] is recovered locally: the command is logged and dropped.
//! - [`ProtocolError`] is the transport-level cause wrapped by the others.
//!
//! Transient link loss is not an error. It is reported as
//! [`BridgeEvent::LinkLost`](crate::event::BridgeEvent::LinkLost) and handled
//! by the transport's reconnect policy.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred during protocol communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An inbound payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The bridge could not start.
    #[error("startup error: {0}")]
    Startup(#[from] StartupError),

    /// A downlink command could not be published.
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A topic segment is empty or contains MQTT special characters.
    #[error("invalid topic segment {0:?}: must be non-empty without '/', '+' or '#'")]
    InvalidTopicSegment(String),

    /// A topic filter is empty.
    #[error("topic filter must not be empty")]
    EmptyTopicFilter,

    /// A duration setting is zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// The maximum reconnect delay is below the initial delay.
    #[error("max reconnect delay ({max_ms} ms) is below initial delay ({initial_ms} ms)")]
    InvalidReconnectRange {
        /// Initial delay in milliseconds.
        initial_ms: u64,
        /// Maximum delay in milliseconds.
        max_ms: u64,
    },

    /// A capacity setting is zero.
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    /// A required field was not provided.
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Errors related to the MQTT transport.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// MQTT client request could not be queued.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The broker answered the connect request with a refusal.
    #[error("connection refused by broker: {0}")]
    ConnectionRefused(String),

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Invalid URL or address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The transport is not connected.
    #[error("transport is not connected")]
    NotConnected,
}

/// Errors produced while decoding an uplink payload.
///
/// Either way the message is skipped; the consumption loop keeps running.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is JSON but does not have the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl DecodeError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

/// Fatal errors raised before the bridge reaches its consuming state.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The required credential is not present in the environment.
    #[error("environment variable {var} is not set; it must hold the TTN API key")]
    MissingCredential {
        /// Name of the environment variable.
        var: String,
    },

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ValueError),

    /// The initial connection to the broker failed.
    #[error("could not connect to broker: {0}")]
    Connect(#[source] ProtocolError),

    /// The initial subscription could not be issued.
    #[error("could not subscribe: {0}")]
    Subscribe(#[source] ProtocolError),

    /// [`MessageBridge::start`](crate::bridge::MessageBridge::start) was
    /// called more than once.
    #[error("bridge was already started")]
    AlreadyStarted,

    /// Shutdown began before startup finished.
    #[error("bridge was shut down during startup")]
    Interrupted,
}

/// A downlink command could not be handed to the transport.
#[derive(Debug, Error)]
#[error("failed to publish to {topic}: {source}")]
pub struct PublishError {
    /// Topic the command was addressed to.
    pub topic: String,
    /// Underlying transport failure.
    #[source]
    pub source: ProtocolError,
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
