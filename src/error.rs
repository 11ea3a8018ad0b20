// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the door opener.
//!
//! The hierarchy follows the two halves of the system: actuator errors come
//! from the GPIO daemon behind the door controller, protocol and parse errors
//! come from the print monitor's HTTP and MQTT links.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// The GPIO daemon could not execute a request.
    #[error("actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    /// Error occurred during HTTP or MQTT communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while parsing a message.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A numeric value is outside the allowed range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Minimum allowed value.
        min: u32,
        /// Maximum allowed value.
        max: u32,
        /// The actual value that was provided.
        actual: u32,
    },
}

/// Errors raised while talking to the GPIO daemon.
///
/// None of these are fatal: the controller reports them to the caller and
/// keeps accepting input.
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// Every connection attempt failed.
    #[error("GPIO daemon unreachable after {attempts} attempt(s)")]
    Unreachable {
        /// Number of connection attempts made.
        attempts: u32,
    },

    /// The daemon socket failed mid-command.
    #[error("GPIO daemon I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The daemon answered with a negative status code.
    #[error("GPIO daemon rejected command {command} with status {status}")]
    Rejected {
        /// pigpio command number.
        command: u32,
        /// Negative pigpio error code.
        status: i32,
    },

    /// A command was issued without an established connection.
    #[error("GPIO daemon is not connected")]
    NotConnected,
}

/// Errors related to protocol communication (HTTP/MQTT).
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The peer answered with a non-success HTTP status.
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    /// MQTT request could not be queued.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// TLS configuration could not be built.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// Invalid URL or address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Errors related to parsing inbound messages.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting was not provided.
    #[error("missing required setting {0}")]
    Missing(String),

    /// A setting could not be parsed.
    #[error("invalid value {value:?} for {key}: {message}")]
    Invalid {
        /// Setting name.
        key: String,
        /// Raw value that was provided.
        value: String,
        /// Why the value was rejected.
        message: String,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
