// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process configuration.
//!
//! Both binaries are configured from environment variables. Loading goes
//! through [`ControllerConfig::from_lookup`] / [`MonitorConfig::from_lookup`]
//! so tests can supply variables without touching the process environment.
//!
//! Door controller:
//!
//! | Variable | Default |
//! |---|---|
//! | `PIGPIO_ADDR` | `localhost` |
//! | `PIGPIO_PORT` | `8888` |
//! | `DOOR_LISTEN_ADDR` | `0.0.0.0:3000` |
//! | `DOOR_GPIO_BACKEND` | `pigpio` (or `simulated`) |
//! | `PIGPIO_CONNECT_TIMEOUT_MS` | `2000` |
//!
//! Print monitor:
//!
//! | Variable | Default |
//! |---|---|
//! | `BAMBU_HOST` | required |
//! | `BAMBU_PORT` | `8883` |
//! | `BAMBU_SERIAL` | required |
//! | `BAMBU_ACCESS_CODE` | required |
//! | `BAMBU_USERNAME` | `bblp` |
//! | `BAMBU_CA_CERT` | unset (accept the printer's self-signed certificate) |
//! | `DOOR_URL` | `http://localhost:3000` |
//! | `DOOR_OPEN_TEMP` | `45` |
//! | `MONITOR_LISTEN_ADDR` | `0.0.0.0:5000` |

use std::fmt::Display;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::actuator::{RetryPolicy, ServoPositions};
use crate::error::ConfigError;
use crate::gpio::{Edge, InputPin, Pull};
use crate::monitor::ReconnectBackoff;

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key: key.to_string(),
                value: raw.clone(),
                message: e.to_string(),
            })
        })
        .transpose()
}

/// Which GPIO backend the door controller drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// The pigpio daemon.
    #[default]
    Pigpio,
    /// The in-memory simulator.
    Simulated,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pigpio" => Ok(Self::Pigpio),
            "simulated" | "sim" => Ok(Self::Simulated),
            other => Err(format!("unknown backend {other:?}, expected pigpio or simulated")),
        }
    }
}

/// Door controller settings.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use door_opener::config::ControllerConfig;
///
/// let config = ControllerConfig::default()
///     .with_pigpio("192.168.1.20", 8888)
///     .with_debounce(Duration::from_millis(200));
/// assert_eq!(config.servo_pin, 18);
/// assert_eq!(config.pigpio_host, "192.168.1.20");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// pigpio daemon host.
    pub pigpio_host: String,
    /// pigpio daemon port.
    pub pigpio_port: u16,
    /// HTTP listen address.
    pub listen_addr: SocketAddr,
    /// GPIO backend.
    pub backend: BackendKind,
    /// Servo signal pin (BCM).
    pub servo_pin: u8,
    /// Open and close pulse widths.
    pub positions: ServoPositions,
    /// Push button input.
    pub button: InputPin,
    /// Limit switch input.
    pub limit_switch: InputPin,
    /// Minimum time between accepted toggles.
    pub debounce: Duration,
    /// Time after a move during which toggles are ignored.
    pub move_guard: Duration,
    /// Hold time before the servo pulse is stopped.
    pub settle: Duration,
    /// GPIO daemon connection retry.
    pub retry: RetryPolicy,
    /// pigpio socket connect timeout.
    pub connect_timeout: Duration,
    /// Delay before hardware input setup is retried after a failure.
    pub input_restart: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pigpio_host: "localhost".to_string(),
            pigpio_port: 8888,
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 3000)),
            backend: BackendKind::Pigpio,
            servo_pin: 18,
            positions: ServoPositions::default(),
            button: InputPin {
                pin: 23,
                pull: Pull::Down,
                edge: Edge::Rising,
                glitch_filter_us: 10_000,
            },
            limit_switch: InputPin {
                pin: 25,
                pull: Pull::Up,
                edge: Edge::Falling,
                glitch_filter_us: 10_000,
            },
            debounce: Duration::from_millis(300),
            move_guard: Duration::from_millis(900),
            settle: Duration::from_millis(800),
            retry: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(2),
            input_restart: Duration::from_secs(5),
        }
    }
}

impl ControllerConfig {
    /// Loads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through `lookup`, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparsable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(host) = lookup("PIGPIO_ADDR").filter(|h| !h.trim().is_empty()) {
            config.pigpio_host = host.trim().to_string();
        }
        if let Some(port) = parsed(&lookup, "PIGPIO_PORT")? {
            config.pigpio_port = port;
        }
        if let Some(addr) = parsed(&lookup, "DOOR_LISTEN_ADDR")? {
            config.listen_addr = addr;
        }
        if let Some(backend) = parsed(&lookup, "DOOR_GPIO_BACKEND")? {
            config.backend = backend;
        }
        if let Some(millis) = parsed(&lookup, "PIGPIO_CONNECT_TIMEOUT_MS")? {
            config.connect_timeout = Duration::from_millis(millis);
        }
        Ok(config)
    }

    /// Sets the pigpio daemon address.
    #[must_use]
    pub fn with_pigpio(mut self, host: impl Into<String>, port: u16) -> Self {
        self.pigpio_host = host.into();
        self.pigpio_port = port;
        self
    }

    /// Sets the GPIO backend.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the debounce interval.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the move guard interval.
    #[must_use]
    pub fn with_move_guard(mut self, move_guard: Duration) -> Self {
        self.move_guard = move_guard;
        self
    }

    /// Sets the servo settle duration.
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

/// Print monitor settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Printer address.
    pub host: String,
    /// Printer MQTT port.
    pub port: u16,
    /// Printer serial number, scoping the report topic.
    pub serial: String,
    /// LAN access code, used as the MQTT password.
    pub access_code: String,
    /// MQTT username.
    pub username: String,
    /// Optional PEM file to verify the broker certificate against.
    pub ca_cert: Option<PathBuf>,
    /// Door controller base URL.
    pub door_url: String,
    /// Bed temperature below which the door opens, in °C.
    pub door_open_temp: f64,
    /// Status endpoint listen address.
    pub listen_addr: SocketAddr,
    /// Door controller request timeout.
    pub door_timeout: Duration,
    /// Delay between attempts until the first subscription succeeds.
    pub initial_retry: Duration,
    /// Reconnect delays after a drop.
    pub backoff: ReconnectBackoff,
    /// MQTT keep-alive interval.
    pub keep_alive: Duration,
}

impl MonitorConfig {
    /// Default MQTT over TLS port.
    pub const DEFAULT_PORT: u16 = 8883;
    /// Default MQTT username for LAN mode.
    pub const DEFAULT_USERNAME: &'static str = "bblp";
    /// Default door threshold in °C.
    pub const DEFAULT_DOOR_OPEN_TEMP: f64 = 45.0;

    /// Creates settings for the printer at `host`.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        serial: impl Into<String>,
        access_code: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: Self::DEFAULT_PORT,
            serial: serial.into(),
            access_code: access_code.into(),
            username: Self::DEFAULT_USERNAME.to_string(),
            ca_cert: None,
            door_url: "http://localhost:3000".to_string(),
            door_open_temp: Self::DEFAULT_DOOR_OPEN_TEMP,
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 5000)),
            door_timeout: Duration::from_secs(5),
            initial_retry: Duration::from_secs(10),
            backoff: ReconnectBackoff::default(),
            keep_alive: Duration::from_secs(30),
        }
    }

    /// Loads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is unparsable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new(
            required(&lookup, "BAMBU_HOST")?,
            required(&lookup, "BAMBU_SERIAL")?,
            required(&lookup, "BAMBU_ACCESS_CODE")?,
        );

        if let Some(port) = parsed(&lookup, "BAMBU_PORT")? {
            config.port = port;
        }
        if let Some(username) = lookup("BAMBU_USERNAME").filter(|u| !u.is_empty()) {
            config.username = username;
        }
        config.ca_cert = lookup("BAMBU_CA_CERT")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        if let Some(url) = lookup("DOOR_URL").filter(|u| !u.is_empty()) {
            config.door_url = url;
        }
        if let Some(temp) = parsed(&lookup, "DOOR_OPEN_TEMP")? {
            config.door_open_temp = temp;
        }
        if let Some(addr) = parsed(&lookup, "MONITOR_LISTEN_ADDR")? {
            config.listen_addr = addr;
        }
        Ok(config)
    }

    /// Sets the MQTT port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the door controller URL.
    #[must_use]
    pub fn with_door_url(mut self, url: impl Into<String>) -> Self {
        self.door_url = url.into();
        self
    }

    /// Sets the door threshold.
    #[must_use]
    pub fn with_door_open_temp(mut self, celsius: f64) -> Self {
        self.door_open_temp = celsius;
        self
    }

    /// Sets the CA file used to verify the broker.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Returns the telemetry topic for this printer.
    #[must_use]
    pub fn report_topic(&self) -> String {
        format!("device/{}/report", self.serial)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn controller_defaults() {
        let config = ControllerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.pigpio_host, "localhost");
        assert_eq!(config.pigpio_port, 8888);
        assert_eq!(config.listen_addr.port(), 3000);
        assert_eq!(config.button.pin, 23);
        assert_eq!(config.limit_switch.edge, Edge::Falling);
    }

    #[test]
    fn controller_from_environment() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("PIGPIO_ADDR", "pi.local"),
            ("PIGPIO_PORT", "9999"),
            ("DOOR_LISTEN_ADDR", "127.0.0.1:8080"),
            ("DOOR_GPIO_BACKEND", "Simulated"),
            ("PIGPIO_CONNECT_TIMEOUT_MS", "500"),
        ]))
        .unwrap();

        assert_eq!(config.pigpio_host, "pi.local");
        assert_eq!(config.pigpio_port, 9999);
        assert_eq!(config.listen_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.backend, BackendKind::Simulated);
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
    }

    #[test]
    fn controller_rejects_bad_port() {
        let err = ControllerConfig::from_lookup(lookup(&[("PIGPIO_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "PIGPIO_PORT"));
    }

    #[test]
    fn monitor_requires_printer_identity() {
        let err = MonitorConfig::from_lookup(lookup(&[("BAMBU_HOST", "10.0.0.5")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("BAMBU_SERIAL".to_string()));
    }

    #[test]
    fn monitor_from_environment() {
        let config = MonitorConfig::from_lookup(lookup(&[
            ("BAMBU_HOST", "10.0.0.5"),
            ("BAMBU_SERIAL", "01S00A000000000"),
            ("BAMBU_ACCESS_CODE", "12345678"),
            ("DOOR_URL", "http://door.local:3000"),
            ("DOOR_OPEN_TEMP", "40.5"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8883);
        assert_eq!(config.username, "bblp");
        assert_eq!(config.door_open_temp, 40.5);
        assert_eq!(config.door_url, "http://door.local:3000");
        assert!(config.ca_cert.is_none());
        assert_eq!(config.report_topic(), "device/01S00A000000000/report");
    }
}
