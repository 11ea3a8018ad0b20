// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Door Opener - a servo-driven 3D printer enclosure door.
//!
//! The crate has two halves that talk to each other only over HTTP:
//!
//! - **Door controller** ([`DoorController`]): drives the servo through a
//!   GPIO daemon, arbitrates the push button, the limit switch and HTTP
//!   commands, and keeps the open/closed belief.
//! - **Print monitor** ([`monitor::PrintMonitor`]): follows the printer's
//!   MQTT telemetry and opens the door once the bed has cooled below a
//!   threshold, closing it again when the bed reheats.
//!
//! # Door controller
//!
//! ```no_run
//! use std::sync::Arc;
//! use door_opener::config::ControllerConfig;
//! use door_opener::gpio::PigpioBackend;
//! use door_opener::{DoorController, server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ControllerConfig::from_env()?;
//!     let gpio = Arc::new(PigpioBackend::new(&config.pigpio_host, config.pigpio_port));
//!     let controller = Arc::new(DoorController::new(gpio, &config));
//!
//!     let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
//!     axum::serve(listener, server::router(controller)).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Print monitor
//!
//! ```no_run
//! use std::sync::Arc;
//! use door_opener::config::MonitorConfig;
//! use door_opener::monitor::{DoorClient, PrintMonitor, PrintTracker, TelemetrySession};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MonitorConfig::from_env()?;
//!     let session = TelemetrySession::new(&config)?;
//!     let door = DoorClient::new(&config.door_url, config.door_timeout)?;
//!     let monitor = PrintMonitor::new(
//!         door,
//!         PrintTracker::new(config.door_open_temp),
//!         session.status(),
//!     );
//!
//!     let (tx, rx) = tokio::sync::mpsc::channel(64);
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(session.run(tx, cancel.clone()));
//!
//!     monitor.seed_belief().await;
//!     monitor.process_reports(rx, cancel).await;
//!     Ok(())
//! }
//! ```

pub mod actuator;
pub mod config;
pub mod controller;
pub mod error;
pub mod gpio;
pub mod monitor;
pub mod server;
pub mod types;

pub use controller::{DoorController, InputEvent, InputSource, ToggleOutcome};
pub use error::{
    ActuatorError, ConfigError, Error, ParseError, ProtocolError, Result, ValueError,
};
pub use types::{DoorState, PulseWidth};
