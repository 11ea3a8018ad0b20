// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GPIO daemon backends.
//!
//! The door hardware is driven through a GPIO daemon that exposes pin
//! primitives over a socket. This module defines the [`GpioBackend`] seam
//! the controller talks to, plus two implementations:
//!
//! - [`PigpioBackend`]: the pigpio socket interface (`pigpiod`, port 8888)
//! - [`SimulatedGpio`]: an in-memory backend for running without hardware

mod pigpio;
mod simulated;

pub use pigpio::PigpioBackend;
pub use simulated::SimulatedGpio;

use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::controller::{InputEvent, InputSource};
use crate::error::ActuatorError;

/// Logic level of a GPIO pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Pin reads 0.
    Low,
    /// Pin reads 1.
    High,
}

impl Level {
    /// Returns the level as reported by the daemon (0 or 1).
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }
}

/// Internal pull resistor setting for an input pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pull {
    /// No pull resistor.
    Off,
    /// Pull towards ground; the pin idles low.
    Down,
    /// Pull towards 3.3 V; the pin idles high.
    Up,
}

/// Signal transition that triggers a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// Low to high.
    Rising,
    /// High to low.
    Falling,
}

impl Edge {
    /// Returns `true` if a pin that now reads `level` has just made this transition.
    #[must_use]
    pub const fn matches(self, level: Level) -> bool {
        matches!(
            (self, level),
            (Self::Rising, Level::High) | (Self::Falling, Level::Low)
        )
    }
}

/// Wiring of one toggle input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPin {
    /// BCM pin number.
    pub pin: u8,
    /// Pull resistor to enable.
    pub pull: Pull,
    /// Transition that counts as a press.
    pub edge: Edge,
    /// Daemon-side glitch filter in microseconds; 0 disables it.
    pub glitch_filter_us: u32,
}

impl InputPin {
    /// Returns the edge subscription for this input.
    #[must_use]
    pub const fn watch(self, source: InputSource) -> EdgeWatch {
        EdgeWatch {
            pin: self.pin,
            edge: self.edge,
            source,
        }
    }
}

/// Maps an edge on a pin to the input source it represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeWatch {
    /// BCM pin number.
    pub pin: u8,
    /// Transition to report.
    pub edge: Edge,
    /// Source stamped on the resulting [`InputEvent`].
    pub source: InputSource,
}

/// Primitives the door controller needs from a GPIO daemon.
///
/// Connections are lazy: [`connect`](Self::connect) is called by the
/// actuator whenever [`is_connected`](Self::is_connected) reports `false`,
/// and implementations drop their connection on I/O failure so the next
/// call reconnects.
pub trait GpioBackend: Send + Sync + 'static {
    /// Establishes the daemon connection if it is not already up.
    fn connect(&self) -> impl Future<Output = Result<(), ActuatorError>> + Send;

    /// Returns whether a daemon connection is currently established.
    fn is_connected(&self) -> bool;

    /// Sets the servo pulse width on `pin`; 0 stops the pulse train.
    fn set_servo_pulsewidth(
        &self,
        pin: u8,
        pulse_width_us: u16,
    ) -> impl Future<Output = Result<(), ActuatorError>> + Send;

    /// Reads the current level of `pin`.
    fn read(&self, pin: u8) -> impl Future<Output = Result<Level, ActuatorError>> + Send;

    /// Configures `input.pin` as an input with pull resistor and glitch filter.
    fn configure_input(
        &self,
        input: InputPin,
    ) -> impl Future<Output = Result<(), ActuatorError>> + Send;

    /// Forwards matching edges as [`InputEvent`]s until cancelled.
    ///
    /// Returns `Ok(())` on cancellation or when the receiver is dropped.
    fn watch_edges(
        &self,
        watches: Vec<EdgeWatch>,
        events: mpsc::Sender<InputEvent>,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), ActuatorError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_matches_level() {
        assert!(Edge::Rising.matches(Level::High));
        assert!(!Edge::Rising.matches(Level::Low));
        assert!(Edge::Falling.matches(Level::Low));
        assert!(!Edge::Falling.matches(Level::High));
    }

    #[test]
    fn input_pin_watch() {
        let button = InputPin {
            pin: 23,
            pull: Pull::Down,
            edge: Edge::Rising,
            glitch_filter_us: 10_000,
        };
        let watch = button.watch(InputSource::Button);
        assert_eq!(watch.pin, 23);
        assert_eq!(watch.edge, Edge::Rising);
        assert_eq!(watch.source, InputSource::Button);
    }
}
