// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory GPIO backend.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Edge, EdgeWatch, GpioBackend, InputPin, Level};
use crate::controller::InputEvent;
use crate::error::ActuatorError;

/// A GPIO backend that records servo pulses instead of driving hardware.
///
/// Used by `DOOR_GPIO_BACKEND=simulated` to run the controller on a machine
/// without a servo, and by tests to observe exactly which pulses were sent.
/// Reachability can be toggled to exercise the daemon-down paths.
///
/// # Examples
///
/// ```
/// use door_opener::gpio::{GpioBackend, Level, SimulatedGpio};
///
/// # async fn example() -> Result<(), door_opener::error::ActuatorError> {
/// let gpio = SimulatedGpio::new();
/// gpio.connect().await?;
/// gpio.set_servo_pulsewidth(18, 500).await?;
/// gpio.set_servo_pulsewidth(18, 0).await?;
///
/// assert_eq!(gpio.pulses(), vec![(18, 500), (18, 0)]);
/// assert_eq!(gpio.servo_moves(), vec![500]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SimulatedGpio {
    reachable: AtomicBool,
    connected: AtomicBool,
    connect_attempts: AtomicU32,
    pulses: Mutex<Vec<(u8, u16)>>,
    levels: Mutex<HashMap<u8, Level>>,
    inputs: Mutex<Vec<InputPin>>,
    watchers: Mutex<Vec<(Vec<EdgeWatch>, mpsc::Sender<InputEvent>)>>,
}

impl SimulatedGpio {
    /// Creates a reachable simulated daemon with every pin low.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            connect_attempts: AtomicU32::new(0),
            pulses: Mutex::new(Vec::new()),
            levels: Mutex::new(HashMap::new()),
            inputs: Mutex::new(Vec::new()),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Creates a simulated daemon that refuses every connection.
    #[must_use]
    pub fn unreachable() -> Self {
        let gpio = Self::new();
        gpio.set_reachable(false);
        gpio
    }

    /// Makes the daemon reachable or not. Going unreachable drops the connection.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Release);
        if !reachable {
            self.connected.store(false, Ordering::Release);
        }
    }

    /// Sets the level returned by [`read`](GpioBackend::read) for `pin`.
    pub fn set_level(&self, pin: u8, level: Level) {
        self.levels.lock().insert(pin, level);
    }

    /// Returns every `(pin, pulse_width_us)` written so far, stop pulses included.
    #[must_use]
    pub fn pulses(&self) -> Vec<(u8, u16)> {
        self.pulses.lock().clone()
    }

    /// Returns the non-zero pulse widths written so far, one per servo move.
    #[must_use]
    pub fn servo_moves(&self) -> Vec<u16> {
        self.pulses
            .lock()
            .iter()
            .filter_map(|&(_, width)| (width != 0).then_some(width))
            .collect()
    }

    /// Returns how many times a connection was attempted.
    #[must_use]
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::Acquire)
    }

    /// Returns the inputs configured through [`configure_input`](GpioBackend::configure_input).
    #[must_use]
    pub fn configured_inputs(&self) -> Vec<InputPin> {
        self.inputs.lock().clone()
    }

    /// Injects an edge on `pin`, forwarding it to every matching watcher.
    ///
    /// Returns the number of events delivered.
    pub fn simulate_edge(&self, pin: u8, edge: Edge) -> usize {
        self.set_level(pin, Level::from(matches!(edge, Edge::Rising)));

        let watchers = self.watchers.lock();
        watchers
            .iter()
            .flat_map(|(watches, tx)| {
                watches
                    .iter()
                    .filter(move |w| w.pin == pin && w.edge == edge)
                    .map(move |w| tx.try_send(InputEvent::now(w.source)).is_ok())
            })
            .filter(|delivered| *delivered)
            .count()
    }

    fn ensure_connected(&self) -> Result<(), ActuatorError> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ActuatorError::NotConnected)
        }
    }
}

impl Default for SimulatedGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioBackend for SimulatedGpio {
    async fn connect(&self) -> Result<(), ActuatorError> {
        self.connect_attempts.fetch_add(1, Ordering::AcqRel);
        if !self.reachable.load(Ordering::Acquire) {
            return Err(ActuatorError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "simulated daemon is down",
            )));
        }
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn set_servo_pulsewidth(&self, pin: u8, pulse_width_us: u16) -> Result<(), ActuatorError> {
        self.ensure_connected()?;
        self.pulses.lock().push((pin, pulse_width_us));
        tracing::debug!(pin, pulse_width_us, "Simulated servo pulse");
        Ok(())
    }

    async fn read(&self, pin: u8) -> Result<Level, ActuatorError> {
        self.ensure_connected()?;
        Ok(self.levels.lock().get(&pin).copied().unwrap_or(Level::Low))
    }

    async fn configure_input(&self, input: InputPin) -> Result<(), ActuatorError> {
        self.ensure_connected()?;
        self.inputs.lock().push(input);
        Ok(())
    }

    async fn watch_edges(
        &self,
        watches: Vec<EdgeWatch>,
        events: mpsc::Sender<InputEvent>,
        cancel: CancellationToken,
    ) -> Result<(), ActuatorError> {
        self.ensure_connected()?;
        self.watchers.lock().push((watches, events));
        cancel.cancelled().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::InputSource;

    #[tokio::test]
    async fn records_pulses_once_connected() {
        let gpio = SimulatedGpio::new();
        assert!(matches!(
            gpio.set_servo_pulsewidth(18, 500).await,
            Err(ActuatorError::NotConnected)
        ));

        gpio.connect().await.unwrap();
        gpio.set_servo_pulsewidth(18, 500).await.unwrap();
        gpio.set_servo_pulsewidth(18, 0).await.unwrap();

        assert_eq!(gpio.pulses(), vec![(18, 500), (18, 0)]);
        assert_eq!(gpio.servo_moves(), vec![500]);
    }

    #[tokio::test]
    async fn unreachable_refuses_connections() {
        let gpio = SimulatedGpio::unreachable();
        assert!(gpio.connect().await.is_err());
        assert!(gpio.connect().await.is_err());
        assert_eq!(gpio.connect_attempts(), 2);
        assert!(!gpio.is_connected());
    }

    #[tokio::test]
    async fn going_down_drops_connection() {
        let gpio = SimulatedGpio::new();
        gpio.connect().await.unwrap();
        gpio.set_reachable(false);
        assert!(!gpio.is_connected());
    }

    #[tokio::test]
    async fn read_returns_configured_level() {
        let gpio = SimulatedGpio::new();
        gpio.connect().await.unwrap();
        gpio.set_level(25, Level::High);
        assert_eq!(gpio.read(25).await.unwrap(), Level::High);
        assert_eq!(gpio.read(23).await.unwrap(), Level::Low);
    }

    #[tokio::test]
    async fn simulated_edges_reach_watchers() {
        let gpio = std::sync::Arc::new(SimulatedGpio::new());
        gpio.connect().await.unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let watches = vec![EdgeWatch {
            pin: 23,
            edge: Edge::Rising,
            source: InputSource::Button,
        }];

        let task = tokio::spawn({
            let gpio = std::sync::Arc::clone(&gpio);
            let cancel = cancel.clone();
            async move { gpio.watch_edges(watches, tx, cancel).await }
        });

        // Wait until the watcher is registered
        while gpio.watchers.lock().is_empty() {
            tokio::task::yield_now().await;
        }

        assert_eq!(gpio.simulate_edge(23, Edge::Falling), 0);
        assert_eq!(gpio.simulate_edge(23, Edge::Rising), 1);
        assert_eq!(rx.recv().await.unwrap().source, InputSource::Button);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
