// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Servo actuation.
//!
//! An [`ActuatorCommand`] is executed as pulse on, hold for the settle
//! duration, pulse off. The servo is never left energized between moves.
//! The backend connection is established lazily and retried a bounded
//! number of times before the command fails.

use std::sync::Arc;
use std::time::Duration;

use crate::error::ActuatorError;
use crate::gpio::GpioBackend;
use crate::types::{DoorState, PulseWidth};

/// Servo pulse widths for the two door positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoPositions {
    /// Pulse width that opens the door.
    pub open: PulseWidth,
    /// Pulse width that closes the door.
    pub close: PulseWidth,
}

impl ServoPositions {
    /// Returns the pulse width for `state`.
    #[must_use]
    pub const fn for_state(self, state: DoorState) -> PulseWidth {
        match state {
            DoorState::Open => self.open,
            DoorState::Closed => self.close,
        }
    }
}

impl Default for ServoPositions {
    fn default() -> Self {
        Self {
            open: PulseWidth::clamped(500),
            close: PulseWidth::clamped(2000),
        }
    }
}

/// A single servo move.
///
/// `target` is `None` for raw calibration moves whose resulting door
/// position is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorCommand {
    /// Door state this move is meant to reach.
    pub target: Option<DoorState>,
    /// Pulse width to apply.
    pub pulse_width: PulseWidth,
}

impl ActuatorCommand {
    /// Creates a move towards `state` using `positions`.
    #[must_use]
    pub const fn towards(state: DoorState, positions: ServoPositions) -> Self {
        Self {
            target: Some(state),
            pulse_width: positions.for_state(state),
        }
    }

    /// Creates a raw move with no door-state meaning.
    #[must_use]
    pub const fn raw(pulse_width: PulseWidth) -> Self {
        Self {
            target: None,
            pulse_width,
        }
    }
}

/// Bounded connection retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connection attempts before giving up; at least one is made.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// A single attempt with no delay.
    pub const ONCE: Self = Self {
        attempts: 1,
        delay: Duration::ZERO,
    };
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(300),
        }
    }
}

/// Drives the door servo through a [`GpioBackend`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use door_opener::actuator::{ActuatorCommand, ServoActuator, ServoPositions};
/// use door_opener::gpio::SimulatedGpio;
/// use door_opener::types::DoorState;
///
/// # async fn example() -> Result<(), door_opener::error::ActuatorError> {
/// let gpio = Arc::new(SimulatedGpio::new());
/// let actuator = ServoActuator::new(Arc::clone(&gpio), 18)
///     .with_settle(Duration::from_millis(10));
///
/// actuator
///     .execute(ActuatorCommand::towards(DoorState::Open, ServoPositions::default()))
///     .await?;
/// assert_eq!(gpio.pulses(), vec![(18, 500), (18, 0)]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ServoActuator<B> {
    backend: Arc<B>,
    pin: u8,
    settle: Duration,
    retry: RetryPolicy,
}

impl<B: GpioBackend> ServoActuator<B> {
    /// Default hold time before the pulse train is stopped.
    pub const DEFAULT_SETTLE: Duration = Duration::from_millis(800);

    /// Creates an actuator driving the servo on `pin`.
    #[must_use]
    pub fn new(backend: Arc<B>, pin: u8) -> Self {
        Self {
            backend,
            pin,
            settle: Self::DEFAULT_SETTLE,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the settle duration.
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Sets the connection retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Returns the servo pin.
    #[must_use]
    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Returns the connection retry policy used for moves.
    #[must_use]
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Connects to the backend if needed, retrying per `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`ActuatorError::Unreachable`] once every attempt has failed.
    pub async fn ensure_connected(&self, policy: RetryPolicy) -> Result<(), ActuatorError> {
        if self.backend.is_connected() {
            return Ok(());
        }

        let attempts = policy.attempts.max(1);
        for attempt in 1..=attempts {
            match self.backend.connect().await {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "Connected to GPIO daemon after retry");
                    }
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, attempts, error = %e, "GPIO daemon connection failed");
                    if attempt < attempts {
                        tokio::time::sleep(policy.delay).await;
                    }
                }
            }
        }

        Err(ActuatorError::Unreachable { attempts })
    }

    /// Executes `command`: pulse on, settle, pulse off.
    ///
    /// Runs to completion once started; the caller is suspended for the
    /// settle duration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or rejects the pulse.
    pub async fn execute(&self, command: ActuatorCommand) -> Result<(), ActuatorError> {
        self.ensure_connected(self.retry).await?;

        let width = command.pulse_width.value();
        tracing::info!(
            pin = self.pin,
            pulse_width_us = width,
            target = ?command.target,
            "Moving servo"
        );

        self.backend.set_servo_pulsewidth(self.pin, width).await?;
        tokio::time::sleep(self.settle).await;
        self.backend.set_servo_pulsewidth(self.pin, 0).await
    }

    /// Reports whether the backend can be reached, trying once.
    pub async fn is_reachable(&self) -> bool {
        self.ensure_connected(RetryPolicy::ONCE).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::SimulatedGpio;

    fn actuator(gpio: &Arc<SimulatedGpio>) -> ServoActuator<SimulatedGpio> {
        ServoActuator::new(Arc::clone(gpio), 18)
    }

    #[test]
    fn positions_map_states() {
        let positions = ServoPositions::default();
        assert_eq!(positions.for_state(DoorState::Open).value(), 500);
        assert_eq!(positions.for_state(DoorState::Closed).value(), 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn execute_pulses_settles_and_stops() {
        let gpio = Arc::new(SimulatedGpio::new());
        let actuator = actuator(&gpio);

        let started = tokio::time::Instant::now();
        actuator
            .execute(ActuatorCommand::towards(
                DoorState::Closed,
                ServoPositions::default(),
            ))
            .await
            .unwrap();

        assert_eq!(gpio.pulses(), vec![(18, 2000), (18, 0)]);
        assert!(started.elapsed() >= ServoActuator::<SimulatedGpio>::DEFAULT_SETTLE);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_after_bounded_retries() {
        let gpio = Arc::new(SimulatedGpio::unreachable());
        let actuator = actuator(&gpio);

        let result = actuator
            .execute(ActuatorCommand::raw(PulseWidth::clamped(1500)))
            .await;

        assert!(matches!(
            result,
            Err(ActuatorError::Unreachable { attempts: 10 })
        ));
        assert_eq!(gpio.connect_attempts(), 10);
        assert!(gpio.pulses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_lazily() {
        let gpio = Arc::new(SimulatedGpio::new());
        let actuator = actuator(&gpio);

        actuator
            .execute(ActuatorCommand::raw(PulseWidth::clamped(1500)))
            .await
            .unwrap();
        actuator
            .execute(ActuatorCommand::raw(PulseWidth::clamped(1500)))
            .await
            .unwrap();
        assert_eq!(gpio.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn reachability_check_tries_once() {
        let gpio = Arc::new(SimulatedGpio::unreachable());
        let actuator = actuator(&gpio);
        assert!(!actuator.is_reachable().await);
        assert_eq!(gpio.connect_attempts(), 1);

        gpio.set_reachable(true);
        assert!(actuator.is_reachable().await);
    }
}
