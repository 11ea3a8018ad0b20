// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Door controller.
//!
//! [`DoorController`] owns the servo actuator, the toggle guard windows and
//! the door state belief. Every entry point that moves the servo goes
//! through one async mutex held from guard evaluation until the move has
//! finished, so at most one move is in flight at any time.
//!
//! Hardware edges and remote toggles arrive as [`InputEvent`]s on a channel
//! consumed by [`DoorController::run`]. HTTP handlers call the directional
//! operations directly.

mod event;
mod guard;

pub use event::{InputEvent, InputSource};
pub use guard::Rejection;

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::actuator::{ActuatorCommand, RetryPolicy, ServoActuator, ServoPositions};
use crate::config::ControllerConfig;
use crate::error::ActuatorError;
use crate::gpio::{EdgeWatch, GpioBackend, InputPin};
use crate::types::{DoorState, PulseWidth};
use guard::ToggleGuard;

/// BCM pins probed by [`DoorController::scan`].
pub const SCAN_PINS: RangeInclusive<u8> = 17..=27;

/// Result of a toggle request.
#[derive(Debug)]
pub enum ToggleOutcome {
    /// The door was moved to the given state.
    Moved(DoorState),
    /// The toggle was accepted but the servo move failed.
    ///
    /// The state belief has still been flipped to `target` and the guard
    /// windows still advanced.
    Failed {
        /// State the move was meant to reach.
        target: DoorState,
        /// Why the move failed.
        error: ActuatorError,
    },
    /// The toggle was ignored.
    Rejected(Rejection),
}

impl ToggleOutcome {
    /// Returns `true` unless the request was rejected by a guard window.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Raw input levels reported by `/pins`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PinLevels {
    /// Button pin level.
    pub button: u8,
    /// Limit switch pin level.
    pub limit: u8,
    /// Current door state belief.
    pub open: bool,
}

/// Arbitrates every door input and drives the servo.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use door_opener::config::ControllerConfig;
/// use door_opener::gpio::SimulatedGpio;
/// use door_opener::types::DoorState;
/// use door_opener::DoorController;
///
/// # async fn example() -> Result<(), door_opener::error::ActuatorError> {
/// let gpio = Arc::new(SimulatedGpio::new());
/// let controller = DoorController::new(gpio, &ControllerConfig::default());
///
/// controller.open().await?;
/// assert_eq!(controller.read_state(), DoorState::Open);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DoorController<B> {
    actuator: ServoActuator<B>,
    positions: ServoPositions,
    button: InputPin,
    limit_switch: InputPin,
    guard: Mutex<ToggleGuard>,
    state: watch::Sender<DoorState>,
    input_restart: Duration,
}

impl<B: GpioBackend> DoorController<B> {
    /// Creates a controller for `backend` using the pins and timings in `config`.
    ///
    /// The door starts out believed closed.
    #[must_use]
    pub fn new(backend: Arc<B>, config: &ControllerConfig) -> Self {
        let actuator = ServoActuator::new(backend, config.servo_pin)
            .with_settle(config.settle)
            .with_retry(config.retry);

        Self {
            actuator,
            positions: config.positions,
            button: config.button,
            limit_switch: config.limit_switch,
            guard: Mutex::new(ToggleGuard::new(config.debounce, config.move_guard)),
            state: watch::Sender::new(DoorState::default()),
            input_restart: config.input_restart,
        }
    }

    /// Returns the current door state belief.
    #[must_use]
    pub fn read_state(&self) -> DoorState {
        *self.state.borrow()
    }

    /// Subscribes to door state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DoorState> {
        self.state.subscribe()
    }

    /// Overwrites the state belief without moving the servo.
    pub fn set_state(&self, state: DoorState) {
        let previous = self.state.send_replace(state);
        tracing::info!(%previous, %state, "Door state overwritten");
    }

    /// Handles a toggle request from a button, limit switch or remote peer.
    ///
    /// Ignored while a move is in progress or within the debounce interval
    /// of the last accepted toggle. Otherwise flips the state belief and
    /// moves the servo; the busy window is armed whether or not the move
    /// succeeds.
    pub async fn handle_toggle_event(&self, source: InputSource, now: Instant) -> ToggleOutcome {
        let mut guard = self.guard.lock().await;

        if let Err(rejection) = guard.check(now) {
            tracing::debug!(%source, %rejection, "Toggle ignored");
            return ToggleOutcome::Rejected(rejection);
        }
        guard.accept(now);

        let target = self.read_state().toggled();
        self.state.send_replace(target);
        tracing::info!(%source, %target, "Toggling door");

        let result = self
            .actuator
            .execute(ActuatorCommand::towards(target, self.positions))
            .await;
        guard.arm(now);

        match result {
            Ok(()) => ToggleOutcome::Moved(target),
            Err(error) => {
                tracing::error!(%source, %target, error = %error, "Toggle move failed");
                ToggleOutcome::Failed { target, error }
            }
        }
    }

    /// Opens the door.
    ///
    /// # Errors
    ///
    /// Returns an error if the servo could not be moved; the state belief
    /// is left unchanged.
    pub async fn open(&self) -> Result<(), ActuatorError> {
        self.move_door(DoorState::Open).await
    }

    /// Closes the door.
    ///
    /// # Errors
    ///
    /// Returns an error if the servo could not be moved; the state belief
    /// is left unchanged.
    pub async fn close(&self) -> Result<(), ActuatorError> {
        self.move_door(DoorState::Closed).await
    }

    async fn move_door(&self, target: DoorState) -> Result<(), ActuatorError> {
        let mut guard = self.guard.lock().await;
        let now = Instant::now();

        let result = self
            .actuator
            .execute(ActuatorCommand::towards(target, self.positions))
            .await;
        guard.arm(now);

        match result {
            Ok(()) => {
                self.state.send_replace(target);
                tracing::info!(%target, "Door moved");
                Ok(())
            }
            Err(e) => {
                tracing::error!(%target, error = %e, "Door move failed");
                Err(e)
            }
        }
    }

    /// Moves the servo to a raw pulse width, clamped to 500-2500 µs.
    ///
    /// The state belief is not touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the servo could not be moved.
    pub async fn move_to(&self, pulse_width_us: u32) -> Result<PulseWidth, ActuatorError> {
        let pulse_width = PulseWidth::clamped(pulse_width_us);
        let mut guard = self.guard.lock().await;
        let now = Instant::now();

        let result = self.actuator.execute(ActuatorCommand::raw(pulse_width)).await;
        guard.arm(now);
        result.map(|()| pulse_width)
    }

    /// Reports whether the GPIO daemon is reachable.
    pub async fn diagnose(&self) -> bool {
        self.actuator.is_reachable().await
    }

    /// Reads the button and limit switch levels.
    ///
    /// # Errors
    ///
    /// Returns an error if the GPIO daemon is unreachable.
    pub async fn pin_levels(&self) -> Result<PinLevels, ActuatorError> {
        self.actuator.ensure_connected(RetryPolicy::ONCE).await?;
        let backend = self.actuator.backend();
        let button = backend.read(self.button.pin).await?;
        let limit = backend.read(self.limit_switch.pin).await?;

        Ok(PinLevels {
            button: button.as_u8(),
            limit: limit.as_u8(),
            open: self.read_state().is_open(),
        })
    }

    /// Reads every pin in [`SCAN_PINS`].
    ///
    /// # Errors
    ///
    /// Returns an error if the GPIO daemon is unreachable.
    pub async fn scan(&self) -> Result<BTreeMap<u8, u8>, ActuatorError> {
        self.actuator.ensure_connected(RetryPolicy::ONCE).await?;
        let backend = self.actuator.backend();

        let mut levels = BTreeMap::new();
        for pin in SCAN_PINS {
            levels.insert(pin, backend.read(pin).await?.as_u8());
        }
        Ok(levels)
    }

    /// Returns the edge subscriptions for the button and limit switch.
    #[must_use]
    pub fn input_watches(&self) -> Vec<EdgeWatch> {
        vec![
            self.button.watch(InputSource::Button),
            self.limit_switch.watch(InputSource::LimitSwitch),
        ]
    }

    /// Configures the input pins and forwards their edges to `events` until
    /// `cancel` fires.
    ///
    /// The daemon connection is retried with the same policy as servo moves.
    ///
    /// # Errors
    ///
    /// Returns an error if the pins cannot be configured or the notification
    /// stream fails.
    pub async fn listen_inputs(
        &self,
        events: mpsc::Sender<InputEvent>,
        cancel: CancellationToken,
    ) -> Result<(), ActuatorError> {
        self.actuator.ensure_connected(self.actuator.retry()).await?;
        let backend = self.actuator.backend();
        for input in [self.button, self.limit_switch] {
            backend.configure_input(input).await?;
        }
        tracing::info!(
            button = self.button.pin,
            limit_switch = self.limit_switch.pin,
            "Hardware inputs configured"
        );

        backend
            .watch_edges(self.input_watches(), events, cancel)
            .await
    }

    /// Runs [`listen_inputs`](Self::listen_inputs) until `cancel` fires,
    /// setting the inputs up again after every failure.
    ///
    /// Also returns once the receiving end of `events` is gone.
    pub async fn supervise_inputs(&self, events: mpsc::Sender<InputEvent>, cancel: CancellationToken) {
        loop {
            let result = self.listen_inputs(events.clone(), cancel.clone()).await;
            if cancel.is_cancelled() || events.is_closed() {
                break;
            }
            match result {
                Ok(()) => tracing::warn!("Edge notifications ended, restarting"),
                Err(e) => tracing::warn!(
                    error = %e,
                    retry_in = ?self.input_restart,
                    "Hardware inputs unavailable"
                ),
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.input_restart) => {}
            }
        }
        tracing::debug!("Input supervision stopped");
    }

    /// Consumes toggle requests until `cancel` fires or every sender is gone.
    pub async fn run(&self, mut events: mpsc::Receiver<InputEvent>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle_toggle_event(event.source, event.at).await;
        }
        tracing::debug!("Input arbitration loop stopped");
    }
}
