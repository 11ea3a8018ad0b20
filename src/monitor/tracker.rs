// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bed temperature threshold and print completion tracking.

use chrono::{DateTime, Utc};

use super::telemetry::{PrintReport, TelemetrySample};

/// Door command issued to the door controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoorCommand {
    /// `GET /open`.
    Open,
    /// `GET /close`.
    Close,
}

impl DoorCommand {
    /// Returns the door controller path for this command.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Open => "/open",
            Self::Close => "/close",
        }
    }

    /// Returns the door belief once this command has succeeded.
    #[must_use]
    pub const fn resulting_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// What a report means for the door.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    /// Command to send, if the bed temperature crossed the threshold.
    pub door: Option<DoorCommand>,
    /// `true` on the report where progress first reached 100.
    pub completed_now: bool,
}

/// Tracks the latest telemetry and decides when to move the door.
///
/// The door belief is a remote copy: it is seeded from the controller's
/// `/state` and only updated through [`confirm`](Self::confirm) after a
/// command succeeded, so a failed command is retried on the next report.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use door_opener::monitor::{DoorCommand, PrintReport, PrintTracker};
///
/// let mut tracker = PrintTracker::new(45.0);
/// let cooled = PrintReport { bed_temper: Some(44.0), ..PrintReport::default() };
///
/// let observation = tracker.observe(&cooled, Utc::now());
/// assert_eq!(observation.door, Some(DoorCommand::Open));
/// tracker.confirm(DoorCommand::Open);
/// assert!(tracker.door_open());
/// ```
#[derive(Debug, Clone)]
pub struct PrintTracker {
    threshold_c: f64,
    door_open: bool,
    completed: bool,
    sample: TelemetrySample,
}

impl PrintTracker {
    /// Creates a tracker opening the door below `threshold_c`.
    ///
    /// The door is assumed closed until told otherwise.
    #[must_use]
    pub fn new(threshold_c: f64) -> Self {
        Self {
            threshold_c,
            door_open: false,
            completed: false,
            sample: TelemetrySample::default(),
        }
    }

    /// Returns the threshold in °C.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold_c
    }

    /// Returns the door belief.
    #[must_use]
    pub fn door_open(&self) -> bool {
        self.door_open
    }

    /// Overwrites the door belief.
    pub fn set_door_open(&mut self, open: bool) {
        self.door_open = open;
    }

    /// Returns whether the current print has completed.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// Returns the latest telemetry.
    #[must_use]
    pub fn sample(&self) -> &TelemetrySample {
        &self.sample
    }

    /// Applies `report` and decides what it means for the door.
    pub fn observe(&mut self, report: &PrintReport, at: DateTime<Utc>) -> Observation {
        self.sample.apply(report, at);

        let mut observation = Observation::default();

        if let Some(percent) = report.mc_percent {
            if percent >= 100 {
                observation.completed_now = !self.completed;
                self.completed = true;
            } else {
                self.completed = false;
            }
        }

        if let Some(bed) = report.bed_temper {
            if bed < self.threshold_c && !self.door_open {
                observation.door = Some(DoorCommand::Open);
            } else if bed > self.threshold_c && self.door_open {
                observation.door = Some(DoorCommand::Close);
            }
        }

        observation
    }

    /// Records that `command` was carried out.
    pub fn confirm(&mut self, command: DoorCommand) {
        self.door_open = command.resulting_open();
    }
}
