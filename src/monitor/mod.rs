// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Print monitor: opens the enclosure door once the bed has cooled.
//!
//! A [`TelemetrySession`] delivers raw report payloads from the printer's
//! MQTT broker. [`PrintMonitor`] parses them, feeds them to a
//! [`PrintTracker`] and sends the resulting [`DoorCommand`]s to the door
//! controller through a [`DoorClient`].

mod backoff;
mod door_client;
mod session;
mod status;
mod telemetry;
pub mod tls;
mod tracker;

pub use backoff::ReconnectBackoff;
pub use door_client::DoorClient;
pub use session::{SessionStatus, SessionSupervisor, TelemetrySession};
pub use status::{MonitorStatus, router};
pub use telemetry::{PrintReport, ReportMessage, TelemetrySample};
pub use tracker::{DoorCommand, Observation, PrintTracker};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Turns printer telemetry into door commands.
#[derive(Debug)]
pub struct PrintMonitor {
    door: DoorClient,
    tracker: Mutex<PrintTracker>,
    session: watch::Receiver<SessionStatus>,
}

impl PrintMonitor {
    /// Creates a monitor sending commands through `door`.
    ///
    /// `session` is the status feed of the [`TelemetrySession`] delivering
    /// the reports.
    #[must_use]
    pub fn new(
        door: DoorClient,
        tracker: PrintTracker,
        session: watch::Receiver<SessionStatus>,
    ) -> Self {
        Self {
            door,
            tracker: Mutex::new(tracker),
            session,
        }
    }

    /// Seeds the door belief from the controller's `/state`.
    ///
    /// On failure the belief stays at closed.
    pub async fn seed_belief(&self) {
        match self.door.state().await {
            Ok(open) => {
                self.tracker.lock().set_door_open(open);
                tracing::info!(open, "Door state seeded from controller");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not read door state, assuming closed");
            }
        }
    }

    /// Handles one raw report payload.
    ///
    /// Malformed payloads are logged and dropped.
    pub async fn handle_payload(&self, payload: &[u8]) {
        let message = match ReportMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "Dropping malformed telemetry"
                );
                return;
            }
        };
        let Some(report) = message.print else {
            return;
        };

        let observation = self.tracker.lock().observe(&report, Utc::now());

        if observation.completed_now {
            tracing::info!("Print completed");
        }

        if let Some(command) = observation.door {
            tracing::info!(
                bed_temp_c = ?report.bed_temper,
                command = command.path(),
                "Bed temperature crossed door threshold"
            );
            match self.door.send(command).await {
                Ok(()) => self.tracker.lock().confirm(command),
                Err(e) => {
                    tracing::error!(command = command.path(), error = %e, "Door command failed");
                }
            }
        }
    }

    /// Handles payloads from `reports` until `cancel` fires or the sender is dropped.
    pub async fn process_reports(&self, mut reports: mpsc::Receiver<Vec<u8>>, cancel: CancellationToken) {
        loop {
            let payload = tokio::select! {
                () = cancel.cancelled() => break,
                payload = reports.recv() => match payload {
                    Some(payload) => payload,
                    None => break,
                },
            };
            self.handle_payload(&payload).await;
        }
    }

    /// Returns the door belief.
    #[must_use]
    pub fn door_open(&self) -> bool {
        self.tracker.lock().door_open()
    }

    /// Returns a snapshot for the status endpoint.
    #[must_use]
    pub fn status(&self) -> MonitorStatus {
        let session = *self.session.borrow();
        let tracker = self.tracker.lock();
        MonitorStatus::new(session, &tracker)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn monitor(status: SessionStatus) -> PrintMonitor {
        // Nothing listens on the discard port
        let door = DoorClient::new("http://127.0.0.1:9", Duration::from_millis(100)).unwrap();
        let (_, session) = watch::channel(status);
        PrintMonitor::new(door, PrintTracker::new(45.0), session)
    }

    #[tokio::test]
    async fn malformed_payload_leaves_sample_untouched() {
        let monitor = monitor(SessionStatus::Subscribed);
        monitor.handle_payload(br#"{"print": {"bed_temper": 60}}"#).await;
        monitor.handle_payload(b"{garbage").await;

        let status = monitor.status();
        assert_eq!(status.bed_temp, Some(60.0));
        assert_eq!(status.status, "ON");
    }

    #[tokio::test]
    async fn status_reports_progress() {
        let monitor = monitor(SessionStatus::Connecting);
        monitor
            .handle_payload(
                br#"{"print": {"bed_temper": 70, "mc_percent": 100, "layer_num": 200, "total_layer_num": 200}}"#,
            )
            .await;

        let status = monitor.status();
        assert_eq!(status.status, "OFF");
        assert_eq!(status.percent, Some(100));
        assert!(status.completed);
        assert!(status.last_update.is_some());
    }

    #[tokio::test]
    async fn failed_command_keeps_belief() {
        let monitor = monitor(SessionStatus::Subscribed);
        monitor.handle_payload(br#"{"print": {"bed_temper": 30}}"#).await;
        assert!(!monitor.door_open());
    }
}
