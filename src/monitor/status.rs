// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `GET /temps` status endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use super::session::SessionStatus;
use super::tracker::PrintTracker;
use super::PrintMonitor;

/// Body of `GET /temps`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorStatus {
    /// `ON` while subscribed, `OFF` otherwise.
    pub status: &'static str,
    /// Bed temperature in °C.
    pub bed_temp: Option<f64>,
    /// Nozzle temperature in °C.
    pub nozzle_temp: Option<f64>,
    /// When the last report arrived.
    pub last_update: Option<DateTime<Utc>>,
    /// Print progress in percent.
    pub percent: Option<u32>,
    /// Current layer.
    pub layer: Option<u32>,
    /// Total layers.
    pub total_layers: Option<u32>,
    /// Estimated minutes remaining.
    pub remaining_minutes: Option<u32>,
    /// Whether the current print has reached 100 %.
    pub completed: bool,
    /// Door belief.
    pub door_open: bool,
}

impl MonitorStatus {
    pub(crate) fn new(session: SessionStatus, tracker: &PrintTracker) -> Self {
        let sample = tracker.sample();
        Self {
            status: session.label(),
            bed_temp: sample.bed_temp_c,
            nozzle_temp: sample.nozzle_temp_c,
            last_update: sample.updated_at,
            percent: sample.percent_complete,
            layer: sample.layer,
            total_layers: sample.total_layers,
            remaining_minutes: sample.remaining_minutes,
            completed: tracker.completed(),
            door_open: tracker.door_open(),
        }
    }
}

/// Builds the print monitor status router.
pub fn router(monitor: Arc<PrintMonitor>) -> Router {
    Router::new()
        .route("/temps", get(temps))
        .layer(TraceLayer::new_for_http())
        .with_state(monitor)
}

async fn temps(State(monitor): State<Arc<PrintMonitor>>) -> Json<MonitorStatus> {
    Json(monitor.status())
}
