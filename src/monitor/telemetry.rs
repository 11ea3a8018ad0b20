// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Printer telemetry messages.
//!
//! The printer publishes JSON reports on `device/<serial>/report`. Only the
//! nested `print` object is of interest, and each report carries an
//! arbitrary subset of its fields: a full status push has all of them, an
//! incremental update only the ones that changed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseError;

/// Top-level report envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportMessage {
    /// Print status fields, absent for non-print reports.
    #[serde(default)]
    pub print: Option<PrintReport>,
}

impl ReportMessage {
    /// Parses a raw MQTT payload.
    ///
    /// A field inside `print` with an unexpected type is skipped on its
    /// own; the other fields of the report are still kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not JSON or `print` is not an object.
    pub fn parse(payload: &[u8]) -> Result<Self, ParseError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Fields of the `print` object this crate tracks.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct PrintReport {
    /// Bed temperature in °C.
    pub bed_temper: Option<f64>,
    /// Nozzle temperature in °C.
    pub nozzle_temper: Option<f64>,
    /// Print progress in percent.
    pub mc_percent: Option<u32>,
    /// Current layer.
    pub layer_num: Option<u32>,
    /// Total layers of the current job.
    pub total_layer_num: Option<u32>,
    /// Estimated minutes remaining.
    pub mc_remaining_time: Option<u32>,
}

impl From<Map<String, Value>> for PrintReport {
    fn from(fields: Map<String, Value>) -> Self {
        Self {
            bed_temper: field(&fields, "bed_temper", Value::as_f64),
            nozzle_temper: field(&fields, "nozzle_temper", Value::as_f64),
            mc_percent: field(&fields, "mc_percent", as_u32),
            layer_num: field(&fields, "layer_num", as_u32),
            total_layer_num: field(&fields, "total_layer_num", as_u32),
            mc_remaining_time: field(&fields, "mc_remaining_time", as_u32),
        }
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

/// Extracts `key`, skipping it with a warning if present but of the wrong type.
fn field<T>(fields: &Map<String, Value>, key: &str, extract: fn(&Value) -> Option<T>) -> Option<T> {
    let value = fields.get(key)?;
    let extracted = extract(value);
    if extracted.is_none() && !value.is_null() {
        tracing::warn!(field = key, %value, "Skipping telemetry field of unexpected type");
    }
    extracted
}

/// Latest known telemetry values.
///
/// Overwritten field by field; nothing is kept beyond the last value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySample {
    /// Bed temperature in °C.
    pub bed_temp_c: Option<f64>,
    /// Nozzle temperature in °C.
    pub nozzle_temp_c: Option<f64>,
    /// Print progress in percent.
    pub percent_complete: Option<u32>,
    /// Current layer.
    pub layer: Option<u32>,
    /// Total layers.
    pub total_layers: Option<u32>,
    /// Estimated minutes remaining.
    pub remaining_minutes: Option<u32>,
    /// When the last report was applied.
    pub updated_at: Option<DateTime<Utc>>,
}

impl TelemetrySample {
    /// Applies every field present in `report`, leaving the others untouched.
    pub fn apply(&mut self, report: &PrintReport, at: DateTime<Utc>) {
        fn merge<T: Copy>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        merge(&mut self.bed_temp_c, report.bed_temper);
        merge(&mut self.nozzle_temp_c, report.nozzle_temper);
        merge(&mut self.percent_complete, report.mc_percent);
        merge(&mut self.layer, report.layer_num);
        merge(&mut self.total_layers, report.total_layer_num);
        merge(&mut self.remaining_minutes, report.mc_remaining_time);
        self.updated_at = Some(at);
    }
}
