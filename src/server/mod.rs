// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP surface of the door controller.
//!
//! | Path | Response |
//! |---|---|
//! | `GET /state` | `{"open": bool}` |
//! | `GET /open`, `GET /close` | `ok` |
//! | `GET /move/:pos` | `Servo moved to <pos> µs` |
//! | `GET /setState/:state` | `ok` |
//! | `GET /pins` | `{"button", "limit", "open"}` |
//! | `GET /diag` | `{"daemon_connected": bool}` |
//! | `GET /scan` | level of each pin 17-27 |
//!
//! Actuator failures answer `500` with `pigpio not connected`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::controller::DoorController;
use crate::error::ActuatorError;
use crate::gpio::GpioBackend;
use crate::types::DoorState;

/// Body returned when the GPIO daemon cannot be reached.
pub const NOT_CONNECTED: &str = "pigpio not connected";

/// Builds the door controller router.
pub fn router<B: GpioBackend>(controller: Arc<DoorController<B>>) -> Router {
    Router::new()
        .route("/state", get(state::<B>))
        .route("/open", get(open::<B>))
        .route("/close", get(close::<B>))
        .route("/move/:pos", get(move_to::<B>))
        .route("/setState/:state", get(set_state::<B>))
        .route("/pins", get(pins::<B>))
        .route("/diag", get(diag::<B>))
        .route("/scan", get(scan::<B>))
        .layer(TraceLayer::new_for_http())
        .with_state(controller)
}

/// Maps an actuator failure to the `500` response.
struct ActuatorFailure(ActuatorError);

impl From<ActuatorError> for ActuatorFailure {
    fn from(error: ActuatorError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ActuatorFailure {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "Request failed on GPIO daemon");
        (StatusCode::INTERNAL_SERVER_ERROR, NOT_CONNECTED).into_response()
    }
}

type Shared<B> = State<Arc<DoorController<B>>>;

async fn state<B: GpioBackend>(State(controller): Shared<B>) -> Json<serde_json::Value> {
    Json(json!({ "open": controller.read_state().is_open() }))
}

async fn open<B: GpioBackend>(State(controller): Shared<B>) -> Result<&'static str, ActuatorFailure> {
    controller.open().await?;
    Ok("ok")
}

async fn close<B: GpioBackend>(State(controller): Shared<B>) -> Result<&'static str, ActuatorFailure> {
    controller.close().await?;
    Ok("ok")
}

async fn move_to<B: GpioBackend>(
    State(controller): Shared<B>,
    Path(pos): Path<u32>,
) -> Result<String, ActuatorFailure> {
    let pulse_width = controller.move_to(pos).await?;
    Ok(format!("Servo moved to {} µs", pulse_width.value()))
}

async fn set_state<B: GpioBackend>(
    State(controller): Shared<B>,
    Path(state): Path<String>,
) -> &'static str {
    controller.set_state(DoorState::from_path_segment(&state));
    "ok"
}

async fn pins<B: GpioBackend>(State(controller): Shared<B>) -> Response {
    match controller.pin_levels().await {
        Ok(levels) => Json(levels).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Pin read failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "no pigpio" })),
            )
                .into_response()
        }
    }
}

async fn diag<B: GpioBackend>(State(controller): Shared<B>) -> Json<serde_json::Value> {
    Json(json!({ "daemon_connected": controller.diagnose().await }))
}

async fn scan<B: GpioBackend>(State(controller): Shared<B>) -> Response {
    match controller.scan().await {
        Ok(levels) => Json(levels).into_response(),
        Err(e) => ActuatorFailure(e).into_response(),
    }
}
