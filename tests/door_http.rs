// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the door controller HTTP surface.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use door_opener::config::ControllerConfig;
use door_opener::gpio::{Level, SimulatedGpio};
use door_opener::{DoorController, DoorState, server};
use tower::ServiceExt;

fn app(gpio: &Arc<SimulatedGpio>) -> (Router, Arc<DoorController<SimulatedGpio>>) {
    let controller = Arc::new(DoorController::new(
        Arc::clone(gpio),
        &ControllerConfig::default(),
    ));
    (server::router(Arc::clone(&controller)), controller)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_str(&body).unwrap())
}

// ============================================================================
// State belief
// ============================================================================

mod state {
    use super::*;

    #[tokio::test]
    async fn starts_closed() {
        let gpio = Arc::new(SimulatedGpio::new());
        let (app, _) = app(&gpio);

        let (status, json) = get_json(&app, "/state").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({ "open": false }));
    }

    #[tokio::test]
    async fn set_state_then_read_without_moving() {
        let gpio = Arc::new(SimulatedGpio::new());
        let (app, _) = app(&gpio);

        let (status, body) = get(&app, "/setState/Open").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");

        let (_, json) = get_json(&app, "/state").await;
        assert_eq!(json, serde_json::json!({ "open": true }));
        assert!(gpio.pulses().is_empty());
    }
}

// ============================================================================
// Directional moves
// ============================================================================

mod moves {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn open_and_close() {
        let gpio = Arc::new(SimulatedGpio::new());
        let (app, controller) = app(&gpio);

        assert_eq!(get(&app, "/open").await, (StatusCode::OK, "ok".to_string()));
        assert_eq!(controller.read_state(), DoorState::Open);

        assert_eq!(get(&app, "/close").await, (StatusCode::OK, "ok".to_string()));
        assert_eq!(controller.read_state(), DoorState::Closed);

        assert_eq!(gpio.pulses(), vec![(18, 500), (18, 0), (18, 2000), (18, 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn open_twice_keeps_open() {
        let gpio = Arc::new(SimulatedGpio::new());
        let (app, _) = app(&gpio);

        get(&app, "/open").await;
        get(&app, "/open").await;

        let (_, json) = get_json(&app, "/state").await;
        assert_eq!(json["open"], true);
        assert_eq!(gpio.servo_moves(), vec![500, 500]);
    }

    #[tokio::test(start_paused = true)]
    async fn move_is_clamped() {
        let gpio = Arc::new(SimulatedGpio::new());
        let (app, controller) = app(&gpio);

        let (status, body) = get(&app, "/move/9999").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Servo moved to 2500 µs");

        let (_, body) = get(&app, "/move/1500").await;
        assert_eq!(body, "Servo moved to 1500 µs");

        assert_eq!(gpio.servo_moves(), vec![2500, 1500]);
        assert_eq!(controller.read_state(), DoorState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn daemon_down_is_500_and_state_unchanged() {
        let gpio = Arc::new(SimulatedGpio::unreachable());
        let (app, _) = app(&gpio);

        let (status, body) = get(&app, "/close").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, server::NOT_CONNECTED);

        let (status, _) = get(&app, "/move/1000").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (_, json) = get_json(&app, "/state").await;
        assert_eq!(json["open"], false);
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

mod diagnostics {
    use super::*;

    #[tokio::test]
    async fn pins_reports_levels_and_belief() {
        let gpio = Arc::new(SimulatedGpio::new());
        gpio.set_level(23, Level::High);
        let (app, controller) = app(&gpio);
        controller.set_state(DoorState::Open);

        let (status, json) = get_json(&app, "/pins").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            serde_json::json!({ "button": 1, "limit": 0, "open": true })
        );
    }

    #[tokio::test]
    async fn diag_tracks_daemon() {
        let gpio = Arc::new(SimulatedGpio::unreachable());
        let (app, _) = app(&gpio);

        let (_, json) = get_json(&app, "/diag").await;
        assert_eq!(json, serde_json::json!({ "daemon_connected": false }));

        gpio.set_reachable(true);
        let (_, json) = get_json(&app, "/diag").await;
        assert_eq!(json, serde_json::json!({ "daemon_connected": true }));
    }

    #[tokio::test]
    async fn scan_lists_pins_17_to_27() {
        let gpio = Arc::new(SimulatedGpio::new());
        gpio.set_level(22, Level::High);
        let (app, _) = app(&gpio);

        let (status, json) = get_json(&app, "/scan").await;
        assert_eq!(status, StatusCode::OK);

        let levels = json.as_object().unwrap();
        assert_eq!(levels.len(), 11);
        assert_eq!(levels["17"], 0);
        assert_eq!(levels["22"], 1);
        assert_eq!(levels["27"], 0);
    }
}
