// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the print monitor against a mocked door controller.

use std::time::Duration;

use door_opener::monitor::{DoorClient, DoorCommand, PrintMonitor, PrintTracker, SessionStatus};
use door_opener::ProtocolError;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bed(temp: f64) -> Vec<u8> {
    format!(r#"{{"print": {{"bed_temper": {temp}}}}}"#).into_bytes()
}

fn monitor(server: &MockServer) -> PrintMonitor {
    let door = DoorClient::new(server.uri(), Duration::from_secs(5)).unwrap();
    let (_, session) = watch::channel(SessionStatus::Subscribed);
    PrintMonitor::new(door, PrintTracker::new(45.0), session)
}

async fn mount_ok(server: &MockServer, route: &str, expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(expected)
        .mount(server)
        .await;
}

// ============================================================================
// DoorClient
// ============================================================================

mod door_client {
    use super::*;

    #[tokio::test]
    async fn reads_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/state"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "open": true })),
            )
            .mount(&server)
            .await;

        let client = DoorClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert!(client.state().await.unwrap());
    }

    #[tokio::test]
    async fn sends_commands() {
        let server = MockServer::start().await;
        mount_ok(&server, "/open", 1).await;
        mount_ok(&server, "/close", 1).await;

        let client = DoorClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        client.open().await.unwrap();
        client.send(DoorCommand::Close).await.unwrap();
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/open"))
            .respond_with(ResponseTemplate::new(500).set_body_string("pigpio not connected"))
            .mount(&server)
            .await;

        let client = DoorClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert!(matches!(
            client.open().await,
            Err(ProtocolError::UnexpectedStatus(500))
        ));
    }

    #[tokio::test]
    async fn malformed_state_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/state"))
            .respond_with(ResponseTemplate::new(200).set_body_string("open"))
            .mount(&server)
            .await;

        let client = DoorClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert!(client.state().await.is_err());
    }
}

// ============================================================================
// Threshold automation
// ============================================================================

mod automation {
    use super::*;

    #[tokio::test]
    async fn cool_then_reheat_sends_one_open_and_one_close() {
        let server = MockServer::start().await;
        mount_ok(&server, "/open", 1).await;
        mount_ok(&server, "/close", 1).await;

        let monitor = monitor(&server);
        for temp in [50.0, 44.0, 46.0] {
            monitor.handle_payload(&bed(temp)).await;
        }

        assert!(!monitor.door_open());
        server.verify().await;
    }

    #[tokio::test]
    async fn seeded_open_belief_suppresses_open() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/state"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "open": true })),
            )
            .mount(&server)
            .await;
        mount_ok(&server, "/open", 0).await;

        let monitor = monitor(&server);
        monitor.seed_belief().await;
        assert!(monitor.door_open());

        monitor.handle_payload(&bed(30.0)).await;
        server.verify().await;
    }

    #[tokio::test]
    async fn seed_failure_assumes_closed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/state"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let monitor = monitor(&server);
        monitor.seed_belief().await;
        assert!(!monitor.door_open());
    }

    #[tokio::test]
    async fn failed_open_is_retried_on_next_report() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/open"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        mount_ok(&server, "/open", 1).await;

        let monitor = monitor(&server);
        monitor.handle_payload(&bed(40.0)).await;
        assert!(!monitor.door_open());

        monitor.handle_payload(&bed(39.0)).await;
        assert!(monitor.door_open());
        server.verify().await;
    }

    #[tokio::test]
    async fn malformed_and_unrelated_reports_are_ignored() {
        let server = MockServer::start().await;
        mount_ok(&server, "/open", 0).await;

        let monitor = monitor(&server);
        monitor.handle_payload(b"\xff\xfe not json").await;
        monitor
            .handle_payload(br#"{"info": {"command": "get_version"}}"#)
            .await;
        monitor
            .handle_payload(br#"{"print": {"nozzle_temper": 25.0}}"#)
            .await;

        assert_eq!(monitor.status().nozzle_temp, Some(25.0));
        server.verify().await;
    }

    #[tokio::test]
    async fn mistyped_progress_does_not_block_open() {
        let server = MockServer::start().await;
        mount_ok(&server, "/open", 1).await;

        let monitor = monitor(&server);
        monitor
            .handle_payload(br#"{"print": {"bed_temper": 30.0, "mc_percent": 42.5}}"#)
            .await;

        assert!(monitor.door_open());
        assert_eq!(monitor.status().bed_temp, Some(30.0));
        server.verify().await;
    }

    #[tokio::test]
    async fn process_reports_until_cancelled() {
        let server = MockServer::start().await;
        mount_ok(&server, "/open", 1).await;

        let monitor = monitor(&server);
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        tx.send(bed(60.0)).await.unwrap();
        tx.send(bed(41.5)).await.unwrap();
        drop(tx);

        monitor.process_reports(rx, cancel).await;
        assert!(monitor.door_open());
        server.verify().await;
    }
}
