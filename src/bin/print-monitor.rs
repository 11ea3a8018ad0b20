// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Print monitor service: printer telemetry to door commands.

use std::sync::Arc;

use anyhow::Context;
use door_opener::config::MonitorConfig;
use door_opener::monitor::{DoorClient, PrintMonitor, PrintTracker, TelemetrySession, router};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("door_opener=info")),
        )
        .init();

    let config = MonitorConfig::from_env().context("invalid print monitor configuration")?;
    let session = TelemetrySession::new(&config).context("cannot set up printer session")?;
    let door = DoorClient::new(&config.door_url, config.door_timeout)
        .context("cannot set up door client")?;
    let monitor = Arc::new(PrintMonitor::new(
        door,
        PrintTracker::new(config.door_open_temp),
        session.status(),
    ));

    tracing::info!(
        printer = %config.host,
        door = %config.door_url,
        threshold_c = config.door_open_temp,
        "Starting print monitor"
    );
    monitor.seed_belief().await;

    let cancel = CancellationToken::new();
    let (reports_tx, reports_rx) = mpsc::channel(64);

    let session_task = tokio::spawn(session.run(reports_tx, cancel.clone()));
    let reports_task = tokio::spawn({
        let monitor = Arc::clone(&monitor);
        let cancel = cancel.clone();
        async move { monitor.process_reports(reports_rx, cancel).await }
    });

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutting down");
            }
            cancel.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("cannot bind {}", config.listen_addr))?;
    axum::serve(listener, router(monitor))
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await
        .context("status server failed")?;

    cancel.cancel();
    let _ = tokio::join!(session_task, reports_task);
    Ok(())
}
