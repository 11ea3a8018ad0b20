// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Door controller service: HTTP surface plus hardware inputs.

use std::sync::Arc;

use anyhow::Context;
use door_opener::config::{BackendKind, ControllerConfig};
use door_opener::gpio::{GpioBackend, PigpioBackend, SimulatedGpio};
use door_opener::{DoorController, server};
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

    let config = ControllerConfig::from_env().context("invalid door controller configuration")?;

    match config.backend {
        BackendKind::Pigpio => {
            let gpio = PigpioBackend::new(&config.pigpio_host, config.pigpio_port)
                .with_connect_timeout(config.connect_timeout);
            serve(Arc::new(gpio), &config).await
        }
        BackendKind::Simulated => {
            tracing::warn!("Using simulated GPIO backend, the servo will not move");
            serve(Arc::new(SimulatedGpio::new()), &config).await
        }
    }
}

async fn serve<B: GpioBackend>(gpio: Arc<B>, config: &ControllerConfig) -> anyhow::Result<()> {
    let controller = Arc::new(DoorController::new(gpio, config));
    let cancel = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(16);

    let inputs = tokio::spawn({
        let controller = Arc::clone(&controller);
        let cancel = cancel.clone();
        async move { controller.supervise_inputs(events_tx, cancel).await }
    });

    let arbiter = tokio::spawn({
        let controller = Arc::clone(&controller);
        let cancel = cancel.clone();
        async move { controller.run(events_rx, cancel).await }
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
    tracing::info!(
        addr = %config.listen_addr,
        pigpio = %format!("{}:{}", config.pigpio_host, config.pigpio_port),
        "Door controller listening"
    );

    axum::serve(listener, server::router(controller))
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await
        .context("HTTP server failed")?;

    cancel.cancel();
    let _ = tokio::join!(inputs, arbiter);
    Ok(())
}
