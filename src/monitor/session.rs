// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Managed MQTT session to the printer.
//!
//! The session moves through `Disconnected -> Connecting -> Subscribed` and
//! back to `Disconnected` on any failure. Until the first subscription
//! succeeds, failures are retried after a fixed interval; once the session
//! has been up, reconnects use [`ReconnectBackoff`].

use std::fmt;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::ReconnectBackoff;
use super::tls;
use crate::config::MonitorConfig;
use crate::error::ProtocolError;

/// Largest accepted MQTT packet; full status pushes exceed the default.
const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Connection state of the telemetry session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    /// No connection; waiting to retry.
    #[default]
    Disconnected,
    /// Connecting or waiting for the subscription to be acknowledged.
    Connecting,
    /// Receiving telemetry.
    Subscribed,
}

impl SessionStatus {
    /// Returns the `ON`/`OFF` label shown by the status endpoint.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Subscribed => "ON",
            Self::Disconnected | Self::Connecting => "OFF",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
        };
        f.write_str(name)
    }
}

/// Session state machine and retry policy, independent of the transport.
#[derive(Debug)]
pub struct SessionSupervisor {
    status: watch::Sender<SessionStatus>,
    ever_subscribed: bool,
    initial_retry: Duration,
    backoff: ReconnectBackoff,
}

impl SessionSupervisor {
    /// Creates a disconnected supervisor.
    #[must_use]
    pub fn new(initial_retry: Duration, backoff: ReconnectBackoff) -> Self {
        Self {
            status: watch::Sender::new(SessionStatus::Disconnected),
            ever_subscribed: false,
            initial_retry,
            backoff,
        }
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Subscribes to status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Records that a connection attempt has started.
    pub fn on_connecting(&mut self) {
        self.status.send_replace(SessionStatus::Connecting);
    }

    /// Records that the broker accepted the connection.
    pub fn on_connected(&mut self) {
        self.backoff.reset();
        self.status.send_replace(SessionStatus::Connecting);
    }

    /// Records that the subscription was acknowledged.
    pub fn on_subscribed(&mut self) {
        self.ever_subscribed = true;
        self.status.send_replace(SessionStatus::Subscribed);
    }

    /// Records a failure and returns how long to wait before retrying.
    pub fn on_failure(&mut self) -> Duration {
        self.status.send_replace(SessionStatus::Disconnected);
        if self.ever_subscribed {
            self.backoff.next_delay()
        } else {
            self.initial_retry
        }
    }
}

/// MQTT session delivering raw telemetry payloads.
pub struct TelemetrySession {
    client: AsyncClient,
    event_loop: EventLoop,
    topic: String,
    supervisor: SessionSupervisor,
}

impl fmt::Debug for TelemetrySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetrySession")
            .field("topic", &self.topic)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

impl TelemetrySession {
    /// Prepares a session for the printer in `config`. Nothing connects
    /// until [`run`](Self::run) is polled.
    ///
    /// # Errors
    ///
    /// Returns an error if the CA file cannot be read or TLS cannot be set up.
    pub fn new(config: &MonitorConfig) -> Result<Self, ProtocolError> {
        let ca_pem = config
            .ca_cert
            .as_ref()
            .map(|path| {
                std::fs::read(path)
                    .map_err(|e| ProtocolError::Tls(format!("{}: {e}", path.display())))
            })
            .transpose()?;

        let client_id = format!("door_opener_{}", std::process::id());
        let mut options = MqttOptions::new(client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);
        options.set_credentials(&config.username, &config.access_code);
        options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        options.set_transport(Transport::tls_with_config(tls::configuration(ca_pem)?));

        let (client, event_loop) = AsyncClient::new(options, 10);

        Ok(Self {
            client,
            event_loop,
            topic: config.report_topic(),
            supervisor: SessionSupervisor::new(config.initial_retry, config.backoff.clone()),
        })
    }

    /// Subscribes to session status changes.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.supervisor.subscribe()
    }

    /// Runs the session until `cancel` fires, forwarding every report
    /// payload to `payloads`.
    ///
    /// Connection failures are logged and retried forever.
    pub async fn run(mut self, payloads: mpsc::Sender<Vec<u8>>, cancel: CancellationToken) {
        self.supervisor.on_connecting();

        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = self.event_loop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                    tracing::debug!(?connack, "Printer broker connected");
                    self.supervisor.on_connected();
                    if let Err(e) = subscribe(&self.client, &self.topic) {
                        tracing::error!(topic = %self.topic, error = %e, "Failed to queue subscription");
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(suback))) => {
                    tracing::debug!(?suback, "Subscription acknowledged");
                    self.supervisor.on_subscribed();
                    tracing::info!(topic = %self.topic, "Receiving printer telemetry");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if let Err(e) = payloads.try_send(publish.payload.to_vec()) {
                        tracing::warn!(error = %e, "Dropping telemetry report");
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    tracing::info!("Printer broker disconnected");
                }
                Ok(_) => {}
                Err(e) => {
                    let delay = self.supervisor.on_failure();
                    tracing::warn!(
                        error = %e,
                        retry_in_secs = delay.as_secs_f32(),
                        "Printer broker connection failed"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                    self.supervisor.on_connecting();
                }
            }
        }

        let _ = self.client.try_disconnect();
        tracing::debug!("Telemetry session stopped");
    }
}

/// Queues the report subscription on `client`.
fn subscribe(client: &AsyncClient, topic: &str) -> Result<(), ProtocolError> {
    client.try_subscribe(topic, QoS::AtMostOnce)?;
    Ok(())
}
