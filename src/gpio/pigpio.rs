// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! pigpio socket interface.
//!
//! `pigpiod` accepts fixed 16-byte little-endian frames on its control
//! socket: `cmd, p1, p2, p3`. It answers with the same layout where the last
//! word is the result; negative results are pigpio error codes.
//!
//! Edge notifications use a second socket. After `NOIB` turns that socket
//! into a notification stream and `NB` selects the pins, the daemon writes a
//! 12-byte report (`seqno: u16, flags: u16, tick: u32, level: u32`) whenever
//! a watched level changes.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::{EdgeWatch, GpioBackend, InputPin, Level, Pull};
use crate::controller::InputEvent;
use crate::error::ActuatorError;

/// pigpio command numbers used by this backend.
mod cmd {
    pub const MODES: u32 = 0;
    pub const PUD: u32 = 2;
    pub const READ: u32 = 3;
    pub const SERVO: u32 = 8;
    pub const BR1: u32 = 10;
    pub const NB: u32 = 19;
    pub const NC: u32 = 21;
    pub const FG: u32 = 97;
    pub const NOIB: u32 = 99;
}

const MODE_INPUT: u32 = 0;

/// Report flags that carry no level information (watchdog, keep-alive, event).
const NON_LEVEL_FLAGS: u16 = (1 << 5) | (1 << 6) | (1 << 7);

const COMMAND_FRAME_LEN: usize = 16;
const REPORT_FRAME_LEN: usize = 12;

/// Encodes a control socket request frame.
pub(crate) fn encode_command(command: u32, p1: u32, p2: u32) -> [u8; COMMAND_FRAME_LEN] {
    let mut frame = [0u8; COMMAND_FRAME_LEN];
    frame[0..4].copy_from_slice(&command.to_le_bytes());
    frame[4..8].copy_from_slice(&p1.to_le_bytes());
    frame[8..12].copy_from_slice(&p2.to_le_bytes());
    frame
}

/// Decodes a control socket response frame into its non-negative result.
pub(crate) fn decode_response(
    command: u32,
    frame: &[u8; COMMAND_FRAME_LEN],
) -> Result<u32, ActuatorError> {
    let status = i32::from_le_bytes([frame[12], frame[13], frame[14], frame[15]]);
    u32::try_from(status).map_err(|_| ActuatorError::Rejected { command, status })
}

/// A level-change report from the notification socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Report {
    pub seqno: u16,
    pub flags: u16,
    pub tick: u32,
    pub level: u32,
}

impl Report {
    pub(crate) fn decode(frame: &[u8; REPORT_FRAME_LEN]) -> Self {
        Self {
            seqno: u16::from_le_bytes([frame[0], frame[1]]),
            flags: u16::from_le_bytes([frame[2], frame[3]]),
            tick: u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]),
            level: u32::from_le_bytes([frame[8], frame[9], frame[10], frame[11]]),
        }
    }
}

/// Turns successive bank-1 level snapshots into edge matches.
#[derive(Debug)]
pub(crate) struct EdgeDetector {
    watches: Vec<EdgeWatch>,
    last_levels: u32,
}

impl EdgeDetector {
    pub(crate) fn new(watches: Vec<EdgeWatch>, initial_levels: u32) -> Self {
        Self {
            watches,
            last_levels: initial_levels,
        }
    }

    /// Bitmask of the watched pins, as passed to `NB`.
    pub(crate) fn bitmask(&self) -> u32 {
        self.watches
            .iter()
            .fold(0, |mask, watch| mask | pin_bit(watch.pin))
    }

    /// Returns the watches whose edge occurred in this report.
    pub(crate) fn feed(&mut self, report: &Report) -> Vec<EdgeWatch> {
        if report.flags & NON_LEVEL_FLAGS != 0 {
            return Vec::new();
        }

        let changed = self.last_levels ^ report.level;
        self.last_levels = report.level;

        self.watches
            .iter()
            .filter(|watch| {
                let bit = pin_bit(watch.pin);
                changed & bit != 0 && watch.edge.matches(Level::from(report.level & bit != 0))
            })
            .copied()
            .collect()
    }
}

fn pin_bit(pin: u8) -> u32 {
    1u32.checked_shl(u32::from(pin)).unwrap_or(0)
}

async fn exchange(
    stream: &mut TcpStream,
    command: u32,
    p1: u32,
    p2: u32,
) -> Result<u32, ActuatorError> {
    stream.write_all(&encode_command(command, p1, p2)).await?;
    let mut frame = [0u8; COMMAND_FRAME_LEN];
    stream.read_exact(&mut frame).await?;
    decode_response(command, &frame)
}

/// GPIO backend speaking the pigpio socket protocol.
///
/// The control connection is opened lazily and dropped on the first I/O
/// error, so a restarted daemon is picked up by the next command.
///
/// # Examples
///
/// ```no_run
/// use door_opener::gpio::{GpioBackend, PigpioBackend};
///
/// # async fn example() -> Result<(), door_opener::error::ActuatorError> {
/// let backend = PigpioBackend::new("pigpio", PigpioBackend::DEFAULT_PORT);
/// backend.connect().await?;
/// backend.set_servo_pulsewidth(18, 1500).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PigpioBackend {
    host: String,
    port: u16,
    connect_timeout: Duration,
    control: Mutex<Option<TcpStream>>,
    connected: AtomicBool,
}

impl PigpioBackend {
    /// Default `pigpiod` port.
    pub const DEFAULT_PORT: u16 = 8888;

    /// Default timeout for opening a daemon socket.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

    /// Creates a backend for the daemon at `host:port`. No connection is made yet.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            control: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Sets the socket connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Returns the daemon address as `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn open_socket(&self) -> Result<TcpStream, ActuatorError> {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "pigpio connect timed out"))??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    async fn command(&self, command: u32, p1: u32, p2: u32) -> Result<u32, ActuatorError> {
        let mut control = self.control.lock().await;
        let stream = control.as_mut().ok_or(ActuatorError::NotConnected)?;

        match exchange(stream, command, p1, p2).await {
            Err(ActuatorError::Io(e)) => {
                *control = None;
                self.connected.store(false, Ordering::Release);
                tracing::warn!(
                    address = %self.address(),
                    command,
                    error = %e,
                    "pigpio connection lost"
                );
                Err(ActuatorError::Io(e))
            }
            other => other,
        }
    }
}

impl GpioBackend for PigpioBackend {
    async fn connect(&self) -> Result<(), ActuatorError> {
        let mut control = self.control.lock().await;
        if control.is_some() {
            return Ok(());
        }

        let stream = self.open_socket().await?;
        *control = Some(stream);
        self.connected.store(true, Ordering::Release);
        tracing::info!(address = %self.address(), "Connected to pigpio daemon");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn set_servo_pulsewidth(&self, pin: u8, pulse_width_us: u16) -> Result<(), ActuatorError> {
        self.command(cmd::SERVO, u32::from(pin), u32::from(pulse_width_us))
            .await
            .map(|_| ())
    }

    async fn read(&self, pin: u8) -> Result<Level, ActuatorError> {
        let level = self.command(cmd::READ, u32::from(pin), 0).await?;
        Ok(Level::from(level != 0))
    }

    async fn configure_input(&self, input: InputPin) -> Result<(), ActuatorError> {
        let pin = u32::from(input.pin);
        let pull = match input.pull {
            Pull::Off => 0,
            Pull::Down => 1,
            Pull::Up => 2,
        };

        self.command(cmd::MODES, pin, MODE_INPUT).await?;
        self.command(cmd::PUD, pin, pull).await?;
        if input.glitch_filter_us > 0 {
            self.command(cmd::FG, pin, input.glitch_filter_us).await?;
        }

        tracing::debug!(pin = input.pin, pull = ?input.pull, "Configured input pin");
        Ok(())
    }

    async fn watch_edges(
        &self,
        watches: Vec<EdgeWatch>,
        events: mpsc::Sender<InputEvent>,
        cancel: CancellationToken,
    ) -> Result<(), ActuatorError> {
        let mut notify = self.open_socket().await?;
        let handle = exchange(&mut notify, cmd::NOIB, 0, 0).await?;

        let initial_levels = self.command(cmd::BR1, 0, 0).await?;
        let mut detector = EdgeDetector::new(watches, initial_levels);
        self.command(cmd::NB, handle, detector.bitmask()).await?;

        tracing::info!(
            address = %self.address(),
            handle,
            mask = %format!("{:#010x}", detector.bitmask()),
            "Edge notifications started"
        );

        let mut frame = [0u8; REPORT_FRAME_LEN];
        let result = loop {
            tokio::select! {
                () = cancel.cancelled() => break Ok(()),
                read = notify.read_exact(&mut frame) => {
                    if let Err(e) = read {
                        break Err(ActuatorError::Io(e));
                    }

                    let report = Report::decode(&frame);
                    let mut receiver_gone = false;
                    for watch in detector.feed(&report) {
                        tracing::debug!(
                            pin = watch.pin,
                            source = %watch.source,
                            tick = report.tick,
                            "Edge detected"
                        );
                        if events.send(InputEvent::now(watch.source)).await.is_err() {
                            receiver_gone = true;
                            break;
                        }
                    }
                    if receiver_gone {
                        break Ok(());
                    }
                }
            }
        };

        if let Err(e) = self.command(cmd::NC, handle, 0).await {
            tracing::debug!(handle, error = %e, "Failed to close notification handle");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::InputSource;
    use crate::gpio::Edge;

    fn report(level: u32) -> Report {
        Report {
            seqno: 0,
            flags: 0,
            tick: 0,
            level,
        }
    }

    fn watches() -> Vec<EdgeWatch> {
        vec![
            EdgeWatch {
                pin: 23,
                edge: Edge::Rising,
                source: InputSource::Button,
            },
            EdgeWatch {
                pin: 25,
                edge: Edge::Falling,
                source: InputSource::LimitSwitch,
            },
        ]
    }

    #[test]
    fn encode_servo_frame() {
        let frame = encode_command(cmd::SERVO, 18, 2000);
        assert_eq!(&frame[0..4], &[8, 0, 0, 0]);
        assert_eq!(&frame[4..8], &[18, 0, 0, 0]);
        assert_eq!(&frame[8..12], &2000u32.to_le_bytes());
        assert_eq!(&frame[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn decode_success_response() {
        let mut frame = encode_command(cmd::READ, 23, 0);
        frame[12..16].copy_from_slice(&1i32.to_le_bytes());
        assert_eq!(decode_response(cmd::READ, &frame).unwrap(), 1);
    }

    #[test]
    fn decode_error_response() {
        let mut frame = encode_command(cmd::SERVO, 18, 9000);
        frame[12..16].copy_from_slice(&(-7i32).to_le_bytes());
        let err = decode_response(cmd::SERVO, &frame).unwrap_err();
        assert!(matches!(
            err,
            ActuatorError::Rejected {
                command: 8,
                status: -7
            }
        ));
    }

    #[test]
    fn decode_report_frame() {
        let mut frame = [0u8; REPORT_FRAME_LEN];
        frame[0..2].copy_from_slice(&7u16.to_le_bytes());
        frame[2..4].copy_from_slice(&0u16.to_le_bytes());
        frame[4..8].copy_from_slice(&123_456u32.to_le_bytes());
        frame[8..12].copy_from_slice(&(1u32 << 23).to_le_bytes());

        let report = Report::decode(&frame);
        assert_eq!(report.seqno, 7);
        assert_eq!(report.tick, 123_456);
        assert_eq!(report.level, 1 << 23);
    }

    #[test]
    fn detector_bitmask() {
        let detector = EdgeDetector::new(watches(), 0);
        assert_eq!(detector.bitmask(), (1 << 23) | (1 << 25));
    }

    #[test]
    fn detector_reports_rising_button() {
        // Limit switch idles high (pull-up), button idles low (pull-down)
        let mut detector = EdgeDetector::new(watches(), 1 << 25);
        let fired = detector.feed(&report((1 << 25) | (1 << 23)));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].source, InputSource::Button);

        // Button release is the wrong edge
        assert!(detector.feed(&report(1 << 25)).is_empty());
    }

    #[test]
    fn detector_reports_falling_limit() {
        let mut detector = EdgeDetector::new(watches(), 1 << 25);
        let fired = detector.feed(&report(0));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].source, InputSource::LimitSwitch);
    }

    #[test]
    fn detector_ignores_unwatched_pins() {
        let mut detector = EdgeDetector::new(watches(), 0);
        assert!(detector.feed(&report(1 << 4)).is_empty());
    }

    #[test]
    fn detector_ignores_keepalive() {
        let mut detector = EdgeDetector::new(watches(), 0);
        let keepalive = Report {
            flags: 1 << 6,
            ..report(1 << 23)
        };
        assert!(detector.feed(&keepalive).is_empty());
        // Levels were not taken from the keep-alive, so the real edge still fires
        assert_eq!(detector.feed(&report(1 << 23)).len(), 1);
    }

    #[test]
    fn backend_starts_disconnected() {
        let backend = PigpioBackend::new("localhost", PigpioBackend::DEFAULT_PORT);
        assert!(!backend.is_connected());
        assert_eq!(backend.address(), "localhost:8888");
    }

    #[tokio::test]
    async fn command_without_connection_fails() {
        let backend = PigpioBackend::new("localhost", PigpioBackend::DEFAULT_PORT);
        let err = backend.set_servo_pulsewidth(18, 1500).await.unwrap_err();
        assert!(matches!(err, ActuatorError::NotConnected));
    }
}
