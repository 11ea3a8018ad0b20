// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Toggle requests delivered to the arbitration loop.

use std::fmt;

use tokio::time::Instant;

/// Where a toggle request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSource {
    /// The push button on the enclosure.
    Button,
    /// The mechanical limit switch.
    LimitSwitch,
    /// A toggle requested by another process over the event channel.
    RemoteCommand,
}

impl InputSource {
    /// Returns the name used in log output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Button => "button",
            Self::LimitSwitch => "limit_switch",
            Self::RemoteCommand => "remote",
        }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A toggle request stamped with the instant it was observed.
///
/// The timestamp is taken where the edge was seen, not where the event is
/// evaluated, so a request that waited behind a move is still judged against
/// the guard windows as of when it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    /// Origin of the request.
    pub source: InputSource,
    /// When the request was observed.
    pub at: Instant,
}

impl InputEvent {
    /// Creates an event stamped with the current instant.
    #[must_use]
    pub fn now(source: InputSource) -> Self {
        Self {
            source,
            at: Instant::now(),
        }
    }
}
