// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Door position belief.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether the enclosure door is believed to be open or closed.
///
/// This is a belief, not a measurement: nothing senses the door position.
/// It changes when the controller commands a move or when someone
/// overwrites it through [`DoorController::set_state`](crate::DoorController::set_state).
///
/// # Examples
///
/// ```
/// use door_opener::types::DoorState;
///
/// let state = DoorState::Closed;
/// assert_eq!(state.toggled(), DoorState::Open);
/// assert!(state.toggled().is_open());
/// assert_eq!(DoorState::from_open(false), DoorState::Closed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DoorState {
    /// The door is open.
    Open,
    /// The door is closed.
    #[default]
    Closed,
}

impl DoorState {
    /// Returns `true` for [`DoorState::Open`].
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns the opposite state.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Open => Self::Closed,
            Self::Closed => Self::Open,
        }
    }

    /// Converts an `open` flag, as carried by the `/state` endpoint.
    #[must_use]
    pub const fn from_open(open: bool) -> Self {
        if open { Self::Open } else { Self::Closed }
    }

    /// Interprets the `/setState/<state>` path segment.
    ///
    /// Only the exact string `Open` means open; anything else is closed.
    #[must_use]
    pub fn from_path_segment(segment: &str) -> Self {
        Self::from_open(segment == "Open")
    }

    /// Returns the display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_closed() {
        assert_eq!(DoorState::default(), DoorState::Closed);
    }

    #[test]
    fn toggled_twice_is_identity() {
        for state in [DoorState::Open, DoorState::Closed] {
            assert_eq!(state.toggled().toggled(), state);
            assert_ne!(state.toggled(), state);
        }
    }

    #[test]
    fn path_segment_is_exact_match() {
        assert_eq!(DoorState::from_path_segment("Open"), DoorState::Open);
        assert_eq!(DoorState::from_path_segment("open"), DoorState::Closed);
        assert_eq!(DoorState::from_path_segment("Closed"), DoorState::Closed);
        assert_eq!(DoorState::from_path_segment(""), DoorState::Closed);
    }

    #[test]
    fn display() {
        assert_eq!(DoorState::Open.to_string(), "Open");
        assert_eq!(DoorState::Closed.to_string(), "Closed");
    }
}
