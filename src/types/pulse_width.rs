// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Servo pulse width type.
//!
//! Hobby servos take a 50 Hz PWM signal whose high time selects the horn
//! angle. The safe range for the door servo is 500-2500 microseconds.

use std::fmt;

use serde::Serialize;

use crate::error::ValueError;

/// Servo pulse width in microseconds, always within 500-2500.
///
/// # Examples
///
/// ```
/// use door_opener::types::PulseWidth;
///
/// let pw = PulseWidth::new(1500).unwrap();
/// assert_eq!(pw.value(), 1500);
///
/// // Out of range values are rejected by `new` but clamped by `clamped`
/// assert!(PulseWidth::new(9999).is_err());
/// assert_eq!(PulseWidth::clamped(9999), PulseWidth::MAX);
/// assert_eq!(PulseWidth::clamped(0), PulseWidth::MIN);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PulseWidth(u16);

impl PulseWidth {
    /// Shortest accepted pulse (500 µs).
    pub const MIN: Self = Self(500);

    /// Longest accepted pulse (2500 µs).
    pub const MAX: Self = Self(2500);

    /// Creates a pulse width, rejecting values outside 500-2500.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if the value is outside the range.
    pub fn new(micros: u32) -> Result<Self, ValueError> {
        if !(u32::from(Self::MIN.0)..=u32::from(Self::MAX.0)).contains(&micros) {
            return Err(ValueError::OutOfRange {
                min: u32::from(Self::MIN.0),
                max: u32::from(Self::MAX.0),
                actual: micros,
            });
        }
        Ok(Self::clamped(micros))
    }

    /// Creates a pulse width, clamping to 500-2500.
    #[must_use]
    pub const fn clamped(micros: u32) -> Self {
        if micros < Self::MIN.0 as u32 {
            Self::MIN
        } else if micros > Self::MAX.0 as u32 {
            Self::MAX
        } else {
            // Safe: bounded by MAX above
            #[allow(clippy::cast_possible_truncation)]
            Self(micros as u16)
        }
    }

    /// Returns the pulse width in microseconds.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PulseWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} µs", self.0)
    }
}

impl TryFrom<u32> for PulseWidth {
    type Error = ValueError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
