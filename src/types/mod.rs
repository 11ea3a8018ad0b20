// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared by the door controller and the print monitor.
//!
//! - [`DoorState`] - Open/Closed belief about the enclosure door
//! - [`PulseWidth`] - Servo pulse width in microseconds (500-2500)

mod door;
mod pulse_width;

pub use door::DoorState;
pub use pulse_width::PulseWidth;
