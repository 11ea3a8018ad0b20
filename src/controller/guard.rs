// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Debounce and busy windows for toggle inputs.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Why a toggle request was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A move is still physically in progress.
    Busy {
        /// Time left in the busy window.
        remaining: Duration,
    },
    /// The request came too soon after the last accepted toggle.
    Debounced {
        /// Time since the last accepted toggle.
        since_last: Duration,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy { remaining } => write!(f, "busy for another {remaining:?}"),
            Self::Debounced { since_last } => {
                write!(f, "debounced ({since_last:?} since last toggle)")
            }
        }
    }
}

/// The two timing windows that gate toggle inputs.
///
/// `busy_until` is the busy window's expiry; `last_accepted` is the debounce
/// window's anchor. Both start unset so the first toggle is always accepted.
#[derive(Debug, Clone)]
pub(crate) struct ToggleGuard {
    debounce: Duration,
    move_guard: Duration,
    busy_until: Option<Instant>,
    last_accepted: Option<Instant>,
}

impl ToggleGuard {
    pub(crate) const fn new(debounce: Duration, move_guard: Duration) -> Self {
        Self {
            debounce,
            move_guard,
            busy_until: None,
            last_accepted: None,
        }
    }

    /// Checks whether a toggle observed at `now` may proceed.
    pub(crate) fn check(&self, now: Instant) -> Result<(), Rejection> {
        if let Some(until) = self.busy_until
            && now < until
        {
            return Err(Rejection::Busy {
                remaining: until - now,
            });
        }

        if let Some(last) = self.last_accepted {
            let since_last = now.saturating_duration_since(last);
            if since_last < self.debounce {
                return Err(Rejection::Debounced { since_last });
            }
        }

        Ok(())
    }

    /// Anchors the debounce window at `now`.
    pub(crate) fn accept(&mut self, now: Instant) {
        self.last_accepted = Some(now);
    }

    /// Extends the busy window to `now + move_guard`.
    ///
    /// Never shortens a window that already reaches further.
    pub(crate) fn arm(&mut self, now: Instant) {
        let until = now + self.move_guard;
        self.busy_until = Some(self.busy_until.map_or(until, |current| current.max(until)));
    }
}
