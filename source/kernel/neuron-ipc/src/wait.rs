// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Blocking policy applied uniformly to both ends of a port.

use core::time::Duration;
use std::time::Instant;

/// Behaviour of a blocking call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Block until the operation completes or the port dies.
    Blocking,
    /// Return immediately if no progress can be made.
    NonBlocking,
    /// Block until the operation completes, the port dies, or the timeout expires.
    Timeout(Duration),
}

impl Wait {
    /// Returns `true` when the caller requested a non-blocking attempt.
    pub const fn is_non_blocking(self) -> bool {
        matches!(self, Self::NonBlocking)
    }

    /// Converts a [`Wait::Timeout`] variant into its [`Duration`].
    pub const fn timeout(self) -> Option<Duration> {
        match self {
            Self::Timeout(duration) => Some(duration),
            Self::Blocking | Self::NonBlocking => None,
        }
    }

    pub(crate) fn deadline(self) -> Deadline {
        match self {
            Self::Blocking => Deadline::Never,
            Self::NonBlocking => Deadline::Now,
            // Saturate absurd timeouts to an unbounded wait.
            Self::Timeout(duration) => match Instant::now().checked_add(duration) {
                Some(at) => Deadline::At(at),
                None => Deadline::Never,
            },
        }
    }
}

/// Absolute form of a [`Wait`] computed once at the start of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Deadline {
    Never,
    Now,
    At(Instant),
}

impl Deadline {
    pub(crate) fn expired(self) -> bool {
        match self {
            Self::Never => false,
            Self::Now => true,
            Self::At(at) => Instant::now() >= at,
        }
    }
}
