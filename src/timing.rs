// Copyright 2025 The parabench developers
//
// Licensed under the Apache License, Version 2.0
// <https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <https://opensource.org/licenses/MIT>, at your option. This file may not
// be copied, modified, or distributed except according to those terms.

//! High-resolution timestamps on the thread CPU-time and monotonic clocks.

use crate::error::Result;
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
use nix::time::{clock_gettime, ClockId};

/// Clock to read a [`Timestamp`] from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Clock {
    /// CPU time consumed by the calling thread.
    ThreadCpu,
    /// Monotonic wall-clock time.
    Monotonic,
}

impl Clock {
    /// Returns a human-readable name of this clock.
    pub fn name(self) -> &'static str {
        match self {
            Clock::ThreadCpu => "thread CPU-time",
            Clock::Monotonic => "monotonic",
        }
    }
}

/// A point in time, split into whole seconds and nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    secs: i64,
    nanos: i64,
}

impl Timestamp {
    /// Creates a timestamp from its components.
    pub fn new(secs: i64, nanos: i64) -> Self {
        Self { secs, nanos }
    }

    /// Reads the given clock.
    #[cfg(all(
        not(miri),
        any(
            target_os = "android",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "linux"
        )
    ))]
    pub fn now(clock: Clock) -> Result<Self> {
        let clock_id = match clock {
            Clock::ThreadCpu => ClockId::CLOCK_THREAD_CPUTIME_ID,
            Clock::Monotonic => ClockId::CLOCK_MONOTONIC,
        };
        let time = clock_gettime(clock_id).map_err(|e| crate::error::BenchError::Clock {
            clock: clock.name(),
            source: e.into(),
        })?;
        Ok(Self {
            secs: i64::from(time.tv_sec()),
            nanos: i64::from(time.tv_nsec()),
        })
    }

    /// Reads the given clock.
    ///
    /// On this platform, both clocks are backed by a monotonic [`Instant`].
    ///
    /// [`Instant`]: std::time::Instant
    #[cfg(any(
        miri,
        not(any(
            target_os = "android",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "linux"
        ))
    ))]
    pub fn now(_clock: Clock) -> Result<Self> {
        use std::sync::OnceLock;
        use std::time::Instant;

        static ORIGIN: OnceLock<Instant> = OnceLock::new();
        let elapsed = ORIGIN.get_or_init(Instant::now).elapsed();
        Ok(Self {
            secs: elapsed.as_secs() as i64,
            nanos: i64::from(elapsed.subsec_nanos()),
        })
    }

    /// Returns the time elapsed since `start`, in milliseconds.
    ///
    /// Whole seconds and nanoseconds are subtracted separately, so a
    /// nanosecond field that wraps around between both timestamps is
    /// accounted for.
    pub fn millis_since(&self, start: &Timestamp) -> f64 {
        (self.secs - start.secs) as f64 * 1000.0 + (self.nanos - start.nanos) as f64 / 1e6
    }
}
