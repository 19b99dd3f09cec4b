// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Web backend for cadence.
//!
//! - [`RafTicks`]: `requestAnimationFrame` tick source.
//! - [`frame_loop`]: a [`FrameLoop`] wired to `RafTicks` with the web
//!   configuration.

#![no_std]

extern crate alloc;

mod raf;

pub use raf::RafTicks;

use cadence_core::driver::{FrameLoop, FrameLoopConfig};
use cadence_core::root::RootSet;
use cadence_core::time::{HostTime, Timebase};

/// Returns the current host time from `performance.now()`.
///
/// The returned [`HostTime`] is in microsecond ticks. Use [`timebase`] to
/// convert to nanoseconds.
#[must_use]
pub fn now() -> HostTime {
    host_time_from_dom_timestamp(raf::performance_now())
}

/// Returns the web [`Timebase`]: 1 tick = 1 µs = 1000 ns.
#[must_use]
pub fn timebase() -> Timebase {
    Timebase::MICROS
}

/// Converts a `DOMHighResTimeStamp` (milliseconds) to microsecond ticks.
///
/// Negative and NaN timestamps map to zero.
#[must_use]
pub fn host_time_from_dom_timestamp(ms: f64) -> HostTime {
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "DOM timestamps are small positive f64; µs fits in u64 and `as` saturates"
    )]
    let us = (ms * 1000.0) as u64;
    HostTime(us)
}

/// Creates a [`FrameLoop`] over `roots` ticking on `requestAnimationFrame`.
#[must_use]
pub fn frame_loop(roots: RootSet) -> FrameLoop {
    FrameLoop::new(roots, RafTicks::new(), FrameLoopConfig::web())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timebase_is_microsecond() {
        let tb = timebase();
        // 1 tick = 1 µs = 1000 ns
        assert_eq!(tb.ticks_to_nanos(1), 1000);
        assert_eq!(tb.ticks_to_nanos(1_000_000), 1_000_000_000);
        assert_eq!(FrameLoopConfig::web().timebase, tb);
    }

    #[test]
    fn dom_timestamps_become_microseconds() {
        assert_eq!(host_time_from_dom_timestamp(16.5), HostTime(16_500));
        assert_eq!(host_time_from_dom_timestamp(1000.0), HostTime(1_000_000));
        assert_eq!(host_time_from_dom_timestamp(0.0), HostTime(0));
    }

    #[test]
    fn bad_dom_timestamps_saturate_to_zero() {
        assert_eq!(host_time_from_dom_timestamp(-5.0), HostTime(0));
        assert_eq!(host_time_from_dom_timestamp(f64::NAN), HostTime(0));
    }

    #[test]
    fn fresh_source_has_nothing_scheduled() {
        let ticks = RafTicks::new();
        assert_eq!(ticks.pending(), 0);
        assert!(!ticks.is_scheduled());
    }
}
