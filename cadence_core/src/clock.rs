// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-root frame clock.
//!
//! [`FrameClock`] turns the host timestamps delivered with each tick into the
//! `f64` second deltas that stages and subscriptions consume. It never reads
//! a system clock itself: every sample comes from the driver, which keeps the
//! whole pipeline deterministic under a manual tick source.

use crate::time::{HostTime, Timebase};

/// Elapsed-time tracker for a single root.
#[derive(Clone, Debug)]
pub struct FrameClock {
    running: bool,
    auto_start: bool,
    last_sample: Option<HostTime>,
    elapsed_time: f64,
    old_time: f64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    /// Creates a stopped clock that starts on its first sample.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            running: false,
            auto_start: true,
            last_sample: None,
            elapsed_time: 0.0,
            old_time: 0.0,
        }
    }

    /// Starts (or restarts) the clock. Elapsed time is reset and the next
    /// sample establishes the reference point.
    pub fn start(&mut self) {
        self.running = true;
        self.last_sample = None;
        self.elapsed_time = 0.0;
        self.old_time = 0.0;
    }

    /// Stops the clock. Samples taken while stopped report a zero delta and
    /// do not accumulate, unless auto-start is enabled.
    pub fn stop(&mut self) {
        self.running = false;
        self.auto_start = false;
    }

    /// Stops the clock and zeroes its elapsed time.
    pub fn reset(&mut self) {
        self.stop();
        self.last_sample = None;
        self.elapsed_time = 0.0;
        self.old_time = 0.0;
    }

    /// Returns `true` while the clock accumulates time.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Total seconds accumulated since the clock was started.
    #[must_use]
    pub fn elapsed_time(&self) -> f64 {
        self.elapsed_time
    }

    /// Elapsed time recorded before the most recent externally driven sync.
    #[must_use]
    pub fn old_time(&self) -> f64 {
        self.old_time
    }

    /// Samples the clock at `now` and returns the seconds since the previous
    /// sample.
    ///
    /// The first sample after a start returns zero. A timestamp earlier than
    /// the previous sample yields zero rather than a negative delta.
    pub fn delta_at(&mut self, now: HostTime, timebase: Timebase) -> f64 {
        if !self.running {
            if !self.auto_start {
                return 0.0;
            }
            self.start();
        }
        let delta = match self.last_sample {
            Some(previous) => now.saturating_duration_since(previous).to_secs_f64(timebase),
            None => 0.0,
        };
        self.last_sample = Some(now);
        self.elapsed_time += delta;
        delta
    }

    /// Moves the clock to an externally supplied time (in seconds) and
    /// returns the difference from the previous elapsed time.
    ///
    /// Used by roots whose frames are clocked entirely by the host. The delta
    /// is not clamped and may be negative if the host rewinds.
    pub fn sync_to(&mut self, seconds: f64) -> f64 {
        let delta = seconds - self.elapsed_time;
        self.old_time = self.elapsed_time;
        self.elapsed_time = seconds;
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TB: Timebase = Timebase::MICROS;

    #[test]
    fn first_sample_is_zero_then_accumulates() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.delta_at(HostTime(1_000_000), TB), 0.0);
        assert!(clock.is_running(), "auto-started on first sample");
        assert_eq!(clock.delta_at(HostTime(1_500_000), TB), 0.5);
        assert_eq!(clock.delta_at(HostTime(2_000_000), TB), 0.5);
        assert_eq!(clock.elapsed_time(), 1.0);
    }

    #[test]
    fn backwards_timestamp_yields_zero() {
        let mut clock = FrameClock::new();
        clock.delta_at(HostTime(2_000_000), TB);
        assert_eq!(clock.delta_at(HostTime(1_000_000), TB), 0.0);
    }

    #[test]
    fn stopped_clock_reports_zero() {
        let mut clock = FrameClock::new();
        clock.delta_at(HostTime(0), TB);
        clock.stop();
        assert_eq!(clock.delta_at(HostTime(5_000_000), TB), 0.0);
        assert_eq!(clock.elapsed_time(), 0.0);

        clock.start();
        assert_eq!(clock.delta_at(HostTime(6_000_000), TB), 0.0, "fresh reference");
        assert_eq!(clock.delta_at(HostTime(6_250_000), TB), 0.25);
    }

    #[test]
    fn sync_to_tracks_external_time() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.sync_to(2.0), 2.0);
        assert_eq!(clock.sync_to(3.5), 1.5);
        assert_eq!(clock.old_time(), 2.0);
        assert_eq!(clock.elapsed_time(), 3.5);
    }
}
