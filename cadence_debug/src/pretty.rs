// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to microseconds using a [`Timebase`].

use std::io::Write;

use cadence_core::time::{HostTime, Timebase};
use cadence_core::trace::{
    AdvanceEvent, IdleEvent, InvalidateEvent, InvalidateOutcome, PhaseBeginEvent, PhaseEndEvent,
    PhaseKind, RootSkipEvent, RootUpdateEvent, SkipReason, TickEvent, TickSummary, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    timebase: Timebase,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            timebase,
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }

    /// Consumes the sink and returns its writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn ticks_to_us(&self, ticks: u64) -> f64 {
        self.timebase.ticks_to_nanos(ticks) as f64 / 1000.0
    }

    fn host_us(&self, t: HostTime) -> f64 {
        self.ticks_to_us(t.ticks())
    }
}

fn phase_name(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::BeforeEffects => "before",
        PhaseKind::Roots => "roots",
        PhaseKind::AfterEffects => "after",
        PhaseKind::TailEffects => "tail",
    }
}

fn skip_reason(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::Inactive => "inactive",
        SkipReason::NoPendingFrames => "no-pending",
        SkipReason::Presenting => "presenting",
    }
}

fn outcome_name(outcome: InvalidateOutcome) -> &'static str {
    match outcome {
        InvalidateOutcome::Accepted => "accepted",
        InvalidateOutcome::Woke => "woke",
        InvalidateOutcome::IgnoredInactive => "ignored:inactive",
        InvalidateOutcome::IgnoredNever => "ignored:never",
        InvalidateOutcome::IgnoredPresenting => "ignored:presenting",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_tick(&mut self, e: &TickEvent) {
        let _ = writeln!(
            self.writer,
            "[tick] frame={} now={:.1}µs",
            e.frame_index,
            self.host_us(e.now),
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:begin] frame={} {} at {:.1}µs",
            e.frame_index,
            phase_name(e.phase),
            self.host_us(e.timestamp),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:end] frame={} {} at {:.1}µs",
            e.frame_index,
            phase_name(e.phase),
            self.host_us(e.timestamp),
        );
    }

    fn on_root_update(&mut self, e: &RootUpdateEvent) {
        let _ = match e.frame_index {
            Some(frame_index) => write!(self.writer, "[root] frame={frame_index}"),
            None => write!(self.writer, "[root] advance"),
        };
        let _ = writeln!(
            self.writer,
            " root={} delta={:.3}ms pending={} repeat={}",
            e.root.0,
            e.delta * 1000.0,
            e.pending_frames,
            e.repeat,
        );
    }

    fn on_root_skip(&mut self, e: &RootSkipEvent) {
        let _ = writeln!(
            self.writer,
            "[skip] frame={} root={} reason={}",
            e.frame_index,
            e.root.0,
            skip_reason(e.reason),
        );
    }

    fn on_invalidate(&mut self, e: &InvalidateEvent) {
        let _ = writeln!(
            self.writer,
            "[invalidate] root={} requested={} pending={} {}",
            e.root.0,
            e.requested,
            e.pending_frames,
            outcome_name(e.outcome),
        );
    }

    fn on_advance(&mut self, e: &AdvanceEvent) {
        let effects = if e.global_effects { "yes" } else { "no" };
        let _ = writeln!(
            self.writer,
            "[advance] now={:.1}µs roots={} effects={effects}",
            self.host_us(e.now),
            e.roots,
        );
    }

    fn on_idle(&mut self, e: &IdleEvent) {
        let _ = writeln!(
            self.writer,
            "[idle] frame={} at {:.1}µs",
            e.frame_index,
            self.host_us(e.now),
        );
    }

    fn on_tick_summary(&mut self, s: &TickSummary) {
        let next = if s.went_idle { "idle" } else { "continue" };
        let _ = writeln!(
            self.writer,
            "[summary] frame={} updated={} skipped={} repeat={} before={:.1}µs \
             roots={:.1}µs after={:.1}µs tail={:.1}µs next={next}",
            s.frame_index,
            s.roots_updated,
            s.roots_skipped,
            s.repeat,
            self.ticks_to_us(s.before_ticks),
            self.ticks_to_us(s.roots_ticks),
            self.ticks_to_us(s.after_ticks),
            self.ticks_to_us(s.tail_ticks),
        );
    }
}
