// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the frame loop.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! driver calls as it works. All method bodies default to no-ops, so
//! implementing only the events you care about is fine.
//!
//! A sink is installed with
//! [`FrameLoop::set_trace_sink`](crate::driver::FrameLoop::set_trace_sink).
//! When the `trace` feature is **off**, the driver discards the sink and every
//! emission compiles to nothing. When **on**, each emission performs a single
//! `Option` branch before dispatching.
//!
//! [`TickSummaryBuilder`] collects phase timestamps during a tick and
//! produces a [`TickSummary`] at the end.
//!
//! # Crate features
//!
//! - `trace`: enables event dispatch (one branch per call site).

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;

use crate::root::RootId;
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which part of a tick is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Global before-effects.
    BeforeEffects,
    /// Per-root stage work.
    Roots,
    /// Global after-effects.
    AfterEffects,
    /// Tail effects on the transition to idle.
    TailEffects,
}

/// Why a root did no work in a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The root is inactive.
    Inactive,
    /// The root is on demand and has no invalidated frames left.
    NoPendingFrames,
    /// An exclusive presentation session owns the root's frames.
    Presenting,
}

/// What happened to an invalidation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvalidateOutcome {
    /// Frames were added; the driver was already running.
    Accepted,
    /// Frames were added and the driver was woken from idle.
    Woke,
    /// Ignored: the root is inactive.
    IgnoredInactive,
    /// Ignored: the root's frame loop is `Never`.
    IgnoredNever,
    /// Ignored: exclusive presentation is active.
    IgnoredPresenting,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a tick starts.
#[derive(Clone, Copy, Debug)]
pub struct TickEvent {
    /// Monotonic tick counter of the driver.
    pub frame_index: u64,
    /// Timestamp delivered by the tick source.
    pub now: HostTime,
}

/// Marks the beginning of a tick phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBeginEvent {
    /// Tick counter.
    pub frame_index: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Host time at the start of the phase.
    pub timestamp: HostTime,
}

/// Marks the end of a tick phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseEndEvent {
    /// Tick counter.
    pub frame_index: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Host time at the end of the phase.
    pub timestamp: HostTime,
}

/// Emitted after a root ran its stages.
#[derive(Clone, Copy, Debug)]
pub struct RootUpdateEvent {
    /// Tick counter, or `None` for an [`advance`](crate::driver::FrameLoop::advance).
    pub frame_index: Option<u64>,
    /// Which root.
    pub root: RootId,
    /// Delta handed to the stages, in seconds.
    pub delta: f64,
    /// Pending frames left after this update.
    pub pending_frames: u32,
    /// This root's contribution to the repeat tally.
    pub repeat: u32,
}

/// Emitted when a root is skipped in a tick.
#[derive(Clone, Copy, Debug)]
pub struct RootSkipEvent {
    /// Tick counter.
    pub frame_index: u64,
    /// Which root.
    pub root: RootId,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Emitted for every per-root invalidation request.
#[derive(Clone, Copy, Debug)]
pub struct InvalidateEvent {
    /// Which root.
    pub root: RootId,
    /// Frames requested.
    pub requested: u32,
    /// Pending frames after the request.
    pub pending_frames: u32,
    /// What the driver did with it.
    pub outcome: InvalidateOutcome,
}

/// Emitted when the host advances roots manually.
#[derive(Clone, Copy, Debug)]
pub struct AdvanceEvent {
    /// Timestamp supplied by the host.
    pub now: HostTime,
    /// Number of roots advanced.
    pub roots: u32,
    /// Whether global effects ran around the update.
    pub global_effects: bool,
}

/// Emitted when the driver stops ticking.
#[derive(Clone, Copy, Debug)]
pub struct IdleEvent {
    /// Tick counter of the last tick.
    pub frame_index: u64,
    /// Timestamp of the last tick.
    pub now: HostTime,
}

/// Per-tick summary produced by [`TickSummaryBuilder`].
#[derive(Clone, Copy, Debug)]
pub struct TickSummary {
    /// Tick counter.
    pub frame_index: u64,
    /// Timestamp delivered by the tick source.
    pub now: HostTime,
    /// Roots that ran their stages.
    pub roots_updated: u32,
    /// Roots that were skipped.
    pub roots_skipped: u32,
    /// Summed repeat tally.
    pub repeat: u32,
    /// Whether the driver went idle after this tick.
    pub went_idle: bool,
    /// Before-effects duration in ticks (0 if not measured).
    pub before_ticks: u64,
    /// Root work duration in ticks (0 if not measured).
    pub roots_ticks: u64,
    /// After-effects duration in ticks (0 if not measured).
    pub after_ticks: u64,
    /// Tail-effects duration in ticks (0 if not measured).
    pub tail_ticks: u64,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the frame loop.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a tick starts.
    fn on_tick(&mut self, e: &TickEvent) {
        _ = e;
    }

    /// Called at the beginning of a tick phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a tick phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called after a root ran its stages.
    fn on_root_update(&mut self, e: &RootUpdateEvent) {
        _ = e;
    }

    /// Called when a root is skipped.
    fn on_root_skip(&mut self, e: &RootSkipEvent) {
        _ = e;
    }

    /// Called for every per-root invalidation.
    fn on_invalidate(&mut self, e: &InvalidateEvent) {
        _ = e;
    }

    /// Called when the host advances roots manually.
    fn on_advance(&mut self, e: &AdvanceEvent) {
        _ = e;
    }

    /// Called when the driver goes idle.
    fn on_idle(&mut self, e: &IdleEvent) {
        _ = e;
    }

    /// Called with a per-tick summary.
    fn on_tick_summary(&mut self, s: &TickSummary) {
        _ = s;
    }
}

/// A shared sink, so the host can keep a handle to a sink owned by the
/// driver.
impl<S: TraceSink + ?Sized> TraceSink for Rc<RefCell<S>> {
    fn on_tick(&mut self, e: &TickEvent) {
        self.borrow_mut().on_tick(e);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.borrow_mut().on_phase_begin(e);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.borrow_mut().on_phase_end(e);
    }

    fn on_root_update(&mut self, e: &RootUpdateEvent) {
        self.borrow_mut().on_root_update(e);
    }

    fn on_root_skip(&mut self, e: &RootSkipEvent) {
        self.borrow_mut().on_root_skip(e);
    }

    fn on_invalidate(&mut self, e: &InvalidateEvent) {
        self.borrow_mut().on_invalidate(e);
    }

    fn on_advance(&mut self, e: &AdvanceEvent) {
        self.borrow_mut().on_advance(e);
    }

    fn on_idle(&mut self, e: &IdleEvent) {
        self.borrow_mut().on_idle(e);
    }

    fn on_tick_summary(&mut self, s: &TickSummary) {
        self.borrow_mut().on_tick_summary(s);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer
// ---------------------------------------------------------------------------

/// Owner of the driver's optional sink.
///
/// When the `trace` feature is **off**, the sink is dropped on install and
/// [`emit`](Self::emit) compiles to nothing.
pub(crate) struct Tracer {
    #[cfg(feature = "trace")]
    sink: RefCell<Option<Box<dyn TraceSink>>>,
}

impl Tracer {
    pub(crate) fn new() -> Self {
        Self {
            #[cfg(feature = "trace")]
            sink: RefCell::new(None),
        }
    }

    /// Installs `sink`, returning the previous one.
    pub(crate) fn set(&self, sink: Option<Box<dyn TraceSink>>) -> Option<Box<dyn TraceSink>> {
        #[cfg(feature = "trace")]
        {
            core::mem::replace(&mut *self.sink.borrow_mut(), sink)
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            None
        }
    }

    /// Returns `true` if events would reach a sink.
    #[inline]
    pub(crate) fn is_enabled(&self) -> bool {
        #[cfg(feature = "trace")]
        {
            self.sink.try_borrow().is_ok_and(|sink| sink.is_some())
        }
        #[cfg(not(feature = "trace"))]
        {
            false
        }
    }

    /// Hands the sink to `f`. Events emitted from inside a sink are dropped.
    #[inline]
    pub(crate) fn emit(&self, f: impl FnOnce(&mut dyn TraceSink)) {
        #[cfg(feature = "trace")]
        if let Ok(mut slot) = self.sink.try_borrow_mut()
            && let Some(sink) = slot.as_deref_mut()
        {
            f(sink);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = f;
        }
    }
}

impl core::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// TickSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps and root counts during a tick and produces a
/// [`TickSummary`].
#[derive(Debug)]
pub struct TickSummaryBuilder {
    tick: TickEvent,
    phase_starts: [Option<HostTime>; 4],
    phase_ends: [Option<HostTime>; 4],
    roots_updated: u32,
    roots_skipped: u32,
}

impl TickSummaryBuilder {
    /// Starts building a summary for the given tick.
    #[must_use]
    pub fn new(tick: &TickEvent) -> Self {
        Self {
            tick: *tick,
            phase_starts: [None; 4],
            phase_ends: [None; 4],
            roots_updated: 0,
            roots_skipped: 0,
        }
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_starts[phase_index(phase)] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_ends[phase_index(phase)] = Some(t);
    }

    /// Counts a root that ran its stages.
    pub fn root_updated(&mut self) {
        self.roots_updated += 1;
    }

    /// Counts a root that was skipped.
    pub fn root_skipped(&mut self) {
        self.roots_skipped += 1;
    }

    /// Consumes the builder and produces the final [`TickSummary`].
    #[must_use]
    pub fn finish(self, repeat: u32, went_idle: bool) -> TickSummary {
        TickSummary {
            frame_index: self.tick.frame_index,
            now: self.tick.now,
            roots_updated: self.roots_updated,
            roots_skipped: self.roots_skipped,
            repeat,
            went_idle,
            before_ticks: self.phase_duration(PhaseKind::BeforeEffects),
            roots_ticks: self.phase_duration(PhaseKind::Roots),
            after_ticks: self.phase_duration(PhaseKind::AfterEffects),
            tail_ticks: self.phase_duration(PhaseKind::TailEffects),
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> u64 {
        let idx = phase_index(phase);
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).ticks(),
            _ => 0,
        }
    }
}

/// Maps a [`PhaseKind`] to an array index.
const fn phase_index(phase: PhaseKind) -> usize {
    match phase {
        PhaseKind::BeforeEffects => 0,
        PhaseKind::Roots => 1,
        PhaseKind::AfterEffects => 2,
        PhaseKind::TailEffects => 3,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
