// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The frame driver.
//!
//! [`FrameLoop`] ticks a [`RootSet`] on demand. It asks its [`TickSource`]
//! for a tick only while some root still has work, and goes idle otherwise:
//!
//! ```text
//!              invalidate()
//!   ┌──────┐ ───────────────► ┌─────────┐ ──┐ repeat > 0, or
//!   │ Idle │                  │ Running │   │ invalidated mid-tick:
//!   └──────┘ ◄─────────────── └─────────┘ ◄─┘ request next tick
//!             repeat == 0:
//!             run tail effects
//! ```
//!
//! Each tick runs the global before-effects, then every root in set order,
//! then the global after-effects. A root is processed unless it is inactive,
//! presenting, or on demand with no invalidated frames left. A processed root
//! samples its clock, runs its whole stage pipeline and consumes one pending
//! frame. `Always` roots keep the driver running; `Demand` roots keep it
//! running while frames remain.
//!
//! The driver wires two standing entries into every root it sees, once per
//! driver instance: an `update`-stage entry running the root's
//! [subscriptions](crate::root::RootState::subscribe), and a `render`-stage
//! entry submitting the frame when the root's render mode is
//! [`Auto`](RenderMode::Auto). Missing stages are skipped.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::any::Any;
use core::cell::{Cell, RefCell};
use core::fmt;

use crate::effect::{EffectPhase, GlobalEffects};
use crate::registry::Registration;
use crate::root::{FrameLoopMode, RenderMode, Root, RootId, RootSet, RootState};
use crate::stage::{FrameCallback, RENDER, UPDATE};
use crate::tick::{TickId, TickSource};
use crate::time::{HostTime, Timebase};
use crate::trace::{
    AdvanceEvent, IdleEvent, InvalidateEvent, InvalidateOutcome, PhaseBeginEvent, PhaseEndEvent,
    PhaseKind, RootSkipEvent, RootUpdateEvent, SkipReason, TickEvent, TickSummaryBuilder,
    TraceSink, Tracer,
};

/// Driver-wide configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLoopConfig {
    /// Unit of the [`HostTime`] values delivered by the tick source.
    pub timebase: Timebase,
    /// Upper bound on a root's pending-frame counter.
    pub max_pending_frames: u32,
}

impl FrameLoopConfig {
    /// Browser hosts: `requestAnimationFrame` timestamps in microseconds.
    #[must_use]
    pub const fn web() -> Self {
        Self {
            timebase: Timebase::MICROS,
            max_pending_frames: 60,
        }
    }

    /// Native hosts with a nanosecond monotonic clock.
    #[must_use]
    pub const fn native() -> Self {
        Self {
            timebase: Timebase::NANOS,
            max_pending_frames: 60,
        }
    }
}

impl Default for FrameLoopConfig {
    fn default() -> Self {
        Self::native()
    }
}

/// Whether the driver has a tick outstanding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DriverState {
    /// No tick requested.
    Idle,
    /// A tick has been requested or is in progress.
    Running,
}

/// Standing stage entries wired into one root.
struct Installed {
    root: Weak<Root>,
    entries: Vec<Registration>,
}

struct LoopInner {
    config: FrameLoopConfig,
    roots: RootSet,
    effects: GlobalEffects,
    host: RefCell<Box<dyn TickSource>>,
    scheduled: Cell<Option<TickId>>,
    running: Cell<bool>,
    in_tick: Cell<bool>,
    wake_requested: Cell<bool>,
    installed: RefCell<BTreeMap<RootId, Installed>>,
    frame_index: Cell<u64>,
    tracer: Tracer,
}

/// Cooperative on-demand frame scheduler.
///
/// Clones share the same driver. Callbacks may capture a clone to
/// invalidate from inside a tick; the scheduled tick itself only holds a
/// weak reference, so dropping every handle stops the loop.
#[derive(Clone)]
pub struct FrameLoop {
    inner: Rc<LoopInner>,
}

impl FrameLoop {
    /// Creates an idle driver over `roots`, ticking through `host`.
    ///
    /// `roots` is shared: roots the host inserts later are picked up by the
    /// next tick.
    pub fn new(roots: RootSet, host: impl TickSource + 'static, config: FrameLoopConfig) -> Self {
        Self {
            inner: Rc::new(LoopInner {
                config,
                roots,
                effects: GlobalEffects::new(),
                host: RefCell::new(Box::new(host)),
                scheduled: Cell::new(None),
                running: Cell::new(false),
                in_tick: Cell::new(false),
                wake_requested: Cell::new(false),
                installed: RefCell::new(BTreeMap::new()),
                frame_index: Cell::new(0),
                tracer: Tracer::new(),
            }),
        }
    }

    /// The driver configuration.
    #[must_use]
    pub fn config(&self) -> FrameLoopConfig {
        self.inner.config
    }

    /// The root set this driver ticks.
    #[must_use]
    pub fn roots(&self) -> &RootSet {
        &self.inner.roots
    }

    /// The global effect lists.
    #[must_use]
    pub fn effects(&self) -> &GlobalEffects {
        &self.inner.effects
    }

    /// Registers a global effect. Shorthand for
    /// `self.effects().add(phase, callback)`.
    pub fn add_effect(&self, phase: EffectPhase, callback: impl FnMut(HostTime) + 'static) -> Registration {
        self.inner.effects.add(phase, callback)
    }

    /// Runs the `phase` effect list now, outside of any tick.
    pub fn flush_global_effects(&self, phase: EffectPhase, timestamp: HostTime) {
        self.inner.effects.flush(phase, timestamp);
    }

    /// Whether a tick is outstanding.
    #[must_use]
    pub fn state(&self) -> DriverState {
        if self.inner.running.get() {
            DriverState::Running
        } else {
            DriverState::Idle
        }
    }

    /// Shorthand for `self.state() == DriverState::Running`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Number of ticks run so far.
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.inner.frame_index.get()
    }

    /// Requests `frames` more processed ticks for `root`, or for every root
    /// in the set when `root` is `None`.
    ///
    /// Ignored for roots that are inactive, presenting or in
    /// [`Never`](FrameLoopMode::Never) mode. A request for zero frames counts
    /// as one. The pending counter saturates at
    /// [`max_pending_frames`](FrameLoopConfig::max_pending_frames). An idle
    /// driver is woken.
    pub fn invalidate(&self, root: Option<&RootState>, frames: u32) {
        match root {
            Some(state) => self.inner.invalidate_root(state, frames),
            None => {
                for root in self.inner.roots.snapshot() {
                    self.inner.invalidate_root(root.state(), frames);
                }
            }
        }
    }

    /// Runs one update pass for `root`, or for every root in the set, at
    /// `timestamp`.
    ///
    /// This is how hosts drive [`Never`](FrameLoopMode::Never) roots and
    /// presentation sessions. Skip conditions are not applied, no tick is
    /// requested and the driver state is left alone. When
    /// `run_global_effects` is set the pass is bracketed by the before and
    /// after effects. `frame` is forwarded to every stage.
    ///
    /// Unlike a tick's first pass, this also wires the standing `update` and
    /// `render` entries into roots that have not been installed yet.
    pub fn advance(
        &self,
        timestamp: HostTime,
        run_global_effects: bool,
        root: Option<&Rc<Root>>,
        frame: Option<&dyn Any>,
    ) {
        let inner = &self.inner;
        if run_global_effects {
            inner.effects.flush(EffectPhase::Before, timestamp);
        }
        let count = match root {
            Some(root) => {
                inner.install(root);
                inner.update_root(root, timestamp, frame, None);
                1
            }
            None => {
                let roots = inner.roots.snapshot();
                for root in &roots {
                    inner.install(root);
                    inner.update_root(root, timestamp, frame, None);
                }
                roots.len()
            }
        };
        if run_global_effects {
            inner.effects.flush(EffectPhase::After, timestamp);
        }
        let event = AdvanceEvent {
            now: timestamp,
            roots: u32::try_from(count).unwrap_or(u32::MAX),
            global_effects: run_global_effects,
        };
        inner.tracer.emit(|sink| sink.on_advance(&event));
    }

    /// Switches a root's frame-loop mode.
    ///
    /// The root's clock is reset (restarted unless the new mode is
    /// [`Never`](FrameLoopMode::Never)) and the root is invalidated, so
    /// switching to [`Always`](FrameLoopMode::Always) wakes an idle driver.
    pub fn set_frameloop(&self, state: &RootState, mode: FrameLoopMode) {
        state.set_frameloop(mode);
        self.inner.invalidate_root(state, 1);
    }

    /// Cancels the outstanding tick and returns to idle without running tail
    /// effects.
    ///
    /// Called from inside a tick, the rest of the tick still runs but no
    /// further tick is requested unless something is invalidated afterwards.
    pub fn stop(&self) {
        let inner = &self.inner;
        if let Some(id) = inner.scheduled.take() {
            inner.host.borrow_mut().cancel_tick(id);
        }
        inner.running.set(false);
        inner.wake_requested.set(false);
    }

    /// Installs a trace sink, returning the previous one.
    ///
    /// Without the `trace` feature the sink is dropped and nothing is
    /// emitted.
    pub fn set_trace_sink(&self, sink: Option<Box<dyn TraceSink>>) -> Option<Box<dyn TraceSink>> {
        self.inner.tracer.set(sink)
    }
}

impl fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = &self.inner;
        f.debug_struct("FrameLoop")
            .field("config", &inner.config)
            .field("state", &self.state())
            .field("frame_index", &inner.frame_index.get())
            .field("roots", &inner.roots)
            .field("effects", &inner.effects)
            .field("tracer", &inner.tracer)
            .finish_non_exhaustive()
    }
}

/// Resets the driver if a callback unwinds out of a tick.
struct TickGuard<'a> {
    inner: &'a LoopInner,
    completed: bool,
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let inner = self.inner;
        inner.in_tick.set(false);
        inner.wake_requested.set(false);
        inner.running.set(false);
        if let Some(id) = inner.scheduled.take()
            && let Ok(mut host) = inner.host.try_borrow_mut()
        {
            host.cancel_tick(id);
        }
    }
}

impl LoopInner {
    fn request_tick(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let id = self.host.borrow_mut().request_tick(Box::new(move |t| {
            if let Some(inner) = weak.upgrade() {
                inner.tick(t);
            }
        }));
        self.scheduled.set(Some(id));
        self.running.set(true);
    }

    fn tick(self: &Rc<Self>, t: HostTime) {
        self.scheduled.set(None);
        let frame_index = self.frame_index.get();
        self.frame_index.set(frame_index + 1);
        self.in_tick.set(true);
        self.wake_requested.set(false);
        let mut guard = TickGuard {
            inner: self,
            completed: false,
        };

        let tick_event = TickEvent { frame_index, now: t };
        self.tracer.emit(|sink| sink.on_tick(&tick_event));
        let mut summary = self
            .tracer
            .is_enabled()
            .then(|| TickSummaryBuilder::new(&tick_event));

        self.phase_begin(frame_index, PhaseKind::BeforeEffects, &mut summary);
        self.effects.flush(EffectPhase::Before, t);
        self.phase_end(frame_index, PhaseKind::BeforeEffects, &mut summary);

        self.phase_begin(frame_index, PhaseKind::Roots, &mut summary);
        let mut repeat = 0_u32;
        for root in self.roots.snapshot() {
            repeat = repeat.saturating_add(self.tick_root(&root, t, frame_index, &mut summary));
        }
        self.phase_end(frame_index, PhaseKind::Roots, &mut summary);
        self.prune_installed();

        self.phase_begin(frame_index, PhaseKind::AfterEffects, &mut summary);
        self.effects.flush(EffectPhase::After, t);
        self.phase_end(frame_index, PhaseKind::AfterEffects, &mut summary);

        self.in_tick.set(false);
        let wake = self.wake_requested.replace(false);
        guard.completed = true;

        let went_idle = if !self.running.get() {
            // Stopped during the tick.
            if wake {
                self.request_tick();
            }
            !wake
        } else if repeat == 0 && !wake {
            self.running.set(false);
            let idle = IdleEvent { frame_index, now: t };
            self.tracer.emit(|sink| sink.on_idle(&idle));
            self.phase_begin(frame_index, PhaseKind::TailEffects, &mut summary);
            self.effects.flush(EffectPhase::Tail, t);
            self.phase_end(frame_index, PhaseKind::TailEffects, &mut summary);
            true
        } else {
            self.request_tick();
            false
        };

        if let Some(builder) = summary {
            let summary = builder.finish(repeat, went_idle);
            self.tracer.emit(|sink| sink.on_tick_summary(&summary));
        }
    }

    /// Processes one root inside a tick. Returns its repeat contribution.
    fn tick_root(
        &self,
        root: &Rc<Root>,
        t: HostTime,
        frame_index: u64,
        summary: &mut Option<TickSummaryBuilder>,
    ) -> u32 {
        self.install(root);
        let state = root.state();
        let skip = if !state.is_active() {
            Some(SkipReason::Inactive)
        } else if state.frameloop() != FrameLoopMode::Always && state.pending_frames() == 0 {
            Some(SkipReason::NoPendingFrames)
        } else if state.is_presenting() {
            Some(SkipReason::Presenting)
        } else {
            None
        };
        if let Some(reason) = skip {
            let event = RootSkipEvent {
                frame_index,
                root: state.id(),
                reason,
            };
            self.tracer.emit(|sink| sink.on_root_skip(&event));
            if let Some(summary) = summary {
                summary.root_skipped();
            }
            return 0;
        }
        let repeat = self.update_root(root, t, None, Some(frame_index));
        if let Some(summary) = summary {
            summary.root_updated();
        }
        repeat
    }

    /// One update pass: sample the clock, run every stage, consume a frame.
    fn update_root(
        &self,
        root: &Rc<Root>,
        t: HostTime,
        frame: Option<&dyn Any>,
        frame_index: Option<u64>,
    ) -> u32 {
        let state = root.state();
        let delta = {
            let mut clock = state.clock_mut();
            if state.frameloop() == FrameLoopMode::Never {
                clock.sync_to(t.to_secs_f64(self.config.timebase))
            } else {
                // `min`/`max` rather than `clamp`: a NaN or negative
                // `max_delta` must not panic.
                clock
                    .delta_at(t, self.config.timebase)
                    .min(state.max_delta())
                    .max(0.0)
            }
        };
        state.stages().run(delta, frame);
        let pending = state.consume_frame();
        let repeat = if state.frameloop() == FrameLoopMode::Always {
            1
        } else {
            pending
        };
        let event = RootUpdateEvent {
            frame_index,
            root: state.id(),
            delta,
            pending_frames: pending,
            repeat,
        };
        self.tracer.emit(|sink| sink.on_root_update(&event));
        repeat
    }

    fn invalidate_root(self: &Rc<Self>, state: &RootState, frames: u32) {
        let outcome = if state.is_presenting() {
            InvalidateOutcome::IgnoredPresenting
        } else if !state.is_active() {
            InvalidateOutcome::IgnoredInactive
        } else if state.frameloop() == FrameLoopMode::Never {
            InvalidateOutcome::IgnoredNever
        } else {
            state.add_pending_frames(frames.max(1), self.config.max_pending_frames);
            if self.in_tick.get() {
                self.wake_requested.set(true);
                InvalidateOutcome::Accepted
            } else if self.running.get() {
                InvalidateOutcome::Accepted
            } else {
                self.request_tick();
                InvalidateOutcome::Woke
            }
        };
        let event = InvalidateEvent {
            root: state.id(),
            requested: frames,
            pending_frames: state.pending_frames(),
            outcome,
        };
        self.tracer.emit(|sink| sink.on_invalidate(&event));
    }

    /// Wires the standing `update` and `render` entries into `root`, once.
    fn install(&self, root: &Rc<Root>) {
        let mut installed = self.installed.borrow_mut();
        if let Some(existing) = installed.get(&root.id())
            && core::ptr::eq(existing.root.as_ptr(), Rc::as_ptr(root))
        {
            return;
        }
        installed.retain(|_, entry| entry.root.strong_count() > 0);

        let state = root.state();
        let mut entries = Vec::with_capacity(2);
        if let Some(stage) = state.get_stage(UPDATE) {
            let run = FrameCallback::new(|state, delta, frame| state.run_subscribers(delta, frame));
            entries.push(stage.add(run, root));
        }
        if let Some(stage) = state.get_stage(RENDER) {
            let render = FrameCallback::new(|state, _, _| {
                if state.render_mode() == RenderMode::Auto {
                    state.submit_frame();
                }
            });
            entries.push(stage.add(render, root));
        }

        let fresh = Installed {
            root: Rc::downgrade(root),
            entries,
        };
        if let Some(previous) = installed.insert(root.id(), fresh) {
            for entry in previous.entries {
                entry.remove();
            }
        }
    }

    /// Removes the standing entries of roots that left the set, were
    /// replaced or were dropped.
    fn prune_installed(&self) {
        let stale: Vec<Installed> = {
            let mut installed = self.installed.borrow_mut();
            let ids: Vec<RootId> = installed
                .iter()
                .filter(|(id, entry)| {
                    !self
                        .roots
                        .get(**id)
                        .is_some_and(|root| core::ptr::eq(entry.root.as_ptr(), Rc::as_ptr(&root)))
                })
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| installed.remove(id)).collect()
        };
        for installed in stale {
            for entry in installed.entries {
                entry.remove();
            }
        }
    }

    fn timestamp(&self) -> HostTime {
        self.host
            .try_borrow()
            .map_or(HostTime(0), |host| host.now())
    }

    fn phase_begin(
        &self,
        frame_index: u64,
        phase: PhaseKind,
        summary: &mut Option<TickSummaryBuilder>,
    ) {
        if !self.tracer.is_enabled() {
            return;
        }
        let timestamp = self.timestamp();
        if let Some(summary) = summary {
            summary.phase_begin(phase, timestamp);
        }
        let event = PhaseBeginEvent {
            frame_index,
            phase,
            timestamp,
        };
        self.tracer.emit(|sink| sink.on_phase_begin(&event));
    }

    fn phase_end(
        &self,
        frame_index: u64,
        phase: PhaseKind,
        summary: &mut Option<TickSummaryBuilder>,
    ) {
        if !self.tracer.is_enabled() {
            return;
        }
        let timestamp = self.timestamp();
        if let Some(summary) = summary {
            summary.phase_end(phase, timestamp);
        }
        let event = PhaseEndEvent {
            frame_index,
            phase,
            timestamp,
        };
        self.tracer.emit(|sink| sink.on_phase_end(&event));
    }
}

impl Drop for LoopInner {
    fn drop(&mut self) {
        if let Some(id) = self.scheduled.take() {
            self.host.get_mut().cancel_tick(id);
        }
        for (_, installed) in core::mem::take(self.installed.get_mut()) {
            for entry in installed.entries {
                entry.remove();
            }
        }
    }
}
