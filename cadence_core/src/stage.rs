// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Named per-root update phases.
//!
//! A root owns a [`StagePipeline`]: an ordered list of [`Stage`]s that the
//! driver runs once per processed tick with `(delta, frame)`. Each stage holds
//! an ordered list of [`Subscription`]s, a [`FrameCallback`] paired with the
//! root whose state it observes.
//!
//! The [standard pipeline](StagePipeline::standard) is:
//!
//! ```text
//!   early ─► fixed ─► update ─► late ─► render ─► after
//! ```
//!
//! The driver wires two standing entries into it: one in [`UPDATE`] that runs
//! the root's own subscriptions, and one in [`RENDER`] that submits the frame.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::string::String;
use alloc::vec::Vec;
use core::any::Any;
use core::cell::{Cell, RefCell};
use core::fmt;

use crate::registry::{Registration, SlotList};
use crate::root::{Root, RootState};

/// Name of the stage that runs before everything else.
pub const EARLY: &str = "early";
/// Name of the fixed-timestep stage.
pub const FIXED: &str = "fixed";
/// Name of the stage that runs root subscriptions.
pub const UPDATE: &str = "update";
/// Name of the stage that runs after `update`.
pub const LATE: &str = "late";
/// Name of the stage that submits the frame.
pub const RENDER: &str = "render";
/// Name of the stage that runs after rendering.
pub const AFTER: &str = "after";

type FrameFn = dyn FnMut(&RootState, f64, Option<&dyn Any>);

struct FrameSlot {
    current: RefCell<Box<FrameFn>>,
    staged: RefCell<Option<Box<FrameFn>>>,
}

/// A shared, swappable per-frame callback.
///
/// Clones refer to the same slot, so a callback can be replaced through any
/// clone without re-registering it anywhere.
#[derive(Clone)]
pub struct FrameCallback {
    slot: Rc<FrameSlot>,
}

impl FrameCallback {
    /// Wraps `callback` in a new slot.
    pub fn new(callback: impl FnMut(&RootState, f64, Option<&dyn Any>) + 'static) -> Self {
        Self {
            slot: Rc::new(FrameSlot {
                current: RefCell::new(Box::new(callback)),
                staged: RefCell::new(None),
            }),
        }
    }

    /// Replaces the callback held by this slot.
    ///
    /// If the slot is currently running, the replacement takes effect once
    /// the running call returns.
    pub fn replace(&self, callback: impl FnMut(&RootState, f64, Option<&dyn Any>) + 'static) {
        let callback: Box<FrameFn> = Box::new(callback);
        match self.slot.current.try_borrow_mut() {
            Ok(mut current) => *current = callback,
            Err(_) => *self.slot.staged.borrow_mut() = Some(callback),
        }
    }

    /// Returns `true` if both handles refer to the same slot.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }

    /// Invokes the callback. Re-entrant calls into a running slot are
    /// skipped.
    pub(crate) fn call(&self, state: &RootState, delta: f64, frame: Option<&dyn Any>) {
        self.apply_staged();
        if let Ok(mut callback) = self.slot.current.try_borrow_mut() {
            callback(state, delta, frame);
        }
        self.apply_staged();
    }

    fn apply_staged(&self) {
        if let Ok(mut current) = self.slot.current.try_borrow_mut()
            && let Some(next) = self.slot.staged.borrow_mut().take()
        {
            *current = next;
        }
    }
}

impl fmt::Debug for FrameCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCallback")
            .field("running", &self.slot.current.try_borrow().is_err())
            .finish_non_exhaustive()
    }
}

/// A frame callback bound to the root whose state it receives.
///
/// The root is held weakly; once it is dropped the subscription is inert.
#[derive(Clone)]
pub struct Subscription {
    callback: FrameCallback,
    store: Weak<Root>,
}

impl Subscription {
    /// Binds `callback` to `store`.
    #[must_use]
    pub fn new(callback: FrameCallback, store: &Rc<Root>) -> Self {
        Self {
            callback,
            store: Rc::downgrade(store),
        }
    }

    /// The callback slot of this subscription.
    #[must_use]
    pub fn callback(&self) -> &FrameCallback {
        &self.callback
    }

    /// Runs the callback with the owning root's state, if the root is alive.
    pub(crate) fn run(&self, delta: f64, frame: Option<&dyn Any>) {
        if let Some(root) = self.store.upgrade() {
            self.callback.call(root.state(), delta, frame);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("callback", &self.callback)
            .field("store", &self.store.upgrade().map(|root| root.id()))
            .finish()
    }
}

/// Fixed-timestep parameters for [`Stage::fixed`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedStep {
    /// Step length in seconds.
    pub step: f64,
    /// Maximum substeps per frame; excess accumulated time is discarded.
    pub max_substeps: u32,
}

impl Default for FixedStep {
    fn default() -> Self {
        Self {
            step: 1.0 / 60.0,
            max_substeps: 6,
        }
    }
}

#[derive(Debug)]
struct FixedState {
    config: FixedStep,
    accumulator: Cell<f64>,
    alpha: Cell<f64>,
}

/// A named phase holding an ordered list of subscriptions.
pub struct Stage {
    name: String,
    subscribers: SlotList<Subscription>,
    fixed: Option<FixedState>,
}

impl Stage {
    /// Creates a stage that runs its subscribers once per frame with the
    /// frame delta.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: SlotList::new(),
            fixed: None,
        }
    }

    /// Creates a fixed-timestep stage.
    ///
    /// Each frame adds the delta to an accumulator and runs the subscribers
    /// with `step` as their delta once per whole step accumulated, up to
    /// `max_substeps` times. A non-positive or non-finite step never runs.
    #[must_use]
    pub fn fixed(name: impl Into<String>, config: FixedStep) -> Self {
        Self {
            name: name.into(),
            subscribers: SlotList::new(),
            fixed: Some(FixedState {
                config,
                accumulator: Cell::new(0.0),
                alpha: Cell::new(0.0),
            }),
        }
    }

    /// The stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a subscription. Subscribers run in registration order.
    pub fn add(&self, callback: FrameCallback, owner: &Rc<Root>) -> Registration {
        self.subscribers.push(Subscription::new(callback, owner))
    }

    /// Number of subscriptions in this stage.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns `true` if the stage has no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interpolation factor between the last two fixed steps, in `[0, 1)`.
    ///
    /// Always zero for variable stages.
    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.fixed.as_ref().map_or(0.0, |fixed| fixed.alpha.get())
    }

    /// Runs the stage for one frame.
    pub fn frame(&self, delta: f64, frame: Option<&dyn Any>) {
        match &self.fixed {
            None => self.run_subscribers(delta, frame),
            Some(fixed) => self.run_fixed(fixed, delta, frame),
        }
    }

    fn run_subscribers(&self, delta: f64, frame: Option<&dyn Any>) {
        self.subscribers.for_each_live(|sub| sub.run(delta, frame));
    }

    fn run_fixed(&self, fixed: &FixedState, delta: f64, frame: Option<&dyn Any>) {
        let step = fixed.config.step;
        if !(step.is_finite() && step > 0.0) {
            return;
        }
        let mut accumulator = fixed.accumulator.get() + delta.max(0.0);
        let mut substeps = 0;
        while accumulator >= step && substeps < fixed.config.max_substeps {
            accumulator -= step;
            substeps += 1;
            self.run_subscribers(step, frame);
        }
        // Drop whatever the substep cap left behind so a stall does not
        // snowball into the following frames.
        accumulator %= step;
        fixed.accumulator.set(accumulator);
        fixed.alpha.set(accumulator / step);
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("subscribers", &self.subscribers.len())
            .field("fixed", &self.fixed)
            .finish()
    }
}

/// An ordered sequence of named stages.
#[derive(Debug, Default)]
pub struct StagePipeline {
    stages: Vec<Stage>,
}

impl StagePipeline {
    /// Creates a pipeline with no stages.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates the standard six-stage pipeline.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            stages: alloc::vec![
                Stage::new(EARLY),
                Stage::fixed(FIXED, FixedStep::default()),
                Stage::new(UPDATE),
                Stage::new(LATE),
                Stage::new(RENDER),
                Stage::new(AFTER),
            ],
        }
    }

    /// Appends a stage to the end of the pipeline.
    #[must_use]
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    /// Iterates over the stages in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = &Stage> + '_ {
        self.stages.iter()
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage in order.
    pub fn run(&self, delta: f64, frame: Option<&dyn Any>) {
        for stage in &self.stages {
            stage.frame(delta, frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root::{RootConfig, RootId};
    use alloc::vec;

    type Log = Rc<RefCell<Vec<(u32, f64)>>>;

    fn logging(log: &Log, tag: u32) -> FrameCallback {
        let log = Rc::clone(log);
        FrameCallback::new(move |_, delta, _| log.borrow_mut().push((tag, delta)))
    }

    fn root() -> Rc<Root> {
        Root::new(RootId(0), RootConfig::default())
    }

    #[test]
    fn subscribers_run_in_registration_order() {
        let owner = root();
        let stage = Stage::new("test");
        let log: Log = Rc::default();
        let _ = stage.add(logging(&log, 1), &owner);
        let _ = stage.add(logging(&log, 2), &owner);

        stage.frame(0.5, None);
        assert_eq!(*log.borrow(), vec![(1, 0.5), (2, 0.5)]);
        assert_eq!(stage.alpha(), 0.0);
    }

    #[test]
    fn subscription_receives_owner_state() {
        let owner = Root::new(RootId(42), RootConfig::default());
        let stage = Stage::new("test");
        let seen = Rc::new(Cell::new(None));
        let sink = Rc::clone(&seen);
        let _ = stage.add(FrameCallback::new(move |state, _, _| sink.set(Some(state.id()))), &owner);

        stage.frame(0.0, None);
        assert_eq!(seen.get(), Some(RootId(42)));
    }

    #[test]
    fn dropped_owner_is_skipped() {
        let stage = Stage::new("test");
        let log: Log = Rc::default();
        let owner = root();
        let _ = stage.add(logging(&log, 1), &owner);
        drop(owner);

        stage.frame(1.0, None);
        assert!(log.borrow().is_empty(), "owner is gone");
        assert_eq!(stage.len(), 1);
    }

    #[test]
    fn frame_context_is_forwarded() {
        let owner = root();
        let stage = Stage::new("test");
        let seen = Rc::new(Cell::new(0_u32));
        let sink = Rc::clone(&seen);
        let _ = stage.add(
            FrameCallback::new(move |_, _, frame| {
                if let Some(value) = frame.and_then(|f| f.downcast_ref::<u32>()) {
                    sink.set(*value);
                }
            }),
            &owner,
        );

        stage.frame(0.0, Some(&7_u32));
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn replace_swaps_without_reregistering() {
        let owner = root();
        let stage = Stage::new("test");
        let log: Log = Rc::default();
        let callback = logging(&log, 1);
        let _ = stage.add(callback.clone(), &owner);

        stage.frame(0.1, None);
        let replacement_log = Rc::clone(&log);
        callback.replace(move |_, delta, _| replacement_log.borrow_mut().push((2, delta)));
        stage.frame(0.2, None);

        assert_eq!(*log.borrow(), vec![(1, 0.1), (2, 0.2)]);
        assert_eq!(stage.len(), 1);
    }

    #[test]
    fn replace_while_running_applies_after_call() {
        let owner = root();
        let stage = Stage::new("test");
        let log: Log = Rc::default();

        let handle: Rc<RefCell<Option<FrameCallback>>> = Rc::default();
        let inner_handle = Rc::clone(&handle);
        let first_log = Rc::clone(&log);
        let callback = FrameCallback::new(move |_, delta, _| {
            first_log.borrow_mut().push((1, delta));
            if let Some(me) = inner_handle.borrow().as_ref() {
                let next_log = Rc::clone(&first_log);
                me.replace(move |_, delta, _| next_log.borrow_mut().push((2, delta)));
            }
        });
        *handle.borrow_mut() = Some(callback.clone());
        let _ = stage.add(callback, &owner);

        stage.frame(1.0, None);
        stage.frame(2.0, None);
        assert_eq!(*log.borrow(), vec![(1, 1.0), (2, 2.0)]);
    }

    #[test]
    fn fixed_stage_runs_whole_steps() {
        let owner = root();
        let stage = Stage::fixed(
            "physics",
            FixedStep {
                step: 0.25,
                max_substeps: 10,
            },
        );
        let log: Log = Rc::default();
        let _ = stage.add(logging(&log, 1), &owner);

        stage.frame(0.625, None);
        assert_eq!(*log.borrow(), vec![(1, 0.25), (1, 0.25)]);
        assert_eq!(stage.alpha(), 0.5);

        stage.frame(0.125, None);
        assert_eq!(log.borrow().len(), 3, "leftover 0.125 + 0.125 completes a step");
        assert_eq!(stage.alpha(), 0.0);
    }

    #[test]
    fn fixed_stage_caps_substeps_and_discards_backlog() {
        let owner = root();
        let stage = Stage::fixed(
            "physics",
            FixedStep {
                step: 0.5,
                max_substeps: 2,
            },
        );
        let log: Log = Rc::default();
        let _ = stage.add(logging(&log, 1), &owner);

        stage.frame(10.25, None);
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(stage.alpha(), 0.5, "only the sub-step remainder survives");
    }

    #[test]
    fn standard_pipeline_order_and_lookup() {
        let pipeline = StagePipeline::standard();
        let names: Vec<&str> = pipeline.iter().map(Stage::name).collect();
        assert_eq!(names, vec![EARLY, FIXED, UPDATE, LATE, RENDER, AFTER]);
        assert!(pipeline.get(UPDATE).is_some());
        assert!(pipeline.get("missing").is_none());
        assert!(StagePipeline::empty().is_empty());
    }
}
