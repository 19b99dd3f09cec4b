// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render roots and their state.
//!
//! A [`Root`] is an independently owned rendering context: a [`RootId`] plus
//! a [`RootState`] holding everything the driver reads each tick (frame-loop
//! mode, clock, pending-frame counter, flags, stages, subscribers, renderer).
//!
//! Roots are created and destroyed by the host. The driver only iterates the
//! [`RootSet`] it was given and never adds or removes entries.
//!
//! Every `RootState` field uses interior mutability, so a callback handed
//! `&RootState` mid-frame may invalidate the root, flip its flags or
//! subscribe new callbacks without conflicting with the running tick.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::Any;
use core::cell::{Cell, Ref, RefCell, RefMut};
use core::fmt;

use crate::clock::FrameClock;
use crate::registry::{Registration, SlotList};
use crate::stage::{FrameCallback, Stage, StagePipeline, Subscription};

/// Default upper bound on the per-frame delta, in seconds.
pub const DEFAULT_MAX_DELTA: f64 = 0.1;

/// Identifies a root. Hosts assign these; the scheduler treats them as
/// opaque.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RootId(pub u32);

impl fmt::Debug for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootId({})", self.0)
    }
}

/// When a root wants frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FrameLoopMode {
    /// Render every tick while active.
    Always,
    /// Render only while invalidated frames remain.
    #[default]
    Demand,
    /// Never render from the driver; the host calls
    /// [`FrameLoop::advance`](crate::driver::FrameLoop::advance) itself.
    Never,
}

/// Whether the standing render entry submits frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RenderMode {
    /// The driver submits a frame through the root's [`Renderer`] each
    /// processed tick.
    #[default]
    Auto,
    /// The application renders from its own subscriptions.
    Manual,
}

/// Submits a frame for a root.
///
/// Scene, camera and graphics context live in the implementor; the driver
/// only decides when `render` is called.
pub trait Renderer {
    /// Draws the current frame.
    fn render(&mut self, state: &RootState);
}

/// Construction parameters for a [`Root`].
#[derive(Debug)]
pub struct RootConfig {
    /// Initial frame-loop mode.
    pub frameloop: FrameLoopMode,
    /// Initial render mode.
    pub render_mode: RenderMode,
    /// Upper bound on the clock delta handed to stages, in seconds.
    pub max_delta: f64,
    /// The root's stages.
    pub stages: StagePipeline,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            frameloop: FrameLoopMode::Demand,
            render_mode: RenderMode::Auto,
            max_delta: DEFAULT_MAX_DELTA,
            stages: StagePipeline::standard(),
        }
    }
}

/// Mutable per-root state read and written by the driver.
pub struct RootState {
    id: RootId,
    frameloop: Cell<FrameLoopMode>,
    render_mode: Cell<RenderMode>,
    pending_frames: Cell<u32>,
    max_delta: Cell<f64>,
    active: Cell<bool>,
    presenting: Cell<bool>,
    clock: RefCell<FrameClock>,
    stages: StagePipeline,
    subscribers: SlotList<Subscription>,
    renderer: RefCell<Option<Box<dyn Renderer>>>,
}

impl RootState {
    fn new(id: RootId, config: RootConfig) -> Self {
        let mut clock = FrameClock::new();
        if config.frameloop == FrameLoopMode::Never {
            clock.reset();
        }
        Self {
            id,
            frameloop: Cell::new(config.frameloop),
            render_mode: Cell::new(config.render_mode),
            pending_frames: Cell::new(0),
            max_delta: Cell::new(config.max_delta),
            active: Cell::new(true),
            presenting: Cell::new(false),
            clock: RefCell::new(clock),
            stages: config.stages,
            subscribers: SlotList::new(),
            renderer: RefCell::new(None),
        }
    }

    /// The root's identifier.
    #[must_use]
    pub fn id(&self) -> RootId {
        self.id
    }

    /// Current frame-loop mode.
    #[must_use]
    pub fn frameloop(&self) -> FrameLoopMode {
        self.frameloop.get()
    }

    /// Changes the frame-loop mode and resets the clock.
    ///
    /// The clock is stopped and zeroed; it is restarted unless the new mode
    /// is [`FrameLoopMode::Never`], in which case elapsed time only moves
    /// through [`advance`](crate::driver::FrameLoop::advance). This does not
    /// wake the driver; use
    /// [`FrameLoop::set_frameloop`](crate::driver::FrameLoop::set_frameloop)
    /// for that.
    pub fn set_frameloop(&self, mode: FrameLoopMode) {
        let mut clock = self.clock.borrow_mut();
        clock.reset();
        if mode != FrameLoopMode::Never {
            clock.start();
        }
        self.frameloop.set(mode);
    }

    /// Current render mode.
    #[must_use]
    pub fn render_mode(&self) -> RenderMode {
        self.render_mode.get()
    }

    /// Sets the render mode.
    pub fn set_render_mode(&self, mode: RenderMode) {
        self.render_mode.set(mode);
    }

    /// Frames still owed to this root by invalidation.
    #[must_use]
    pub fn pending_frames(&self) -> u32 {
        self.pending_frames.get()
    }

    /// Upper bound on the per-frame delta, in seconds.
    #[must_use]
    pub fn max_delta(&self) -> f64 {
        self.max_delta.get()
    }

    /// Sets the upper bound on the per-frame delta.
    pub fn set_max_delta(&self, seconds: f64) {
        self.max_delta.set(seconds);
    }

    /// Whether the root takes part in ticks.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Marks the root active or inactive. Inactive roots are skipped by the
    /// driver and ignore invalidation.
    pub fn set_active(&self, active: bool) {
        self.active.set(active);
    }

    /// Whether an exclusive presentation session (e.g. XR) owns this root's
    /// frames.
    #[must_use]
    pub fn is_presenting(&self) -> bool {
        self.presenting.get()
    }

    /// Enters or leaves exclusive presentation. While presenting, the host
    /// drives the root through
    /// [`advance`](crate::driver::FrameLoop::advance).
    pub fn set_presenting(&self, presenting: bool) {
        self.presenting.set(presenting);
    }

    /// Borrows the root's clock.
    ///
    /// # Panics
    ///
    /// Panics if called while the driver is sampling the clock, which never
    /// overlaps a user callback.
    #[must_use]
    pub fn clock(&self) -> Ref<'_, FrameClock> {
        self.clock.borrow()
    }

    pub(crate) fn clock_mut(&self) -> RefMut<'_, FrameClock> {
        self.clock.borrow_mut()
    }

    /// The root's stages.
    #[must_use]
    pub fn stages(&self) -> &StagePipeline {
        &self.stages
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn get_stage(&self, name: &str) -> Option<&Stage> {
        self.stages.get(name)
    }

    /// Registers a subscription that runs in the `update` stage with the
    /// state of `store`.
    ///
    /// `store` is usually the root owning this state, but may be another
    /// root whose state the callback wants to observe.
    pub fn subscribe(&self, callback: FrameCallback, store: &Rc<Root>) -> Registration {
        self.subscribers.push(Subscription::new(callback, store))
    }

    /// Number of registered subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Installs the renderer used when the render mode is
    /// [`RenderMode::Auto`], returning the previous one.
    ///
    /// # Panics
    ///
    /// Panics if called from inside [`Renderer::render`].
    pub fn set_renderer(&self, renderer: Box<dyn Renderer>) -> Option<Box<dyn Renderer>> {
        self.renderer.borrow_mut().replace(renderer)
    }

    /// Removes the renderer.
    ///
    /// # Panics
    ///
    /// Panics if called from inside [`Renderer::render`].
    pub fn take_renderer(&self) -> Option<Box<dyn Renderer>> {
        self.renderer.borrow_mut().take()
    }

    /// Runs every subscription in registration order.
    pub(crate) fn run_subscribers(&self, delta: f64, frame: Option<&dyn Any>) {
        self.subscribers.for_each_live(|sub| sub.run(delta, frame));
    }

    /// Submits a frame through the renderer, if one is installed. A render
    /// issued from inside the renderer is skipped.
    pub(crate) fn submit_frame(&self) {
        if let Ok(mut renderer) = self.renderer.try_borrow_mut()
            && let Some(renderer) = renderer.as_deref_mut()
        {
            renderer.render(self);
        }
    }

    /// Adds invalidated frames, clamped to `max`. Returns the new count.
    pub(crate) fn add_pending_frames(&self, frames: u32, max: u32) -> u32 {
        let pending = self.pending_frames.get().saturating_add(frames).min(max);
        self.pending_frames.set(pending);
        pending
    }

    /// Consumes one pending frame (floored at zero). Returns the remainder.
    pub(crate) fn consume_frame(&self) -> u32 {
        let pending = self.pending_frames.get().saturating_sub(1);
        self.pending_frames.set(pending);
        pending
    }
}

impl fmt::Debug for RootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootState")
            .field("id", &self.id)
            .field("frameloop", &self.frameloop.get())
            .field("render_mode", &self.render_mode.get())
            .field("pending_frames", &self.pending_frames.get())
            .field("max_delta", &self.max_delta.get())
            .field("active", &self.active.get())
            .field("presenting", &self.presenting.get())
            .field("clock", &self.clock.try_borrow().ok())
            .field("stages", &self.stages)
            .field("subscribers", &self.subscribers.len())
            .field("renderer", &self.renderer.try_borrow().map(|r| r.is_some()).ok())
            .finish()
    }
}

/// A rendering context owned by the host.
#[derive(Debug)]
pub struct Root {
    state: RootState,
}

impl Root {
    /// Creates a root. Roots are shared through `Rc` so subscriptions can
    /// refer back to them weakly.
    #[must_use]
    pub fn new(id: RootId, config: RootConfig) -> Rc<Self> {
        Rc::new(Self {
            state: RootState::new(id, config),
        })
    }

    /// The root's identifier.
    #[must_use]
    pub fn id(&self) -> RootId {
        self.state.id
    }

    /// The root's state.
    #[must_use]
    pub fn state(&self) -> &RootState {
        &self.state
    }

    /// Registers a subscription on this root observing this root's own
    /// state.
    pub fn subscribe(self: &Rc<Self>, callback: FrameCallback) -> Registration {
        self.state.subscribe(callback, self)
    }
}

/// Insertion-ordered set of live roots, shared between the host and the
/// driver.
///
/// Clones share the same underlying set.
#[derive(Clone, Default)]
pub struct RootSet {
    roots: Rc<RefCell<Vec<Rc<Root>>>>,
}

impl RootSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `root`. A root with the same id is replaced in place, keeping
    /// its position, and returned.
    pub fn insert(&self, root: Rc<Root>) -> Option<Rc<Root>> {
        let mut roots = self.roots.borrow_mut();
        match roots.iter_mut().find(|existing| existing.id() == root.id()) {
            Some(existing) => Some(core::mem::replace(existing, root)),
            None => {
                roots.push(root);
                None
            }
        }
    }

    /// Removes the root with `id`, preserving the order of the others.
    pub fn remove(&self, id: RootId) -> Option<Rc<Root>> {
        let mut roots = self.roots.borrow_mut();
        let index = roots.iter().position(|root| root.id() == id)?;
        Some(roots.remove(index))
    }

    /// Looks up a root by id.
    #[must_use]
    pub fn get(&self, id: RootId) -> Option<Rc<Root>> {
        self.roots
            .borrow()
            .iter()
            .find(|root| root.id() == id)
            .cloned()
    }

    /// Number of roots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.borrow().len()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.borrow().is_empty()
    }

    /// The roots present right now, in insertion order.
    ///
    /// The driver walks this snapshot so the host may add or remove roots
    /// from inside a callback.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Rc<Root>> {
        self.roots.borrow().clone()
    }
}

impl fmt::Debug for RootSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.roots.borrow().iter().map(|root| root.id()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{HostTime, Timebase};
    use alloc::vec;

    fn root(id: u32) -> Rc<Root> {
        Root::new(RootId(id), RootConfig::default())
    }

    fn ids(set: &RootSet) -> Vec<u32> {
        set.snapshot().iter().map(|root| root.id().0).collect()
    }

    #[test]
    fn root_set_keeps_insertion_order() {
        let set = RootSet::new();
        set.insert(root(3));
        set.insert(root(1));
        set.insert(root(2));
        assert_eq!(ids(&set), vec![3, 1, 2]);

        assert!(set.remove(RootId(1)).is_some());
        assert!(set.remove(RootId(1)).is_none());
        assert_eq!(ids(&set), vec![3, 2]);
    }

    #[test]
    fn root_set_replaces_in_place() {
        let set = RootSet::new();
        let first = root(1);
        set.insert(Rc::clone(&first));
        set.insert(root(2));

        let previous = set.insert(root(1)).expect("replaced");
        assert!(Rc::ptr_eq(&previous, &first));
        assert_eq!(ids(&set), vec![1, 2]);
        assert!(!Rc::ptr_eq(&set.get(RootId(1)).unwrap(), &first));
    }

    #[test]
    fn root_set_clones_share_membership() {
        let host = RootSet::new();
        let driver_view = host.clone();
        host.insert(root(5));
        assert_eq!(driver_view.len(), 1);
        assert!(driver_view.get(RootId(5)).is_some());
    }

    #[test]
    fn pending_frames_clamp_and_floor() {
        let r = root(0);
        let state = r.state();
        assert_eq!(state.add_pending_frames(50, 60), 50);
        assert_eq!(state.add_pending_frames(50, 60), 60);
        assert_eq!(state.add_pending_frames(u32::MAX, 60), 60);
        for _ in 0..60 {
            state.consume_frame();
        }
        assert_eq!(state.consume_frame(), 0);
        assert_eq!(state.pending_frames(), 0);
    }

    #[test]
    fn set_frameloop_resets_clock() {
        let r = root(0);
        let state = r.state();
        state.clock_mut().delta_at(HostTime(0), Timebase::MICROS);
        state.clock_mut().delta_at(HostTime(2_000_000), Timebase::MICROS);
        assert_eq!(state.clock().elapsed_time(), 2.0);

        state.set_frameloop(FrameLoopMode::Always);
        assert_eq!(state.frameloop(), FrameLoopMode::Always);
        assert_eq!(state.clock().elapsed_time(), 0.0);
        assert!(state.clock().is_running());

        state.set_frameloop(FrameLoopMode::Never);
        assert!(!state.clock().is_running());
    }

    #[test]
    fn defaults() {
        let r = root(9);
        let state = r.state();
        assert_eq!(state.id(), RootId(9));
        assert_eq!(state.frameloop(), FrameLoopMode::Demand);
        assert_eq!(state.render_mode(), RenderMode::Auto);
        assert_eq!(state.max_delta(), DEFAULT_MAX_DELTA);
        assert!(state.is_active());
        assert!(!state.is_presenting());
        assert_eq!(state.pending_frames(), 0);
        assert_eq!(state.stages().len(), 6);
    }

    #[test]
    fn renderer_is_called_and_replaceable() {
        struct Counting(Rc<Cell<u32>>);
        impl Renderer for Counting {
            fn render(&mut self, _state: &RootState) {
                self.0.set(self.0.get() + 1);
            }
        }

        let r = root(0);
        let count = Rc::new(Cell::new(0));
        assert!(r.state().set_renderer(Box::new(Counting(Rc::clone(&count)))).is_none());
        r.state().submit_frame();
        r.state().submit_frame();
        assert_eq!(count.get(), 2);

        assert!(r.state().take_renderer().is_some());
        r.state().submit_frame();
        assert_eq!(count.get(), 2);
    }
}
