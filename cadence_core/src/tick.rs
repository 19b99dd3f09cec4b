// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host tick primitive.
//!
//! The driver never spins its own loop. It asks a [`TickSource`] for one
//! callback at the next display refresh, and asks again at the end of every
//! tick that still has work. Platform backends implement the trait over
//! their display-synchronized callback queue (e.g. `requestAnimationFrame`);
//! [`ManualTicks`] is a deterministic implementation for headless hosts and
//! tests.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use crate::time::HostTime;

/// Callback scheduled on a [`TickSource`]. Receives the refresh timestamp.
pub type TickCallback = Box<dyn FnOnce(HostTime)>;

/// Identifies a requested tick so it can be cancelled.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TickId(pub u64);

impl fmt::Debug for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TickId({})", self.0)
    }
}

/// A display-synchronized one-shot callback queue.
///
/// Implementations must invoke each requested callback at most once, with
/// timestamps that never decrease across invocations, and never
/// synchronously from inside `request_tick`.
pub trait TickSource {
    /// Schedules `callback` for the next refresh.
    fn request_tick(&mut self, callback: TickCallback) -> TickId;

    /// Cancels a tick that has not fired yet. Unknown or already-fired ids
    /// are ignored.
    fn cancel_tick(&mut self, id: TickId);

    /// The host's current monotonic time, used to timestamp diagnostics.
    fn now(&self) -> HostTime;
}

#[derive(Default)]
struct ManualQueue {
    next_id: u64,
    queue: Vec<(TickId, TickCallback)>,
    now: HostTime,
    fired: u64,
}

/// A [`TickSource`] that fires only when told to.
///
/// Clones share the same queue: hand one clone to the driver and keep another
/// to call [`fire`](Self::fire).
#[derive(Clone, Default)]
pub struct ManualTicks {
    inner: Rc<RefCell<ManualQueue>>,
}

impl ManualTicks {
    /// Creates an empty tick source at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of callbacks waiting for the next refresh.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Number of callbacks fired so far.
    #[must_use]
    pub fn fired(&self) -> u64 {
        self.inner.borrow().fired
    }

    /// Simulates a display refresh at `now`.
    ///
    /// Every callback queued before this call runs once with `now`, in
    /// request order; callbacks requested while firing wait for the next
    /// refresh. `now` is clamped so timestamps never decrease. Returns the
    /// number of callbacks run.
    pub fn fire(&self, now: HostTime) -> usize {
        let (batch, now) = {
            let inner = &mut *self.inner.borrow_mut();
            inner.now = inner.now.max(now);
            inner.fired += inner.queue.len() as u64;
            (core::mem::take(&mut inner.queue), inner.now)
        };
        let count = batch.len();
        for (_, callback) in batch {
            callback(now);
        }
        count
    }
}

impl TickSource for ManualTicks {
    fn request_tick(&mut self, callback: TickCallback) -> TickId {
        let mut inner = self.inner.borrow_mut();
        let id = TickId(inner.next_id);
        inner.next_id += 1;
        inner.queue.push((id, callback));
        id
    }

    fn cancel_tick(&mut self, id: TickId) {
        self.inner.borrow_mut().queue.retain(|(queued, _)| *queued != id);
    }

    fn now(&self) -> HostTime {
        self.inner.borrow().now
    }
}

impl fmt::Debug for ManualTicks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ManualTicks")
            .field("pending", &inner.queue.len())
            .field("now", &inner.now)
            .field("fired", &inner.fired)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use core::cell::Cell;

    #[test]
    fn fire_runs_queued_callbacks_once() {
        let ticks = ManualTicks::new();
        let mut source = ticks.clone();
        let seen: Rc<RefCell<Vec<u64>>> = Rc::default();

        for _ in 0..2 {
            let seen = Rc::clone(&seen);
            source.request_tick(Box::new(move |t| seen.borrow_mut().push(t.ticks())));
        }
        assert_eq!(ticks.pending(), 2);
        assert_eq!(ticks.fire(HostTime(10)), 2);
        assert_eq!(ticks.fire(HostTime(20)), 0);
        assert_eq!(*seen.borrow(), vec![10, 10]);
        assert_eq!(ticks.fired(), 2);
    }

    #[test]
    fn cancelled_tick_never_fires() {
        let ticks = ManualTicks::new();
        let mut source = ticks.clone();
        let hit = Rc::new(Cell::new(false));
        let flag = Rc::clone(&hit);
        let id = source.request_tick(Box::new(move |_| flag.set(true)));
        source.cancel_tick(id);
        source.cancel_tick(id);

        assert_eq!(ticks.fire(HostTime(1)), 0);
        assert!(!hit.get());
    }

    #[test]
    fn requests_made_while_firing_wait_for_next_refresh() {
        let ticks = ManualTicks::new();
        let mut source = ticks.clone();
        let count = Rc::new(Cell::new(0));

        let counter = Rc::clone(&count);
        let mut again = ticks.clone();
        source.request_tick(Box::new(move |_| {
            counter.set(counter.get() + 1);
            let counter = Rc::clone(&counter);
            again.request_tick(Box::new(move |_| counter.set(counter.get() + 1)));
        }));

        ticks.fire(HostTime(1));
        assert_eq!(count.get(), 1);
        assert_eq!(ticks.pending(), 1);
        ticks.fire(HostTime(2));
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn timestamps_never_decrease() {
        let ticks = ManualTicks::new();
        let mut source = ticks.clone();
        ticks.fire(HostTime(100));
        let seen = Rc::new(Cell::new(HostTime(0)));
        let sink = Rc::clone(&seen);
        source.request_tick(Box::new(move |t| sink.set(t)));
        ticks.fire(HostTime(50));
        assert_eq!(seen.get(), HostTime(100));
        assert_eq!(source.now(), HostTime(100));
    }
}
