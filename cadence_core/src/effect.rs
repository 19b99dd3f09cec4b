// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Global frame effects.
//!
//! [`GlobalEffects`] holds three independent callback lists that the driver
//! flushes around the per-root work of every tick:
//!
//! ```text
//!   Before ──► roots (stages) ──► After ──► [repeat == 0] ──► Tail
//! ```
//!
//! Callbacks receive the tick's [`HostTime`]. Each list runs in registration
//! order and every callback runs exactly once per flush.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;

use crate::registry::{Registration, SlotList};
use crate::time::HostTime;

/// Which global effect list a callback belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectPhase {
    /// Runs at the start of every tick, before any root is processed.
    Before,
    /// Runs at the end of every tick, after all roots were processed.
    After,
    /// Runs once when the driver stops ticking and goes idle.
    Tail,
}

type EffectCell = Rc<RefCell<Box<dyn FnMut(HostTime)>>>;

/// The three global effect lists owned by a frame loop.
pub struct GlobalEffects {
    before: SlotList<EffectCell>,
    after: SlotList<EffectCell>,
    tail: SlotList<EffectCell>,
}

impl Default for GlobalEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalEffects {
    /// Creates empty effect lists.
    #[must_use]
    pub fn new() -> Self {
        Self {
            before: SlotList::new(),
            after: SlotList::new(),
            tail: SlotList::new(),
        }
    }

    /// Appends `callback` to the `phase` list.
    ///
    /// The returned [`Registration`] removes exactly this callback.
    pub fn add(&self, phase: EffectPhase, callback: impl FnMut(HostTime) + 'static) -> Registration {
        let cell: EffectCell = Rc::new(RefCell::new(Box::new(callback)));
        self.list(phase).push(cell)
    }

    /// Invokes every callback of `phase` with `timestamp`, in registration
    /// order.
    ///
    /// A callback removed by an earlier callback of the same flush is not
    /// invoked. A callback that is already running further up the stack is
    /// skipped for the nested flush.
    pub fn flush(&self, phase: EffectPhase, timestamp: HostTime) {
        self.list(phase).for_each_live(|cell| {
            if let Ok(mut callback) = cell.try_borrow_mut() {
                callback(timestamp);
            }
        });
    }

    /// Number of callbacks currently registered for `phase`.
    #[must_use]
    pub fn len(&self, phase: EffectPhase) -> usize {
        self.list(phase).len()
    }

    /// Returns `true` if no callback is registered in any phase.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.before.len() == 0 && self.after.len() == 0 && self.tail.len() == 0
    }

    fn list(&self, phase: EffectPhase) -> &SlotList<EffectCell> {
        match phase {
            EffectPhase::Before => &self.before,
            EffectPhase::After => &self.after,
            EffectPhase::Tail => &self.tail,
        }
    }
}

impl fmt::Debug for GlobalEffects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalEffects")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .field("tail", &self.tail.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::Cell;

    fn recorder() -> Rc<RefCell<Vec<(&'static str, u64)>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn flush_runs_in_registration_order_with_timestamp() {
        let effects = GlobalEffects::new();
        let log = recorder();
        for name in ["a", "b", "c"] {
            let log = Rc::clone(&log);
            let _ = effects.add(EffectPhase::Before, move |t| log.borrow_mut().push((name, t.ticks())));
        }
        let after_log = Rc::clone(&log);
        let _ = effects.add(EffectPhase::After, move |t| after_log.borrow_mut().push(("after", t.ticks())));

        effects.flush(EffectPhase::Before, HostTime(16));
        assert_eq!(*log.borrow(), vec![("a", 16), ("b", 16), ("c", 16)]);
        assert_eq!(effects.len(EffectPhase::After), 1);
        assert_eq!(effects.len(EffectPhase::Tail), 0);
    }

    #[test]
    fn removal_is_idempotent() {
        let effects = GlobalEffects::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let reg = effects.add(EffectPhase::Tail, move |_| counter.set(counter.get() + 1));

        effects.flush(EffectPhase::Tail, HostTime(0));
        assert!(reg.remove());
        assert!(!reg.remove());
        effects.flush(EffectPhase::Tail, HostTime(1));
        assert_eq!(hits.get(), 1);
        assert!(effects.is_empty());
    }

    #[test]
    fn callback_can_remove_a_later_sibling_mid_flush() {
        let effects = GlobalEffects::new();
        let log = recorder();
        let victim: Rc<RefCell<Option<Registration>>> = Rc::new(RefCell::new(None));

        let remover_victim = Rc::clone(&victim);
        let remover_log = Rc::clone(&log);
        let _ = effects.add(EffectPhase::After, move |t| {
            remover_log.borrow_mut().push(("remover", t.ticks()));
            if let Some(reg) = remover_victim.borrow().as_ref() {
                reg.remove();
            }
        });
        let victim_log = Rc::clone(&log);
        *victim.borrow_mut() = Some(effects.add(EffectPhase::After, move |t| {
            victim_log.borrow_mut().push(("victim", t.ticks()));
        }));

        effects.flush(EffectPhase::After, HostTime(1));
        effects.flush(EffectPhase::After, HostTime(2));
        assert_eq!(*log.borrow(), vec![("remover", 1), ("remover", 2)]);
    }

    #[test]
    fn callback_can_remove_itself() {
        let effects = GlobalEffects::new();
        let hits = Rc::new(Cell::new(0));
        let own: Rc<RefCell<Option<Registration>>> = Rc::new(RefCell::new(None));

        let counter = Rc::clone(&hits);
        let own_handle = Rc::clone(&own);
        *own.borrow_mut() = Some(effects.add(EffectPhase::Before, move |_| {
            counter.set(counter.get() + 1);
            if let Some(reg) = own_handle.borrow().as_ref() {
                reg.remove();
            }
        }));

        effects.flush(EffectPhase::Before, HostTime(0));
        effects.flush(EffectPhase::Before, HostTime(1));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn nested_flush_skips_running_callback() {
        let effects = Rc::new(GlobalEffects::new());
        let depth = Rc::new(Cell::new(0));

        let inner_effects = Rc::clone(&effects);
        let counter = Rc::clone(&depth);
        let _ = effects.add(EffectPhase::Before, move |t| {
            counter.set(counter.get() + 1);
            // Re-entering the same phase must not recurse into this callback.
            inner_effects.flush(EffectPhase::Before, t);
        });

        effects.flush(EffectPhase::Before, HostTime(0));
        assert_eq!(depth.get(), 1);
    }
}
