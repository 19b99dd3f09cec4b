// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ordered callback lists with stable registration identity.
//!
//! Every list the scheduler iterates (global effects, stage subscribers, root
//! subscribers) is a [`SlotList`]. Entries are keyed by a monotonically
//! assigned slot id, so a [`Registration`] always removes exactly the entry it
//! was issued for, no matter how many entries were added or removed since.

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct SlotId(u64);

struct Entry<T> {
    id: SlotId,
    /// Cleared on removal so in-flight snapshots skip the entry.
    live: Rc<Cell<bool>>,
    value: T,
}

struct Slots<T> {
    next_id: u64,
    /// Sorted by id: ids are assigned in push order and removal keeps order.
    entries: Vec<Entry<T>>,
}

/// Insertion-ordered list whose entries can be removed by slot id.
///
/// The list is iterated through a snapshot so callbacks may add or remove
/// entries while it is being walked.
pub(crate) struct SlotList<T> {
    slots: Rc<RefCell<Slots<T>>>,
}

impl<T: Clone + 'static> SlotList<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Rc::new(RefCell::new(Slots {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Appends an entry and returns the handle that removes it.
    pub(crate) fn push(&self, entry: T) -> Registration {
        let id = {
            let mut slots = self.slots.borrow_mut();
            let id = SlotId(slots.next_id);
            slots.next_id += 1;
            slots.entries.push(Entry {
                id,
                live: Rc::new(Cell::new(true)),
                value: entry,
            });
            id
        };
        // Unsized coercion to the type-erased detach handle.
        let list: Weak<dyn Detach> = Rc::downgrade(&self.slots) as Weak<dyn Detach>;
        Registration { list, id }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.borrow().entries.len()
    }

    fn snapshot(&self) -> Vec<(Rc<Cell<bool>>, T)> {
        self.slots
            .borrow()
            .entries
            .iter()
            .map(|entry| (Rc::clone(&entry.live), entry.value.clone()))
            .collect()
    }

    /// Calls `f` for every entry that is still registered at the moment it
    /// is reached. Entries added during the walk are not visited.
    pub(crate) fn for_each_live(&self, mut f: impl FnMut(&T)) {
        for (live, entry) in self.snapshot() {
            if live.get() {
                f(&entry);
            }
        }
    }
}

impl<T> fmt::Debug for SlotList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotList")
            .field("len", &self.slots.borrow().entries.len())
            .finish()
    }
}

impl<T> Slots<T> {
    fn index_of(&self, id: SlotId) -> Option<usize> {
        self.entries.binary_search_by_key(&id, |entry| entry.id).ok()
    }
}

trait Detach {
    fn detach(&self, id: SlotId) -> bool;
    fn is_attached(&self, id: SlotId) -> bool;
}

impl<T> Detach for RefCell<Slots<T>> {
    fn detach(&self, id: SlotId) -> bool {
        // The entry is dropped after the borrow ends: its captures may
        // unregister other entries of this list.
        let removed = {
            let mut slots = self.borrow_mut();
            slots.index_of(id).map(|index| slots.entries.remove(index))
        };
        match removed {
            Some(entry) => {
                entry.live.set(false);
                true
            }
            None => false,
        }
    }

    fn is_attached(&self, id: SlotId) -> bool {
        self.borrow().index_of(id).is_some()
    }
}

/// Handle to a registered callback.
///
/// Dropping a `Registration` leaves the callback registered; call
/// [`remove`](Self::remove) to unregister it.
pub struct Registration {
    list: Weak<dyn Detach>,
    id: SlotId,
}

impl Registration {
    /// Removes the callback this handle was issued for.
    ///
    /// Returns `true` if the callback was still registered. Removing twice,
    /// or after the owning list has been dropped, is a no-op returning
    /// `false`.
    pub fn remove(&self) -> bool {
        self.list.upgrade().is_some_and(|list| list.detach(self.id))
    }

    /// Returns `true` while the callback is still registered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.list
            .upgrade()
            .is_some_and(|list| list.is_attached(self.id))
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("registered", &self.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn removal_targets_original_slot() {
        let list = SlotList::<u32>::new();
        let a = list.push(7);
        let b = list.push(7);
        let c = list.push(9);

        assert!(a.remove(), "first removal succeeds");
        assert!(!a.remove(), "second removal is a no-op");

        let mut seen = Vec::new();
        list.for_each_live(|v| seen.push(*v));
        assert_eq!(seen, vec![7, 9]);

        assert!(b.is_registered());
        assert!(c.remove());
        assert!(!c.is_registered());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn entries_removed_mid_walk_are_not_visited() {
        let list = SlotList::<u32>::new();
        let _first = list.push(1);
        let second = list.push(2);
        let _third = list.push(3);

        let mut seen = Vec::new();
        list.for_each_live(|v| {
            if *v == 1 {
                second.remove();
            }
            seen.push(*v);
        });
        assert_eq!(seen, vec![1, 3]);
    }

    #[test]
    fn walk_skips_every_entry_removed_ahead_of_it() {
        let list = SlotList::<u32>::new();
        let regs: Vec<Registration> = (0..8).map(|v| list.push(v)).collect();

        let mut seen = Vec::new();
        list.for_each_live(|v| {
            if *v == 0 {
                for reg in regs.iter().skip(1).step_by(2) {
                    assert!(reg.remove());
                }
            }
            seen.push(*v);
        });
        assert_eq!(seen, vec![0, 2, 4, 6]);
        assert!(regs[2].is_registered());
        assert!(!regs[3].is_registered());
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn entries_added_mid_walk_wait_for_next_walk() {
        let list = SlotList::<u32>::new();
        let _first = list.push(1);

        let mut seen = Vec::new();
        list.for_each_live(|v| {
            seen.push(*v);
            let _ = list.push(*v + 10);
        });
        assert_eq!(seen, vec![1]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn registration_outliving_list_is_inert() {
        let list = SlotList::<u32>::new();
        let reg = list.push(1);
        drop(list);
        assert!(!reg.is_registered());
        assert!(!reg.remove());
    }
}
