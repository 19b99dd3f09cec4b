// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `requestAnimationFrame` tick source.
//!
//! [`RafTicks`] implements [`TickSource`] over the browser's
//! `requestAnimationFrame` API. Each browser callback receives a
//! [`DOMHighResTimeStamp`][mdn] (milliseconds from `performance.now()`),
//! which is converted to microsecond [`HostTime`] ticks and handed to every
//! tick requested before that frame.
//!
//! [mdn]: https://developer.mozilla.org/en-US/docs/Web/API/DOMHighResTimeStamp

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;

use cadence_core::tick::{TickCallback, TickId, TickSource};
use cadence_core::time::HostTime;

use crate::host_time_from_dom_timestamp;

// Direct global bindings instead of `web_sys::Window` methods, so no
// Window/Performance objects are fetched (and unwrapped) on every frame.
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = performance, js_name = "now")]
    pub(crate) fn performance_now() -> f64;

    #[wasm_bindgen(js_name = "requestAnimationFrame")]
    fn request_animation_frame(callback: &JsValue) -> i32;

    #[wasm_bindgen(js_name = "cancelAnimationFrame")]
    fn cancel_animation_frame(id: i32);
}

type RafClosure = Closure<dyn FnMut(f64)>;

struct RafInner {
    /// The JS closure registered with `requestAnimationFrame`.
    ///
    /// Created on the first request and reused for every frame after that.
    closure: RefCell<Option<RafClosure>>,

    /// Ticks waiting for the next animation frame, in request order.
    pending: RefCell<Vec<(TickId, TickCallback)>>,

    next_id: Cell<u64>,

    /// The id of the outstanding `requestAnimationFrame` call, if any.
    raf_id: Cell<Option<i32>>,

    /// Latest timestamp handed out; later frames never report less.
    last: Cell<HostTime>,
}

/// A [`TickSource`] backed by `requestAnimationFrame`.
///
/// At most one browser frame is requested at a time no matter how many ticks
/// are queued. Dropping the source cancels the outstanding frame.
pub struct RafTicks {
    inner: Rc<RafInner>,
}

impl Default for RafTicks {
    fn default() -> Self {
        Self::new()
    }
}

impl RafTicks {
    /// Creates a tick source with nothing requested.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RafInner {
                closure: RefCell::new(None),
                pending: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                raf_id: Cell::new(None),
                last: Cell::new(HostTime(0)),
            }),
        }
    }

    /// Number of ticks waiting for the next animation frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Returns `true` while a browser frame is requested.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.inner.raf_id.get().is_some()
    }
}

impl RafInner {
    fn schedule(self: &Rc<Self>) {
        if self.raf_id.get().is_some() {
            return;
        }
        let mut slot = self.closure.borrow_mut();
        let closure = slot.get_or_insert_with(|| {
            let weak = Rc::downgrade(self);
            Closure::wrap(Box::new(move |timestamp_ms: f64| on_frame(&weak, timestamp_ms))
                as Box<dyn FnMut(f64)>)
        });
        let id = request_animation_frame(closure.as_ref().unchecked_ref());
        self.raf_id.set(Some(id));
    }

    fn cancel_frame(&self) {
        if let Some(id) = self.raf_id.take() {
            cancel_animation_frame(id);
        }
    }
}

fn on_frame(weak: &Weak<RafInner>, timestamp_ms: f64) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    inner.raf_id.set(None);

    let now = host_time_from_dom_timestamp(timestamp_ms).max(inner.last.get());
    inner.last.set(now);

    // Requests made by these callbacks queue up for the next frame.
    let batch = core::mem::take(&mut *inner.pending.borrow_mut());
    for (_, callback) in batch {
        callback(now);
    }
}

impl TickSource for RafTicks {
    fn request_tick(&mut self, callback: TickCallback) -> TickId {
        let id = TickId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        self.inner.pending.borrow_mut().push((id, callback));
        self.inner.schedule();
        id
    }

    fn cancel_tick(&mut self, id: TickId) {
        let mut pending = self.inner.pending.borrow_mut();
        pending.retain(|(queued, _)| *queued != id);
        if pending.is_empty() {
            self.inner.cancel_frame();
        }
    }

    fn now(&self) -> HostTime {
        host_time_from_dom_timestamp(performance_now()).max(self.inner.last.get())
    }
}

impl Drop for RafTicks {
    fn drop(&mut self) {
        self.inner.cancel_frame();
        // Drop the JS closure so it doesn't leak.
        self.inner.closure.borrow_mut().take();
    }
}

impl core::fmt::Debug for RafTicks {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RafTicks")
            .field("pending", &self.inner.pending.try_borrow().map(|p| p.len()).ok())
            .field("raf_id", &self.inner.raf_id.get())
            .field("last", &self.inner.last.get())
            .finish_non_exhaustive()
    }
}
