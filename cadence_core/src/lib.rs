// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! On-demand frame scheduling for independently owned render roots.
//!
//! `cadence_core` drives any number of rendering contexts ("roots") from a
//! single display-synchronized tick source, and stops asking for ticks once
//! no root has work left. A root asks for work by being
//! [invalidated](driver::FrameLoop::invalidate); the driver wakes, ticks
//! until every root has consumed its pending frames, runs its tail effects
//! and goes idle again. It is `no_std` compatible (with `alloc`) and
//! single-threaded by construction.
//!
//! # Architecture
//!
//! ```text
//!   invalidate(root, n) ──► FrameLoop ──► TickSource::request_tick()
//!                               ▲                    │
//!                               │                    ▼
//!                  repeat > 0   │            tick(timestamp)
//!                               │                    │
//!        ┌──────────────────────┴────────────────────┘
//!        ▼
//!   Before effects ──► for each root: early ─► fixed ─► update ─► late ─► render ─► after
//!                                                                                   │
//!        ┌──────────────────────────────────────────────────────────────────────────┘
//!        ▼
//!   After effects ──► repeat == 0 ? Tail effects, idle : request next tick
//! ```
//!
//! **[`driver`]**: [`FrameLoop`](driver::FrameLoop), the tick algorithm
//! and the invalidation API.
//!
//! **[`root`]**: [`Root`](root::Root), its mutable
//! [`RootState`](root::RootState) and the shared [`RootSet`](root::RootSet).
//!
//! **[`stage`]**: named per-root phases, swappable
//! [`FrameCallback`](stage::FrameCallback)s and fixed-timestep stages.
//!
//! **[`effect`]**: the global before/after/tail effect lists.
//!
//! **[`tick`]**: the [`TickSource`](tick::TickSource) trait that platform
//! backends implement, plus [`ManualTicks`](tick::ManualTicks) for headless
//! hosts.
//!
//! **[`clock`]**: per-root elapsed-time tracking.
//!
//! **[`time`]**: [`HostTime`](time::HostTime),
//! [`Duration`](time::Duration) and [`Timebase`](time::Timebase).
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! frame-loop instrumentation.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use cadence_core::driver::{DriverState, FrameLoop, FrameLoopConfig};
//! use cadence_core::root::{Root, RootConfig, RootId, RootSet};
//! use cadence_core::stage::FrameCallback;
//! use cadence_core::tick::ManualTicks;
//! use cadence_core::time::HostTime;
//!
//! let ticks = ManualTicks::new();
//! let roots = RootSet::new();
//! let frames = FrameLoop::new(roots.clone(), ticks.clone(), FrameLoopConfig::web());
//!
//! let root = Root::new(RootId(0), RootConfig::default());
//! roots.insert(Rc::clone(&root));
//!
//! let updates = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&updates);
//! let _sub = root.subscribe(FrameCallback::new(move |_, _, _| counter.set(counter.get() + 1)));
//!
//! frames.invalidate(Some(root.state()), 2);
//! ticks.fire(HostTime(16_667));
//! ticks.fire(HostTime(33_333));
//! assert_eq!(updates.get(), 2);
//! assert_eq!(frames.state(), DriverState::Idle);
//! ```
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables trace event dispatch (one branch
//!   per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod clock;
pub mod driver;
pub mod effect;
mod registry;
pub mod root;
pub mod stage;
pub mod tick;
pub mod time;
pub mod trace;

pub use registry::Registration;
