// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! Tick phases become duration slices on thread 0. Per-root events become
//! instants on a thread per root (`tid = root id + 1`). Events that carry no
//! timestamp of their own (root updates, skips, invalidations) are stamped
//! with the most recent tick or advance time.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use cadence_core::root::RootId;
use cadence_core::time::Timebase;

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps are converted to microseconds using the provided [`Timebase`].
pub fn export(bytes: &[u8], timebase: Timebase, writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    let mut last_ts = 0.0;

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::Tick(e) => {
                last_ts = ticks_to_us(e.now.ticks(), timebase);
                events.push(json!({
                    "ph": "i",
                    "name": "Tick",
                    "cat": "Driver",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "g",
                    "args": {
                        "frame_index": e.frame_index,
                    }
                }));
            }
            RecordedEvent::PhaseBegin(e) => {
                events.push(json!({
                    "ph": "B",
                    "name": format!("{:?}", e.phase),
                    "cat": "Tick",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "frame_index": e.frame_index,
                    }
                }));
            }
            RecordedEvent::PhaseEnd(e) => {
                events.push(json!({
                    "ph": "E",
                    "name": format!("{:?}", e.phase),
                    "cat": "Tick",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "frame_index": e.frame_index,
                    }
                }));
            }
            RecordedEvent::RootUpdate(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "RootUpdate",
                    "cat": "Root",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": root_tid(e.root),
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "delta_ms": e.delta * 1000.0,
                        "pending_frames": e.pending_frames,
                        "repeat": e.repeat,
                    }
                }));
            }
            RecordedEvent::RootSkip(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "RootSkip",
                    "cat": "Root",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": root_tid(e.root),
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "reason": format!("{:?}", e.reason),
                    }
                }));
            }
            RecordedEvent::Invalidate(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Invalidate",
                    "cat": "Root",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": root_tid(e.root),
                    "s": "t",
                    "args": {
                        "requested": e.requested,
                        "pending_frames": e.pending_frames,
                        "outcome": format!("{:?}", e.outcome),
                    }
                }));
            }
            RecordedEvent::Advance(e) => {
                last_ts = ticks_to_us(e.now.ticks(), timebase);
                events.push(json!({
                    "ph": "i",
                    "name": "Advance",
                    "cat": "Driver",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "g",
                    "args": {
                        "roots": e.roots,
                        "global_effects": e.global_effects,
                    }
                }));
            }
            RecordedEvent::Idle(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Idle",
                    "cat": "Driver",
                    "ts": ticks_to_us(e.now.ticks(), timebase),
                    "pid": 0,
                    "tid": 0,
                    "s": "g",
                    "args": {
                        "frame_index": e.frame_index,
                    }
                }));
            }
            RecordedEvent::TickSummary(s) => {
                events.push(json!({
                    "ph": "i",
                    "name": "TickSummary",
                    "cat": "Summary",
                    "ts": ticks_to_us(s.now.ticks(), timebase),
                    "pid": 0,
                    "tid": 0,
                    "s": "g",
                    "args": {
                        "frame_index": s.frame_index,
                        "roots_updated": s.roots_updated,
                        "roots_skipped": s.roots_skipped,
                        "repeat": s.repeat,
                        "went_idle": s.went_idle,
                        "before_us": ticks_to_us(s.before_ticks, timebase),
                        "roots_us": ticks_to_us(s.roots_ticks, timebase),
                        "after_us": ticks_to_us(s.after_ticks, timebase),
                        "tail_us": ticks_to_us(s.tail_ticks, timebase),
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn ticks_to_us(ticks: u64, timebase: Timebase) -> f64 {
    timebase.ticks_to_nanos(ticks) as f64 / 1000.0
}

fn root_tid(root: RootId) -> u64 {
    u64::from(root.0) + 1
}
