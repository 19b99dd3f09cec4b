// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`], and [`replay`] feeds them into
//! another sink.

use cadence_core::root::RootId;
use cadence_core::time::HostTime;
use cadence_core::trace::{
    AdvanceEvent, IdleEvent, InvalidateEvent, InvalidateOutcome, PhaseBeginEvent, PhaseEndEvent,
    PhaseKind, RootSkipEvent, RootUpdateEvent, SkipReason, TickEvent, TickSummary, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_TICK: u8 = 1;
const TAG_PHASE_BEGIN: u8 = 2;
const TAG_PHASE_END: u8 = 3;
const TAG_ROOT_UPDATE: u8 = 4;
const TAG_ROOT_SKIP: u8 = 5;
const TAG_INVALIDATE: u8 = 6;
const TAG_ADVANCE: u8 = 7;
const TAG_IDLE: u8 = 8;
const TAG_TICK_SUMMARY: u8 = 9;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Discards everything recorded so far.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn write_option_u64(&mut self, v: Option<u64>) {
        match v {
            Some(val) => {
                self.write_u8(1);
                self.write_u64(val);
            }
            None => {
                self.write_u8(0);
                self.write_u64(0);
            }
        }
    }

    fn write_phase(&mut self, p: PhaseKind) {
        self.write_u8(match p {
            PhaseKind::BeforeEffects => 0,
            PhaseKind::Roots => 1,
            PhaseKind::AfterEffects => 2,
            PhaseKind::TailEffects => 3,
        });
    }

    fn write_skip_reason(&mut self, r: SkipReason) {
        self.write_u8(match r {
            SkipReason::Inactive => 0,
            SkipReason::NoPendingFrames => 1,
            SkipReason::Presenting => 2,
        });
    }

    fn write_outcome(&mut self, o: InvalidateOutcome) {
        self.write_u8(match o {
            InvalidateOutcome::Accepted => 0,
            InvalidateOutcome::Woke => 1,
            InvalidateOutcome::IgnoredInactive => 2,
            InvalidateOutcome::IgnoredNever => 3,
            InvalidateOutcome::IgnoredPresenting => 4,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_tick(&mut self, e: &TickEvent) {
        self.write_u8(TAG_TICK);
        self.write_u64(e.frame_index);
        self.write_u64(e.now.ticks());
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_u8(TAG_PHASE_BEGIN);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_u8(TAG_PHASE_END);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_root_update(&mut self, e: &RootUpdateEvent) {
        self.write_u8(TAG_ROOT_UPDATE);
        self.write_option_u64(e.frame_index);
        self.write_u32(e.root.0);
        self.write_f64(e.delta);
        self.write_u32(e.pending_frames);
        self.write_u32(e.repeat);
    }

    fn on_root_skip(&mut self, e: &RootSkipEvent) {
        self.write_u8(TAG_ROOT_SKIP);
        self.write_u64(e.frame_index);
        self.write_u32(e.root.0);
        self.write_skip_reason(e.reason);
    }

    fn on_invalidate(&mut self, e: &InvalidateEvent) {
        self.write_u8(TAG_INVALIDATE);
        self.write_u32(e.root.0);
        self.write_u32(e.requested);
        self.write_u32(e.pending_frames);
        self.write_outcome(e.outcome);
    }

    fn on_advance(&mut self, e: &AdvanceEvent) {
        self.write_u8(TAG_ADVANCE);
        self.write_u64(e.now.ticks());
        self.write_u32(e.roots);
        self.write_bool(e.global_effects);
    }

    fn on_idle(&mut self, e: &IdleEvent) {
        self.write_u8(TAG_IDLE);
        self.write_u64(e.frame_index);
        self.write_u64(e.now.ticks());
    }

    fn on_tick_summary(&mut self, s: &TickSummary) {
        self.write_u8(TAG_TICK_SUMMARY);
        self.write_u64(s.frame_index);
        self.write_u64(s.now.ticks());
        self.write_u32(s.roots_updated);
        self.write_u32(s.roots_skipped);
        self.write_u32(s.repeat);
        self.write_bool(s.went_idle);
        self.write_u64(s.before_ticks);
        self.write_u64(s.roots_ticks);
        self.write_u64(s.after_ticks);
        self.write_u64(s.tail_ticks);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`TickEvent`].
    Tick(TickEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// A [`RootUpdateEvent`].
    RootUpdate(RootUpdateEvent),
    /// A [`RootSkipEvent`].
    RootSkip(RootSkipEvent),
    /// An [`InvalidateEvent`].
    Invalidate(InvalidateEvent),
    /// An [`AdvanceEvent`].
    Advance(AdvanceEvent),
    /// An [`IdleEvent`].
    Idle(IdleEvent),
    /// A [`TickSummary`].
    TickSummary(TickSummary),
}

impl RecordedEvent {
    /// Dispatches this event to the matching `sink` method.
    pub fn dispatch(&self, sink: &mut dyn TraceSink) {
        match self {
            Self::Tick(e) => sink.on_tick(e),
            Self::PhaseBegin(e) => sink.on_phase_begin(e),
            Self::PhaseEnd(e) => sink.on_phase_end(e),
            Self::RootUpdate(e) => sink.on_root_update(e),
            Self::RootSkip(e) => sink.on_root_skip(e),
            Self::Invalidate(e) => sink.on_invalidate(e),
            Self::Advance(e) => sink.on_advance(e),
            Self::Idle(e) => sink.on_idle(e),
            Self::TickSummary(s) => sink.on_tick_summary(s),
        }
    }
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
///
/// Iteration stops at the first unknown tag or truncated record.
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Feeds every event of a recording into `sink`, in recorded order.
///
/// Returns the number of events replayed.
pub fn replay(bytes: &[u8], sink: &mut dyn TraceSink) -> usize {
    let mut count = 0;
    for event in decode(bytes) {
        event.dispatch(sink);
        count += 1;
    }
    count
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let bytes = self.data.get(self.pos..end)?.try_into().ok()?;
        self.pos = end;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[v]| v)
    }

    fn read_bool(&mut self) -> Option<bool> {
        self.read_u8().map(|v| v != 0)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_f64(&mut self) -> Option<f64> {
        self.read_u64().map(f64::from_bits)
    }

    fn read_option_u64(&mut self) -> Option<Option<u64>> {
        let present = self.read_u8()?;
        let val = self.read_u64()?;
        Some(if present != 0 { Some(val) } else { None })
    }

    fn read_phase(&mut self) -> Option<PhaseKind> {
        Some(match self.read_u8()? {
            0 => PhaseKind::BeforeEffects,
            1 => PhaseKind::Roots,
            2 => PhaseKind::AfterEffects,
            _ => PhaseKind::TailEffects,
        })
    }

    fn read_skip_reason(&mut self) -> Option<SkipReason> {
        Some(match self.read_u8()? {
            0 => SkipReason::Inactive,
            1 => SkipReason::NoPendingFrames,
            _ => SkipReason::Presenting,
        })
    }

    fn read_outcome(&mut self) -> Option<InvalidateOutcome> {
        Some(match self.read_u8()? {
            0 => InvalidateOutcome::Accepted,
            1 => InvalidateOutcome::Woke,
            2 => InvalidateOutcome::IgnoredInactive,
            3 => InvalidateOutcome::IgnoredNever,
            _ => InvalidateOutcome::IgnoredPresenting,
        })
    }

    fn decode_tick(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Tick(TickEvent {
            frame_index: self.read_u64()?,
            now: HostTime(self.read_u64()?),
        }))
    }

    fn decode_phase_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: HostTime(self.read_u64()?),
        }))
    }

    fn decode_phase_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: HostTime(self.read_u64()?),
        }))
    }

    fn decode_root_update(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::RootUpdate(RootUpdateEvent {
            frame_index: self.read_option_u64()?,
            root: RootId(self.read_u32()?),
            delta: self.read_f64()?,
            pending_frames: self.read_u32()?,
            repeat: self.read_u32()?,
        }))
    }

    fn decode_root_skip(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::RootSkip(RootSkipEvent {
            frame_index: self.read_u64()?,
            root: RootId(self.read_u32()?),
            reason: self.read_skip_reason()?,
        }))
    }

    fn decode_invalidate(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Invalidate(InvalidateEvent {
            root: RootId(self.read_u32()?),
            requested: self.read_u32()?,
            pending_frames: self.read_u32()?,
            outcome: self.read_outcome()?,
        }))
    }

    fn decode_advance(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Advance(AdvanceEvent {
            now: HostTime(self.read_u64()?),
            roots: self.read_u32()?,
            global_effects: self.read_bool()?,
        }))
    }

    fn decode_idle(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Idle(IdleEvent {
            frame_index: self.read_u64()?,
            now: HostTime(self.read_u64()?),
        }))
    }

    fn decode_tick_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::TickSummary(TickSummary {
            frame_index: self.read_u64()?,
            now: HostTime(self.read_u64()?),
            roots_updated: self.read_u32()?,
            roots_skipped: self.read_u32()?,
            repeat: self.read_u32()?,
            went_idle: self.read_bool()?,
            before_ticks: self.read_u64()?,
            roots_ticks: self.read_u64()?,
            after_ticks: self.read_u64()?,
            tail_ticks: self.read_u64()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_TICK => self.decode_tick(),
            TAG_PHASE_BEGIN => self.decode_phase_begin(),
            TAG_PHASE_END => self.decode_phase_end(),
            TAG_ROOT_UPDATE => self.decode_root_update(),
            TAG_ROOT_SKIP => self.decode_root_skip(),
            TAG_INVALIDATE => self.decode_invalidate(),
            TAG_ADVANCE => self.decode_advance(),
            TAG_IDLE => self.decode_idle(),
            TAG_TICK_SUMMARY => self.decode_tick_summary(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use cadence_core::driver::{FrameLoop, FrameLoopConfig};
    use cadence_core::root::{Root, RootConfig, RootSet};
    use cadence_core::tick::ManualTicks;

    fn tag(event: &RecordedEvent) -> &'static str {
        match event {
            RecordedEvent::Tick(_) => "tick",
            RecordedEvent::PhaseBegin(_) => "begin",
            RecordedEvent::PhaseEnd(_) => "end",
            RecordedEvent::RootUpdate(_) => "update",
            RecordedEvent::RootSkip(_) => "skip",
            RecordedEvent::Invalidate(_) => "invalidate",
            RecordedEvent::Advance(_) => "advance",
            RecordedEvent::Idle(_) => "idle",
            RecordedEvent::TickSummary(_) => "summary",
        }
    }

    #[test]
    fn root_update_keeps_delta_bits_and_missing_frame_index() {
        let mut rec = RecorderSink::new();
        rec.on_root_update(&RootUpdateEvent {
            frame_index: None,
            root: RootId(4),
            delta: 1.0 / 60.0,
            pending_frames: 3,
            repeat: 3,
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 1);
        match &events[0] {
            RecordedEvent::RootUpdate(e) => {
                assert_eq!(e.frame_index, None);
                assert_eq!(e.root, RootId(4));
                assert_eq!(e.delta.to_bits(), (1.0_f64 / 60.0).to_bits());
                assert_eq!(e.pending_frames, 3);
                assert_eq!(e.repeat, 3);
            }
            other => panic!("expected RootUpdate, got {other:?}"),
        }
    }

    #[test]
    fn invalidate_and_skip_enums_survive() {
        let mut rec = RecorderSink::new();
        rec.on_invalidate(&InvalidateEvent {
            root: RootId(1),
            requested: 0,
            pending_frames: 1,
            outcome: InvalidateOutcome::IgnoredPresenting,
        });
        rec.on_root_skip(&RootSkipEvent {
            frame_index: 9,
            root: RootId(2),
            reason: SkipReason::Inactive,
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            RecordedEvent::Invalidate(InvalidateEvent {
                outcome: InvalidateOutcome::IgnoredPresenting,
                ..
            })
        ));
        assert!(matches!(
            events[1],
            RecordedEvent::RootSkip(RootSkipEvent {
                frame_index: 9,
                reason: SkipReason::Inactive,
                ..
            })
        ));
    }

    #[test]
    fn truncated_record_stops_decoding() {
        let mut rec = RecorderSink::new();
        rec.on_tick(&TickEvent {
            frame_index: 1,
            now: HostTime(10),
        });
        rec.on_idle(&IdleEvent {
            frame_index: 1,
            now: HostTime(10),
        });
        let bytes = rec.into_bytes();

        let events: Vec<_> = decode(&bytes[..bytes.len() - 3]).collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RecordedEvent::Tick(_)));
    }

    #[test]
    fn empty_buffer_decodes_to_nothing() {
        let events: Vec<_> = decode(&[]).collect();
        assert!(events.is_empty());
    }

    #[test]
    fn records_a_demand_session_from_the_driver() {
        let ticks = ManualTicks::new();
        let roots = RootSet::new();
        let frames = FrameLoop::new(roots.clone(), ticks.clone(), FrameLoopConfig::web());
        let root = Root::new(RootId(0), RootConfig::default());
        roots.insert(Rc::clone(&root));
        let recorder = Rc::new(RefCell::new(RecorderSink::new()));
        let _ = frames.set_trace_sink(Some(Box::new(Rc::clone(&recorder))));

        frames.invalidate(Some(root.state()), 1);
        ticks.fire(HostTime(16_667));

        let recorder = recorder.borrow();
        let tags: Vec<_> = decode(recorder.as_bytes()).map(|e| tag(&e)).collect();
        assert_eq!(
            tags,
            [
                "invalidate",
                "tick",
                "begin",
                "end",
                "begin",
                "update",
                "end",
                "begin",
                "end",
                "idle",
                "begin",
                "end",
                "summary",
            ]
        );
    }

    #[test]
    fn replay_feeds_another_sink() {
        #[derive(Default)]
        struct Ticks(Vec<u64>);
        impl TraceSink for Ticks {
            fn on_tick(&mut self, e: &TickEvent) {
                self.0.push(e.frame_index);
            }
        }

        let mut rec = RecorderSink::new();
        for frame_index in 0..3 {
            rec.on_tick(&TickEvent {
                frame_index,
                now: HostTime(frame_index * 100),
            });
            rec.on_idle(&IdleEvent {
                frame_index,
                now: HostTime(frame_index * 100),
            });
        }

        let mut sink = Ticks::default();
        assert_eq!(replay(rec.as_bytes(), &mut sink), 6);
        assert_eq!(sink.0, [0, 1, 2]);
    }
}
