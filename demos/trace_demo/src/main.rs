// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Headless frame loop that exercises the tracing and diagnostics pipeline.
//!
//! Drives three roots through 60 simulated display refreshes:
//!
//! - `scene` renders on demand and is invalidated twice;
//! - `spinner` animates every frame, then switches itself to on-demand;
//! - `video` is clocked by the host through `advance`.
//!
//! Events are captured by a
//! [`RecorderSink`](cadence_debug::recorder::RecorderSink), replayed through
//! a [`PrettyPrintSink`](cadence_debug::pretty::PrettyPrintSink) and exported
//! as a Chrome trace JSON file.

use std::cell::{Cell, RefCell};
use std::fs::File;
use std::io::BufWriter;
use std::rc::Rc;

use cadence_core::driver::{FrameLoop, FrameLoopConfig};
use cadence_core::effect::EffectPhase;
use cadence_core::root::{FrameLoopMode, Renderer, Root, RootConfig, RootId, RootSet, RootState};
use cadence_core::stage::FrameCallback;
use cadence_core::tick::ManualTicks;
use cadence_core::time::HostTime;

use cadence_debug::pretty::PrettyPrintSink;
use cadence_debug::recorder::{self, RecorderSink};

const REFRESH_COUNT: u64 = 60;
/// 16.6ms refresh interval in nanoseconds (≈60 Hz).
const REFRESH_INTERVAL_NS: u64 = 16_666_667;
/// Frames the spinner animates before going on-demand.
const SPIN_FRAMES: u32 = 30;

/// Counts submitted frames.
struct CountingRenderer(Rc<Cell<u32>>);

impl Renderer for CountingRenderer {
    fn render(&mut self, _state: &RootState) {
        self.0.set(self.0.get() + 1);
    }
}

fn root(roots: &RootSet, id: u32, frameloop: FrameLoopMode) -> (Rc<Root>, Rc<Cell<u32>>) {
    let root = Root::new(
        RootId(id),
        RootConfig {
            frameloop,
            ..RootConfig::default()
        },
    );
    let rendered = Rc::new(Cell::new(0));
    root.state()
        .set_renderer(Box::new(CountingRenderer(Rc::clone(&rendered))));
    roots.insert(Rc::clone(&root));
    (root, rendered)
}

fn main() {
    let config = FrameLoopConfig::native();
    let timebase = config.timebase;

    // -- driver ------------------------------------------------------------
    let ticks = ManualTicks::new();
    let roots = RootSet::new();
    let frames = FrameLoop::new(roots.clone(), ticks.clone(), config);

    let recorder = Rc::new(RefCell::new(RecorderSink::new()));
    let _ = frames.set_trace_sink(Some(Box::new(Rc::clone(&recorder))));

    let idles = Rc::new(Cell::new(0_u32));
    let idle_count = Rc::clone(&idles);
    let _tail = frames.add_effect(EffectPhase::Tail, move |_| idle_count.set(idle_count.get() + 1));

    // -- roots -------------------------------------------------------------
    let (scene, scene_frames) = root(&roots, 0, FrameLoopMode::Demand);
    let (spinner, spinner_frames) = root(&roots, 1, FrameLoopMode::Always);
    let (video, video_frames) = root(&roots, 2, FrameLoopMode::Never);

    let spins = Rc::new(Cell::new(0_u32));
    let spin_count = Rc::clone(&spins);
    let driver = frames.clone();
    let _spin = spinner.subscribe(FrameCallback::new(move |state, _, _| {
        spin_count.set(spin_count.get() + 1);
        if spin_count.get() == SPIN_FRAMES {
            driver.set_frameloop(state, FrameLoopMode::Demand);
        }
    }));

    // -- simulated display -------------------------------------------------
    let mut now_ticks: u64 = 1_000_000_000; // start at 1s

    frames.invalidate(Some(scene.state()), 3);
    frames.invalidate(Some(spinner.state()), 1);

    for refresh in 0..REFRESH_COUNT {
        let now = HostTime(now_ticks);
        ticks.fire(now);

        if refresh % 4 == 0 {
            frames.advance(now, false, Some(&video), None);
        }
        if refresh == 45 {
            frames.invalidate(Some(scene.state()), 2);
        }

        now_ticks += REFRESH_INTERVAL_NS;
    }

    // -- report ------------------------------------------------------------
    let bytes = recorder.borrow().as_bytes().to_vec();
    let mut pretty = PrettyPrintSink::new(Box::new(std::io::stdout()), timebase);
    let replayed = recorder::replay(&bytes, &mut pretty);

    println!(
        "ticks={} idles={} scene={} spinner={} video={} events={replayed}",
        frames.frame_index(),
        idles.get(),
        scene_frames.get(),
        spinner_frames.get(),
        video_frames.get(),
    );

    // -- export Chrome trace -----------------------------------------------
    let path = "trace.json";
    let file = File::create(path).expect("failed to create trace.json");
    let mut writer = BufWriter::new(file);
    cadence_debug::chrome::export(&bytes, timebase, &mut writer)
        .expect("failed to write Chrome trace");

    println!("Wrote {path} ({REFRESH_COUNT} refreshes)");
}
