//! Drive a `TrackingContext` from a replay script and print what a renderer
//! bound to each target would see.
//!
//! Usage: track_replay <script.json> [pattern_id]

use std::time::Duration;

use artrack::core::FrameView;
use artrack::tracking::replay::{ReplayScript, ScriptedAnalyzer};
use artrack::tracking::{
    ContextParams, ControlTarget, MarkerControlsParams, PerformanceProfile, TrackingContext,
};

#[cfg(not(feature = "tracing"))]
use artrack::core::init_with_level;
#[cfg(feature = "tracing")]
use artrack::core::init_tracing;
#[cfg(not(feature = "tracing"))]
use log::LevelFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(not(feature = "tracing"))]
    init_with_level(LevelFilter::Info)?;
    #[cfg(feature = "tracing")]
    init_tracing(false);

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("Usage: track_replay <script.json> [pattern_id]");
        return Ok(());
    };
    let pattern_id: u32 = match std::env::args().nth(2) {
        Some(raw) => raw.parse()?,
        None => 5,
    };

    let script = ReplayScript::load_json(path)?;
    let frames = script.frames.len();
    let mut params = ContextParams::for_profile(PerformanceProfile::PhoneNormal);
    params.controller = script.params.clone();
    params.analyzer = script.settings;

    let mut ctx = TrackingContext::new(ScriptedAnalyzer::new(script), params)?;
    let pattern = ctx.add_marker(MarkerControlsParams::for_target(ControlTarget::Pattern(
        pattern_id,
    )))?;
    let group = ctx.add_marker(MarkerControlsParams::for_target(
        ControlTarget::MultiMarker(0),
    ))?;

    // Frames arrive at 30 fps, matching the profile's detection rate.
    let step = Duration::from_secs_f64(1.0 / 30.0);
    for i in 0..frames {
        let now = step * i as u32;
        match ctx.update(&FrameView::empty(), now) {
            Ok(Some(summary)) => println!(
                "frame {}: {} squares, {} tracked",
                summary.frame, summary.marker_count, summary.tracked
            ),
            Ok(None) => println!("frame {i}: throttled"),
            Err(err) => println!("frame {i}: {err}"),
        }

        for (name, pos) in [("pattern", pattern), ("group", group)] {
            let controls = &ctx.controls()[pos];
            let state = controls.state();
            if state.visible {
                let t = &state.matrix.as_slice()[12..15];
                println!("  {name} visible at [{:.1}, {:.1}, {:.1}]", t[0], t[1], t[2]);
            } else {
                println!("  {name} hidden");
            }
        }
    }

    Ok(())
}
