// Demo runner for the `ledge_vision` library: tracks a synthetic panning
// scene end to end, simulating a player who shoots once the target finishes
// rising. Each hit tightens the despawn timeout, the way a survival mode
// would. Run with RUST_LOG=debug for per-frame detail; an edge-overlay PNG
// is written at exit.

use std::path::Path;

use ledge_vision::config::PipelineConfig;
use ledge_vision::core_modules::luma::LumaFrame;
use ledge_vision::core_modules::utils::frame_dump;
use ledge_vision::pipeline::{FrameInput, NativeFrame, TrackingPipeline};

const PROC_WIDTH: usize = 320;
const PROC_HEIGHT: usize = 240;
const NATIVE_WIDTH: usize = 640;
const NATIVE_HEIGHT: usize = 480;
const EDGE_ROW: usize = 100; // processing-resolution shelf boundary
const FRAMES: usize = 600;
const FPS: f64 = 30.0;
const AIM_FRAMES: usize = 10; // frames the simulated player takes to line up

/// Striped gray scene with one strong horizontal shelf edge, panned
/// sideways by `pan` pixels.
fn scene_rgba(width: usize, height: usize, edge_row: usize, pan: i64) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        let step = if y >= edge_row { 120u8 } else { 0 };
        for x in 0..width {
            let stripe = ((x as i64 - pan).rem_euclid(80)) as u8;
            let v = stripe / 2 + step;
            rgba.extend_from_slice(&[v, v, v, 255]);
        }
    }
    rgba
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = PipelineConfig { rng_seed: Some(17), ..PipelineConfig::survival() };
    let mut pipeline = TrackingPipeline::new(config);

    let mut hits = 0u32;
    let mut aim = 0usize;
    let mut last_luma = None;

    for index in 0..FRAMES {
        let now = index as f64 / FPS;
        let pan = ((now * 0.8).sin() * 5.0).round() as i64;
        let proc = scene_rgba(PROC_WIDTH, PROC_HEIGHT, EDGE_ROW, pan);

        // Native frames are only synthesized when verification will need
        // them, the same economy a real capture source would practice.
        let native_pixels;
        let native = if pipeline.wants_native_frame() {
            native_pixels = scene_rgba(NATIVE_WIDTH, NATIVE_HEIGHT, EDGE_ROW * 2, pan * 2);
            Some(NativeFrame { rgba: &native_pixels, width: NATIVE_WIDTH, height: NATIVE_HEIGHT })
        } else {
            None
        };

        let report = pipeline.process_frame(FrameInput {
            rgba: &proc,
            width: PROC_WIDTH,
            height: PROC_HEIGHT,
            native,
            now,
        });

        if let Some(event) = report.event {
            println!(
                "[{now:6.2}s] {event:?} at ({}, {})",
                report.target.position.x, report.target.position.y
            );
        }

        if report.target.active && report.target.rise_height == pipeline.config().target_max_height
        {
            aim += 1;
            if aim >= AIM_FRAMES && pipeline.register_hit(now) {
                hits += 1;
                aim = 0;
                let timeout = (4.0 - f64::from(hits) * 0.1).max(1.5);
                pipeline.set_despawn_after(Some(timeout));
                println!("[{now:6.2}s] hit #{hits}; despawn timeout now {timeout:.1}s");
            }
        } else {
            aim = 0;
        }

        if index == FRAMES - 1 {
            last_luma = Some(LumaFrame::from_rgba(PROC_WIDTH, PROC_HEIGHT, &proc));
        }
    }

    println!("session over: {hits} hits in {:.0} seconds", FRAMES as f64 / FPS);
    if let Some(luma) = last_luma {
        let path = Path::new("ledge_vision_edges.png");
        match frame_dump::save_luma_with_edges(path, &luma, pipeline.last_edges()) {
            Ok(()) => println!("edge overlay written to {}", path.display()),
            Err(err) => eprintln!("edge overlay failed: {err}"),
        }
    }
}
