//! End-to-end tests for the tracking pipeline.
//!
//! Every test drives a synthetic scene: vertical-stripe texture for the
//! motion estimators to grip, plus one strong horizontal shelf edge for the
//! detector. Panning the scene sideways stands in for camera motion.

use ledge_vision::config::{MotionStrategy, PipelineConfig};
use ledge_vision::parallel_pipeline::{AsyncPipeline, IngestError};
use ledge_vision::pipeline::{
    FrameInput, FrameReport, NativeFrame, TargetEvent, TrackingPipeline,
};

const PROC_WIDTH: usize = 320;
const PROC_HEIGHT: usize = 240;
const NATIVE_WIDTH: usize = 640;
const NATIVE_HEIGHT: usize = 480;
const EDGE_ROW: usize = 100; // processing-resolution shelf boundary
const FRAME_DT: f64 = 1.0 / 30.0;

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

fn config(seed: u64) -> PipelineConfig {
    PipelineConfig { rng_seed: Some(seed), ..PipelineConfig::default() }
}

/// Owns a pipeline and a frame clock, synthesizing native frames only when
/// the pipeline asks for them, the way a real capture host would.
struct Session {
    pipeline: TrackingPipeline,
    now: f64,
}

impl Session {
    fn new(seed: u64) -> Self {
        Self { pipeline: TrackingPipeline::new(config(seed)), now: 0.0 }
    }

    fn step(&mut self, pan: i64) -> FrameReport {
        let proc = scene_rgba(PROC_WIDTH, PROC_HEIGHT, EDGE_ROW, pan);
        let native = scene_rgba(NATIVE_WIDTH, NATIVE_HEIGHT, EDGE_ROW * 2, pan * 2);
        let wants = self.pipeline.wants_native_frame();
        let report = self.pipeline.process_frame(FrameInput {
            rgba: &proc,
            width: PROC_WIDTH,
            height: PROC_HEIGHT,
            native: wants.then(|| NativeFrame {
                rgba: &native,
                width: NATIVE_WIDTH,
                height: NATIVE_HEIGHT,
            }),
            now: self.now,
        });
        self.now += FRAME_DT;
        report
    }
}

#[test]
fn a_panning_camera_never_sheds_the_lock() {
    let mut session = Session::new(7);
    let mut appeared = 0;
    let mut lost = 0;
    for _ in 0..300 {
        let pan = ((session.now * 0.8).sin() * 5.0).round() as i64;
        match session.step(pan).event {
            Some(TargetEvent::Appeared) => appeared += 1,
            Some(TargetEvent::Lost) => lost += 1,
            _ => {}
        }
    }

    assert_eq!(appeared, 1, "the lock should engage exactly once");
    assert_eq!(lost, 0, "pan corrections should keep the lock through the sweep");
    let snapshot = session.pipeline.snapshot();
    assert!(snapshot.active);
    assert!(
        (snapshot.position.y - 2 * EDGE_ROW as i64).abs() <= 4,
        "target drifted to y = {}",
        snapshot.position.y
    );
}

#[test]
fn both_sad_strategies_recover_a_pan() {
    for strategy in [MotionStrategy::RowVote, MotionStrategy::ColumnProfile] {
        let cfg = PipelineConfig {
            motion_strategy: strategy,
            rng_seed: Some(3),
            ..PipelineConfig::default()
        };
        let mut pipeline = TrackingPipeline::new(cfg);
        let first = scene_rgba(PROC_WIDTH, PROC_HEIGHT, EDGE_ROW, 0);
        let second = scene_rgba(PROC_WIDTH, PROC_HEIGHT, EDGE_ROW, 3);

        pipeline.process_frame(FrameInput {
            rgba: &first,
            width: PROC_WIDTH,
            height: PROC_HEIGHT,
            native: None,
            now: 0.0,
        });
        let report = pipeline.process_frame(FrameInput {
            rgba: &second,
            width: PROC_WIDTH,
            height: PROC_HEIGHT,
            native: None,
            now: FRAME_DT,
        });

        assert!(
            (report.motion.dx - 3.0).abs() <= 0.5,
            "{strategy:?} reported dx = {}",
            report.motion.dx
        );
        assert_eq!(report.motion.dy, 0.0);
    }
}

#[test]
fn a_hit_respawns_on_a_detected_edge_away_from_the_last_target() {
    let mut session = Session::new(11);
    let mut appeared = false;
    for _ in 0..40 {
        appeared |= session.step(0).event == Some(TargetEvent::Appeared);
    }
    assert!(appeared, "the stable scene should produce a lock");
    let hit = session.pipeline.snapshot().position;
    let now = session.now;
    assert!(session.pipeline.register_hit(now));

    let mut respawn = None;
    for _ in 0..60 {
        if session.step(0).event == Some(TargetEvent::Appeared) {
            respawn = Some(session.pipeline.snapshot().position);
            break;
        }
    }
    let respawn = respawn.expect("the scheduled respawn never appeared");

    // The new target sits on the same physical shelf but well away from
    // the position that was just shot.
    assert!(
        (respawn.y - 2 * EDGE_ROW as i64).abs() <= 4,
        "respawn off the shelf at y = {}",
        respawn.y
    );
    let target_width = session.pipeline.config().target_width;
    assert!(
        (respawn.x - hit.x).abs() >= 2 * target_width,
        "respawn at x = {} crowds the hit at x = {}",
        respawn.x,
        hit.x
    );
}

#[test]
fn hits_cycle_through_spread_out_respawns() {
    let mut session = Session::new(5);
    let max_height = session.pipeline.config().target_max_height;
    let target_width = session.pipeline.config().target_width;

    let mut hits: Vec<i64> = Vec::new();
    let mut frames = 0usize;
    while hits.len() < 3 && frames < 600 {
        let report = session.step(0);
        frames += 1;
        if report.target.active && report.target.rise_height == max_height {
            let x = report.target.position.x;
            let now = session.now;
            assert!(session.pipeline.register_hit(now));
            hits.push(x);
        }
    }

    assert_eq!(hits.len(), 3, "only {} hits landed in {frames} frames", hits.len());
    for pair in hits.windows(2) {
        assert!(
            (pair[1] - pair[0]).abs() >= 2 * target_width,
            "consecutive targets at x = {} and x = {}",
            pair[0],
            pair[1]
        );
    }
}

#[tokio::test]
async fn the_async_front_end_locks_and_shuts_down() {
    let mut pipeline = AsyncPipeline::new(config(9));
    let proc = scene_rgba(PROC_WIDTH, PROC_HEIGHT, EDGE_ROW, 0);
    let native = scene_rgba(NATIVE_WIDTH, NATIVE_HEIGHT, EDGE_ROW * 2, 0);

    let mut appeared = false;
    let mut last = None;
    for i in 0..40 {
        let report = pipeline
            .process_frame(FrameInput {
                rgba: &proc,
                width: PROC_WIDTH,
                height: PROC_HEIGHT,
                native: Some(NativeFrame {
                    rgba: &native,
                    width: NATIVE_WIDTH,
                    height: NATIVE_HEIGHT,
                }),
                now: i as f64 * FRAME_DT,
            })
            .await
            .expect("worker should be running");
        appeared |= report.event == Some(TargetEvent::Appeared);
        last = Some(report);
    }

    assert!(appeared);
    let last = last.expect("frames were processed");
    assert!(last.target.active);
    assert!((last.target.position.y - 2 * EDGE_ROW as i64).abs() <= 4);

    pipeline.shutdown().await;
    let err = pipeline
        .process_frame(FrameInput {
            rgba: &proc,
            width: PROC_WIDTH,
            height: PROC_HEIGHT,
            native: None,
            now: 99.0,
        })
        .await
        .expect_err("the worker should be gone");
    assert!(matches!(err, IngestError::WorkerGone));
}
