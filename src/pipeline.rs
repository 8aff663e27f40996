// THEORY:
// The `pipeline` module is the top-level API for the tracking engine. One
// call per displayed frame runs the whole stack in a fixed order: pending
// spawns materialize, timed-out targets retire, the frame converts to luma,
// camera motion is estimated and applied to every stored position, edges
// are detected, and finally the target is either re-verified (locked) or
// the scanner is fed (not locked). The caller gets back a single report
// with everything the renderer and game logic need.
//
// Key architectural principles:
// 1.  **Corrections Before Detection**: The pan estimate must move the
//     stored positions before this frame's detections are compared against
//     them, or every pan would read as the target jumping away.
// 2.  **Native Frames On Demand**: Full-resolution pixels are only needed
//     while a target is locked. `wants_native_frame` tells the caller when
//     to pay for the capture; a missing native frame degrades verification
//     instead of failing it.
// 3.  **Two Luma Frames, Recycled**: The previous frame survives only long
//     enough to feed the motion estimators, then its buffer is reused for
//     the next conversion.

use log::{debug, info, trace};

use crate::config::{MotionStrategy, PipelineConfig};
use crate::core_modules::edge_detector::EdgeDetector;
use crate::core_modules::luma::LumaFrame;
use crate::core_modules::motion;
#[cfg(feature = "phase-correlation")]
use crate::core_modules::spectral::PhaseCorrelator;
use crate::core_modules::target_lock::TargetLock;
use crate::core_modules::verifier::EdgeVerifier;

// Re-export key data structures for the public API.
pub use crate::core_modules::edge_segment::EdgeSegment;
pub use crate::core_modules::motion::{Displacement, DisplacementEstimator};
pub use crate::core_modules::spawn::Position;
pub use crate::core_modules::target_lock::LockState;
pub use crate::core_modules::verifier::Verification;

// Subpixel estimates below half a native pixel stay unapplied; rounding
// them would wobble the target by a pixel on alternating frames.
const NATIVE_SHIFT_DEADBAND: f64 = 0.5;

/// One frame of input. `rgba` is the processing-resolution color frame the
/// per-pixel analysis runs on; `native` is the full-resolution frame,
/// needed only while a target is locked.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub rgba: &'a [u8],
    pub width: usize,
    pub height: usize,
    pub native: Option<NativeFrame<'a>>,
    /// Monotonic timestamp in seconds. The pipeline never reads a clock.
    pub now: f64,
}

/// A borrowed full-resolution RGBA frame.
#[derive(Debug, Clone, Copy)]
pub struct NativeFrame<'a> {
    pub rgba: &'a [u8],
    pub width: usize,
    pub height: usize,
}

/// Renderer-facing view of the tracked target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSnapshot {
    pub active: bool,
    /// Native-resolution position; meaningful while `active`.
    pub position: Position,
    pub rise_height: u32,
    pub persistence: u32,
}

/// A lifecycle edge crossed during one update, for the caller's audio cues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEvent {
    /// A target became active this frame.
    Appeared,
    /// A locked target eroded away after sustained verification misses.
    Lost,
    /// A locked target hit its despawn timeout and was retired.
    Despawned,
}

/// The primary output of the tracking pipeline for a single frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub target: TargetSnapshot,
    pub edges: Vec<EdgeSegment>,
    /// Camera displacement between the previous and current frame, in
    /// processing-resolution pixels.
    pub motion: Displacement,
    pub event: Option<TargetEvent>,
}

/// The main, top-level struct for the tracking engine.
pub struct TrackingPipeline {
    config: PipelineConfig,
    detector: EdgeDetector,
    verifier: EdgeVerifier,
    lock: TargetLock,
    backend: Option<Box<dyn DisplacementEstimator + Send>>,
    prev_luma: Option<LumaFrame>,
    spare_buffer: Vec<u8>,
    last_edges: Vec<EdgeSegment>,
}

impl TrackingPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let detector = EdgeDetector::new(config.detection_threshold, config.min_line_length);
        let verifier = EdgeVerifier::new(config.detection_threshold, config.process_scale);
        let lock = TargetLock::new(config.rng_seed);
        let backend = default_backend(&config);
        Self {
            config,
            detector,
            verifier,
            lock,
            backend,
            prev_luma: None,
            spare_buffer: Vec::new(),
            last_edges: Vec::new(),
        }
    }

    /// Runs one full tracking pass and reports the resulting state.
    pub fn process_frame(&mut self, frame: FrameInput<'_>) -> FrameReport {
        let now = frame.now;
        let mut event = None;

        // --- 1. Materialize a pending spawn whose delay has elapsed ---
        if self.lock.check_pending_spawn(now, &self.config) {
            let p = self.lock.spawn_position();
            info!("target appeared at ({}, {})", p.x, p.y);
            event = Some(TargetEvent::Appeared);
        }

        // --- 2. Retire a locked target that outlived its timeout ---
        if self.lock.despawn_due(now, self.config.despawn_after) {
            info!("target despawned; queueing the next spawn");
            self.lock.queue_next_candidate(now, &self.last_edges, &self.config);
            event = Some(TargetEvent::Despawned);
        }

        // --- 3. Luma conversion and camera-motion correction ---
        let cur = LumaFrame::from_rgba_with(
            frame.width,
            frame.height,
            frame.rgba,
            std::mem::take(&mut self.spare_buffer),
        );
        let motion = self.estimate_motion(&cur);
        let native_dx = motion.dx * self.config.native_scale();
        if native_dx.abs() > NATIVE_SHIFT_DEADBAND {
            let shift = native_dx.round() as i64;
            debug!("pan correction of {shift}px applied to stored positions");
            self.lock.apply_horizontal_shift(shift, self.config.game_width);
        }

        // --- 4. Edge detection ---
        self.last_edges = self.detector.detect(&cur);
        trace!("{} edge segments detected", self.last_edges.len());

        // --- 5. Verify the locked target, or feed the scanner ---
        if self.lock.is_locked() {
            let spawn = self.lock.spawn_position();
            let verification = match frame.native {
                Some(native) => self.verifier.verify(
                    &cur,
                    native.rgba,
                    native.width,
                    native.height,
                    spawn.x,
                    spawn.y,
                ),
                None => self.verifier.verify(&cur, &[], 0, 0, spawn.x, spawn.y),
            };
            self.lock.maintain(&verification, &self.config);
            if !self.lock.is_locked() {
                info!("target lost at ({}, {})", spawn.x, spawn.y);
                event = Some(TargetEvent::Lost);
            }
        } else if !matches!(self.lock.state(), LockState::PendingSpawn { .. }) {
            if self.last_edges.is_empty() {
                self.lock.drop_scan_target();
                self.lock.update(None, now, &self.config);
            } else {
                self.lock.ensure_scan_target(&self.last_edges, &self.config);
                let fed = match self.lock.state() {
                    LockState::Candidate { position } => Some(position),
                    _ => None,
                };
                self.lock.update(fed, now, &self.config);
                if self.lock.is_locked() {
                    let p = self.lock.spawn_position();
                    info!("target locked at ({}, {})", p.x, p.y);
                    event = Some(TargetEvent::Appeared);
                }
            }
        }

        // --- 6. Roll the frame pair ---
        if let Some(old) = self.prev_luma.replace(cur) {
            self.spare_buffer = old.into_raw();
        }

        FrameReport { target: self.snapshot(), edges: self.last_edges.clone(), motion, event }
    }

    fn estimate_motion(&mut self, cur: &LumaFrame) -> Displacement {
        let Some(prev) = &self.prev_luma else {
            return Displacement::default();
        };
        if let Some(backend) = self.backend.as_mut() {
            return backend.estimate_displacement(prev, cur).unwrap_or_default();
        }
        match self.config.motion_strategy {
            MotionStrategy::RowVote => {
                Displacement::horizontal(motion::estimate_global_motion_x(prev, cur))
            }
            MotionStrategy::ColumnProfile => {
                Displacement::horizontal(motion::estimate_subpixel_shift_x(prev, cur))
            }
            // Routed through the backend slot at construction.
            #[cfg(feature = "phase-correlation")]
            MotionStrategy::PhaseCorrelation => Displacement::default(),
        }
    }

    /// The current target state, as the renderer should draw it.
    pub fn snapshot(&self) -> TargetSnapshot {
        TargetSnapshot {
            active: self.lock.is_locked(),
            position: self.lock.spawn_position(),
            rise_height: self.lock.rise_height(),
            persistence: self.lock.persistence(),
        }
    }

    /// Whether the next frame should carry a native-resolution buffer.
    /// Conservatively true from the moment a spawn is scheduled.
    pub fn wants_native_frame(&self) -> bool {
        matches!(self.lock.state(), LockState::Locked | LockState::PendingSpawn { .. })
    }

    /// Reports a successful shot on the locked target. Returns true when
    /// the hit retired the target and scheduled a respawn.
    pub fn register_hit(&mut self, now: f64) -> bool {
        if !self.lock.is_locked() {
            return false;
        }
        let p = self.lock.spawn_position();
        info!("hit registered at ({}, {}); respawn queued", p.x, p.y);
        self.lock.queue_next_candidate(now, &self.last_edges, &self.config);
        true
    }

    /// Adjusts the despawn timeout between updates. Mode policies that
    /// shrink the timeout over a session call this each round.
    pub fn set_despawn_after(&mut self, timeout: Option<f64>) {
        self.config.despawn_after = timeout;
    }

    /// Replaces the full-frame displacement backend.
    pub fn set_estimator(&mut self, backend: Box<dyn DisplacementEstimator + Send>) {
        self.backend = Some(backend);
    }

    /// Clears all tracking state for a new session. Configuration and the
    /// random sequence are kept.
    pub fn reset(&mut self) {
        self.lock.reset();
        self.prev_luma = None;
        self.last_edges.clear();
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The most recent frame's edge segments, for debug overlays.
    pub fn last_edges(&self) -> &[EdgeSegment] {
        &self.last_edges
    }

    pub fn lock_state(&self) -> LockState {
        self.lock.state()
    }
}

#[cfg(feature = "phase-correlation")]
fn default_backend(config: &PipelineConfig) -> Option<Box<dyn DisplacementEstimator + Send>> {
    match config.motion_strategy {
        MotionStrategy::PhaseCorrelation => Some(Box::new(PhaseCorrelator::new())),
        _ => None,
    }
}

#[cfg(not(feature = "phase-correlation"))]
fn default_backend(_config: &PipelineConfig) -> Option<Box<dyn DisplacementEstimator + Send>> {
    None
}
