// THEORY:
// Raw detections flicker. An edge that is rock solid to a human eye drops
// out for a frame, wobbles a pixel, or splits in two under sensor noise. A
// target that spawned and vanished at that cadence would be unplayable, so
// every externally visible transition is wrapped in hysteresis: positions
// must persist before they become targets, and targets must stay missing
// before they are given up.
//
// Key architectural principles:
// 1.  **One Counter, Both Directions**: A single persistence count climbs
//     while detections agree and decays while they do not. Lock is granted
//     only past a minimum, and held until the count drains completely, so
//     a boundary-straddling detection cannot strobe the target.
// 2.  **States Are Structural**: Scanning, holding a candidate, locked, and
//     waiting out a spawn delay are enum variants carrying their own data.
//     A candidate position or a scheduled spawn cannot exist in the wrong
//     state because there is no field for it.
// 3.  **Time Is An Argument**: Every time-sensitive operation receives the
//     current timestamp from the caller. Nothing in here reads a clock,
//     which makes despawn and delay behavior replayable in tests.
// 4.  **History Shapes The Future**: Recent hit positions are kept in a
//     bounded deque and steer the next spawn away from worn ground.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::PipelineConfig;
use crate::core_modules::edge_segment::EdgeSegment;
use crate::core_modules::spawn::{Position, pick_random_position, sample_spawn_positions};
use crate::core_modules::verifier::Verification;

/// Where the tracker is in its lifecycle. Variants carry the data that only
/// exists in that state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LockState {
    /// No target and no candidate; waiting for edges worth watching.
    Scanning,
    /// A position under observation, fed back into the persistence counter
    /// every frame until it proves stable or the edges disappear.
    Candidate { position: Position },
    /// A committed, externally visible target.
    Locked,
    /// A chosen position waiting out the spawn delay.
    PendingSpawn { position: Position, ready_at: f64 },
}

/// The tracked-target state machine.
///
/// Owns the persistence counters, the smoothed point of interest, the hit
/// history, and the random source for spawn selection. All coordinates are
/// native-resolution pixels.
#[derive(Debug)]
pub struct TargetLock {
    state: LockState,
    poi: Position,
    prev_poi: Position,
    persistence: u32,
    rise_height: u32,
    spawn: Position,
    activated_at: f64,
    hit_history: VecDeque<Position>,
    rng: StdRng,
}

impl TargetLock {
    /// A fixed seed replays every spawn decision; `None` draws one from the
    /// operating system.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            state: LockState::Scanning,
            poi: Position { x: 0, y: 0 },
            prev_poi: Position { x: 0, y: 0 },
            persistence: 0,
            rise_height: 0,
            spawn: Position { x: 0, y: 0 },
            activated_at: 0.0,
            hit_history: VecDeque::new(),
            rng,
        }
    }

    /// Clears all tracking state. The random source keeps its sequence.
    pub fn reset(&mut self) {
        self.state = LockState::Scanning;
        self.poi = Position { x: 0, y: 0 };
        self.prev_poi = Position { x: 0, y: 0 };
        self.persistence = 0;
        self.rise_height = 0;
        self.spawn = Position { x: 0, y: 0 };
        self.activated_at = 0.0;
        self.hit_history.clear();
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.state, LockState::Locked)
    }

    /// The committed target position, meaningful while locked.
    pub fn spawn_position(&self) -> Position {
        self.spawn
    }

    /// Visual rise progress, `0..=TARGET_MAX_HEIGHT`, for the renderer.
    pub fn rise_height(&self) -> u32 {
        self.rise_height
    }

    pub fn persistence(&self) -> u32 {
        self.persistence
    }

    pub fn activated_at(&self) -> f64 {
        self.activated_at
    }

    pub fn hit_history(&self) -> &VecDeque<Position> {
        &self.hit_history
    }

    /// Feeds one frame's detection (or lack of one) into the persistence
    /// counter. Close-by detections build toward a lock and average into a
    /// smoothed position; far or missing ones erode the count.
    pub fn update(&mut self, detected: Option<Position>, now: f64, config: &PipelineConfig) {
        let Some(detected) = detected else {
            self.decay();
            return;
        };

        let dx = (detected.x - self.prev_poi.x) as f64;
        let dy = (detected.y - self.prev_poi.y) as f64;
        let dist = (dx * dx + dy * dy).sqrt();

        if dist < config.poi_distance_threshold as f64 {
            self.persistence = (self.persistence + 1).min(config.max_persistence());
            self.poi = Position {
                x: (detected.x + self.prev_poi.x) >> 1,
                y: (detected.y + self.prev_poi.y) >> 1,
            };

            if self.persistence > config.poi_persistence_min {
                self.spawn = self.poi;
                if !self.is_locked() {
                    self.activated_at = now;
                }
                self.state = LockState::Locked;
                if self.rise_height < config.target_max_height {
                    self.rise_height += config.target_rise_speed;
                }
            }
        } else {
            self.decay();
        }

        self.prev_poi = detected;
    }

    /// Applies a verifier result to a locked target. A confirmed edge
    /// refreshes the position and tops up persistence; a miss keeps rising
    /// through the grace period, then erodes until the lock is lost.
    pub fn maintain(&mut self, verification: &Verification, config: &PipelineConfig) {
        if verification.found {
            self.spawn = Position { x: verification.x, y: verification.y };
            self.persistence = config.max_persistence();
            if self.rise_height < config.target_max_height {
                self.rise_height += config.target_rise_speed;
            }
        } else if self.rise_height < config.target_max_height {
            self.rise_height += config.target_rise_speed;
        } else {
            self.decay();
        }
    }

    fn decay(&mut self) {
        if self.persistence > 0 {
            self.persistence -= 1;
        }
        if self.persistence == 0 {
            self.rise_height = 0;
            if self.is_locked() {
                self.state = LockState::Scanning;
            }
        }
    }

    /// Retires the current target and schedules the next one. Called on a
    /// hit or a despawn timeout. The retired position joins the hit
    /// history; the next position comes from `last_edges` when possible,
    /// otherwise from a random offset along the same row.
    pub fn queue_next_candidate(
        &mut self,
        now: f64,
        last_edges: &[EdgeSegment],
        config: &PipelineConfig,
    ) {
        self.hit_history.push_back(self.spawn);
        while self.hit_history.len() > config.hit_history_size {
            self.hit_history.pop_front();
        }

        self.persistence = 0;
        self.rise_height = 0;
        self.activated_at = 0.0;
        self.state = LockState::Scanning;

        let ready_at = now + config.spawn_delay;
        if !last_edges.is_empty() {
            let positions = sample_spawn_positions(
                last_edges,
                config.native_scale(),
                config.target_width,
                config.game_width,
            );
            let last_hit = self.hit_history.back().copied();
            if let Some(position) =
                pick_random_position(&mut self.rng, &positions, last_hit, config.target_width)
            {
                self.state = LockState::PendingSpawn { position, ready_at };
                return;
            }
        }

        // No usable edges; hop a random distance along the current row.
        let target_width = config.target_width as f64;
        let direction = if self.rng.random::<bool>() { 1.0 } else { -1.0 };
        let offset = target_width + self.rng.random::<f64>() * target_width * 2.0;
        let x = (self.spawn.x as f64 + direction * offset)
            .min((config.game_width - config.target_width) as f64)
            .max(target_width);
        self.state = LockState::PendingSpawn {
            position: Position { x: x.round() as i64, y: self.spawn.y },
            ready_at,
        };
    }

    /// Materializes a scheduled spawn once its delay has elapsed. The
    /// position was chosen deliberately, so persistence is primed straight
    /// to the cap instead of rebuilding through scanning. Returns true on
    /// the frame the target appears.
    pub fn check_pending_spawn(&mut self, now: f64, config: &PipelineConfig) -> bool {
        let LockState::PendingSpawn { position, ready_at } = self.state else {
            return false;
        };
        if now < ready_at {
            return false;
        }
        self.spawn = position;
        self.poi = position;
        self.prev_poi = position;
        self.persistence = config.max_persistence();
        self.rise_height = 1;
        self.state = LockState::Locked;
        self.activated_at = now;
        true
    }

    /// Whether a locked target has outlived its despawn timeout.
    pub fn despawn_due(&self, now: f64, despawn_after: Option<f64>) -> bool {
        match despawn_after {
            Some(timeout) if timeout > 0.0 => {
                self.is_locked() && self.activated_at > 0.0 && now - self.activated_at >= timeout
            }
            _ => false,
        }
    }

    /// Picks a scan candidate from the current edges if none is held yet.
    pub fn ensure_scan_target(&mut self, edges: &[EdgeSegment], config: &PipelineConfig) {
        if !matches!(self.state, LockState::Scanning) {
            return;
        }
        let positions = sample_spawn_positions(
            edges,
            config.native_scale(),
            config.target_width,
            config.game_width,
        );
        let last_hit = self.hit_history.back().copied();
        if let Some(position) =
            pick_random_position(&mut self.rng, &positions, last_hit, config.target_width)
        {
            self.state = LockState::Candidate { position };
        }
    }

    /// Discards the held candidate, if any.
    pub fn drop_scan_target(&mut self) {
        if matches!(self.state, LockState::Candidate { .. }) {
            self.state = LockState::Scanning;
        }
    }

    /// Shifts every stored horizontal position by a camera-pan correction.
    /// History entries pushed out of the frame are forgotten.
    pub fn apply_horizontal_shift(&mut self, native_dx: i64, game_width: i64) {
        if native_dx == 0 {
            return;
        }
        match &mut self.state {
            LockState::Locked => self.spawn.x += native_dx,
            LockState::Candidate { position } => position.x += native_dx,
            LockState::PendingSpawn { position, .. } => position.x += native_dx,
            LockState::Scanning => {}
        }
        for hit in self.hit_history.iter_mut() {
            hit.x += native_dx;
        }
        self.hit_history.retain(|hit| hit.x >= 0 && hit.x <= game_width);
    }
}
