// THEORY:
// Every tuning constant that changes how the pipeline behaves lives in one
// serializable struct. The numbers were calibrated against a 640x480 camera
// with a 240-row processing frame; `scale_for_resolution` re-derives the
// resolution-dependent ones so a 720p stream feels the same as a VGA one.
//
// The core never validates these values. It assumes sane positive numbers
// and leaves range policy to whoever constructs the config.

use serde::{Deserialize, Serialize};

/// Which full-frame displacement estimator the pipeline runs each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotionStrategy {
    /// Integer row-vote SAD. Cheapest, whole-pixel results.
    RowVote,
    /// Column-profile SAD with parabolic refinement. Subpixel results for
    /// barely more work; the default.
    #[default]
    ColumnProfile,
    /// FFT phase correlation, subpixel in both axes.
    #[cfg(feature = "phase-correlation")]
    PhaseCorrelation,
}

/// Tuning knobs for the whole tracking pipeline.
///
/// Coordinates and widths are native-resolution pixels; `process_scale`
/// maps them down to the processing frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Native frame width targets live in.
    pub game_width: i64,
    pub game_height: i64,

    /// Edge sensitivity, 0..255 scale; the per-pixel gradient threshold is
    /// a third of this.
    pub detection_threshold: u32,
    /// Minimum segment length, in pixels of a 240-row frame.
    pub min_line_length: usize,

    /// Detections further apart than this erode persistence instead of
    /// building it.
    pub poi_distance_threshold: u32,
    /// Persistence must strictly exceed this before a candidate locks.
    pub poi_persistence_min: u32,
    pub target_rise_speed: u32,
    pub target_max_height: u32,
    /// Extra persistence beyond the minimum granted to a locked target.
    pub target_hold_frames: u32,
    pub hit_history_size: usize,
    pub target_width: i64,

    /// Seconds between retiring a target and materializing the next.
    pub spawn_delay: f64,
    /// Locked targets older than this are force-retired. `None` disables
    /// the timeout.
    pub despawn_after: Option<f64>,

    /// Height of the processing frame, in rows.
    pub process_height: usize,
    /// Native-to-processing shrink factor.
    pub process_scale: f64,

    pub motion_strategy: MotionStrategy,
    /// Fixed seed for spawn selection; `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            game_width: 640,
            game_height: 480,
            detection_threshold: 100,
            min_line_length: 30,
            poi_distance_threshold: 12,
            poi_persistence_min: 10,
            target_rise_speed: 1,
            target_max_height: 10,
            target_hold_frames: 20,
            hit_history_size: 5,
            target_width: 60,
            spawn_delay: 1.0,
            despawn_after: None,
            process_height: 240,
            process_scale: 0.5,
            motion_strategy: MotionStrategy::default(),
            rng_seed: None,
        }
    }
}

impl PipelineConfig {
    /// Relaxed pacing, targets stay until hit.
    pub fn classic() -> Self {
        Self::default()
    }

    /// Fast respawns and a short despawn timeout.
    pub fn time_attack() -> Self {
        Self { spawn_delay: 0.5, despawn_after: Some(3.0), ..Self::default() }
    }

    /// Moderate pacing with a four second timeout. Callers that want the
    /// timeout to tighten over a session pass their own shrinking value to
    /// the despawn check; no decay schedule is built in here.
    pub fn survival() -> Self {
        Self { spawn_delay: 0.8, despawn_after: Some(4.0), ..Self::default() }
    }

    /// Re-derives the resolution-dependent values for a video stream.
    pub fn scale_for_resolution(&mut self, video_width: i64, video_height: i64) {
        self.game_width = video_width;
        self.game_height = video_height;
        self.process_scale = self.process_height as f64 / video_height as f64;

        let detail = video_width.max(video_height) as f64 / 240.0;
        self.poi_distance_threshold = (6.0 * detail).round() as u32;

        let ui_scale = video_height as f64 / 480.0;
        self.target_width = (60.0 * ui_scale).round() as i64;
    }

    /// Processing-frame dimensions for a given native width.
    pub fn process_dimensions(&self) -> (usize, usize) {
        let width = (self.game_width as f64 * self.process_scale).round() as usize;
        (width, self.process_height)
    }

    /// Persistence ceiling: the lock minimum plus the hold margin.
    pub fn max_persistence(&self) -> u32 {
        self.poi_persistence_min + self.target_hold_frames
    }

    /// Processing-to-native coordinate factor.
    pub fn native_scale(&self) -> f64 {
        1.0 / self.process_scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_a_vga_stream() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.game_width, 640);
        assert_eq!(cfg.process_dimensions(), (320, 240));
        assert_eq!(cfg.max_persistence(), 30);
        assert_eq!(cfg.despawn_after, None);
    }

    #[test]
    fn presets_differ_only_in_pacing() {
        let classic = PipelineConfig::classic();
        let time_attack = PipelineConfig::time_attack();
        let survival = PipelineConfig::survival();

        assert_eq!(classic.despawn_after, None);
        assert_eq!(time_attack.spawn_delay, 0.5);
        assert_eq!(time_attack.despawn_after, Some(3.0));
        assert_eq!(survival.spawn_delay, 0.8);
        assert_eq!(survival.despawn_after, Some(4.0));
        assert_eq!(classic.detection_threshold, time_attack.detection_threshold);
    }

    #[test]
    fn scaling_rederives_resolution_dependent_values() {
        let mut cfg = PipelineConfig::default();
        cfg.scale_for_resolution(1280, 720);
        assert_eq!(cfg.game_width, 1280);
        assert_eq!(cfg.poi_distance_threshold, 32);
        assert_eq!(cfg.target_width, 90);
        assert!((cfg.process_scale - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(cfg.process_dimensions(), (427, 240));
    }

    #[test]
    fn configs_round_trip_through_serde() {
        let cfg = PipelineConfig::time_attack();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn partial_configs_fill_in_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(r#"{"detection_threshold":80}"#).unwrap();
        assert_eq!(cfg.detection_threshold, 80);
        assert_eq!(cfg.poi_persistence_min, 10);
    }
}
