// THEORY:
// Camera motion is the enemy of every stage downstream. A locked target is a
// screen position anchored to a physical feature; the moment the player pans,
// every stored position is wrong by the pan amount. The estimators in this
// module measure that amount from the luma frames alone, so the state machine
// can shift its positions instead of losing its lock.
//
// Key architectural principles:
// 1.  **Fail Safe To Zero**: No estimator ever errors. Absent frames,
//     mismatched dimensions, not enough texture, low confidence: the answer
//     is zero displacement and the frame proceeds with degraded accuracy.
// 2.  **Votes, Not Averages**: The global estimator samples independent rows
//     and takes the median of their best shifts. Rows corrupted by local
//     object motion (the rising target itself, a waving hand) land in the
//     tails and drop out; rows dominated by background texture agree.
// 3.  **Constant Window Width**: Search margins are wider than the maximum
//     shift, so the SAD window covers the same pixel count at every shift
//     and raw sums compare fairly without normalization.
// 4.  **Integer Search, Parabolic Refinement**: The column-profile strategy
//     fits a parabola through the three SAD values around the integer
//     minimum. Integer-only estimates visibly stair-step under slow
//     continuous pans; the subpixel term removes that.
//
// Sign convention: positive dx means scene content moved right between the
// previous and current frame, positive dy means it moved down.

use crate::core_modules::luma::LumaFrame;

const ROW_VOTE_MAX_SHIFT: i64 = 12; // horizontal search range, processed pixels
const ROW_VOTE_SAMPLE_ROWS: usize = 12; // evenly spaced rows casting votes
const ROW_VOTE_MARGIN: usize = 14; // max shift + 2, keeps the window width constant
const MIN_ROW_CONTRAST: f64 = 3.0; // per-pixel SAD at zero shift below this = static row
const SHIFT_CONFIDENCE: f64 = 0.85; // best shift must beat no-shift by this factor
const MIN_VOTES: usize = 2;

const PATCH_MAX_SHIFT: i64 = 12;
const PATCH_HALF_ROWS: usize = 8; // texture above and below the edge
const PATCH_HALF_COLS: usize = 30;
const PATCH_NOISE_FLOOR: f64 = 30.0; // average SAD above this = no credible match

const STRIP_MAX_SHIFT: i64 = 16; // vertical search range
const STRIP_WIDTH: usize = 4; // columns averaged against sensor noise
const STRIP_MARGIN: usize = 20; // max shift + 4

const PROFILE_MAX_SHIFT: i64 = 16;
const PROFILE_MARGIN: usize = 18; // max shift + 2
const PROFILE_BAND_LOW: f64 = 0.15; // column sums cover the central band only
const PROFILE_BAND_HIGH: f64 = 0.85;

/// A per-frame pixel displacement estimate, in processed-frame units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Displacement {
    pub dx: f64,
    pub dy: f64,
}

impl Displacement {
    pub fn horizontal(dx: f64) -> Self {
        Self { dx, dy: 0.0 }
    }
}

/// A pluggable full-frame displacement backend.
///
/// The pipeline consults an injected backend when one is present and runs its
/// built-in SAD strategy otherwise. `&mut self` lets implementations keep
/// cached plans and scratch buffers across frames. Returning `None` means no
/// estimate could be produced this frame; the caller treats that as zero
/// displacement.
pub trait DisplacementEstimator {
    fn estimate_displacement(&mut self, prev: &LumaFrame, cur: &LumaFrame) -> Option<Displacement>;
}

fn same_dimensions(prev: &LumaFrame, cur: &LumaFrame) -> bool {
    prev.width() == cur.width() && prev.height() == cur.height()
}

/// Global horizontal motion via multi-row SAD voting.
///
/// Samples rows across the full frame; each row independently finds its best
/// shift, and only rows with real texture get a vote. The median of the
/// votes is the pan estimate. Can be half-integral when the vote count is
/// even.
pub fn estimate_global_motion_x(prev: &LumaFrame, cur: &LumaFrame) -> f64 {
    if !same_dimensions(prev, cur) {
        return 0.0;
    }
    let width = prev.width();
    let height = prev.height();
    if width < ROW_VOTE_MARGIN * 2 + 10 || height < ROW_VOTE_SAMPLE_ROWS {
        return 0.0;
    }

    let pixel_count = (width - ROW_VOTE_MARGIN * 2) as f64;
    let mut votes: Vec<i64> = Vec::with_capacity(ROW_VOTE_SAMPLE_ROWS);

    for s in 0..ROW_VOTE_SAMPLE_ROWS {
        let y = ((s as f64 + 0.5) * height as f64 / ROW_VOTE_SAMPLE_ROWS as f64).round() as usize;
        if y >= height {
            continue;
        }
        let prev_row = prev.row(y);
        let cur_row = cur.row(y);

        let mut best_shift = 0i64;
        let mut best_sad = u64::MAX;
        let mut sad_at_zero = 0u64;

        for shift in -ROW_VOTE_MAX_SHIFT..=ROW_VOTE_MAX_SHIFT {
            let x0 = (ROW_VOTE_MARGIN as i64).max(-shift) as usize;
            let x1 = ((width - ROW_VOTE_MARGIN) as i64).min(width as i64 - shift) as usize;
            let mut sad = 0u64;
            for x in x0..x1 {
                let sample = cur_row[(x as i64 + shift) as usize];
                sad += prev_row[x].abs_diff(sample) as u64;
            }
            if shift == 0 {
                sad_at_zero = sad;
            }
            if sad < best_sad {
                best_sad = sad;
                best_shift = shift;
            }
        }

        // Only rows with enough changed texture are trustworthy: the row
        // must differ from its previous self, and the best shift must
        // clearly beat staying put.
        let avg_zero_sad = sad_at_zero as f64 / pixel_count;
        if avg_zero_sad > MIN_ROW_CONTRAST && (best_sad as f64) < sad_at_zero as f64 * SHIFT_CONFIDENCE
        {
            votes.push(best_shift);
        }
    }

    if votes.len() < MIN_VOTES {
        return 0.0;
    }
    votes.sort_unstable();
    let mid = votes.len() >> 1;
    if votes.len() & 1 == 1 {
        votes[mid] as f64
    } else {
        (votes[mid - 1] + votes[mid]) as f64 * 0.5
    }
}

/// Local horizontal motion around a known target position.
///
/// Cross-correlates a small patch centered on `(px, py)` between the two
/// frames, using rows above and below the edge for texture. Rejects the
/// match entirely when even the best average SAD stays noisy.
pub fn estimate_local_motion_x(prev: &LumaFrame, cur: &LumaFrame, px: usize, py: usize) -> i64 {
    if !same_dimensions(prev, cur) {
        return 0;
    }
    let width = prev.width();
    let height = prev.height();

    let y_start = py.saturating_sub(PATCH_HALF_ROWS);
    let y_end = (py + PATCH_HALF_ROWS + 1).min(height);
    let x_start = px.saturating_sub(PATCH_HALF_COLS).max(PATCH_MAX_SHIFT as usize);
    let x_end = (px + PATCH_HALF_COLS + 1).min(width.saturating_sub(PATCH_MAX_SHIFT as usize));

    if y_end.saturating_sub(y_start) < 3 || x_end.saturating_sub(x_start) < 10 {
        return 0;
    }

    let count = ((y_end - y_start) * (x_end - x_start)) as f64;
    let mut best_shift = 0i64;
    let mut best_sad = f64::INFINITY;

    for shift in -PATCH_MAX_SHIFT..=PATCH_MAX_SHIFT {
        let mut sad = 0u64;
        for y in y_start..y_end {
            let prev_row = prev.row(y);
            let cur_row = cur.row(y);
            for x in x_start..x_end {
                let sample = cur_row[(x as i64 + shift) as usize];
                sad += prev_row[x].abs_diff(sample) as u64;
            }
        }
        let avg = sad as f64 / count;
        if avg < best_sad {
            best_sad = avg;
            best_shift = shift;
        }
    }

    if best_sad > PATCH_NOISE_FLOOR { 0 } else { best_shift }
}

/// Vertical motion from a narrow strip down the middle of the frame.
/// Positive result = scene content moved down.
pub fn estimate_motion_y(prev: &LumaFrame, cur: &LumaFrame) -> i64 {
    if !same_dimensions(prev, cur) {
        return 0;
    }
    let width = prev.width();
    let height = prev.height();

    let strip_x = (width as i64 >> 1) - 2;
    if strip_x < 0 || strip_x + STRIP_WIDTH as i64 >= width as i64 || height < STRIP_MARGIN * 2 {
        return 0;
    }
    let strip_x = strip_x as usize;

    let prev_data = prev.data();
    let cur_data = cur.data();
    let mut best_shift = 0i64;
    let mut best_sad = f64::INFINITY;

    for shift in -STRIP_MAX_SHIFT..=STRIP_MAX_SHIFT {
        let y0 = (STRIP_MARGIN as i64).max(-shift) as usize;
        let y1 = ((height - STRIP_MARGIN) as i64).min(height as i64 - shift) as usize;
        let mut sad = 0u64;
        let mut count = 0u64;
        for y in y0..y1 {
            let shifted_base = (y as i64 + shift) as usize * width;
            let base = y * width;
            for col in 0..STRIP_WIDTH {
                let x = strip_x + col;
                sad += prev_data[base + x].abs_diff(cur_data[shifted_base + x]) as u64;
                count += 1;
            }
        }
        if count == 0 {
            continue;
        }
        let avg = sad as f64 / count as f64;
        if avg < best_sad {
            best_sad = avg;
            best_shift = shift;
        }
    }

    if best_sad > PATCH_NOISE_FLOOR { 0 } else { best_shift }
}

/// Subpixel horizontal motion from 1-D column profiles.
///
/// Each frame collapses to one brightness value per column (summed over the
/// central vertical band), the profiles are SAD-matched over an integer
/// shift range, and the minimum is refined with a parabolic fit. Returns a
/// fractional displacement, or zero when no shift clearly beats staying put.
pub fn estimate_subpixel_shift_x(prev: &LumaFrame, cur: &LumaFrame) -> f64 {
    if !same_dimensions(prev, cur) {
        return 0.0;
    }
    let width = prev.width();
    let height = prev.height();
    if width < PROFILE_MARGIN * 2 + 10 {
        return 0.0;
    }
    let band_top = (height as f64 * PROFILE_BAND_LOW) as usize;
    let band_bottom = (height as f64 * PROFILE_BAND_HIGH) as usize;
    if band_bottom <= band_top {
        return 0.0;
    }

    let prev_profile = column_profile(prev, band_top, band_bottom);
    let cur_profile = column_profile(cur, band_top, band_bottom);

    let count = (width - PROFILE_MARGIN * 2) as f64;
    let mut sads = [0.0f64; (PROFILE_MAX_SHIFT * 2 + 1) as usize];
    for shift in -PROFILE_MAX_SHIFT..=PROFILE_MAX_SHIFT {
        let mut sum = 0u64;
        for x in PROFILE_MARGIN..width - PROFILE_MARGIN {
            let sample = cur_profile[(x as i64 + shift) as usize];
            sum += prev_profile[x].abs_diff(sample);
        }
        sads[(shift + PROFILE_MAX_SHIFT) as usize] = sum as f64 / count;
    }

    let sad_at_zero = sads[PROFILE_MAX_SHIFT as usize];
    let mut best = 0usize;
    let mut best_sad = f64::INFINITY;
    for (i, &sad) in sads.iter().enumerate() {
        if sad < best_sad {
            best_sad = sad;
            best = i;
        }
    }
    let int_shift = best as i64 - PROFILE_MAX_SHIFT;

    // A nonzero shift that barely improves on no-shift is noise, not pan.
    // Without this gate a pair of uniform frames would report the first
    // shift in scan order as motion.
    if int_shift != 0 && best_sad >= sad_at_zero * SHIFT_CONFIDENCE {
        return 0.0;
    }

    if best == 0 || best == sads.len() - 1 || best_sad == 0.0 {
        return int_shift as f64;
    }
    int_shift as f64 + parabolic_offset(sads[best - 1], sads[best], sads[best + 1])
}

/// Offset of a parabola's vertex from its center sample, given three SAD
/// values bracketing a minimum. Zero when the points do not form a convex
/// parabola.
pub(crate) fn parabolic_offset(before: f64, at: f64, after: f64) -> f64 {
    let denom = before - 2.0 * at + after;
    if denom > 0.0 { 0.5 * (before - after) / denom } else { 0.0 }
}

fn column_profile(frame: &LumaFrame, band_top: usize, band_bottom: usize) -> Vec<u64> {
    let width = frame.width();
    let mut profile = vec![0u64; width];
    for y in band_top..band_bottom {
        for (sum, &value) in profile.iter_mut().zip(frame.row(y)) {
            *sum += value as u64;
        }
    }
    profile
}
