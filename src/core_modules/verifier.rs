// THEORY:
// Once a target is locked, the pipeline must keep proving that the physical
// edge is still where the lock says it is. Re-running the full detector
// would be wasteful and jittery; the verifier instead answers a narrower
// question: "is there still a strong horizontal edge near this one point,
// and exactly which row is it on?"
//
// Key architectural principles:
// 1.  **Coarse Gate, Fine Refine**: Pass 1 checks an 11x13 window of the
//     processed frame and can reject cheaply. Only when the edge is
//     plausibly present does Pass 2 touch the native-resolution pixels.
// 2.  **Native Precision On A Tiny ROI**: Pass 2 converts a region of about
//     20x24 native pixels, small enough that full-resolution luma is
//     affordable every frame.
// 3.  **Degraded, Never Failed**: A window clipped to nothing or an
//     undersized ROI falls back to the coarse answer or to "not found";
//     both are ordinary outcomes the state machine absorbs as erosion.

use crate::core_modules::luma::LumaFrame;

const COARSE_HALF_COLS: i64 = 5; // pass-1 window, processed pixels
const COARSE_HALF_ROWS: i64 = 6;
const ROI_HALF_COLS: i64 = 10; // pass-2 region, native pixels
const ROI_HALF_ROWS: i64 = 12;

/// Outcome of one verification. `found == false` leaves the coordinates
/// untouched so the caller can apply its own erosion policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub found: bool,
    pub x: i64,
    pub y: i64,
}

/// Two-pass tracker for a single locked edge position.
#[derive(Debug)]
pub struct EdgeVerifier {
    gradient_threshold: u64,
    process_scale: f64,
}

impl EdgeVerifier {
    pub fn new(detection_threshold: u32, process_scale: f64) -> Self {
        Self { gradient_threshold: (detection_threshold / 3) as u64, process_scale }
    }

    /// Confirms whether a horizontal edge still exists near the target's
    /// native-resolution position `(target_x, target_y)`, and refines the
    /// row if so. `native_rgba` is the full-resolution color frame the
    /// positions are expressed in.
    pub fn verify(
        &self,
        proc: &LumaFrame,
        native_rgba: &[u8],
        native_width: usize,
        native_height: usize,
        target_x: i64,
        target_y: i64,
    ) -> Verification {
        let missed = Verification { found: false, x: target_x, y: target_y };
        let proc_w = proc.width() as i64;
        let proc_h = proc.height() as i64;

        let px = (target_x as f64 * self.process_scale).round() as i64;
        let py = (target_y as f64 * self.process_scale).round() as i64;

        // --- Pass 1: coarse check at processing resolution ---
        let x_start = 1.max(px - COARSE_HALF_COLS);
        let x_end = (proc_w - 1).min(px + COARSE_HALF_COLS + 1);
        let y_start = 1.max(py - COARSE_HALF_ROWS);
        let y_end = (proc_h - 1).min(py + COARSE_HALF_ROWS + 1);
        if x_end <= x_start || y_end <= y_start {
            return missed;
        }

        let mut best_row = 0usize;
        let mut best_strength = 0u64;
        for ry in y_start..y_end {
            let above = proc.row(ry as usize - 1);
            let below = proc.row(ry as usize + 1);
            let mut strength = 0u64;
            for rx in x_start..x_end {
                strength += below[rx as usize].abs_diff(above[rx as usize]) as u64;
            }
            if strength > best_strength {
                best_strength = strength;
                best_row = (ry - y_start) as usize;
            }
        }
        if best_strength < self.gradient_threshold * (x_end - x_start) as u64 {
            return missed;
        }

        // --- Pass 2: refine at native resolution ---
        let ry1 = 1.max(target_y - ROI_HALF_ROWS);
        let ry2 = (native_height as i64 - 1).min(target_y + ROI_HALF_ROWS);
        let rx1 = 0.max(target_x - ROI_HALF_COLS);
        let rx2 = (native_width as i64).min(target_x + ROI_HALF_COLS);
        if ry2 <= ry1 + 2 || rx2 <= rx1 {
            // ROI clipped away; the coarse row mapped back to native
            // coordinates is the best answer available.
            let coarse_y = ((y_start + best_row as i64) as f64 / self.process_scale).round() as i64;
            return Verification { found: true, x: target_x, y: coarse_y };
        }

        let roi_w = (rx2 - rx1) as usize;
        let roi_h = (ry2 - ry1) as usize;
        let roi = LumaFrame::from_rgba_region(
            native_rgba,
            native_width,
            rx1 as usize,
            ry1 as usize,
            roi_w,
            roi_h,
        );

        let mut fine_best = 0usize;
        let mut fine_strength = 0u64;
        for y in 0..roi_h - 2 {
            let near = roi.row(y);
            let far = roi.row(y + 2);
            let mut strength = 0u64;
            for x in 0..roi_w {
                strength += far[x].abs_diff(near[x]) as u64;
            }
            if strength > fine_strength {
                fine_strength = strength;
                fine_best = y;
            }
        }

        Verification { found: true, x: target_x, y: ry1 + fine_best as i64 + 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba_step(width: usize, height: usize, boundary: usize, dark: u8, bright: u8) -> Vec<u8> {
        let mut rgba = Vec::with_capacity(width * height * 4);
        for y in 0..height {
            let v = if y < boundary { dark } else { bright };
            for _ in 0..width {
                rgba.extend_from_slice(&[v, v, v, 255]);
            }
        }
        rgba
    }

    fn luma_step(width: usize, height: usize, boundary: usize, dark: u8, bright: u8) -> LumaFrame {
        let mut data = vec![dark; width * height];
        for y in boundary..height {
            data[y * width..(y + 1) * width].fill(bright);
        }
        LumaFrame::from_raw(width, height, data)
    }

    #[test]
    fn finds_and_refines_a_clean_edge() {
        let proc = luma_step(160, 120, 50, 20, 200);
        let native = rgba_step(320, 240, 100, 20, 200);
        let verifier = EdgeVerifier::new(100, 0.5);
        let result = verifier.verify(&proc, &native, 320, 240, 160, 98);
        assert!(result.found);
        assert_eq!(result.x, 160);
        assert!((result.y - 100).abs() <= 2, "y = {}", result.y);
    }

    #[test]
    fn reports_lost_on_a_blank_region() {
        let proc = LumaFrame::from_raw(160, 120, vec![128; 160 * 120]);
        let native = rgba_step(320, 240, 240, 128, 128);
        let verifier = EdgeVerifier::new(100, 0.5);
        let result = verifier.verify(&proc, &native, 320, 240, 160, 100);
        assert!(!result.found);
        assert_eq!((result.x, result.y), (160, 100));
    }

    #[test]
    fn reports_lost_when_the_window_clips_away() {
        let proc = luma_step(160, 120, 50, 20, 200);
        let native = rgba_step(320, 240, 100, 20, 200);
        let verifier = EdgeVerifier::new(100, 0.5);
        // Far outside the frame: the pass-1 window is empty.
        let result = verifier.verify(&proc, &native, 320, 240, 900, 98);
        assert!(!result.found);
    }

    #[test]
    fn falls_back_to_the_coarse_row_when_the_roi_is_degenerate() {
        let proc = luma_step(40, 60, 30, 20, 200);
        // Native frame too narrow for the requested ROI.
        let native = rgba_step(15, 60, 30, 20, 200);
        let verifier = EdgeVerifier::new(100, 1.0);
        let result = verifier.verify(&proc, &native, 15, 60, 30, 30);
        assert!(result.found);
        assert_eq!(result.x, 30);
        assert_eq!(result.y, 29);
    }

    #[test]
    fn windows_clamp_at_the_frame_border() {
        let proc = luma_step(160, 120, 30, 20, 200);
        let native = rgba_step(320, 240, 60, 20, 200);
        let verifier = EdgeVerifier::new(100, 0.5);
        let result = verifier.verify(&proc, &native, 320, 240, 2, 60);
        assert!(result.found);
        assert!((result.y - 60).abs() <= 2, "y = {}", result.y);
    }
}
