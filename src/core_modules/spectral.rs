// THEORY:
// Phase correlation measures full-frame 2-D displacement in one pass. Where
// the SAD estimators walk a shift range pixel by pixel, this module moves to
// the frequency domain: a pure translation between two frames becomes a
// linear phase ramp, and the inverse transform of the normalized cross-power
// spectrum collapses that ramp into a single peak whose position *is* the
// displacement.
//
// Key architectural principles:
// 1.  **Window Before Transform**: Frames are not periodic, and the FFT
//     pretends they are. A separable Hanning window fades the borders to
//     zero so the wrap-around seam does not masquerade as structure.
// 2.  **Cached Geometry**: Window tables and scratch buffers depend only on
//     the frame dimensions. They are built once and rebuilt only when the
//     dimensions change mid-stream.
// 3.  **Same Failure Contract As SAD**: Degenerate input, a vanishing
//     spectrum, or a non-finite result all return zero displacement. The
//     caller cannot tell this strategy apart from the others by its errors,
//     because it has none.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use crate::core_modules::luma::LumaFrame;
use crate::core_modules::motion::{Displacement, DisplacementEstimator};

const MIN_DIMENSION: usize = 8; // below this the window tables degenerate
const SPECTRUM_EPSILON: f64 = 1e-12; // magnitudes under this are treated as silence

/// FFT-based 2-D displacement estimator with subpixel refinement.
///
/// Owns its window tables and scratch spectra; reuse one instance per
/// stream. Dimension changes are handled transparently.
pub struct PhaseCorrelator {
    planner: FftPlanner<f64>,
    width: usize,
    height: usize,
    window_x: Vec<f64>,
    window_y: Vec<f64>,
    spectrum_prev: Vec<Complex<f64>>,
    spectrum_cur: Vec<Complex<f64>>,
    column: Vec<Complex<f64>>,
}

impl PhaseCorrelator {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            width: 0,
            height: 0,
            window_x: Vec::new(),
            window_y: Vec::new(),
            spectrum_prev: Vec::new(),
            spectrum_cur: Vec::new(),
            column: Vec::new(),
        }
    }

    /// Estimates the displacement that maps `prev` onto `cur`.
    /// Positive dx = content moved right, positive dy = content moved down.
    pub fn estimate(&mut self, prev: &LumaFrame, cur: &LumaFrame) -> Displacement {
        if prev.width() != cur.width() || prev.height() != cur.height() {
            return Displacement::default();
        }
        let width = prev.width();
        let height = prev.height();
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Displacement::default();
        }
        self.ensure_dimensions(width, height);

        self.load_windowed(prev, cur);
        let forward_row = self.planner.plan_fft_forward(width);
        let forward_col = self.planner.plan_fft_forward(height);
        Self::transform_2d(&mut self.spectrum_prev, &mut self.column, width, height, &forward_row, &forward_col);
        Self::transform_2d(&mut self.spectrum_cur, &mut self.column, width, height, &forward_row, &forward_col);

        // Normalized cross-power spectrum, written over the prev buffer.
        for (p, c) in self.spectrum_prev.iter_mut().zip(&self.spectrum_cur) {
            let cross = *p * c.conj();
            let magnitude = cross.norm();
            *p = if magnitude > SPECTRUM_EPSILON {
                cross / magnitude
            } else {
                Complex::new(0.0, 0.0)
            };
        }

        let inverse_row = self.planner.plan_fft_inverse(width);
        let inverse_col = self.planner.plan_fft_inverse(height);
        Self::transform_2d(&mut self.spectrum_prev, &mut self.column, width, height, &inverse_row, &inverse_col);

        let surface = &self.spectrum_prev;
        let mut peak_index = 0usize;
        let mut peak_value = 0.0f64;
        for (i, value) in surface.iter().enumerate() {
            let magnitude = value.norm();
            if magnitude > peak_value {
                peak_value = magnitude;
                peak_index = i;
            }
        }
        if peak_value <= SPECTRUM_EPSILON {
            return Displacement::default();
        }

        let peak_x = peak_index % width;
        let peak_y = peak_index / width;
        let at = |x: usize, y: usize| surface[y * width + x].norm();
        let frac_x = peak_offset(
            at((peak_x + width - 1) % width, peak_y),
            peak_value,
            at((peak_x + 1) % width, peak_y),
        );
        let frac_y = peak_offset(
            at(peak_x, (peak_y + height - 1) % height),
            peak_value,
            at(peak_x, (peak_y + 1) % height),
        );

        // The correlation peak sits at minus the displacement, wrapped into
        // the frame; unwrap to a signed shift before negating.
        let signed_x = if peak_x > width / 2 { peak_x as f64 - width as f64 } else { peak_x as f64 };
        let signed_y =
            if peak_y > height / 2 { peak_y as f64 - height as f64 } else { peak_y as f64 };
        let dx = -(signed_x + frac_x);
        let dy = -(signed_y + frac_y);
        if !dx.is_finite() || !dy.is_finite() {
            return Displacement::default();
        }
        Displacement { dx, dy }
    }

    fn ensure_dimensions(&mut self, width: usize, height: usize) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = height;
        self.window_x = hanning(width);
        self.window_y = hanning(height);
        self.spectrum_prev = vec![Complex::new(0.0, 0.0); width * height];
        self.spectrum_cur = vec![Complex::new(0.0, 0.0); width * height];
        self.column = vec![Complex::new(0.0, 0.0); height];
    }

    fn load_windowed(&mut self, prev: &LumaFrame, cur: &LumaFrame) {
        for y in 0..self.height {
            let wy = self.window_y[y];
            let prev_row = prev.row(y);
            let cur_row = cur.row(y);
            let base = y * self.width;
            for x in 0..self.width {
                let w = self.window_x[x] * wy;
                self.spectrum_prev[base + x] = Complex::new(prev_row[x] as f64 * w, 0.0);
                self.spectrum_cur[base + x] = Complex::new(cur_row[x] as f64 * w, 0.0);
            }
        }
    }

    /// Row FFTs in place, then column FFTs through the gather buffer.
    fn transform_2d(
        spectrum: &mut [Complex<f64>],
        column: &mut [Complex<f64>],
        width: usize,
        height: usize,
        row_fft: &Arc<dyn Fft<f64>>,
        col_fft: &Arc<dyn Fft<f64>>,
    ) {
        row_fft.process(spectrum);
        for x in 0..width {
            for y in 0..height {
                column[y] = spectrum[y * width + x];
            }
            col_fft.process(column);
            for y in 0..height {
                spectrum[y * width + x] = column[y];
            }
        }
    }
}

impl Default for PhaseCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplacementEstimator for PhaseCorrelator {
    fn estimate_displacement(&mut self, prev: &LumaFrame, cur: &LumaFrame) -> Option<Displacement> {
        Some(self.estimate(prev, cur))
    }
}

/// Vertex offset for three samples bracketing a maximum. Concave check, so
/// flat or rising neighbors refuse to refine.
fn peak_offset(left: f64, peak: f64, right: f64) -> f64 {
    let denom = left - 2.0 * peak + right;
    if denom < 0.0 { 0.5 * (left - right) / denom } else { 0.0 }
}

fn hanning(len: usize) -> Vec<f64> {
    let scale = std::f64::consts::TAU / (len - 1) as f64;
    (0..len).map(|n| 0.5 * (1.0 - (n as f64 * scale).cos())).collect()
}
