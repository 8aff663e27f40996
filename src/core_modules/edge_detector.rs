// THEORY:
// The edge detector looks for one specific shape: long, nearly horizontal
// brightness boundaries. Those are the silhouettes the game can anchor a
// target to (table edges, shelf lines, window sills), and restricting the
// search to that shape is what keeps the stage cheap enough to run on every
// frame.
//
// Key architectural principles:
// 1.  **Vertical Gradient Only**: A pixel is an edge pixel when the row two
//     below differs from its own row by more than the gradient threshold.
//     The two-row gap makes soft, antialiased boundaries register as
//     strongly as hard ones.
// 2.  **Scan Band**: Only the middle 1/5..4/5 of the frame height is
//     scanned. The top of a camera frame is usually ceiling or sky and the
//     bottom is usually the player's hands, and both are full of edges the
//     game should never lock onto.
// 3.  **Dilate, Then Run-Scan**: A 1x5 horizontal dilation bridges small
//     gaps before runs are measured, so a boundary broken by sensor noise
//     still counts as one segment.
// 4.  **Longest First, Near-Duplicates Dropped**: Segments are ranked by
//     length, and a segment whose center sits close to an already-kept one
//     is discarded. One physical boundary produces one candidate.

use crate::core_modules::edge_segment::EdgeSegment;
use crate::core_modules::luma::LumaFrame;

const REFERENCE_HEIGHT: usize = 240; // tuning constants are calibrated for a 240-row frame
const BAND_TOP_NUMERATOR: usize = 48; // scan band starts at row 48/240 of the height
const BAND_BOTTOM_NUMERATOR: usize = 192; // and ends at row 192/240
const DILATION_REACH: usize = 2; // 1x5 horizontal dilation
const DEDUP_ROW_GAP: usize = 8; // centers closer than this vertically may be duplicates

/// Finds long horizontal edge segments in a processed luma frame.
///
/// The detector keeps its scratch maps between frames, so one instance
/// should be reused for the lifetime of a stream.
#[derive(Debug)]
pub struct EdgeDetector {
    gradient_threshold: u8,
    min_line_length: usize,
    edge_map: Vec<u8>,
    dilated_map: Vec<u8>,
}

impl EdgeDetector {
    /// `detection_threshold` is the 0..255 sensitivity knob from the
    /// pipeline config; the per-pixel gradient threshold is a third of it.
    /// `min_line_length` is the minimum segment length on a 240-row frame.
    pub fn new(detection_threshold: u32, min_line_length: usize) -> Self {
        Self {
            gradient_threshold: (detection_threshold / 3).min(255) as u8,
            min_line_length,
            edge_map: Vec::new(),
            dilated_map: Vec::new(),
        }
    }

    /// Scans one frame and returns the surviving segments, longest first.
    pub fn detect(&mut self, frame: &LumaFrame) -> Vec<EdgeSegment> {
        let width = frame.width();
        let height = frame.height();
        if width == 0 || height < 3 {
            return Vec::new();
        }

        let band_top = BAND_TOP_NUMERATOR * height / REFERENCE_HEIGHT;
        let band_bottom = (BAND_BOTTOM_NUMERATOR * height / REFERENCE_HEIGHT).min(height - 2);
        if band_top >= band_bottom {
            return Vec::new();
        }

        self.edge_map.clear();
        self.edge_map.resize(width * height, 0);
        self.dilated_map.clear();
        self.dilated_map.resize(width * height, 0);

        // --- 1. Vertical gradient over the scan band ---
        for y in band_top..band_bottom {
            let row = frame.row(y);
            let below = frame.row(y + 2);
            let out = &mut self.edge_map[y * width..(y + 1) * width];
            for x in 0..width {
                if row[x].abs_diff(below[x]) > self.gradient_threshold {
                    out[x] = 1;
                }
            }
        }

        // --- 2. Horizontal dilation ---
        for y in band_top..band_bottom {
            let base = y * width;
            for x in 0..width {
                if self.edge_map[base + x] == 1 {
                    let lo = x.saturating_sub(DILATION_REACH);
                    let hi = (x + DILATION_REACH).min(width - 1);
                    for d in lo..=hi {
                        self.dilated_map[base + d] = 1;
                    }
                }
            }
        }

        // --- 3. Run-scan each band row ---
        let min_len = self.min_line_length * width.max(height) / REFERENCE_HEIGHT;
        let mut segments = Vec::new();
        for y in band_top..band_bottom {
            let base = y * width;
            let mut run_start: Option<usize> = None;
            for x in 0..=width {
                let set = x < width && self.dilated_map[base + x] == 1;
                match (set, run_start) {
                    (true, None) => run_start = Some(x),
                    (false, Some(start)) => {
                        if x - start >= min_len {
                            // The reported row is the midpoint of the
                            // two-row gradient gap.
                            segments.push(EdgeSegment { x_start: start, x_end: x - 1, y: y + 1 });
                        }
                        run_start = None;
                    }
                    _ => {}
                }
            }
        }

        // --- 4. Rank and collapse duplicates ---
        segments.sort_by(|a, b| b.length().cmp(&a.length()));
        let mut kept: Vec<EdgeSegment> = Vec::new();
        for seg in segments {
            let duplicate = kept.iter().any(|k| {
                seg.y.abs_diff(k.y) < DEDUP_ROW_GAP
                    && seg.center_x().abs_diff(k.center_x()) < (seg.length().max(k.length()) >> 1)
            });
            if !duplicate {
                kept.push(seg);
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A frame that is `dark` above `boundary` and `bright` from it down.
    fn step_frame(width: usize, height: usize, boundary: usize, dark: u8, bright: u8) -> LumaFrame {
        let mut data = vec![dark; width * height];
        for y in boundary..height {
            data[y * width..(y + 1) * width].fill(bright);
        }
        LumaFrame::from_raw(width, height, data)
    }

    #[test]
    fn full_width_step_yields_one_segment() {
        let frame = step_frame(320, 240, 120, 20, 200);
        let mut detector = EdgeDetector::new(100, 30);
        let segments = detector.detect(&frame);
        assert_eq!(segments.len(), 1);
        let seg = segments[0];
        assert_eq!(seg.x_start, 0);
        assert_eq!(seg.x_end, 319);
        assert_eq!(seg.y, 119);
    }

    #[test]
    fn weak_gradient_is_ignored() {
        // Threshold 100 means per-pixel gradients above 33 fire.
        let frame = step_frame(320, 240, 120, 100, 130);
        let mut detector = EdgeDetector::new(100, 30);
        assert!(detector.detect(&frame).is_empty());
        let frame = step_frame(320, 240, 120, 100, 134);
        assert!(!detector.detect(&frame).is_empty());
    }

    #[test]
    fn edges_outside_the_scan_band_are_ignored() {
        let mut detector = EdgeDetector::new(100, 30);
        let near_top = step_frame(320, 240, 20, 20, 200);
        assert!(detector.detect(&near_top).is_empty());
        let near_bottom = step_frame(320, 240, 230, 20, 200);
        assert!(detector.detect(&near_bottom).is_empty());
    }

    #[test]
    fn short_runs_are_rejected() {
        // A 240-wide frame keeps the configured minimum length as-is.
        let width = 240;
        let height = 240;
        let mut data = vec![20u8; width * height];
        for y in 120..height {
            for x in 100..115 {
                data[y * width + x] = 200;
            }
        }
        let mut detector = EdgeDetector::new(100, 30);
        assert!(detector.detect(&LumaFrame::from_raw(width, height, data)).is_empty());

        let mut data = vec![20u8; width * height];
        for y in 120..height {
            for x in 100..140 {
                data[y * width + x] = 200;
            }
        }
        let segments = detector.detect(&LumaFrame::from_raw(width, height, data));
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn segments_come_out_longest_first() {
        let width = 320;
        let height = 240;
        let mut data = vec![20u8; width * height];
        for y in 80..100 {
            for x in 10..90 {
                data[y * width + x] = 200;
            }
        }
        for y in 150..170 {
            for x in 100..300 {
                data[y * width + x] = 200;
            }
        }
        let mut detector = EdgeDetector::new(100, 30);
        let segments = detector.detect(&LumaFrame::from_raw(width, height, data));
        assert!(segments.len() >= 2);
        for pair in segments.windows(2) {
            assert!(pair[0].length() >= pair[1].length());
        }
        // The wider rectangle sits on the right; its edges must rank first.
        assert!(segments[0].center_x() > 150);
    }

    #[test]
    fn tiny_frames_are_handled() {
        let mut detector = EdgeDetector::new(100, 30);
        assert!(detector.detect(&LumaFrame::from_raw(0, 0, Vec::new())).is_empty());
        assert!(detector.detect(&LumaFrame::from_raw(10, 2, vec![0; 20])).is_empty());
    }
}
