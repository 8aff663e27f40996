use serde::{Deserialize, Serialize};

/// A horizontal run of edge pixels found on one row of the processed frame.
///
/// Coordinates are in processed-frame space. `x_end` is inclusive, so a
/// one-pixel run has `x_start == x_end` and length 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSegment {
    pub x_start: usize,
    pub x_end: usize,
    pub y: usize,
}

impl EdgeSegment {
    pub fn length(&self) -> usize {
        self.x_end - self.x_start + 1
    }

    pub fn center_x(&self) -> usize {
        (self.x_start + self.x_end + 1) >> 1
    }

    /// Midpoint of the run, in processed-frame coordinates.
    pub fn center(&self) -> (usize, usize) {
        (self.center_x(), self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_counts_inclusive_span() {
        let seg = EdgeSegment { x_start: 10, x_end: 10, y: 5 };
        assert_eq!(seg.length(), 1);
        let seg = EdgeSegment { x_start: 10, x_end: 49, y: 5 };
        assert_eq!(seg.length(), 40);
    }

    #[test]
    fn center_is_the_midpoint_of_the_exclusive_span() {
        let seg = EdgeSegment { x_start: 0, x_end: 5, y: 7 };
        assert_eq!(seg.center(), (3, 7));
        let seg = EdgeSegment { x_start: 10, x_end: 10, y: 7 };
        assert_eq!(seg.center(), (10, 7));
    }
}
