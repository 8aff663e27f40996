// THEORY:
// Where a target appears matters as much as whether one appears. If the next
// target pops up on the same edge, two target-widths from the last hit, the
// player stops hunting and starts camping. This module turns raw edge
// segments into a pool of native-resolution spawn positions and picks from
// that pool with a bias away from recent history.
//
// Key architectural principles:
// 1.  **Rows First, Offsets Second**: Physical edges arrive as many nearby
//     segments. Rows are merged before expansion, so one shelf contributes
//     one row of candidates, not a pile-up.
// 2.  **Different Edge Beats Far Offset**: A candidate on a visibly
//     different edge is always preferred over a far position on the same
//     edge. Vertical variety reads as a new location; horizontal variety
//     reads as a nudge.
// 3.  **Injected Randomness**: Every random choice draws from a caller-owned
//     generator. Seed it and the whole selection chain replays exactly.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core_modules::edge_segment::EdgeSegment;

const ROW_MERGE_DISTANCE: i64 = 20; // rows closer than this are one edge
const MIN_OFFSET_STEP: i64 = 30; // floor for candidate spacing along a row

/// A native-resolution point, used for spawn candidates and tracked targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

/// Expands edge segments into candidate spawn positions in native
/// coordinates. `scale` maps processed rows to native rows; candidates are
/// spaced along each merged row by half a target width, clear of the frame
/// edges.
pub fn sample_spawn_positions(
    edges: &[EdgeSegment],
    scale: f64,
    target_width: i64,
    game_width: i64,
) -> Vec<Position> {
    let mut rows: Vec<i64> = Vec::new();
    for edge in edges {
        let ey = (edge.y as f64 * scale).round() as i64;
        if !rows.iter().any(|&y| (y - ey).abs() < ROW_MERGE_DISTANCE) {
            rows.push(ey);
        }
    }

    let half_width = target_width >> 1;
    let step = MIN_OFFSET_STEP.max(target_width >> 1);
    let mut positions = Vec::new();
    for &y in &rows {
        let mut x = half_width;
        while x <= game_width - half_width {
            positions.push(Position { x, y });
            x += step;
        }
    }
    positions
}

/// Picks the next spawn position, steering away from the last hit.
///
/// Preference order: any candidate on a different edge row; failing that,
/// same-row candidates at least two target widths away, picked from the
/// farthest third; failing that, the farthest third of everything left.
pub fn pick_random_position<R: Rng>(
    rng: &mut R,
    positions: &[Position],
    last_hit: Option<Position>,
    target_width: i64,
) -> Option<Position> {
    if positions.is_empty() {
        return None;
    }
    let Some(last) = last_hit else {
        return Some(positions[rng.random_range(0..positions.len())]);
    };

    let (different_edge, same_edge): (Vec<Position>, Vec<Position>) =
        positions.iter().partition(|p| (p.y - last.y).abs() > ROW_MERGE_DISTANCE);

    if !different_edge.is_empty() {
        return Some(different_edge[rng.random_range(0..different_edge.len())]);
    }

    let distance_sq = |p: &Position| {
        let dx = p.x - last.x;
        let dy = p.y - last.y;
        dx * dx + dy * dy
    };
    let min_distance_sq = (target_width * 2) * (target_width * 2);
    let mut ranked: Vec<(Position, i64)> = same_edge
        .iter()
        .filter(|p| distance_sq(p) >= min_distance_sq)
        .map(|&p| (p, distance_sq(&p)))
        .collect();
    if ranked.is_empty() {
        ranked = same_edge.iter().map(|&p| (p, distance_sq(&p))).collect();
    }
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let farthest = 1.max(ranked.len().div_ceil(3));
    Some(ranked[rng.random_range(0..farthest)].0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn segment(y: usize) -> EdgeSegment {
        EdgeSegment { x_start: 10, x_end: 150, y }
    }

    #[test]
    fn sampling_merges_nearby_rows() {
        let edges = [segment(50), segment(55)];
        let positions = sample_spawn_positions(&edges, 1.0, 60, 640);
        assert!(!positions.is_empty());
        assert!(positions.iter().all(|p| p.y == 50));
        // Offsets run from half a target width to the mirrored far edge.
        assert_eq!(positions.first().map(|p| p.x), Some(30));
        assert!(positions.iter().all(|p| p.x >= 30 && p.x <= 610));
        for pair in positions.windows(2) {
            assert_eq!(pair[1].x - pair[0].x, 30);
        }
    }

    #[test]
    fn sampling_keeps_distinct_rows_and_scales_them() {
        let edges = [segment(50), segment(90)];
        let positions = sample_spawn_positions(&edges, 2.0, 60, 640);
        let mut rows: Vec<i64> = positions.iter().map(|p| p.y).collect();
        rows.dedup();
        assert_eq!(rows, vec![100, 180]);
    }

    #[test]
    fn pick_prefers_a_different_edge_row() {
        let edges = [segment(50), segment(90)];
        let positions = sample_spawn_positions(&edges, 1.0, 60, 640);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let pick =
                pick_random_position(&mut rng, &positions, Some(Position { x: 300, y: 50 }), 60);
            assert_eq!(pick.map(|p| p.y), Some(90));
        }
    }

    #[test]
    fn pick_never_repeats_the_exact_last_hit_with_row_variety() {
        let edges = [segment(50), segment(90)];
        let positions = sample_spawn_positions(&edges, 1.0, 60, 640);
        let last = Position { x: 30, y: 50 };
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let pick = pick_random_position(&mut rng, &positions, Some(last), 60);
            assert_ne!(pick, Some(last));
        }
    }

    #[test]
    fn same_row_picks_come_from_the_farthest_third() {
        let edges = [segment(50)];
        let positions = sample_spawn_positions(&edges, 1.0, 60, 640);
        let last = Position { x: 300, y: 50 };
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let pick = pick_random_position(&mut rng, &positions, Some(last), 60).unwrap();
            assert!((pick.x - last.x).abs() >= 240, "picked {pick:?}");
        }
    }

    #[test]
    fn crowded_rows_still_yield_a_pick() {
        // Every candidate is within the minimum distance; the rule relaxes
        // to the farthest third of what exists.
        let positions = vec![
            Position { x: 290, y: 50 },
            Position { x: 300, y: 50 },
            Position { x: 310, y: 50 },
        ];
        let mut rng = StdRng::seed_from_u64(5);
        let pick = pick_random_position(&mut rng, &positions, Some(Position { x: 300, y: 50 }), 60);
        assert!(pick.is_some());
        assert_ne!(pick, Some(Position { x: 300, y: 50 }));
    }

    #[test]
    fn empty_pools_yield_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_random_position(&mut rng, &[], None, 60), None);
        assert!(sample_spawn_positions(&[], 1.0, 60, 640).is_empty());
    }
}
