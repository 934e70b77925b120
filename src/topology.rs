//! Rank-grid geometry and neighbor discovery.
//!
//! The square domain `[0, side_len)²` is cut into a `ranks_per_side ×
//! ranks_per_side` grid of tiles and rank `r` owns the tile at quadrant
//! `(r mod ranks_per_side, r div ranks_per_side)`. Both the tile bounds and
//! [`RankTopology::position_to_rank`] compare against the same edge values,
//! and tiles are half-open on every axis, so a position is owned by exactly
//! one rank and boids never bounce between two owners.

use crate::error::TopologyError;
use glam::DVec2;

/// Always non-negative remainder of `a / b`.
///
/// Differs from `%` for negative dividends: `wrap_index(-1, 4) == 3`. A
/// negative divisor is handled as `wrap_index(-a, -b)`.
#[inline]
pub fn wrap_index(a: i64, b: i64) -> i64 {
    let (a, b) = if b < 0 { (-a, -b) } else { (a, b) };
    a.rem_euclid(b)
}

/// Returns `Some(k)` when `n == 4^k`.
pub fn power_of_four_exponent(n: usize) -> Option<u32> {
    if n == 0 || !n.is_power_of_two() || n.trailing_zeros() % 2 != 0 {
        return None;
    }
    Some(n.trailing_zeros() / 2)
}

/// Axis-aligned bounds of one rank's tile, `[xmin, xmax) × [ymin, ymax)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileBounds {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl TileBounds {
    /// Half-open containment, matching [`RankTopology::position_to_rank`].
    #[inline]
    pub fn contains(&self, pos: DVec2) -> bool {
        pos.x >= self.xmin && pos.x < self.xmax && pos.y >= self.ymin && pos.y < self.ymax
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }
}

/// Read-only geometry of one rank, derived from `(rank, num_ranks, side_len)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RankTopology {
    rank: usize,
    num_ranks: usize,
    ranks_per_side: usize,
    side_len: f64,
    grid_width: f64,
}

impl RankTopology {
    /// Build the topology for `rank`.
    ///
    /// `num_ranks` must be a power of 4 so that the ranks form a square grid.
    pub fn new(rank: usize, num_ranks: usize, side_len: f64) -> Result<Self, TopologyError> {
        let exponent = power_of_four_exponent(num_ranks)
            .ok_or(TopologyError::NotPowerOfFour { num_ranks })?;
        if rank >= num_ranks {
            return Err(TopologyError::RankOutOfRange { rank, num_ranks });
        }
        if !(side_len.is_finite() && side_len > 0.0) {
            return Err(TopologyError::InvalidSideLength { side_len });
        }

        let ranks_per_side = 1usize << exponent;
        Ok(Self {
            rank,
            num_ranks,
            ranks_per_side,
            side_len,
            grid_width: side_len / ranks_per_side as f64,
        })
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn num_ranks(&self) -> usize {
        self.num_ranks
    }

    #[inline]
    pub fn ranks_per_side(&self) -> usize {
        self.ranks_per_side
    }

    #[inline]
    pub fn side_len(&self) -> f64 {
        self.side_len
    }

    /// Side length of one tile.
    #[inline]
    pub fn grid_width(&self) -> f64 {
        self.grid_width
    }

    /// Integer grid coordinates `(qx, qy)` of this rank's tile.
    #[inline]
    pub fn quadrant(&self) -> (usize, usize) {
        (self.rank % self.ranks_per_side, self.rank / self.ranks_per_side)
    }

    /// Rank owning the tile at grid coordinates `(qx, qy)`.
    #[inline]
    pub fn quad_to_rank(&self, qx: usize, qy: usize) -> usize {
        qx + qy * self.ranks_per_side
    }

    pub fn tile_bounds(&self) -> TileBounds {
        self.bounds_of(self.rank)
    }

    /// Coordinate of the `i`-th grid line. The last line is `side_len`
    /// itself, not `ranks_per_side * grid_width`.
    #[inline]
    fn edge(&self, i: usize) -> f64 {
        if i >= self.ranks_per_side {
            self.side_len
        } else {
            i as f64 * self.grid_width
        }
    }

    /// Bounds of any rank's tile in this grid.
    pub fn bounds_of(&self, rank: usize) -> TileBounds {
        let qx = rank % self.ranks_per_side;
        let qy = rank / self.ranks_per_side;
        TileBounds {
            xmin: self.edge(qx),
            xmax: self.edge(qx + 1),
            ymin: self.edge(qy),
            ymax: self.edge(qy + 1),
        }
    }

    /// Grid index along one axis: the `q` with `edge(q) <= c < edge(q + 1)`.
    ///
    /// Division gives the answer up to one step of rounding, which is then
    /// settled against the edges. Out-of-range coordinates clamp to the
    /// first or last index.
    fn axis_index(&self, c: f64) -> usize {
        let last = self.ranks_per_side - 1;
        let mut q = ((c / self.grid_width).floor().max(0.0) as usize).min(last);
        while q > 0 && c < self.edge(q) {
            q -= 1;
        }
        while q < last && c >= self.edge(q + 1) {
            q += 1;
        }
        q
    }

    /// Rank owning `pos`, for any position inside `[0, side_len)²`.
    ///
    /// Agrees with [`TileBounds::contains`] for every such position.
    pub fn position_to_rank(&self, pos: DVec2) -> usize {
        self.quad_to_rank(self.axis_index(pos.x), self.axis_index(pos.y))
    }

    /// Ranks owning the tiles adjacent to this one on the torus.
    ///
    /// For a 2×2 grid every offset wraps onto one of the other three ranks,
    /// so the result is simply every other rank. Otherwise it is the eight
    /// Moore neighbors, ordered by x offset then y offset. The result is
    /// duplicate-free and never contains this rank.
    pub fn neighbors(&self) -> Vec<usize> {
        if self.ranks_per_side <= 2 {
            return (0..self.num_ranks).filter(|&r| r != self.rank).collect();
        }

        let (qx, qy) = self.quadrant();
        let side = self.ranks_per_side as i64;
        let mut ranks = Vec::with_capacity(8);
        for dx in -1i64..=1 {
            for dy in -1i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = wrap_index(qx as i64 + dx, side) as usize;
                let ny = wrap_index(qy as i64 + dy, side) as usize;
                ranks.push(self.quad_to_rank(nx, ny));
            }
        }
        ranks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_index() {
        assert_eq!(wrap_index(-1, 4), 3);
        assert_eq!(wrap_index(4, 4), 0);
        assert_eq!(wrap_index(5, 4), 1);
        assert_eq!(wrap_index(-9, 4), 3);
        assert_eq!(wrap_index(7, -4), 1);
        assert_eq!(wrap_index(-7, -4), 3);
    }

    #[test]
    fn test_power_of_four() {
        assert_eq!(power_of_four_exponent(1), Some(0));
        assert_eq!(power_of_four_exponent(4), Some(1));
        assert_eq!(power_of_four_exponent(16), Some(2));
        assert_eq!(power_of_four_exponent(64), Some(3));
        assert_eq!(power_of_four_exponent(0), None);
        assert_eq!(power_of_four_exponent(2), None);
        assert_eq!(power_of_four_exponent(8), None);
        assert_eq!(power_of_four_exponent(12), None);
    }

    #[test]
    fn test_rejects_bad_rank_counts() {
        for n in [0, 2, 3, 5, 8, 9, 32] {
            assert!(matches!(
                RankTopology::new(0, n, 5.0),
                Err(TopologyError::NotPowerOfFour { .. })
            ));
        }
        assert!(matches!(
            RankTopology::new(4, 4, 5.0),
            Err(TopologyError::RankOutOfRange { .. })
        ));
        assert!(matches!(
            RankTopology::new(0, 4, 0.0),
            Err(TopologyError::InvalidSideLength { .. })
        ));
    }

    #[test]
    fn test_quadrant_and_bounds() {
        let topo = RankTopology::new(6, 16, 8.0).unwrap();
        assert_eq!(topo.ranks_per_side(), 4);
        assert_eq!(topo.quadrant(), (2, 1));
        assert_eq!(
            topo.tile_bounds(),
            TileBounds {
                xmin: 4.0,
                xmax: 6.0,
                ymin: 2.0,
                ymax: 4.0
            }
        );
    }

    #[test]
    fn test_position_to_rank_matches_bounds() {
        let side = 10.0;
        for rank in 0..16 {
            let topo = RankTopology::new(rank, 16, side).unwrap();
            let b = topo.tile_bounds();
            let samples = [
                DVec2::new(b.xmin, b.ymin),
                DVec2::new(b.xmin + 0.5 * b.width(), b.ymin + 0.5 * b.height()),
                DVec2::new(b.xmax - 1e-9, b.ymax - 1e-9),
            ];
            for p in samples {
                assert!(b.contains(p));
                assert_eq!(topo.position_to_rank(p), rank, "position {p}");
            }
            if b.xmax < side {
                assert_ne!(topo.position_to_rank(DVec2::new(b.xmax, b.ymin)), rank);
                assert!(!b.contains(DVec2::new(b.xmax, b.ymin)));
            }
        }
    }

    /// Largest float strictly below a positive `x`.
    fn just_below(x: f64) -> f64 {
        f64::from_bits(x.to_bits() - 1)
    }

    #[test]
    fn test_edges_agree_for_inexact_tile_widths() {
        for side in [0.7, 1.1, 3.3, 12.9, 5.0 / 3.0] {
            for num_ranks in [4, 16, 64] {
                let topo = RankTopology::new(0, num_ranks, side).unwrap();
                for rank in 0..num_ranks {
                    let b = topo.bounds_of(rank);
                    let corners = [
                        DVec2::new(b.xmin, b.ymin),
                        DVec2::new(just_below(b.xmax), b.ymin),
                        DVec2::new(b.xmin, just_below(b.ymax)),
                        DVec2::new(just_below(b.xmax), just_below(b.ymax)),
                    ];
                    for p in corners {
                        assert!(b.contains(p), "side {side}, rank {rank}, {p}");
                        assert_eq!(
                            topo.position_to_rank(p),
                            rank,
                            "side {side}, {num_ranks} ranks, {p}"
                        );
                    }
                    if b.xmax < side {
                        let across = DVec2::new(b.xmax, b.ymin);
                        assert!(!b.contains(across));
                        assert_ne!(topo.position_to_rank(across), rank);
                    }
                }
            }
        }
    }

    #[test]
    fn test_tile_edge_at_three_quarters_of_inexact_side() {
        // Dividing this edge by the tile width floors to 2, not 3.
        let topo = RankTopology::new(3, 16, 0.7).unwrap();
        let x = 3.0 * topo.grid_width();
        assert_eq!(topo.tile_bounds().xmin, x);
        assert_eq!(topo.position_to_rank(DVec2::new(x, 0.0875)), 3);
        assert_eq!(topo.position_to_rank(DVec2::new(just_below(x), 0.0875)), 2);
    }

    #[test]
    fn test_last_tile_ends_at_side_len() {
        for side in [0.7, 3.3, 12.9] {
            let topo = RankTopology::new(63, 64, side).unwrap();
            let b = topo.tile_bounds();
            assert_eq!(b.xmax, side);
            assert_eq!(b.ymax, side);
            assert_eq!(topo.position_to_rank(DVec2::splat(just_below(side))), 63);
        }
    }

    #[test]
    fn test_position_to_rank_clamps_far_edge() {
        let topo = RankTopology::new(0, 4, 5.0).unwrap();
        assert_eq!(topo.position_to_rank(DVec2::new(5.0, 5.0)), 3);
        assert_eq!(topo.position_to_rank(DVec2::new(4.99, 2.5)), 3);
        assert_eq!(topo.position_to_rank(DVec2::new(0.02, 2.5)), 2);
    }

    #[test]
    fn test_four_rank_neighbors() {
        for rank in 0..4 {
            let topo = RankTopology::new(rank, 4, 5.0).unwrap();
            let n = topo.neighbors();
            assert_eq!(n.len(), 3);
            assert!(!n.contains(&rank));
        }
        assert_eq!(RankTopology::new(2, 4, 5.0).unwrap().neighbors(), vec![0, 1, 3]);
    }

    #[test]
    fn test_single_rank_has_no_neighbors() {
        let topo = RankTopology::new(0, 1, 5.0).unwrap();
        assert!(topo.neighbors().is_empty());
        assert_eq!(topo.position_to_rank(DVec2::new(4.9, 0.1)), 0);
    }

    #[test]
    fn test_moore_neighbors_wrap() {
        let topo = RankTopology::new(0, 16, 8.0).unwrap();
        assert_eq!(topo.neighbors(), vec![15, 3, 7, 12, 4, 13, 1, 5]);
    }

    #[test]
    fn test_neighbors_unique_and_symmetric() {
        for num_ranks in [16, 64] {
            let topos: Vec<_> = (0..num_ranks)
                .map(|r| RankTopology::new(r, num_ranks, 1.0).unwrap())
                .collect();
            for topo in &topos {
                let n = topo.neighbors();
                assert_eq!(n.len(), 8);
                let mut sorted = n.clone();
                sorted.sort_unstable();
                sorted.dedup();
                assert_eq!(sorted.len(), 8);
                for &other in &n {
                    assert!(topos[other].neighbors().contains(&topo.rank()));
                }
            }
        }
    }
}
