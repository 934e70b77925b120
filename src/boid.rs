//! Boids and the 2D vector helpers they move with.

use crate::Wire;
use glam::DVec2;

/// A point agent.
///
/// `id` is assigned once at creation and is unique across the whole
/// population; it travels with the boid through every migration.
#[derive(Wire, Clone, Copy, Debug, PartialEq)]
pub struct Boid {
    pub position: DVec2,
    pub velocity: DVec2,
    pub id: u64,
}

impl Boid {
    pub fn new(position: DVec2, velocity: DVec2, id: u64) -> Self {
        Self {
            position,
            velocity,
            id,
        }
    }

    /// Euclidean distance between two boids.
    ///
    /// Not wrapped across the periodic boundary: boids on opposite edges of
    /// the domain only see each other through a halo tile.
    #[inline]
    pub fn distance(&self, other: &Boid) -> f64 {
        self.position.distance(other.position)
    }

    #[inline]
    pub fn speed(&self) -> f64 {
        self.velocity.length()
    }
}

/// Angle of a vector in `(-π, π]`.
#[inline]
pub fn heading(v: DVec2) -> f64 {
    v.y.atan2(v.x)
}

/// Vector of length `len` pointing at `angle` radians.
#[inline]
pub fn from_heading(angle: f64, len: f64) -> DVec2 {
    DVec2::from_angle(angle) * len
}

/// Fold a coordinate that moved at most one domain length back into
/// `[0, side_len)`.
#[inline]
pub fn wrap_coordinate(mut x: f64, side_len: f64) -> f64 {
    if x >= side_len {
        x -= side_len;
    }
    if x < 0.0 {
        x += side_len;
    }
    // A tiny negative value can round up to exactly side_len.
    if x >= side_len {
        x = 0.0;
    }
    x
}

/// Wrap both axes of a position independently.
#[inline]
pub fn wrap_position(pos: DVec2, side_len: f64) -> DVec2 {
    DVec2::new(
        wrap_coordinate(pos.x, side_len),
        wrap_coordinate(pos.y, side_len),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WireRecord;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_heading_range() {
        assert!((heading(DVec2::new(1.0, 0.0))).abs() < 1e-12);
        assert!((heading(DVec2::new(0.0, 2.0)) - FRAC_PI_2).abs() < 1e-12);
        assert!((heading(DVec2::new(-1.0, 0.0)) - PI).abs() < 1e-12);
    }

    #[test]
    fn test_from_heading_length() {
        for i in 0..16 {
            let angle = i as f64 * 0.7 - 5.0;
            let v = from_heading(angle, 0.03);
            assert!((v.length() - 0.03).abs() < 1e-12);
        }
    }

    #[test]
    fn test_wrap_coordinate() {
        assert!((wrap_coordinate(5.02, 5.0) - 0.02).abs() < 1e-12);
        assert!((wrap_coordinate(-0.5, 5.0) - 4.5).abs() < 1e-12);
        assert_eq!(wrap_coordinate(5.0, 5.0), 0.0);
        assert_eq!(wrap_coordinate(2.5, 5.0), 2.5);
        assert!(wrap_coordinate(-1e-18, 5.0) < 5.0);
    }

    #[test]
    fn test_boid_wire_layout() {
        assert_eq!(std::mem::size_of::<BoidWire>(), 40);

        let boid = Boid::new(DVec2::new(1.0, 2.0), DVec2::new(-0.03, 0.0), 77);
        let wire = boid.to_wire();
        assert_eq!(wire.position, [1.0, 2.0]);
        assert_eq!(wire.id, 77);
        assert_eq!(Boid::from_wire(&wire), boid);
    }
}
