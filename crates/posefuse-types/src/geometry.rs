//! Planar geometry: points and rigid 2-D poses.
//!
//! [`Pose`] follows the usual SE(2) algebra.  Two operators carry the whole
//! odometry bookkeeping of the fusion engine:
//!
//! ```text
//! a.plus_delta(d)   = (a.p + R(a.θ)·d.p,        a.θ + d.θ)
//! b.minus_state(a)  = (R(−a.θ)·(b.p − a.p),     b.θ − a.θ)
//! ```
//!
//! so that `a.plus_delta(b.minus_state(a)) == b` for any pair of poses.
//!
//! Headings are kept as raw radians and are never wrapped; every consumer
//! goes through `sin`/`cos` (see [`Point2D::from_angle`]).
//!
//! # Example
//!
//! ```rust
//! use posefuse_types::{Point2D, Pose};
//! use std::f64::consts::FRAC_PI_2;
//!
//! let a = Pose::new(1.0, 0.0, FRAC_PI_2);
//! let b = Pose::new(1.0, 2.0, FRAC_PI_2);
//!
//! // In a's frame, b is 2 m straight ahead.
//! let delta = b.minus_state(&a);
//! assert!((delta.position.x - 2.0).abs() < 1e-9);
//! assert!(delta.position.y.abs() < 1e-9);
//!
//! let back = a.plus_delta(&delta);
//! assert!(back.position.distance(&b.position) < 1e-9);
//! ```

use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Point2D
// ────────────────────────────────────────────────────────────────────────────

/// A 2-D point or free vector, in metres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    /// Create a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The origin.
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Unit vector pointing along `angle` (radians, counter-clockwise from +X).
    pub fn from_angle(angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(cos, sin)
    }

    /// Angle of this vector, `atan2(y, x)`.  The zero vector maps to `0`.
    pub fn angle(&self) -> f64 {
        self.y.atan2(self.x)
    }

    /// Euclidean length.
    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point2D) -> f64 {
        (*self - *other).norm()
    }

    /// Rotate counter-clockwise by `angle` radians about the origin.
    pub fn rotate(&self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

impl Add for Point2D {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Point2D {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Point2D {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point2D {
    type Output = Self;
    fn mul(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k)
    }
}

impl Div<f64> for Point2D {
    type Output = Self;
    fn div(self, k: f64) -> Self {
        Self::new(self.x / k, self.y / k)
    }
}

impl Neg for Point2D {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl std::iter::Sum for Point2D {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose
// ────────────────────────────────────────────────────────────────────────────

/// A rigid 2-D pose: position plus heading.
///
/// Also used as a relative transform ("delta") between two poses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position in the parent frame (metres).
    pub position: Point2D,
    /// Heading, counter-clockwise from +X (radians).
    pub heading: f64,
}

impl Pose {
    /// Create a pose from raw coordinates.
    pub const fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            position: Point2D::new(x, y),
            heading,
        }
    }

    /// Create a pose from a position and a heading.
    pub const fn from_parts(position: Point2D, heading: f64) -> Self {
        Self { position, heading }
    }

    /// The identity pose (origin, zero heading).
    pub const fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Unit vector of the heading.
    pub fn direction(&self) -> Point2D {
        Point2D::from_angle(self.heading)
    }

    /// Apply the relative motion `delta`, expressed in this pose's frame.
    pub fn plus_delta(&self, delta: &Pose) -> Pose {
        Pose {
            position: self.position + delta.position.rotate(self.heading),
            heading: self.heading + delta.heading,
        }
    }

    /// Relative motion that leads from `mark` to `self`, expressed in
    /// `mark`'s frame.
    pub fn minus_state(&self, mark: &Pose) -> Pose {
        Pose {
            position: (self.position - mark.position).rotate(-mark.heading),
            heading: self.heading - mark.heading,
        }
    }

    /// Map a point from this pose's local frame into the parent frame.
    pub fn transform_point(&self, local: &Point2D) -> Point2D {
        self.position + local.rotate(self.heading)
    }

    /// The pose with heading `heading` whose local point `mount` lands on
    /// `target` in the parent frame.
    ///
    /// Inverse of [`Pose::transform_point`] for a known heading: used to
    /// place a robot hypothesis so that its beacon mount coincides with a
    /// beacon fix.
    pub fn with_mount_at(target: Point2D, heading: f64, mount: &Point2D) -> Pose {
        Pose {
            position: target + (-*mount).rotate(heading),
            heading,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn rotate_quarter_turn_maps_x_to_y() {
        let r = Point2D::new(1.0, 0.0).rotate(FRAC_PI_2);
        assert!(close(r.x, 0.0));
        assert!(close(r.y, 1.0));
    }

    #[test]
    fn zero_vector_angle_is_zero() {
        assert_eq!(Point2D::zero().angle(), 0.0);
    }

    #[test]
    fn plus_delta_moves_along_heading() {
        let a = Pose::new(1.0, 1.0, FRAC_PI_2);
        let b = a.plus_delta(&Pose::new(2.0, 0.0, 0.5));
        assert!(close(b.position.x, 1.0));
        assert!(close(b.position.y, 3.0));
        assert!(close(b.heading, FRAC_PI_2 + 0.5));
    }

    #[test]
    fn minus_state_inverts_plus_delta() {
        let a = Pose::new(-3.0, 0.5, 2.0);
        let b = Pose::new(4.0, -1.0, -0.7);
        let back = a.plus_delta(&b.minus_state(&a));
        assert!(close(back.position.x, b.position.x));
        assert!(close(back.position.y, b.position.y));
        assert!(close(back.heading, b.heading));
    }

    #[test]
    fn identity_minus_state_is_noop() {
        let b = Pose::new(4.0, -1.0, 0.3);
        assert_eq!(b.minus_state(&Pose::identity()), b);
    }

    #[test]
    fn transform_point_applies_rotation_then_translation() {
        let pose = Pose::new(1.0, 0.0, PI);
        let p = pose.transform_point(&Point2D::new(0.5, 0.0));
        assert!(close(p.x, 0.5));
        assert!(close(p.y, 0.0));
    }

    #[test]
    fn with_mount_at_places_mount_on_target() {
        let mount = Point2D::new(-0.01, -0.02);
        let target = Point2D::new(3.0, 4.0);
        for i in 0..8 {
            let heading = i as f64 * PI / 4.0;
            let pose = Pose::with_mount_at(target, heading, &mount);
            assert!(pose.transform_point(&mount).distance(&target) < 1e-12);
            assert_eq!(pose.heading, heading);
        }
    }

    #[test]
    fn points_sum() {
        let s: Point2D = [Point2D::new(1.0, 2.0), Point2D::new(-3.0, 1.0)]
            .into_iter()
            .sum();
        assert_eq!(s, Point2D::new(-2.0, 3.0));
    }
}
