use crate::Vec3;

/// A ray in 3D space with origin and direction.
///
/// The direction is not required to be normalized; hit distances are
/// expressed in units of `direction`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: origin + t * direction
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Component-wise reciprocal of the direction, used by slab tests.
    #[inline]
    pub fn inv_direction(&self) -> Vec3 {
        Vec3::ONE / self.direction
    }

    /// True for zero-length or non-finite rays, which can never hit anything.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        let len_sq = self.direction.length_squared();
        len_sq == 0.0 || !len_sq.is_finite() || !self.origin.is_finite()
    }
}

impl Default for Ray {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            direction: Vec3::Z,
        }
    }
}
