use bytemuck::{Pod, Zeroable};

use crate::{Interval, Vec3};

/// Axis-Aligned Bounding Box for spatial acceleration structures (BVH).
///
/// Stored as a min/max corner pair. A box with any `min > max` component is
/// empty; [`Aabb::EMPTY`] is the canonical empty box and the identity for
/// [`Aabb::grow`].
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create a box from its corners. The caller guarantees `min <= max`.
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point of the iterator.
    pub fn enclosing(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |mut bb, p| {
            bb.grow_point(p);
            bb
        })
    }

    /// Union of two boxes.
    pub fn surrounding(box0: &Aabb, box1: &Aabb) -> Self {
        Self {
            min: box0.min.min(box1.min),
            max: box0.max.max(box1.max),
        }
    }

    /// The region shared by both boxes; empty when they do not overlap.
    pub fn intersection(&self, other: &Aabb) -> Aabb {
        let bb = Aabb {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        };

        if bb.is_empty() {
            Aabb::EMPTY
        } else {
            bb
        }
    }

    #[inline]
    pub fn grow_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    #[inline]
    pub fn grow(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Size along each axis; zero for empty boxes.
    pub fn extent(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Half of the surface area. SAH only ever compares ratios, so the
    /// factor of two is usually dropped.
    #[inline]
    pub fn half_area(&self) -> f32 {
        let e = self.extent();
        e.x * e.y + e.y * e.z + e.z * e.x
    }

    #[inline]
    pub fn surface_area(&self) -> f32 {
        2.0 * self.half_area()
    }

    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// True when `other` lies inside `self`, allowing `eps` of slack.
    /// Empty boxes are contained in everything.
    pub fn contains(&self, other: &Aabb, eps: f32) -> bool {
        if other.is_empty() {
            return true;
        }

        let slack = Vec3::splat(eps);
        (other.min + slack).cmpge(self.min).all() && (other.max - slack).cmple(self.max).all()
    }

    /// Slab test with a precomputed reciprocal direction.
    ///
    /// Returns the parametric distance at which the ray enters the box,
    /// clamped to `ray_t.min`. Touching a flat box counts as a hit; empty
    /// boxes never hit.
    #[inline]
    pub fn entry(&self, origin: Vec3, inv_dir: Vec3, mut ray_t: Interval) -> Option<f32> {
        for axis in 0..3 {
            let adinv = inv_dir[axis];
            let mut t0 = (self.min[axis] - origin[axis]) * adinv;
            let mut t1 = (self.max[axis] - origin[axis]) * adinv;

            if adinv < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }

            // f32::max / f32::min discard the NaN produced by 0 * inf
            ray_t.min = t0.max(ray_t.min);
            ray_t.max = t1.min(ray_t.max);

            if ray_t.max < ray_t.min {
                return None;
            }
        }

        Some(ray_t.min)
    }

    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ray;

    fn unit_cube() -> Aabb {
        Aabb::new(Vec3::splat(-1.0), Vec3::ONE)
    }

    #[test]
    fn test_enclosing_and_surrounding() {
        let bb = Aabb::enclosing([Vec3::new(10.0, 0.0, 10.0), Vec3::new(0.0, 10.0, 0.0)]);
        assert_eq!(bb, Aabb::new(Vec3::ZERO, Vec3::splat(10.0)));
        assert!(Aabb::enclosing([]).is_empty());

        let other = Aabb::new(Vec3::splat(-2.0), Vec3::ZERO);
        let union = Aabb::surrounding(&bb, &other);
        assert_eq!(union, Aabb::new(Vec3::splat(-2.0), Vec3::splat(10.0)));
        assert_eq!(Aabb::surrounding(&Aabb::EMPTY, &other), other);
    }

    #[test]
    fn test_intersection() {
        let a = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        let b = Aabb::new(Vec3::ONE, Vec3::splat(3.0));
        assert_eq!(a.intersection(&b), Aabb::new(Vec3::ONE, Vec3::splat(2.0)));

        let far = Aabb::new(Vec3::splat(5.0), Vec3::splat(6.0));
        assert!(a.intersection(&far).is_empty());
    }

    #[test]
    fn test_area() {
        let bb = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(bb.half_area(), 11.0);
        assert_eq!(bb.surface_area(), 22.0);
        assert_eq!(Aabb::EMPTY.surface_area(), 0.0);
        assert_eq!(bb.centroid(), Vec3::new(0.5, 1.0, 1.5));
    }

    #[test]
    fn test_entry() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let inv = ray.inv_direction();
        assert_eq!(unit_cube().entry(ray.origin, inv, Interval::new(0.0, 100.0)), Some(4.0));
        // Range ends before the box
        assert_eq!(unit_cube().entry(ray.origin, inv, Interval::new(0.0, 3.0)), None);
        // Origin inside: entry clamps to the range start
        assert_eq!(unit_cube().entry(Vec3::ZERO, inv, Interval::new(0.5, 100.0)), Some(0.5));

        let away = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::NEG_Z);
        assert_eq!(unit_cube().entry(away.origin, away.inv_direction(), Interval::from_min(0.0)), None);
    }

    #[test]
    fn test_flat_box_is_hit() {
        let flat = Aabb::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 0.0));
        let ray = Ray::new(Vec3::new(0.0, 0.0, -2.0), Vec3::Z);
        let entry = flat.entry(ray.origin, ray.inv_direction(), Interval::new(0.0, 10.0));
        assert_eq!(entry, Some(2.0));
    }

    #[test]
    fn test_empty_box_is_never_hit() {
        for dir in [Vec3::X, Vec3::NEG_Y, Vec3::new(0.3, -0.2, 0.9)] {
            let ray = Ray::new(Vec3::ZERO, dir);
            let range = Interval::from_min(f32::NEG_INFINITY);
            assert!(Aabb::EMPTY.entry(ray.origin, ray.inv_direction(), range).is_none());
        }
    }

    #[test]
    fn test_contains() {
        let outer = Aabb::new(Vec3::ZERO, Vec3::splat(4.0));
        let inner = Aabb::new(Vec3::ONE, Vec3::splat(2.0));
        assert!(outer.contains(&inner, 0.0));
        assert!(!inner.contains(&outer, 0.0));
        assert!(inner.contains(&Aabb::EMPTY, 0.0));

        let barely_out = Aabb::new(Vec3::ZERO, Vec3::new(4.0 + 1e-6, 1.0, 1.0));
        assert!(outer.contains(&barely_out, 1e-5));
    }
}
