//! Triangle primitive with precomputed bounds.
//!
//! Uses the Möller-Trumbore algorithm for ray-triangle intersection.

use vela_math::{Aabb, Interval, Ray, Vec3};

/// Determinant below which a ray counts as parallel to the triangle.
const PARALLEL_EPSILON: f32 = 1e-8;

/// A single immutable triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primitive {
    vertices: [Vec3; 3],
    material: u32,
    bounds: Aabb,
}

/// Where a ray crossed a triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    /// Ray parameter of the hit
    pub t: f32,
    /// Barycentric weight of `v1`
    pub u: f32,
    /// Barycentric weight of `v2`
    pub v: f32,
}

impl Primitive {
    pub fn new(vertices: [Vec3; 3], material: u32) -> Self {
        Self {
            vertices,
            material,
            bounds: Aabb::enclosing(vertices),
        }
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec3; 3] {
        &self.vertices
    }

    #[inline]
    pub fn material(&self) -> u32 {
        self.material
    }

    #[inline]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Center of the bounding box, the point the builders bin by.
    #[inline]
    pub fn centroid(&self) -> Vec3 {
        self.bounds.centroid()
    }

    pub fn area(&self) -> f32 {
        let [v0, v1, v2] = self.vertices;
        0.5 * (v1 - v0).cross(v2 - v0).length()
    }

    /// Zero-area triangles still occupy a leaf but can never be hit.
    pub fn is_degenerate(&self) -> bool {
        let area = self.area();
        area == 0.0 || !area.is_finite()
    }

    /// Geometric normal following the `v0, v1, v2` winding; zero when degenerate.
    pub fn normal(&self) -> Vec3 {
        let [v0, v1, v2] = self.vertices;
        (v1 - v0).cross(v2 - v0).normalize_or_zero()
    }

    /// Möller-Trumbore ray-triangle intersection.
    pub fn intersect(&self, ray: &Ray, ray_t: Interval) -> Option<TriangleHit> {
        let [v0, v1, v2] = self.vertices;
        let edge1 = v1 - v0;
        let edge2 = v2 - v0;

        let h = ray.direction.cross(edge2);
        let a = edge1.dot(h);

        // Ray is parallel to triangle, or the triangle has no area
        if a.abs() < PARALLEL_EPSILON || !a.is_finite() {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - v0;
        let u = f * s.dot(h);

        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = f * ray.direction.dot(q);

        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(q);

        if !ray_t.contains(t) {
            return None;
        }

        Some(TriangleHit { t, u, v })
    }

    /// Bounds of the triangle parts on either side of the plane
    /// `p[axis] == position`.
    ///
    /// Either side may come back empty when the triangle does not reach it.
    /// Callers clip the result against the reference box they are splitting.
    pub fn split_bounds(&self, axis: usize, position: f32) -> (Aabb, Aabb) {
        let mut left = Aabb::EMPTY;
        let mut right = Aabb::EMPTY;

        for i in 0..3 {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % 3];
            let a_left = a[axis] <= position;
            let b_left = b[axis] <= position;

            if a_left {
                left.grow_point(a);
            } else {
                right.grow_point(a);
            }

            if a_left != b_left {
                let t = ((position - a[axis]) / (b[axis] - a[axis])).clamp(0.0, 1.0);
                let mut m = a + (b - a) * t;
                m[axis] = position;

                left.grow_point(m);
                right.grow_point(m);
            }
        }

        (left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Primitive {
        // Triangle in XY plane at z=-1
        Primitive::new(
            [
                Vec3::new(-1.0, -1.0, -1.0),
                Vec3::new(1.0, -1.0, -1.0),
                Vec3::new(0.0, 1.0, -1.0),
            ],
            3,
        )
    }

    #[test]
    fn test_triangle_hit() {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        let hit = triangle().intersect(&ray, Interval::from_min(0.001));

        let hit = hit.expect("ray through the center should hit");
        assert!((hit.t - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_triangle_miss() {
        // Ray pointing away
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        assert!(triangle()
            .intersect(&ray, Interval::from_min(0.001))
            .is_none());

        // Hit lies beyond the interval
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        assert!(triangle().intersect(&ray, Interval::new(0.001, 0.5)).is_none());
    }

    #[test]
    fn test_degenerate_triangle_never_hits() {
        let sliver = Primitive::new([Vec3::ZERO, Vec3::X, Vec3::X * 2.0], 0);
        assert!(sliver.is_degenerate());
        assert_eq!(sliver.normal(), Vec3::ZERO);

        let ray = Ray::new(Vec3::new(0.5, 0.0, -1.0), Vec3::Z);
        assert!(sliver.intersect(&ray, Interval::from_min(f32::NEG_INFINITY)).is_none());
    }

    #[test]
    fn test_bounds_and_material() {
        let tri = triangle();
        assert_eq!(tri.bounds().min, Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(tri.bounds().max, Vec3::new(1.0, 1.0, -1.0));
        assert_eq!(tri.material(), 3);
        assert!((tri.area() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_split_bounds_straddling() {
        let tri = triangle();
        let (left, right) = tri.split_bounds(0, 0.0);

        assert_eq!(left.min.x, -1.0);
        assert_eq!(left.max.x, 0.0);
        assert_eq!(right.min.x, 0.0);
        assert_eq!(right.max.x, 1.0);
        // Both halves stay inside the original bounds
        assert!(tri.bounds().contains(&left, 1e-6));
        assert!(tri.bounds().contains(&right, 1e-6));
    }

    #[test]
    fn test_split_bounds_one_sided() {
        let tri = triangle();
        let (left, right) = tri.split_bounds(1, 5.0);

        assert_eq!(left, tri.bounds());
        assert!(right.is_empty());
    }
}
