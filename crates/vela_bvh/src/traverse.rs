//! Stack-based ray traversal for both tree shapes.
//!
//! Children are visited near-to-far and anything whose entry distance lies
//! past the closest hit so far is skipped when popped.

use smallvec::SmallVec;
use vela_core::Primitive;
use vela_math::{Interval, Ray, Vec3};

use crate::collapse::{WideBvh, WideChild, MAX_FANOUT};
use crate::node::{Bvh2, Bvh2Node};

/// Nearest intersection found by a traversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Index into the primitive store
    pub primitive: u32,
    pub t: f32,
    pub u: f32,
    pub v: f32,
}

/// Test `indices` against the ray, shrinking `range` to the closest hit.
#[inline]
fn intersect_leaf(
    indices: &[u32],
    primitives: &[Primitive],
    ray: &Ray,
    range: &mut Interval,
    best: &mut Option<Hit>,
) {
    for &prim in indices {
        if let Some(hit) = primitives[prim as usize].intersect(ray, *range) {
            range.max = hit.t;
            *best = Some(Hit {
                primitive: prim,
                t: hit.t,
                u: hit.u,
                v: hit.v,
            });
        }
    }
}

#[inline]
fn any_hit(indices: &[u32], primitives: &[Primitive], ray: &Ray, range: Interval) -> bool {
    indices
        .iter()
        .any(|&prim| primitives[prim as usize].intersect(ray, range).is_some())
}

#[inline]
fn leaf_slice(indices: &[u32], first: u32, count: u32) -> &[u32] {
    &indices[first as usize..(first + count) as usize]
}

struct Prepared {
    origin: Vec3,
    inv_dir: Vec3,
}

fn prepare(ray: &Ray) -> Option<Prepared> {
    if ray.is_degenerate() {
        return None;
    }

    Some(Prepared {
        origin: ray.origin,
        inv_dir: ray.inv_direction(),
    })
}

impl Bvh2 {
    /// Closest hit within `ray_t`, or `None`.
    pub fn intersect(&self, ray: &Ray, ray_t: Interval, primitives: &[Primitive]) -> Option<Hit> {
        self.walk(ray, ray_t, primitives, false).0
    }

    /// Whether anything blocks the ray within `ray_t`. Stops at the first hit.
    pub fn occluded(&self, ray: &Ray, ray_t: Interval, primitives: &[Primitive]) -> bool {
        self.walk(ray, ray_t, primitives, true).1
    }

    fn walk(
        &self,
        ray: &Ray,
        ray_t: Interval,
        primitives: &[Primitive],
        any: bool,
    ) -> (Option<Hit>, bool) {
        let Some(p) = prepare(ray) else {
            return (None, false);
        };

        let mut range = ray_t;
        let mut best = None;
        let mut stack: SmallVec<[(u32, f32); 64]> = SmallVec::new();

        if let Some(t) = self.root().bounds().entry(p.origin, p.inv_dir, range) {
            stack.push((0, t));
        }

        while let Some((id, t_entry)) = stack.pop() {
            if t_entry > range.max {
                continue;
            }

            match self.nodes[id as usize] {
                Bvh2Node::Leaf { first, count, .. } => {
                    let indices = leaf_slice(&self.indices, first, count);
                    if any {
                        if any_hit(indices, primitives, ray, range) {
                            return (None, true);
                        }
                    } else {
                        intersect_leaf(indices, primitives, ray, &mut range, &mut best);
                    }
                }
                Bvh2Node::Internal { left, right, .. } => {
                    let bounds = |child: u32| self.nodes[child as usize].bounds();
                    let t_left = bounds(left).entry(p.origin, p.inv_dir, range);
                    let t_right = bounds(right).entry(p.origin, p.inv_dir, range);

                    match (t_left, t_right) {
                        (Some(tl), Some(tr)) => {
                            // Far child first so the near one pops next
                            if tl <= tr {
                                stack.push((right, tr));
                                stack.push((left, tl));
                            } else {
                                stack.push((left, tl));
                                stack.push((right, tr));
                            }
                        }
                        (Some(tl), None) => stack.push((left, tl)),
                        (None, Some(tr)) => stack.push((right, tr)),
                        (None, None) => {}
                    }
                }
            }
        }

        let hit = best.is_some();
        (best, hit)
    }
}

impl WideBvh {
    /// Closest hit within `ray_t`, or `None`.
    pub fn intersect(&self, ray: &Ray, ray_t: Interval, primitives: &[Primitive]) -> Option<Hit> {
        self.walk(ray, ray_t, primitives, false).0
    }

    /// Whether anything blocks the ray within `ray_t`. Stops at the first hit.
    pub fn occluded(&self, ray: &Ray, ray_t: Interval, primitives: &[Primitive]) -> bool {
        self.walk(ray, ray_t, primitives, true).1
    }

    fn walk(
        &self,
        ray: &Ray,
        ray_t: Interval,
        primitives: &[Primitive],
        any: bool,
    ) -> (Option<Hit>, bool) {
        let Some(p) = prepare(ray) else {
            return (None, false);
        };

        let mut range = ray_t;
        let mut best = None;
        let mut stack: SmallVec<[(WideChild, f32); 64]> = SmallVec::new();

        if let Some(t) = self.bounds.entry(p.origin, p.inv_dir, range) {
            stack.push((WideChild::Node(0), t));
        }

        while let Some((child, t_entry)) = stack.pop() {
            if t_entry > range.max {
                continue;
            }

            match child {
                WideChild::Leaf { first, count } => {
                    let indices = leaf_slice(&self.indices, first, count);
                    if any {
                        if any_hit(indices, primitives, ray, range) {
                            return (None, true);
                        }
                    } else {
                        intersect_leaf(indices, primitives, ray, &mut range, &mut best);
                    }
                }
                WideChild::Node(id) => {
                    let node = &self.nodes[id as usize];
                    let mut hits: SmallVec<[(WideChild, f32); MAX_FANOUT]> = node
                        .occupied()
                        .filter_map(|(bounds, child)| {
                            bounds
                                .entry(p.origin, p.inv_dir, range)
                                .map(|t| (child, t))
                        })
                        .collect();

                    // Farthest pushed first
                    hits.sort_unstable_by(|a, b| b.1.total_cmp(&a.1));
                    stack.extend(hits);
                }
                WideChild::Empty => {}
            }
        }

        let hit = best.is_some();
        (best, hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collapse::collapse;
    use crate::testing::{brute_force, random_rays, random_store};
    use vela_core::{BuildSettings, BuilderKind, PrimitiveStore, WideFanout};

    fn full_range() -> Interval {
        Interval::from_min(0.0)
    }

    #[test]
    fn test_bvh2_and_wide_match_brute_force() {
        let store = random_store(21, 800);
        let prims = store.as_slice();

        for builder in [BuilderKind::Sah, BuilderKind::Sbvh] {
            let settings = BuildSettings {
                builder,
                ..Default::default()
            };
            let bvh = crate::builder::build(&store, &settings);
            let wide4 = collapse(&bvh, WideFanout::Four);
            let wide8 = collapse(&bvh, WideFanout::Eight);

            let mut hits = 0;
            for ray in random_rays(5, 1000) {
                let expected = brute_force(&store, &ray);
                let results = [
                    bvh.intersect(&ray, full_range(), prims),
                    wide4.intersect(&ray, full_range(), prims),
                    wide8.intersect(&ray, full_range(), prims),
                ];

                for found in results {
                    match (expected, found) {
                        (None, None) => {}
                        (Some((prim, t)), Some(hit)) => {
                            assert_eq!(hit.primitive, prim);
                            assert!((hit.t - t).abs() < 1e-4);
                        }
                        other => panic!("{builder:?}: {other:?}"),
                    }
                }

                if expected.is_some() {
                    hits += 1;
                }
            }

            assert!(hits > 0, "test rays never hit anything");
        }
    }

    #[test]
    fn test_occluded_matches_intersect() {
        let store = random_store(22, 400);
        let bvh = crate::sah::build(&store, &BuildSettings::default());
        let wide = collapse(&bvh, WideFanout::Eight);

        for ray in random_rays(6, 500) {
            // Short segments so both outcomes show up
            let range = Interval::new(1e-3, 0.5);
            let expected = store
                .as_slice()
                .iter()
                .any(|prim| prim.intersect(&ray, range).is_some());

            assert_eq!(bvh.occluded(&ray, range, store.as_slice()), expected);
            assert_eq!(wide.occluded(&ray, range, store.as_slice()), expected);
        }
    }

    #[test]
    fn test_degenerate_rays_never_hit() {
        let store = random_store(23, 100);
        let bvh = crate::sah::build(&store, &BuildSettings::default());
        let wide = collapse(&bvh, WideFanout::Four);

        for direction in [Vec3::ZERO, Vec3::new(f32::NAN, 0.0, 1.0), Vec3::splat(f32::INFINITY)] {
            let ray = Ray::new(Vec3::ZERO, direction);
            assert!(bvh.intersect(&ray, full_range(), store.as_slice()).is_none());
            assert!(!wide.occluded(&ray, full_range(), store.as_slice()));
        }
    }

    #[test]
    fn test_empty_scene() {
        let store = PrimitiveStore::empty();
        let bvh = crate::sah::build(&store, &BuildSettings::default());
        let wide = collapse(&bvh, WideFanout::Eight);
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);

        assert!(bvh.intersect(&ray, full_range(), store.as_slice()).is_none());
        assert!(wide.intersect(&ray, full_range(), store.as_slice()).is_none());
        assert!(!wide.occluded(&ray, full_range(), store.as_slice()));
    }

    #[test]
    fn test_single_triangle_barycentrics() {
        let store = PrimitiveStore::from_triangles([([Vec3::ZERO, Vec3::X, Vec3::Y], 0)]);
        let bvh = crate::sah::build(&store, &BuildSettings::default());
        let wide = collapse(&bvh, WideFanout::Four);

        let ray = Ray::new(Vec3::new(0.25, 0.25, 1.0), -Vec3::Z);
        let hit = wide
            .intersect(&ray, full_range(), store.as_slice())
            .expect("ray points at the triangle");

        assert_eq!(hit.primitive, 0);
        assert!((hit.t - 1.0).abs() < 1e-6);
        assert!((hit.u - 0.25).abs() < 1e-6);
        assert!((hit.v - 0.25).abs() < 1e-6);
    }
}
