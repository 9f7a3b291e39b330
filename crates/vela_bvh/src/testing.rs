//! Scene generators and structural checks shared by the unit tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vela_core::PrimitiveStore;
use vela_math::{Interval, Ray, Vec3};

use crate::{Bvh2, Bvh2Node};

const EPS: f32 = 1e-4;

/// `count` small random triangles inside a 20-unit cube.
pub fn random_store(seed: u64, count: usize) -> PrimitiveStore {
    let mut rng = StdRng::seed_from_u64(seed);

    PrimitiveStore::from_triangles((0..count).map(|i| {
        let center = Vec3::new(
            rng.gen_range(-10.0..10.0),
            rng.gen_range(-10.0..10.0),
            rng.gen_range(-10.0..10.0),
        );
        let mut vertex = || {
            center
                + Vec3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                )
        };
        ([vertex(), vertex(), vertex()], (i % 3) as u32)
    }))
}

/// A few long thin triangles crossing a cloud of small ones, the case
/// spatial splits exist for.
pub fn straddling_store(seed: u64) -> PrimitiveStore {
    let small = random_store(seed, 200);
    let mut triangles: Vec<_> = small
        .as_slice()
        .iter()
        .map(|p| (*p.vertices(), p.material()))
        .collect();

    for i in 0..8 {
        let y = -8.0 + 2.0 * i as f32;
        triangles.push((
            [
                Vec3::new(-10.0, y, -10.0),
                Vec3::new(10.0, y + 0.5, 10.0),
                Vec3::new(10.0, y, -10.0),
            ],
            0,
        ));
    }

    PrimitiveStore::from_triangles(triangles)
}

pub fn random_rays(seed: u64, count: usize) -> Vec<Ray> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..count)
        .map(|_| {
            let origin = Vec3::new(
                rng.gen_range(-15.0..15.0),
                rng.gen_range(-15.0..15.0),
                rng.gen_range(-15.0..15.0),
            );
            let target = Vec3::new(
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-5.0..5.0),
            );
            Ray::new(origin, target - origin)
        })
        .collect()
}

/// Nearest hit by testing every primitive.
pub fn brute_force(store: &PrimitiveStore, ray: &Ray) -> Option<(u32, f32)> {
    let mut range = Interval::from_min(0.0);
    let mut best = None;

    for (i, prim) in store.as_slice().iter().enumerate() {
        if let Some(hit) = prim.intersect(ray, range) {
            range.max = hit.t;
            best = Some((i as u32, hit.t));
        }
    }

    best
}

/// Pre-order layout, containment, in-range leaves, every primitive reachable.
pub fn assert_tree_invariants(bvh: &Bvh2, store: &PrimitiveStore) {
    let nodes = bvh.nodes();
    let mut reached = vec![false; store.len()];

    for (id, node) in nodes.iter().enumerate() {
        match *node {
            Bvh2Node::Internal {
                bounds, left, right, ..
            } => {
                assert_eq!(left as usize, id + 1, "left child must follow node {id}");
                assert!(right > left && (right as usize) < nodes.len());
                assert!(bounds.contains(&nodes[left as usize].bounds(), EPS));
                assert!(bounds.contains(&nodes[right as usize].bounds(), EPS));
            }
            Bvh2Node::Leaf {
                bounds,
                first,
                count,
            } => {
                let range = first as usize..(first + count) as usize;
                assert!(range.end <= bvh.indices().len());

                for &prim in &bvh.indices()[range] {
                    reached[prim as usize] = true;
                    // SBVH leaves hold clipped references, so only the
                    // binary builder guarantees whole-primitive containment
                    if bvh.builder() == vela_core::BuilderKind::Sah {
                        assert!(bounds.contains(&store.as_slice()[prim as usize].bounds(), EPS));
                    }
                }
            }
        }
    }

    assert!(reached.iter().all(|&r| r), "unreachable primitive");
}
