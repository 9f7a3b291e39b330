//! Binned SAH builder.
//!
//! Partitions a permutation of primitive ids in place. Each split is chosen
//! among `sah_bins` centroid bins per axis; a range stays a leaf whenever
//! splitting would not beat intersecting everything in it.

use std::time::Instant;

use vela_core::{BuildSettings, BuilderKind, Primitive, PrimitiveStore};
use vela_math::Aabb;

use crate::binning::{find_object_split, leaf_cost, partition_in_place};
use crate::node::{append_rebased, BuildStats, Bvh2, Bvh2Node};

/// Build a BVH2 over `store` using object splits only.
///
/// Every primitive ends up in exactly one leaf.
pub fn build(store: &PrimitiveStore, settings: &BuildSettings) -> Bvh2 {
    SahBuilder::new(store.as_slice(), settings).build()
}

pub struct SahBuilder<'a> {
    primitives: &'a [Primitive],
    settings: BuildSettings,
}

impl<'a> SahBuilder<'a> {
    pub fn new(primitives: &'a [Primitive], settings: &BuildSettings) -> Self {
        Self {
            primitives,
            settings: settings.clamped(),
        }
    }

    pub fn build(&self) -> Bvh2 {
        if self.primitives.is_empty() {
            return Bvh2::empty(BuilderKind::Sah);
        }

        let start = Instant::now();
        let mut indices: Vec<u32> = (0..self.primitives.len() as u32).collect();
        let mut nodes = Vec::with_capacity(2 * self.primitives.len());
        let mut stats = BuildStats::default();

        self.build_range(&mut indices, 0, 0, &mut nodes, &mut stats);

        stats.build_time = start.elapsed();
        Bvh2::from_parts(nodes, indices, self.primitives.len(), BuilderKind::Sah, stats)
    }

    /// Bounds of the range and bounds of its centroids.
    fn range_bounds(&self, indices: &[u32]) -> (Aabb, Aabb) {
        let mut bounds = Aabb::EMPTY;
        let mut centroids = Aabb::EMPTY;

        for &i in indices {
            let prim = &self.primitives[i as usize];
            bounds.grow(&prim.bounds());
            centroids.grow_point(prim.centroid());
        }

        (bounds, centroids)
    }

    fn push_leaf(
        &self,
        nodes: &mut Vec<Bvh2Node>,
        stats: &mut BuildStats,
        bounds: Aabb,
        offset: usize,
        count: usize,
        depth: usize,
    ) {
        nodes.push(Bvh2Node::Leaf {
            bounds,
            first: offset as u32,
            count: count as u32,
        });
        stats.record_leaf(depth);
    }

    /// Build the subtree for `indices`, which starts at `offset` in the full
    /// permutation. The subtree root is pushed at `nodes.len()`.
    fn build_range(
        &self,
        indices: &mut [u32],
        offset: usize,
        depth: usize,
        nodes: &mut Vec<Bvh2Node>,
        stats: &mut BuildStats,
    ) {
        let count = indices.len();
        let (bounds, centroid_bounds) = self.range_bounds(indices);

        if count <= self.settings.min_leaf_size {
            self.push_leaf(nodes, stats, bounds, offset, count, depth);
            return;
        }

        if depth >= self.settings.max_depth {
            log::warn!(
                "SAH build hit depth limit {} with {} primitives left, forcing a leaf",
                self.settings.max_depth,
                count
            );
            stats.forced_leaves += 1;
            self.push_leaf(nodes, stats, bounds, offset, count, depth);
            return;
        }

        let prims = self.primitives;
        let items = indices.iter().map(|&i| {
            let prim = &prims[i as usize];
            (prim.bounds(), prim.centroid())
        });

        let split = find_object_split(items, &bounds, &centroid_bounds, &self.settings)
            .filter(|split| split.candidate.cost < leaf_cost(&self.settings, count));

        let Some(split) = split else {
            self.push_leaf(nodes, stats, bounds, offset, count, depth);
            return;
        };

        let mid = partition_in_place(indices, |&i| split.goes_left(prims[i as usize].centroid()));
        debug_assert_eq!(mid, split.candidate.left_count);

        stats.internal_nodes += 1;
        stats.object_splits += 1;

        let id = nodes.len();
        nodes.push(Bvh2Node::empty_leaf());

        let (left, right) = indices.split_at_mut(mid);
        let right_id = if count >= self.settings.parallel_threshold {
            let ((left_nodes, left_stats), (right_nodes, right_stats)) = rayon::join(
                || self.build_detached(left, offset, depth + 1),
                || self.build_detached(right, offset + mid, depth + 1),
            );

            // Leaf offsets are already global, only node ids move
            append_rebased(nodes, left_nodes, 0);
            let right_id = nodes.len();
            append_rebased(nodes, right_nodes, 0);

            stats.merge(&left_stats);
            stats.merge(&right_stats);
            right_id
        } else {
            self.build_range(left, offset, depth + 1, nodes, stats);
            let right_id = nodes.len();
            self.build_range(right, offset + mid, depth + 1, nodes, stats);
            right_id
        };

        nodes[id] = Bvh2Node::Internal {
            bounds,
            left: id as u32 + 1,
            right: right_id as u32,
            axis: split.candidate.axis as u8,
        };
    }

    /// Build a subtree into its own arena so it can run on another thread.
    fn build_detached(
        &self,
        indices: &mut [u32],
        offset: usize,
        depth: usize,
    ) -> (Vec<Bvh2Node>, BuildStats) {
        let mut nodes = Vec::with_capacity(2 * indices.len());
        let mut stats = BuildStats::default();
        self.build_range(indices, offset, depth, &mut nodes, &mut stats);
        (nodes, stats)
    }
}
