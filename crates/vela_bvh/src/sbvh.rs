//! Spatial-split BVH builder.
//!
//! Extends the binned SAH search with spatial splits: a plane that cuts
//! straddling references in two so both children get tighter boxes. A cut
//! reference is duplicated into both children, which is bounded by the
//! duplication budget. References that are cheaper kept whole on one side
//! are "unsplit" instead.

use std::time::Instant;

use vela_core::{BuildSettings, BuilderKind, Primitive, PrimitiveStore};
use vela_math::{Aabb, Vec3};

use crate::binning::{axes_by_extent, find_object_split, keep_best, leaf_cost, split_cost};
use crate::binning::{ObjectSplit, SplitCandidate};
use crate::node::{BuildStats, Bvh2, Bvh2Node};

/// Build a BVH2 over `store` with spatial splits enabled.
///
/// Every primitive is referenced by at least one leaf, and the index array
/// never exceeds `duplication_budget * store.len()` entries.
pub fn build(store: &PrimitiveStore, settings: &BuildSettings) -> Bvh2 {
    SbvhBuilder::new(store, settings).build()
}

/// A possibly clipped primitive box.
#[derive(Debug, Clone, Copy)]
struct Reference {
    bounds: Aabb,
    prim: u32,
}

impl Reference {
    #[inline]
    fn centroid(&self) -> Vec3 {
        self.bounds.centroid()
    }
}

/// A subtree built in its own arena; leaf ranges index into `indices`.
#[derive(Default)]
struct Subtree {
    nodes: Vec<Bvh2Node>,
    indices: Vec<u32>,
    stats: BuildStats,
}

impl Subtree {
    fn append(&mut self, other: Subtree) {
        let node_base = self.nodes.len() as u32;
        let index_base = self.indices.len() as u32;

        self.nodes
            .extend(other.nodes.into_iter().map(|node| node.rebased(node_base, index_base)));
        self.indices.extend(other.indices);
        self.stats.merge(&other.stats);
    }

    fn push_leaf(&mut self, bounds: Aabb, refs: &[Reference], depth: usize) {
        let first = self.indices.len() as u32;
        self.indices.extend(refs.iter().map(|r| r.prim));
        self.nodes.push(Bvh2Node::Leaf {
            bounds,
            first,
            count: refs.len() as u32,
        });
        self.stats.record_leaf(depth);
    }
}

#[derive(Debug, Clone, Copy)]
struct SpatialBin {
    bounds: Aabb,
    entries: usize,
    exits: usize,
}

impl Default for SpatialBin {
    fn default() -> Self {
        Self {
            bounds: Aabb::EMPTY,
            entries: 0,
            exits: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SpatialSplit {
    position: f32,
    candidate: SplitCandidate,
}

enum Split {
    Object(ObjectSplit),
    Spatial(SpatialSplit),
}

pub struct SbvhBuilder<'a> {
    primitives: &'a [Primitive],
    settings: BuildSettings,
    /// Half area of the whole scene, the overlap test's reference
    root_area: f32,
}

impl<'a> SbvhBuilder<'a> {
    pub fn new(store: &'a PrimitiveStore, settings: &BuildSettings) -> Self {
        Self {
            primitives: store.as_slice(),
            settings: settings.clamped(),
            root_area: store.bounds().half_area(),
        }
    }

    pub fn build(&self) -> Bvh2 {
        if self.primitives.is_empty() {
            return Bvh2::empty(BuilderKind::Sbvh);
        }

        let start = Instant::now();
        let count = self.primitives.len();
        let refs: Vec<Reference> = self
            .primitives
            .iter()
            .enumerate()
            .map(|(i, prim)| Reference {
                bounds: prim.bounds(),
                prim: i as u32,
            })
            .collect();

        let max_refs = (self.settings.duplication_budget as f64 * count as f64).floor() as usize;
        let budget = max_refs.saturating_sub(count);

        let mut tree = Subtree {
            nodes: Vec::with_capacity(2 * count),
            indices: Vec::with_capacity(count),
            stats: BuildStats::default(),
        };
        self.build_node(refs, 0, budget, &mut tree);

        tree.stats.build_time = start.elapsed();
        Bvh2::from_parts(tree.nodes, tree.indices, count, BuilderKind::Sbvh, tree.stats)
    }

    /// Build the subtree for `refs`; its root lands at `out.nodes.len()`.
    fn build_node(&self, refs: Vec<Reference>, depth: usize, budget: usize, out: &mut Subtree) {
        let count = refs.len();
        let mut bounds = Aabb::EMPTY;
        let mut centroid_bounds = Aabb::EMPTY;
        for r in &refs {
            bounds.grow(&r.bounds);
            centroid_bounds.grow_point(r.centroid());
        }

        if count <= self.settings.min_leaf_size {
            out.push_leaf(bounds, &refs, depth);
            return;
        }

        if depth >= self.settings.max_depth {
            log::warn!(
                "SBVH build hit depth limit {} with {} references left, forcing a leaf",
                self.settings.max_depth,
                count
            );
            out.stats.forced_leaves += 1;
            out.push_leaf(bounds, &refs, depth);
            return;
        }

        let object = find_object_split(
            refs.iter().map(|r| (r.bounds, r.centroid())),
            &bounds,
            &centroid_bounds,
            &self.settings,
        );

        let mut spatial = None;
        if self.wants_spatial_split(object.as_ref()) {
            if budget == 0 {
                out.stats.budget_exhausted += 1;
            } else {
                spatial = self.find_spatial_split(&refs, &bounds);
            }
        }

        let leaf = leaf_cost(&self.settings, count);
        let object = object.filter(|split| split.candidate.cost < leaf);
        let spatial = spatial.filter(|split| split.candidate.cost < leaf);

        let split = match (object, spatial) {
            (Some(o), Some(s)) if s.candidate.is_better_than(&o.candidate) => Split::Spatial(s),
            (Some(o), _) => Split::Object(o),
            (None, Some(s)) => Split::Spatial(s),
            (None, None) => {
                out.push_leaf(bounds, &refs, depth);
                return;
            }
        };

        let (axis, left, right, duplicated) = match split {
            Split::Spatial(s) => {
                let (left, right, duplicated) = self.partition_spatial(refs, &s, budget);
                if left.is_empty() || right.is_empty() {
                    // Every reference was unsplit to one side; nothing gained
                    let refs: Vec<Reference> = left.into_iter().chain(right).collect();
                    let Some(o) = object else {
                        out.push_leaf(bounds, &refs, depth);
                        return;
                    };
                    let (left, right) = partition_object(refs, &o);
                    out.stats.object_splits += 1;
                    (o.candidate.axis, left, right, 0)
                } else {
                    out.stats.spatial_splits += 1;
                    out.stats.duplicated_references += duplicated;
                    (s.candidate.axis, left, right, duplicated)
                }
            }
            Split::Object(o) => {
                let (left, right) = partition_object(refs, &o);
                out.stats.object_splits += 1;
                (o.candidate.axis, left, right, 0)
            }
        };

        out.stats.internal_nodes += 1;

        let (left_budget, right_budget) = divide_budget(budget - duplicated, &left, &right);

        let id = out.nodes.len();
        out.nodes.push(Bvh2Node::empty_leaf());

        let right_id = if count >= self.settings.parallel_threshold {
            let (left_tree, right_tree) = rayon::join(
                || self.build_detached(left, depth + 1, left_budget),
                || self.build_detached(right, depth + 1, right_budget),
            );

            out.append(left_tree);
            let right_id = out.nodes.len();
            out.append(right_tree);
            right_id
        } else {
            self.build_node(left, depth + 1, left_budget, out);
            let right_id = out.nodes.len();
            self.build_node(right, depth + 1, right_budget, out);
            right_id
        };

        out.nodes[id] = Bvh2Node::Internal {
            bounds,
            left: id as u32 + 1,
            right: right_id as u32,
            axis: axis as u8,
        };
    }

    fn build_detached(&self, refs: Vec<Reference>, depth: usize, budget: usize) -> Subtree {
        let mut tree = Subtree::default();
        self.build_node(refs, depth, budget, &mut tree);
        tree
    }

    /// Spatial splits are only worth evaluating when the object split's
    /// children overlap by more than the configured share of the scene.
    fn wants_spatial_split(&self, object: Option<&ObjectSplit>) -> bool {
        if self.root_area <= 0.0 {
            return false;
        }

        let Some(threshold) = self.settings.overlap_threshold else {
            return true;
        };

        match object {
            Some(split) => {
                let overlap = split
                    .candidate
                    .left_bounds
                    .intersection(&split.candidate.right_bounds);
                overlap.half_area() / self.root_area > threshold
            }
            // Coincident centroids: only a spatial split can separate them
            None => true,
        }
    }

    /// Bins clipped reference boxes into `spatial_bins` slabs of the node
    /// bounds and returns the cheapest slab boundary.
    fn find_spatial_split(&self, refs: &[Reference], bounds: &Aabb) -> Option<SpatialSplit> {
        let bin_count = self.settings.spatial_bins;
        let parent_area = bounds.half_area();
        let extent = bounds.extent();

        let mut best: Option<(f32, SplitCandidate)> = None;
        let mut bins = vec![SpatialBin::default(); bin_count];
        let mut right_bounds = vec![Aabb::EMPTY; bin_count];
        let mut right_counts = vec![0usize; bin_count];

        for axis in axes_by_extent(extent) {
            if extent[axis] <= 0.0 {
                continue;
            }

            let origin = bounds.min[axis];
            let bin_size = extent[axis] / bin_count as f32;
            let plane = |i: usize| origin + bin_size * i as f32;
            let bin_of = |x: f32| (((x - origin) / bin_size) as usize).min(bin_count - 1);

            bins.fill(SpatialBin::default());

            for r in refs {
                let prim = &self.primitives[r.prim as usize];
                let first = bin_of(r.bounds.min[axis]);
                let last = bin_of(r.bounds.max[axis]).max(first);

                let mut rest = r.bounds;
                for bin in first..last {
                    let (left, right) = prim.split_bounds(axis, plane(bin + 1));
                    bins[bin].bounds.grow(&left.intersection(&rest));
                    rest = right.intersection(&rest);
                }
                bins[last].bounds.grow(&rest);
                bins[first].entries += 1;
                bins[last].exits += 1;
            }

            let mut acc = Aabb::EMPTY;
            let mut exits = 0;
            for i in (0..bin_count).rev() {
                acc.grow(&bins[i].bounds);
                exits += bins[i].exits;
                right_bounds[i] = acc;
                right_counts[i] = exits;
            }

            let mut left = Aabb::EMPTY;
            let mut entries = 0;
            for split in 1..bin_count {
                left.grow(&bins[split - 1].bounds);
                entries += bins[split - 1].entries;

                if entries == 0 || right_counts[split] == 0 {
                    continue;
                }

                let candidate = SplitCandidate {
                    axis,
                    cost: split_cost(
                        &self.settings,
                        parent_area,
                        entries,
                        left.half_area(),
                        right_counts[split],
                        right_bounds[split].half_area(),
                    ),
                    left_count: entries,
                    right_count: right_counts[split],
                    left_bounds: left,
                    right_bounds: right_bounds[split],
                };

                keep_best(&mut best, plane(split), candidate);
            }
        }

        best.map(|(position, candidate)| SpatialSplit {
            position,
            candidate,
        })
    }

    /// Distribute references around the split plane. Straddlers are either
    /// clipped into both sides or, when cheaper, kept whole on one side.
    /// At most `budget` references are duplicated.
    fn partition_spatial(
        &self,
        refs: Vec<Reference>,
        split: &SpatialSplit,
        budget: usize,
    ) -> (Vec<Reference>, Vec<Reference>, usize) {
        let axis = split.candidate.axis;
        let position = split.position;

        let mut left = Vec::with_capacity(split.candidate.left_count);
        let mut right = Vec::with_capacity(split.candidate.right_count);
        let mut straddling = Vec::new();

        let mut left_bounds = Aabb::EMPTY;
        let mut right_bounds = Aabb::EMPTY;

        for r in refs {
            if r.bounds.max[axis] <= position {
                left_bounds.grow(&r.bounds);
                left.push(r);
            } else if r.bounds.min[axis] >= position {
                right_bounds.grow(&r.bounds);
                right.push(r);
            } else {
                straddling.push(r);
            }
        }

        // Straddlers start out counted on both sides
        let mut left_count = left.len() + straddling.len();
        let mut right_count = right.len() + straddling.len();
        let mut duplicated = 0;

        for r in straddling {
            let prim = &self.primitives[r.prim as usize];
            let (l, rr) = prim.split_bounds(axis, position);
            let clipped_left = l.intersection(&r.bounds);
            let clipped_right = rr.intersection(&r.bounds);

            if clipped_left.is_empty() || clipped_right.is_empty() {
                // Only grazes the plane
                if clipped_right.is_empty() {
                    left_bounds.grow(&r.bounds);
                    left.push(r);
                    right_count -= 1;
                } else {
                    right_bounds.grow(&r.bounds);
                    right.push(r);
                    left_count -= 1;
                }
                continue;
            }

            let split_left = Aabb::surrounding(&left_bounds, &clipped_left);
            let split_right = Aabb::surrounding(&right_bounds, &clipped_right);
            let whole_left = Aabb::surrounding(&left_bounds, &r.bounds);
            let whole_right = Aabb::surrounding(&right_bounds, &r.bounds);

            let c_split =
                split_left.half_area() * left_count as f32 + split_right.half_area() * right_count as f32;
            let c_left = whole_left.half_area() * left_count as f32
                + right_bounds.half_area() * (right_count - 1) as f32;
            let c_right = left_bounds.half_area() * (left_count - 1) as f32
                + whole_right.half_area() * right_count as f32;

            let can_duplicate = duplicated < budget;

            if (c_left < c_split || !can_duplicate) && c_left <= c_right {
                left_bounds = whole_left;
                left.push(r);
                right_count -= 1;
            } else if c_right < c_split || !can_duplicate {
                right_bounds = whole_right;
                right.push(r);
                left_count -= 1;
            } else {
                left_bounds = split_left;
                right_bounds = split_right;
                left.push(Reference {
                    bounds: clipped_left,
                    prim: r.prim,
                });
                right.push(Reference {
                    bounds: clipped_right,
                    prim: r.prim,
                });
                duplicated += 1;
            }
        }

        (left, right, duplicated)
    }
}

fn partition_object(refs: Vec<Reference>, split: &ObjectSplit) -> (Vec<Reference>, Vec<Reference>) {
    refs.into_iter().partition(|r| split.goes_left(r.centroid()))
}

/// Split the remaining duplication budget in proportion to each child's
/// SAH weight, so the result does not depend on build order.
fn divide_budget(remaining: usize, left: &[Reference], right: &[Reference]) -> (usize, usize) {
    let weight = |refs: &[Reference]| {
        let bounds = refs.iter().fold(Aabb::EMPTY, |mut bb, r| {
            bb.grow(&r.bounds);
            bb
        });
        bounds.half_area() as f64 * refs.len() as f64
    };

    let left_weight = weight(left);
    let total = left_weight + weight(right);

    let left_budget = if total > 0.0 {
        ((remaining as f64 * left_weight / total).floor() as usize).min(remaining)
    } else {
        remaining / 2
    };

    (left_budget, remaining - left_budget)
}
