//! Binary BVH stored as a flat, index-addressed node arena.
//!
//! Nodes are laid out in pre-order: the root is node 0 and an internal
//! node's left child immediately follows it. Leaves reference a contiguous
//! range of [`Bvh2::indices`], which maps back to primitive ids.

use std::time::Duration;

use vela_core::{BuildSettings, BuilderKind};
use vela_math::Aabb;

/// BVH2 node - either an internal node with two children or a leaf.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bvh2Node {
    /// Internal node with two children.
    Internal {
        bounds: Aabb,
        left: u32,
        right: u32,
        axis: u8,
    },
    /// Leaf node covering `indices[first..first + count]`.
    Leaf { bounds: Aabb, first: u32, count: u32 },
}

impl Bvh2Node {
    #[inline]
    pub fn bounds(&self) -> Aabb {
        match self {
            Bvh2Node::Internal { bounds, .. } | Bvh2Node::Leaf { bounds, .. } => *bounds,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Bvh2Node::Leaf { .. })
    }

    /// Child ids of an internal node.
    #[inline]
    pub fn children(&self) -> Option<(u32, u32)> {
        match *self {
            Bvh2Node::Internal { left, right, .. } => Some((left, right)),
            Bvh2Node::Leaf { .. } => None,
        }
    }

    pub(crate) fn empty_leaf() -> Self {
        Bvh2Node::Leaf {
            bounds: Aabb::EMPTY,
            first: 0,
            count: 0,
        }
    }

    /// Shift child ids by `node_base` and leaf ranges by `index_base`, used
    /// when a subtree built in its own arena is spliced into its parent's.
    pub(crate) fn rebased(self, node_base: u32, index_base: u32) -> Self {
        match self {
            Bvh2Node::Internal {
                bounds,
                left,
                right,
                axis,
            } => Bvh2Node::Internal {
                bounds,
                left: left + node_base,
                right: right + node_base,
                axis,
            },
            Bvh2Node::Leaf {
                bounds,
                first,
                count,
            } => Bvh2Node::Leaf {
                bounds,
                first: first + index_base,
                count,
            },
        }
    }
}

/// Counters collected while building; merged across parallel subtrees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildStats {
    pub internal_nodes: usize,
    pub leaves: usize,
    /// Deepest leaf, root at depth 0
    pub max_depth: usize,
    /// Ranges turned into leaves because the depth guard tripped
    pub forced_leaves: usize,
    pub object_splits: usize,
    pub spatial_splits: usize,
    /// References that went to both children of a spatial split
    pub duplicated_references: usize,
    /// Nodes that would have tried a spatial split but had no budget left
    pub budget_exhausted: usize,
    pub build_time: Duration,
}

impl BuildStats {
    pub(crate) fn merge(&mut self, other: &BuildStats) {
        self.internal_nodes += other.internal_nodes;
        self.leaves += other.leaves;
        self.max_depth = self.max_depth.max(other.max_depth);
        self.forced_leaves += other.forced_leaves;
        self.object_splits += other.object_splits;
        self.spatial_splits += other.spatial_splits;
        self.duplicated_references += other.duplicated_references;
        self.budget_exhausted += other.budget_exhausted;
    }

    pub(crate) fn record_leaf(&mut self, depth: usize) {
        self.leaves += 1;
        self.max_depth = self.max_depth.max(depth);
    }
}

/// A built binary BVH plus the primitive index array its leaves point into.
#[derive(Debug, Clone, PartialEq)]
pub struct Bvh2 {
    pub(crate) nodes: Vec<Bvh2Node>,
    pub(crate) indices: Vec<u32>,
    pub(crate) primitive_count: usize,
    pub(crate) builder: BuilderKind,
    pub(crate) stats: BuildStats,
}

impl Bvh2 {
    pub(crate) fn from_parts(
        nodes: Vec<Bvh2Node>,
        indices: Vec<u32>,
        primitive_count: usize,
        builder: BuilderKind,
        stats: BuildStats,
    ) -> Self {
        Self {
            nodes,
            indices,
            primitive_count,
            builder,
            stats,
        }
    }

    /// Tree for an empty primitive set: one leaf with no primitives.
    pub(crate) fn empty(builder: BuilderKind) -> Self {
        let stats = BuildStats {
            leaves: 1,
            ..Default::default()
        };
        Self::from_parts(vec![Bvh2Node::empty_leaf()], Vec::new(), 0, builder, stats)
    }

    #[inline]
    pub fn nodes(&self) -> &[Bvh2Node] {
        &self.nodes
    }

    #[inline]
    pub fn root(&self) -> &Bvh2Node {
        &self.nodes[0]
    }

    /// Primitive ids in leaf order. In SBVH trees an id may repeat.
    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Number of primitives in the store this tree was built over.
    pub fn primitive_count(&self) -> usize {
        self.primitive_count
    }

    pub fn builder(&self) -> BuilderKind {
        self.builder
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    pub fn bounds(&self) -> Aabb {
        self.root().bounds()
    }

    /// Yields `(node id, first, count)` for every leaf.
    pub fn leaves(&self) -> impl Iterator<Item = (usize, u32, u32)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, node)| match *node {
                Bvh2Node::Leaf { first, count, .. } => Some((id, first, count)),
                Bvh2Node::Internal { .. } => None,
            })
    }

    /// Primitive ids reachable below `node`, in leaf order.
    pub fn subtree_primitives(&self, node: usize) -> Vec<u32> {
        let mut out = Vec::new();
        let mut stack = vec![node];

        while let Some(id) = stack.pop() {
            match self.nodes[id] {
                Bvh2Node::Internal { left, right, .. } => {
                    stack.push(right as usize);
                    stack.push(left as usize);
                }
                Bvh2Node::Leaf { first, count, .. } => {
                    out.extend_from_slice(&self.indices[first as usize..(first + count) as usize]);
                }
            }
        }

        out
    }

    /// Estimated cost of tracing a random ray through the tree, relative to
    /// the root's surface area.
    pub fn sah_cost(&self, settings: &BuildSettings) -> f32 {
        let root_area = self.bounds().half_area();
        if root_area <= 0.0 {
            return 0.0;
        }

        let cost: f32 = self
            .nodes
            .iter()
            .map(|node| match *node {
                Bvh2Node::Internal { bounds, .. } => settings.traversal_cost * bounds.half_area(),
                Bvh2Node::Leaf { bounds, count, .. } => {
                    settings.leaf_cost * count as f32 * bounds.half_area()
                }
            })
            .sum();

        cost / root_area
    }
}

/// Splice `src` (a subtree built in its own arena) onto the end of `dst`.
pub(crate) fn append_rebased(dst: &mut Vec<Bvh2Node>, src: Vec<Bvh2Node>, index_base: u32) {
    let node_base = dst.len() as u32;
    dst.extend(src.into_iter().map(|node| node.rebased(node_base, index_base)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_math::Vec3;

    fn unit_box(x: f32) -> Aabb {
        Aabb::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0))
    }

    fn two_leaf_tree() -> Bvh2 {
        let nodes = vec![
            Bvh2Node::Internal {
                bounds: Aabb::surrounding(&unit_box(0.0), &unit_box(2.0)),
                left: 1,
                right: 2,
                axis: 0,
            },
            Bvh2Node::Leaf {
                bounds: unit_box(0.0),
                first: 0,
                count: 1,
            },
            Bvh2Node::Leaf {
                bounds: unit_box(2.0),
                first: 1,
                count: 2,
            },
        ];
        Bvh2::from_parts(nodes, vec![2, 0, 1], 3, BuilderKind::Sah, BuildStats::default())
    }

    #[test]
    fn test_leaves_and_subtree_primitives() {
        let bvh = two_leaf_tree();
        let leaves: Vec<_> = bvh.leaves().collect();
        assert_eq!(leaves, vec![(1, 0, 1), (2, 1, 2)]);
        assert_eq!(bvh.subtree_primitives(0), vec![2, 0, 1]);
        assert_eq!(bvh.subtree_primitives(2), vec![0, 1]);
    }

    #[test]
    fn test_rebase() {
        let mut dst = vec![Bvh2Node::empty_leaf()];
        append_rebased(&mut dst, two_leaf_tree().nodes, 10);

        assert_eq!(dst.len(), 4);
        assert_eq!(dst[1].children(), Some((2, 3)));
        assert!(matches!(dst[3], Bvh2Node::Leaf { first: 11, count: 2, .. }));
    }

    #[test]
    fn test_empty_tree() {
        let bvh = Bvh2::empty(BuilderKind::Sah);
        assert_eq!(bvh.nodes().len(), 1);
        assert!(bvh.root().is_leaf());
        assert!(bvh.bounds().is_empty());
        assert_eq!(bvh.sah_cost(&BuildSettings::default()), 0.0);
    }

    #[test]
    fn test_sah_cost() {
        let bvh = two_leaf_tree();
        let settings = BuildSettings::default();
        // root half area: 3*1 + 1*1 + 1*3 = 7, leaves 3 each
        let expected = (7.0 + 1.0 * 3.0 + 2.0 * 3.0) / 7.0;
        assert!((bvh.sah_cost(&settings) - expected).abs() < 1e-6);
    }
}
