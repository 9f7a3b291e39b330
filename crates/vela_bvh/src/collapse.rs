//! Collapse a BVH2 into a 4- or 8-wide BVH.
//!
//! Each wide node starts from a binary node's two children and repeatedly
//! pulls up the grandchildren of whichever internal child has the biggest
//! surface-area benefit, until the slots are full or no expansion helps.

use std::collections::VecDeque;

use vela_core::WideFanout;
use vela_math::Aabb;

use crate::node::{Bvh2, Bvh2Node};

/// Largest supported fanout; 4-wide trees leave the upper slots empty.
pub const MAX_FANOUT: usize = 8;

/// One child slot of a wide node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WideChild {
    #[default]
    Empty,
    /// Index of another wide node
    Node(u32),
    /// `indices[first..first + count]`
    Leaf { first: u32, count: u32 },
}

impl WideChild {
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, WideChild::Empty)
    }
}

/// Up to [`MAX_FANOUT`] children with their bounds. Unused slots hold
/// [`WideChild::Empty`] and [`Aabb::EMPTY`], which no ray can hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WideNode {
    pub bounds: [Aabb; MAX_FANOUT],
    pub children: [WideChild; MAX_FANOUT],
}

impl Default for WideNode {
    fn default() -> Self {
        Self {
            bounds: [Aabb::EMPTY; MAX_FANOUT],
            children: [WideChild::Empty; MAX_FANOUT],
        }
    }
}

impl WideNode {
    /// Occupied slots with their bounds.
    pub fn occupied(&self) -> impl Iterator<Item = (Aabb, WideChild)> + '_ {
        self.bounds
            .iter()
            .zip(self.children.iter())
            .filter(|(_, child)| !child.is_empty())
            .map(|(bounds, child)| (*bounds, *child))
    }

    pub fn child_count(&self) -> usize {
        self.children.iter().filter(|c| !c.is_empty()).count()
    }
}

/// A wide BVH with the same index permutation as the BVH2 it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct WideBvh {
    pub(crate) nodes: Vec<WideNode>,
    pub(crate) indices: Vec<u32>,
    pub(crate) fanout: WideFanout,
    pub(crate) bounds: Aabb,
    pub(crate) primitive_count: usize,
}

impl WideBvh {
    #[inline]
    pub fn nodes(&self) -> &[WideNode] {
        &self.nodes
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn fanout(&self) -> WideFanout {
        self.fanout
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn primitive_count(&self) -> usize {
        self.primitive_count
    }

    /// Primitive ids reachable below wide node `node`, in slot order.
    pub fn subtree_primitives(&self, node: usize) -> Vec<u32> {
        let mut out = Vec::new();
        let mut stack = vec![node];

        while let Some(id) = stack.pop() {
            for (_, child) in self.nodes[id].occupied().collect::<Vec<_>>().into_iter().rev() {
                match child {
                    WideChild::Node(n) => stack.push(n as usize),
                    WideChild::Leaf { first, count } => {
                        out.extend_from_slice(&self.indices[first as usize..(first + count) as usize])
                    }
                    WideChild::Empty => {}
                }
            }
        }

        out
    }
}

/// Surface-area gain from replacing internal node `id` by its two children.
fn expansion_benefit(nodes: &[Bvh2Node], id: u32) -> Option<f32> {
    let node = &nodes[id as usize];
    let (left, right) = node.children()?;

    Some(
        2.0 * node.bounds().surface_area()
            - nodes[left as usize].bounds().surface_area()
            - nodes[right as usize].bounds().surface_area(),
    )
}

/// Binary node ids that become the slots of the wide node for `id`.
fn select_slots(nodes: &[Bvh2Node], id: u32, fanout: usize) -> Vec<u32> {
    let mut slots = match nodes[id as usize].children() {
        Some((left, right)) => vec![left, right],
        None => return vec![id],
    };

    while slots.len() < fanout {
        let mut best: Option<(usize, f32, f32)> = None;

        for (slot, &child) in slots.iter().enumerate() {
            let Some(benefit) = expansion_benefit(nodes, child) else {
                continue;
            };
            if benefit <= 0.0 {
                continue;
            }

            let area = nodes[child as usize].bounds().surface_area();
            let better = match best {
                None => true,
                Some((_, best_benefit, best_area)) => {
                    benefit > best_benefit || (benefit == best_benefit && area > best_area)
                }
            };
            if better {
                best = Some((slot, benefit, area));
            }
        }

        let Some((slot, _, _)) = best else {
            break;
        };

        if let Some((left, right)) = nodes[slots[slot] as usize].children() {
            slots.splice(slot..=slot, [left, right]);
        }
    }

    slots
}

/// Collapse `bvh` into a wide BVH with `fanout` slots per node.
///
/// Leaves of the binary tree map to leaf slots unchanged, so every wide
/// subtree covers exactly the primitives of the binary subtree it replaced.
pub fn collapse(bvh: &Bvh2, fanout: WideFanout) -> WideBvh {
    let source = bvh.nodes();
    let slot_count = fanout.slots();

    let mut nodes = Vec::with_capacity(source.len() / 2 + 1);
    let mut queue = VecDeque::from([0u32]);
    nodes.push(WideNode::default());

    // `queue` holds binary node ids whose wide node sits at the matching
    // position in `nodes`
    let mut next = 0;
    while let Some(id) = queue.pop_front() {
        let mut wide = WideNode::default();

        for (slot, child) in select_slots(source, id, slot_count).into_iter().enumerate() {
            let node = &source[child as usize];
            wide.bounds[slot] = node.bounds();
            wide.children[slot] = match *node {
                Bvh2Node::Leaf { first, count, .. } => WideChild::Leaf { first, count },
                Bvh2Node::Internal { .. } => {
                    nodes.push(WideNode::default());
                    queue.push_back(child);
                    WideChild::Node(nodes.len() as u32 - 1)
                }
            };
        }

        nodes[next] = wide;
        next += 1;
    }

    WideBvh {
        nodes,
        indices: bvh.indices().to_vec(),
        fanout,
        bounds: bvh.bounds(),
        primitive_count: bvh.primitive_count(),
    }
}
