//! Binary format for built BVH2 trees.
//!
//! Layout: a 32-byte little-endian header, `node_count` 40-byte
//! [`NodeRecord`]s, then `index_count` `u32` primitive ids. Records and
//! indices are written in native byte order straight from memory.
//!
//! ```text
//! 0   magic "VBVH"
//! 4   format version
//! 8   builder kind
//! 12  primitive count
//! 16  content key (u64)
//! 24  node count
//! 28  index count
//! ```

use bytemuck::{Pod, Zeroable};
use thiserror::Error;
use vela_core::BuilderKind;
use vela_math::Aabb;

use crate::node::{BuildStats, Bvh2, Bvh2Node};

pub const MAGIC: [u8; 4] = *b"VBVH";
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 32;

const LEAF_FLAG: u32 = 1 << 31;

#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("truncated data: need {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("bad magic {0:?}")]
    BadMagic([u8; 4]),

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),

    #[error("unknown builder kind {0}")]
    UnknownBuilder(u32),

    #[error("{0} trailing bytes")]
    TrailingBytes(usize),

    #[error("node {node}: {reason}")]
    InvalidNode { node: usize, reason: &'static str },

    #[error("leaf ranges do not cover the index array exactly")]
    LeafCoverage,

    #[error("index {index} refers to primitive {primitive} of {count}")]
    IndexOutOfRange {
        index: usize,
        primitive: u32,
        count: usize,
    },
}

pub type SerializeResult<T> = std::result::Result<T, SerializeError>;

/// On-disk node. Internal nodes store child ids in `a`/`b` and the split
/// axis in `meta`; leaves set [`LEAF_FLAG`] and store `first`/`count`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct NodeRecord {
    pub bounds: Aabb,
    pub a: u32,
    pub b: u32,
    pub meta: u32,
    _pad: u32,
}

impl From<&Bvh2Node> for NodeRecord {
    fn from(node: &Bvh2Node) -> Self {
        match *node {
            Bvh2Node::Internal {
                bounds,
                left,
                right,
                axis,
            } => NodeRecord {
                bounds,
                a: left,
                b: right,
                meta: axis as u32,
                _pad: 0,
            },
            Bvh2Node::Leaf {
                bounds,
                first,
                count,
            } => NodeRecord {
                bounds,
                a: first,
                b: count,
                meta: LEAF_FLAG,
                _pad: 0,
            },
        }
    }
}

impl NodeRecord {
    fn to_node(self, id: usize) -> SerializeResult<Bvh2Node> {
        if self.meta & LEAF_FLAG != 0 {
            return Ok(Bvh2Node::Leaf {
                bounds: self.bounds,
                first: self.a,
                count: self.b,
            });
        }

        let axis = self.meta;
        if axis > 2 {
            return Err(SerializeError::InvalidNode {
                node: id,
                reason: "split axis out of range",
            });
        }

        Ok(Bvh2Node::Internal {
            bounds: self.bounds,
            left: self.a,
            right: self.b,
            axis: axis as u8,
        })
    }
}

/// Serialize `bvh`, stamping `key` into the header.
pub fn to_bytes(bvh: &Bvh2, key: u64) -> Vec<u8> {
    let records: Vec<NodeRecord> = bvh.nodes().iter().map(NodeRecord::from).collect();
    let records: &[u8] = bytemuck::cast_slice(&records);
    let indices: &[u8] = bytemuck::cast_slice(bvh.indices());

    let mut out = Vec::with_capacity(HEADER_SIZE + records.len() + indices.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&bvh.builder().as_u32().to_le_bytes());
    out.extend_from_slice(&(bvh.primitive_count() as u32).to_le_bytes());
    out.extend_from_slice(&key.to_le_bytes());
    out.extend_from_slice(&(bvh.nodes().len() as u32).to_le_bytes());
    out.extend_from_slice(&(bvh.indices().len() as u32).to_le_bytes());
    out.extend_from_slice(records);
    out.extend_from_slice(indices);
    out
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

/// Parse and validate a serialized tree. Returns the header key with it.
pub fn from_bytes(bytes: &[u8]) -> SerializeResult<(u64, Bvh2)> {
    if bytes.len() < HEADER_SIZE {
        return Err(SerializeError::Truncated {
            expected: HEADER_SIZE,
            actual: bytes.len(),
        });
    }

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&bytes[0..4]);
    if magic != MAGIC {
        return Err(SerializeError::BadMagic(magic));
    }

    let version = read_u32(bytes, 4);
    if version != FORMAT_VERSION {
        return Err(SerializeError::UnsupportedVersion(version));
    }

    let builder_id = read_u32(bytes, 8);
    let builder = BuilderKind::from_u32(builder_id).ok_or(SerializeError::UnknownBuilder(builder_id))?;
    let primitive_count = read_u32(bytes, 12) as usize;
    let key = read_u64(bytes, 16);
    let node_count = read_u32(bytes, 24) as usize;
    let index_count = read_u32(bytes, 28) as usize;

    let record_size = std::mem::size_of::<NodeRecord>();
    let nodes_end = HEADER_SIZE + node_count * record_size;
    let expected = nodes_end + index_count * 4;

    if bytes.len() < expected {
        return Err(SerializeError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    if bytes.len() > expected {
        return Err(SerializeError::TrailingBytes(bytes.len() - expected));
    }
    if node_count == 0 {
        return Err(SerializeError::InvalidNode {
            node: 0,
            reason: "missing root",
        });
    }

    // The body is not necessarily aligned, so copy out
    let records: Vec<NodeRecord> = bytemuck::pod_collect_to_vec(&bytes[HEADER_SIZE..nodes_end]);
    let indices: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes[nodes_end..expected]);

    let nodes = records
        .into_iter()
        .enumerate()
        .map(|(id, record)| record.to_node(id))
        .collect::<SerializeResult<Vec<_>>>()?;

    let stats = validate(&nodes, &indices, primitive_count)?;
    Ok((key, Bvh2::from_parts(nodes, indices, primitive_count, builder, stats)))
}

/// Check the structural invariants a builder guarantees and recover the
/// shape counters.
fn validate(nodes: &[Bvh2Node], indices: &[u32], primitive_count: usize) -> SerializeResult<BuildStats> {
    let mut stats = BuildStats::default();
    let mut visited = 0;
    let mut cursor = 0usize;
    let mut stack = vec![(0usize, 0usize)];

    while let Some((id, depth)) = stack.pop() {
        visited += 1;

        match nodes[id] {
            Bvh2Node::Internal { left, right, .. } => {
                let (left, right) = (left as usize, right as usize);
                if left != id + 1 {
                    return Err(SerializeError::InvalidNode {
                        node: id,
                        reason: "left child does not follow its parent",
                    });
                }
                if right <= left || right >= nodes.len() {
                    return Err(SerializeError::InvalidNode {
                        node: id,
                        reason: "right child out of range",
                    });
                }

                stats.internal_nodes += 1;
                stack.push((right, depth + 1));
                stack.push((left, depth + 1));
            }
            Bvh2Node::Leaf { first, count, .. } => {
                // Depth-first leaf order must walk the index array front to back
                if first as usize != cursor {
                    return Err(SerializeError::LeafCoverage);
                }
                cursor += count as usize;
                if cursor > indices.len() {
                    return Err(SerializeError::LeafCoverage);
                }
                stats.record_leaf(depth);
            }
        }
    }

    if cursor != indices.len() || visited != nodes.len() {
        return Err(SerializeError::LeafCoverage);
    }

    if let Some((index, &primitive)) = indices
        .iter()
        .enumerate()
        .find(|&(_, &prim)| prim as usize >= primitive_count)
    {
        return Err(SerializeError::IndexOutOfRange {
            index,
            primitive,
            count: primitive_count,
        });
    }

    Ok(stats)
}
