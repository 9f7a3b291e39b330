//! The primitive store: an immutable, shareable triangle soup.

use std::hash::Hasher;
use std::sync::Arc;

use fxhash::FxHasher64;
use vela_math::{Aabb, Vec3};

use crate::{Mesh, Primitive};

/// Ordered, immutable sequence of primitives.
///
/// Cloning is cheap; every clone shares the same primitives. The builders
/// refer to primitives by their index in this store.
#[derive(Clone, Debug)]
pub struct PrimitiveStore {
    primitives: Arc<[Primitive]>,
    bounds: Aabb,
    content_hash: u64,
}

impl PrimitiveStore {
    pub fn new(primitives: Vec<Primitive>) -> Self {
        let bounds = primitives.iter().fold(Aabb::EMPTY, |mut bb, prim| {
            bb.grow(&prim.bounds());
            bb
        });
        let content_hash = hash_primitives(&primitives);

        let degenerate = primitives.iter().filter(|prim| prim.is_degenerate()).count();
        if degenerate > 0 {
            log::debug!("{degenerate} of {} primitives have zero area", primitives.len());
        }

        Self {
            primitives: primitives.into(),
            bounds,
            content_hash,
        }
    }

    /// Build a store from `(vertices, material)` pairs.
    pub fn from_triangles(triangles: impl IntoIterator<Item = ([Vec3; 3], u32)>) -> Self {
        Self::new(
            triangles
                .into_iter()
                .map(|(vertices, material)| Primitive::new(vertices, material))
                .collect(),
        )
    }

    /// Flatten meshes in order; each triangle keeps its mesh's material.
    pub fn from_meshes<'m>(meshes: impl IntoIterator<Item = &'m Mesh>) -> Self {
        let mut primitives = Vec::new();
        for mesh in meshes {
            primitives.reserve(mesh.triangle_count());
            primitives.extend(
                mesh.triangles()
                    .map(|vertices| Primitive::new(vertices, mesh.material())),
            );
        }
        Self::new(primitives)
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Primitive> {
        self.primitives.get(index)
    }

    #[inline]
    pub fn as_slice(&self) -> &[Primitive] {
        &self.primitives
    }

    /// Union of all primitive bounds; empty for an empty store.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Stable hash over vertex bit patterns and material ids.
    ///
    /// Identical geometry always produces the same value, across runs and
    /// machines of the same endianness, which is what the build cache keys on.
    pub fn content_hash(&self) -> u64 {
        self.content_hash
    }
}

impl FromIterator<Primitive> for PrimitiveStore {
    fn from_iter<I: IntoIterator<Item = Primitive>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

fn hash_primitives(primitives: &[Primitive]) -> u64 {
    let mut hasher = FxHasher64::default();
    hasher.write_u64(primitives.len() as u64);

    for prim in primitives {
        hasher.write(bytemuck::bytes_of(prim.vertices()));
        hasher.write_u32(prim.material());
    }

    hasher.finish()
}
