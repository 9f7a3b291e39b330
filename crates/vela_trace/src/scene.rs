//! Everything the scheduler reads while tracing a frame.

use vela_bvh::{build_wide, BvhCache, WideBvh};
use vela_core::{BuildSettings, Primitive, PrimitiveStore};

use crate::{Color, Light, Material};

/// Geometry, its acceleration structure, materials and lights.
///
/// Read-only for the duration of a render; rebuild the scene when the
/// geometry changes.
#[derive(Debug, Clone)]
pub struct Scene {
    store: PrimitiveStore,
    bvh: WideBvh,
    materials: Vec<Material>,
    lights: Vec<Light>,
    background: Color,
}

impl Scene {
    /// Build the acceleration structure for `store` and assemble a scene.
    pub fn new(
        store: PrimitiveStore,
        materials: Vec<Material>,
        lights: Vec<Light>,
        background: Color,
        settings: &BuildSettings,
        cache: Option<&BvhCache>,
    ) -> Self {
        let bvh = build_wide(&store, settings, cache);
        Self::from_parts(store, bvh, materials, lights, background)
    }

    /// Assemble a scene around an already built tree for `store`.
    pub fn from_parts(
        store: PrimitiveStore,
        bvh: WideBvh,
        materials: Vec<Material>,
        lights: Vec<Light>,
        background: Color,
    ) -> Self {
        if materials.is_empty() && !store.is_empty() {
            log::warn!("Scene has no materials, every primitive uses the fallback");
        }

        Self {
            store,
            bvh,
            materials,
            lights,
            background,
        }
    }

    #[inline]
    pub fn primitives(&self) -> &[Primitive] {
        self.store.as_slice()
    }

    pub fn store(&self) -> &PrimitiveStore {
        &self.store
    }

    #[inline]
    pub fn bvh(&self) -> &WideBvh {
        &self.bvh
    }

    /// Material `id`, or [`Material::FALLBACK`] for unknown ids.
    #[inline]
    pub fn material(&self, id: u32) -> &Material {
        self.materials.get(id as usize).unwrap_or(&Material::FALLBACK)
    }

    #[inline]
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    #[inline]
    pub fn background(&self) -> Color {
        self.background
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_math::Vec3;

    #[test]
    fn test_unknown_material_falls_back() {
        let store = PrimitiveStore::from_triangles([([Vec3::ZERO, Vec3::X, Vec3::Y], 7)]);
        let scene = Scene::new(
            store,
            vec![Material::emissive(Color::ONE)],
            Vec::new(),
            Color::ZERO,
            &BuildSettings::default(),
            None,
        );

        assert_eq!(scene.material(0), &Material::emissive(Color::ONE));
        assert_eq!(scene.material(7), &Material::FALLBACK);
        assert_eq!(scene.bvh().primitive_count(), 1);
    }
}
