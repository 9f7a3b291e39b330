//! Surface materials.

use rand::Rng;
use vela_math::Vec3;

use crate::sampling::random_unit_vector;

/// Color type alias (linear RGB)
pub type Color = Vec3;

/// How a surface responds to light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Material {
    /// Lambertian diffuse; the only kind lit by explicit light sampling.
    Diffuse { albedo: Color },
    /// Specular reflector. `fuzz` 0 is a perfect mirror, 1 very rough.
    Metal { albedo: Color, fuzz: f32 },
    /// Light-emitting surface that absorbs everything that reaches it.
    Emissive { radiance: Color },
}

impl Material {
    /// Used for primitives whose material id has no entry in the scene.
    pub const FALLBACK: Material = Material::Diffuse {
        albedo: Vec3::splat(0.5),
    };

    pub fn diffuse(albedo: Color) -> Self {
        Material::Diffuse { albedo }
    }

    pub fn metal(albedo: Color, fuzz: f32) -> Self {
        Material::Metal {
            albedo,
            fuzz: fuzz.clamp(0.0, 1.0),
        }
    }

    pub fn emissive(radiance: Color) -> Self {
        Material::Emissive { radiance }
    }

    /// Radiance emitted toward the viewer.
    #[inline]
    pub fn emitted(&self) -> Color {
        match *self {
            Material::Emissive { radiance } => radiance,
            _ => Color::ZERO,
        }
    }

    /// Whether direct lighting should be estimated with a shadow ray.
    #[inline]
    pub fn samples_lights(&self) -> bool {
        matches!(self, Material::Diffuse { .. })
    }

    /// BRDF value for light sampling (diffuse only).
    #[inline]
    pub fn brdf(&self) -> Color {
        match *self {
            Material::Diffuse { albedo } => albedo * std::f32::consts::FRAC_1_PI,
            _ => Color::ZERO,
        }
    }

    /// Scatter an incoming direction at a surface with normal `normal`
    /// (facing the incoming side).
    ///
    /// Returns the attenuation and the outgoing direction, or `None` if the
    /// ray is absorbed.
    pub fn scatter<R: Rng + ?Sized>(
        &self,
        direction: Vec3,
        normal: Vec3,
        rng: &mut R,
    ) -> Option<(Color, Vec3)> {
        match *self {
            Material::Diffuse { albedo } => {
                // Cosine-weighted, so the cosine and pdf cancel
                let mut scatter = normal + random_unit_vector(rng);
                if scatter.length_squared() < 1e-8 {
                    scatter = normal;
                }
                Some((albedo, scatter))
            }
            Material::Metal { albedo, fuzz } => {
                let reflected = reflect(direction.normalize(), normal);
                let scattered = reflected + fuzz * random_unit_vector(rng);

                // Fuzz can push the ray below the surface
                (scattered.dot(normal) > 0.0).then_some((albedo, scattered))
            }
            Material::Emissive { .. } => None,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Material::FALLBACK
    }
}

/// Reflect a vector about a normal.
#[inline]
pub fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2.0 * v.dot(n) * n
}
