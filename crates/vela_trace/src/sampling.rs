//! Random sampling helpers for material scattering.

use rand::Rng;
use vela_math::Vec3;

/// Uniform `f32` in `[0, 1)`.
#[inline]
pub fn gen_f32<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    rng.gen::<f32>()
}

/// Uniformly distributed direction on the unit sphere.
pub fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    // Rejection sampling; the lower bound avoids normalizing near-zero vectors
    loop {
        let v = Vec3::new(
            gen_f32(rng) * 2.0 - 1.0,
            gen_f32(rng) * 2.0 - 1.0,
            gen_f32(rng) * 2.0 - 1.0,
        );
        let len_sq = v.length_squared();
        if 1e-12 < len_sq && len_sq <= 1.0 {
            return v / len_sq.sqrt();
        }
    }
}
