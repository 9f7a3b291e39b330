//! Records that flow between scheduler passes.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use vela_math::Ray;

use crate::Color;

/// A path in flight: the ray to extend next and what it carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayState {
    pub ray: Ray,
    /// Row-major pixel index contributions are written to
    pub pixel: u32,
    /// Product of attenuations along the path so far
    pub throughput: Color,
    /// Number of surface interactions before this ray
    pub depth: u32,
    /// Sampler seed for the next random decision on this path
    pub seed: u64,
}

impl RayState {
    /// Expand the seed into a generator. Each pass that consumes this
    /// state writes a fresh seed drawn from it into whatever it produces.
    #[inline]
    pub fn sampler(&self) -> SmallRng {
        SmallRng::seed_from_u64(self.seed)
    }

    /// Continue the path along `ray`, drawing the next seed from `rng`.
    #[inline]
    pub fn continue_with(&self, ray: Ray, throughput: Color, rng: &mut SmallRng) -> RayState {
        RayState {
            ray,
            pixel: self.pixel,
            throughput,
            depth: self.depth + 1,
            seed: rng.gen(),
        }
    }
}

/// A ray that found a surface, waiting to be shaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialHit {
    pub state: RayState,
    pub primitive: u32,
    pub t: f32,
    pub u: f32,
    pub v: f32,
}

/// A light contribution that counts only if nothing blocks `ray` before
/// `t_max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowRay {
    pub ray: Ray,
    pub t_max: f32,
    pub pixel: u32,
    pub contribution: Color,
}
