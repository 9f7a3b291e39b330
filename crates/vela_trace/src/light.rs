//! Analytic lights sampled by shadow rays.

use vela_math::Vec3;

use crate::Color;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    /// Isotropic point light; radiance falls off with squared distance.
    Point { position: Vec3, intensity: Color },
    /// Light arriving from infinitely far away, travelling along `direction`.
    Directional { direction: Vec3, radiance: Color },
}

/// Incident light at a shading point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSample {
    /// Unit vector from the shading point toward the light
    pub direction: Vec3,
    /// Distance to the light; infinite for directional lights
    pub distance: f32,
    pub radiance: Color,
}

impl Light {
    /// Light arriving at `point`, or `None` if `point` sits on the light or
    /// the light is degenerate.
    pub fn sample(&self, point: Vec3) -> Option<LightSample> {
        match *self {
            Light::Point {
                position,
                intensity,
            } => {
                let to_light = position - point;
                let dist_sq = to_light.length_squared();
                if dist_sq <= 0.0 || !dist_sq.is_finite() {
                    return None;
                }

                let distance = dist_sq.sqrt();
                Some(LightSample {
                    direction: to_light / distance,
                    distance,
                    radiance: intensity / dist_sq,
                })
            }
            Light::Directional {
                direction,
                radiance,
            } => {
                let direction = -direction.try_normalize()?;
                Some(LightSample {
                    direction,
                    distance: f32::INFINITY,
                    radiance,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_falloff() {
        let light = Light::Point {
            position: Vec3::new(0.0, 2.0, 0.0),
            intensity: Color::splat(8.0),
        };
        let sample = light.sample(Vec3::ZERO).unwrap();

        assert_eq!(sample.direction, Vec3::Y);
        assert_eq!(sample.distance, 2.0);
        assert_eq!(sample.radiance, Color::splat(2.0));
        assert!(light.sample(Vec3::new(0.0, 2.0, 0.0)).is_none());
    }

    #[test]
    fn test_directional() {
        let light = Light::Directional {
            direction: Vec3::new(0.0, -3.0, 0.0),
            radiance: Color::ONE,
        };
        let sample = light.sample(Vec3::new(5.0, 0.0, 1.0)).unwrap();

        assert_eq!(sample.direction, Vec3::Y);
        assert!(sample.distance.is_infinite());

        let broken = Light::Directional {
            direction: Vec3::ZERO,
            radiance: Color::ONE,
        };
        assert!(broken.sample(Vec3::ZERO).is_none());
    }
}
