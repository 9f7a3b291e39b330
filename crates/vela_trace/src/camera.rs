//! Pinhole camera producing the Generate pass's primary rays.

use rand::rngs::SmallRng;
use rand::Rng;
use vela_math::{Ray, Vec3};

/// Maps row-major pixel indices of a `width × height` image to rays.
///
/// The image plane sits one unit in front of the eye. Row 0 is the top of
/// the image.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    width: u32,
    height: u32,
    eye: Vec3,
    /// Top-left corner of the image plane
    corner: Vec3,
    /// One pixel to the right on the image plane
    step_x: Vec3,
    /// One pixel down on the image plane
    step_y: Vec3,
}

impl Camera {
    /// Camera at `eye` looking at `target`, with a vertical field of view of
    /// `vfov` degrees. `up` must not be parallel to the view direction.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3, vfov: f32, width: u32, height: u32) -> Self {
        let forward = (target - eye).normalize_or_zero();
        let right = forward.cross(up).normalize_or_zero();
        let down = forward.cross(right);

        let plane_height = 2.0 * (vfov.to_radians() * 0.5).tan();
        let plane_width = plane_height * width as f32 / height.max(1) as f32;

        let step_x = right * (plane_width / width.max(1) as f32);
        let step_y = down * (plane_height / height.max(1) as f32);
        let corner = eye + forward - 0.5 * (width as f32 * step_x + height as f32 * step_y);

        Self {
            width,
            height,
            eye,
            corner,
            step_x,
            step_y,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Ray through a uniformly jittered point of `pixel`. The jitter is the
    /// first two draws from `rng`, so a pixel's sampler seed fixes its ray.
    pub fn primary_ray(&self, pixel: u32, rng: &mut SmallRng) -> Ray {
        let width = self.width.max(1);
        let x = (pixel % width) as f32 + rng.gen::<f32>();
        let y = (pixel / width) as f32 + rng.gen::<f32>();
        self.ray_through(x, y)
    }

    /// Ray through image-plane position `(x, y)`, measured in pixels from the
    /// top-left corner.
    fn ray_through(&self, x: f32, y: f32) -> Ray {
        let target = self.corner + x * self.step_x + y * self.step_y;
        Ray::new(self.eye, (target - self.eye).normalize_or_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn camera(width: u32, height: u32) -> Camera {
        Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y, 60.0, width, height)
    }

    #[test]
    fn test_image_center_looks_at_target() {
        let camera = camera(4, 2);
        let ray = camera.ray_through(2.0, 1.0);
        assert_eq!(ray.origin, Vec3::new(0.0, 0.0, 5.0));
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_vertical_field_of_view() {
        let camera = camera(8, 8);
        let top = camera.ray_through(4.0, 0.0).direction;
        let angle = top.angle_between(Vec3::NEG_Z).to_degrees();
        assert!((angle - 30.0).abs() < 1e-3, "{angle}");
        assert!(top.y > 0.0);
    }

    #[test]
    fn test_pixel_order_is_row_major_from_top_left() {
        let camera = camera(3, 2);
        let mut rng = SmallRng::seed_from_u64(0);

        let first = camera.primary_ray(0, &mut rng).direction;
        let last = camera.primary_ray(5, &mut rng).direction;
        assert!(first.x < 0.0 && first.y > 0.0);
        assert!(last.x > 0.0 && last.y < 0.0);
    }

    #[test]
    fn test_jitter_stays_inside_pixel() {
        let camera = camera(4, 4);
        // Pixel 6 is column 2, row 1
        let left = camera.ray_through(2.0, 1.5).direction;
        let right = camera.ray_through(3.0, 1.5).direction;
        let top = camera.ray_through(2.5, 1.0).direction;
        let bottom = camera.ray_through(2.5, 2.0).direction;

        let mut rng = SmallRng::seed_from_u64(9);
        for _ in 0..64 {
            let dir = camera.primary_ray(6, &mut rng).direction;
            // Project back onto the image plane one unit along -Z
            let p = dir / -dir.z;
            assert!(p.x >= left.x / -left.z - 1e-5 && p.x <= right.x / -right.z + 1e-5);
            assert!(p.y <= top.y / -top.z + 1e-5 && p.y >= bottom.y / -bottom.z - 1e-5);
        }
    }

    #[test]
    fn test_same_seed_same_ray() {
        let camera = camera(16, 16);
        let a = camera.primary_ray(37, &mut SmallRng::seed_from_u64(5));
        let b = camera.primary_ray(37, &mut SmallRng::seed_from_u64(5));
        let c = camera.primary_ray(37, &mut SmallRng::seed_from_u64(6));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
