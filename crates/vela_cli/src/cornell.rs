//! Built-in demo scene: a Cornell box with two blocks.

use vela_core::Mesh;
use vela_math::Vec3;
use vela_trace::{Camera, Color, Light, Material};

const WHITE: u32 = 0;
const RED: u32 = 1;
const GREEN: u32 = 2;
const LAMP: u32 = 3;
const MIRROR: u32 = 4;

pub fn materials() -> Vec<Material> {
    vec![
        Material::diffuse(Color::new(0.73, 0.73, 0.73)),
        Material::diffuse(Color::new(0.65, 0.05, 0.05)),
        Material::diffuse(Color::new(0.12, 0.45, 0.15)),
        Material::emissive(Color::splat(15.0)),
        Material::metal(Color::new(0.8, 0.85, 0.88), 0.05),
    ]
}

pub fn lights() -> Vec<Light> {
    vec![Light::Point {
        position: Vec3::new(0.5, 0.95, 0.5),
        intensity: Color::splat(0.6),
    }]
}

pub fn camera(width: u32, height: u32) -> Camera {
    Camera::look_at(
        Vec3::new(0.5, 0.5, -1.4),
        Vec3::new(0.5, 0.5, 0.5),
        Vec3::Y,
        40.0,
        width,
        height,
    )
}

/// Walls, lamp and the two blocks.
pub fn meshes() -> Vec<Mesh> {
    let p = |x: f32, y: f32, z: f32| Vec3::new(x, y, z);

    vec![
        // Floor, ceiling, back wall
        Mesh::quad([p(0., 0., 0.), p(1., 0., 0.), p(1., 0., 1.), p(0., 0., 1.)], WHITE),
        Mesh::quad([p(0., 1., 0.), p(0., 1., 1.), p(1., 1., 1.), p(1., 1., 0.)], WHITE),
        Mesh::quad([p(0., 0., 1.), p(1., 0., 1.), p(1., 1., 1.), p(0., 1., 1.)], WHITE),
        // Side walls
        Mesh::quad([p(0., 0., 0.), p(0., 0., 1.), p(0., 1., 1.), p(0., 1., 0.)], RED),
        Mesh::quad([p(1., 0., 0.), p(1., 1., 0.), p(1., 1., 1.), p(1., 0., 1.)], GREEN),
        // Ceiling lamp, just below the ceiling
        Mesh::quad(
            [
                p(0.4, 0.999, 0.4),
                p(0.6, 0.999, 0.4),
                p(0.6, 0.999, 0.6),
                p(0.4, 0.999, 0.6),
            ],
            LAMP,
        ),
        Mesh::cuboid(p(0.15, 0.0, 0.2), p(0.45, 0.3, 0.5), WHITE),
        Mesh::cuboid(p(0.55, 0.0, 0.5), p(0.85, 0.6, 0.8), MIRROR),
    ]
}
