//! Indexed triangle meshes, the form scene geometry arrives in before it is
//! flattened into the primitive store.

use vela_math::Vec3;

/// Corner `i` of a cuboid takes max x/y/z where bit 0/1/2 of `i` is set.
/// Each face is listed counter-clockwise seen from outside.
const CUBOID_FACES: [[u32; 4]; 6] = [
    [0, 4, 6, 2], // -x
    [1, 3, 7, 5], // +x
    [0, 1, 5, 4], // -y
    [2, 6, 7, 3], // +y
    [0, 2, 3, 1], // -z
    [4, 5, 7, 6], // +z
];

/// Shared vertex positions, index triples into them, and the material every
/// triangle of the mesh uses.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    positions: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    material: u32,
}

impl Mesh {
    pub fn new(positions: Vec<Vec3>, triangles: Vec<[u32; 3]>, material: u32) -> Self {
        Self {
            positions,
            triangles,
            material,
        }
    }

    /// Planar quad `a b c d`, split along the `a c` diagonal.
    pub fn quad(corners: [Vec3; 4], material: u32) -> Self {
        Self::new(corners.to_vec(), vec![[0, 1, 2], [0, 2, 3]], material)
    }

    /// Closed axis-aligned box with outward-facing winding.
    pub fn cuboid(min: Vec3, max: Vec3, material: u32) -> Self {
        let positions = (0..8)
            .map(|i| {
                Vec3::new(
                    if i & 1 != 0 { max.x } else { min.x },
                    if i & 2 != 0 { max.y } else { min.y },
                    if i & 4 != 0 { max.z } else { min.z },
                )
            })
            .collect();

        let triangles = CUBOID_FACES
            .iter()
            .flat_map(|&[a, b, c, d]| [[a, b, c], [a, c, d]])
            .collect();

        Self::new(positions, triangles, material)
    }

    pub fn material(&self) -> u32 {
        self.material
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Vertex positions of every triangle.
    ///
    /// A triangle naming a vertex the mesh does not have is skipped with a
    /// warning; one bad triangle never drops the rest of the mesh.
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.triangles.iter().filter_map(move |&[i0, i1, i2]| {
            let vertex = |i: u32| self.positions.get(i as usize).copied();
            match (vertex(i0), vertex(i1), vertex(i2)) {
                (Some(v0), Some(v1), Some(v2)) => Some([v0, v1, v2]),
                _ => {
                    log::warn!(
                        "Skipping triangle [{i0}, {i1}, {i2}]: mesh has {} vertices",
                        self.positions.len()
                    );
                    None
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal(t: &[Vec3; 3]) -> Vec3 {
        (t[1] - t[0]).cross(t[2] - t[0])
    }

    #[test]
    fn test_quad() {
        let corners = [Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y];
        let mesh = Mesh::quad(corners, 3);
        let triangles: Vec<_> = mesh.triangles().collect();

        assert_eq!(mesh.material(), 3);
        assert_eq!(
            triangles,
            vec![
                [corners[0], corners[1], corners[2]],
                [corners[0], corners[2], corners[3]],
            ]
        );
        // Both halves face the same way
        assert!(normal(&triangles[0]).dot(normal(&triangles[1])) > 0.0);
    }

    #[test]
    fn test_cuboid_faces_outward() {
        let min = Vec3::new(-1.0, 0.0, 2.0);
        let max = Vec3::new(1.0, 3.0, 2.5);
        let center = (min + max) * 0.5;
        let mesh = Mesh::cuboid(min, max, 0);

        assert_eq!(mesh.triangle_count(), 12);
        for t in mesh.triangles() {
            let centroid = (t[0] + t[1] + t[2]) / 3.0;
            assert!(normal(&t).dot(centroid - center) > 0.0, "{t:?}");
            assert!(t.iter().all(|v| v.cmpge(min).all() && v.cmple(max).all()));
        }
    }

    #[test]
    fn test_invalid_triangles_are_skipped() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let mesh = Mesh::new(positions, vec![[0, 1, 2], [0, 1, 7]], 0);

        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.triangles().count(), 1);
    }
}
