use crate::error::MeshError;
use glam::{Vec2, Vec3};
use rasterscene_common::Vertex;

/// Validated triangle-list geometry kept on the CPU.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Result<Self, MeshError> {
        if indices.is_empty() {
            return Err(MeshError::Empty);
        }
        if indices.len() % 3 != 0 {
            return Err(MeshError::NotTriangles(indices.len()));
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(MeshError::IndexOutOfRange {
                index,
                vertex_count: vertices.len(),
            });
        }
        Ok(Self { vertices, indices })
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Axis-aligned cube centered on the origin, four vertices per face.
    pub fn cube(half_extent: f32) -> Self {
        // (normal, tangent) per face; bitangent = normal × tangent.
        const FACES: [(Vec3, Vec3); 6] = [
            (Vec3::Z, Vec3::NEG_X),
            (Vec3::NEG_Z, Vec3::X),
            (Vec3::X, Vec3::Z),
            (Vec3::NEG_X, Vec3::NEG_Z),
            (Vec3::Y, Vec3::X),
            (Vec3::NEG_Y, Vec3::X),
        ];
        const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, tangent) in FACES {
            let bitangent = normal.cross(tangent);
            let base = vertices.len() as u32;
            for (u, v) in CORNERS {
                let position = (normal + tangent * u + bitangent * v) * half_extent;
                let uv = Vec2::new((u + 1.0) / 2.0, (1.0 - v) / 2.0);
                vertices.push(Vertex::new(position, uv, normal, tangent));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self { vertices, indices }
    }

    /// Unit quad in the XY plane facing -Z.
    pub fn quad(half_extent: f32) -> Self {
        let normal = Vec3::NEG_Z;
        let tangent = Vec3::X;
        let vertices = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
            .into_iter()
            .map(|(x, y)| {
                Vertex::new(
                    Vec3::new(x, y, 0.0) * half_extent,
                    Vec2::new((x + 1.0) / 2.0, (1.0 - y) / 2.0),
                    normal,
                    tangent,
                )
            })
            .collect();
        Self {
            vertices,
            indices: vec![0, 2, 1, 0, 3, 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_indices() {
        assert_eq!(Mesh::new(vec![Vertex::default()], vec![]), Err(MeshError::Empty));
    }

    #[test]
    fn rejects_partial_triangles() {
        let vertices = vec![Vertex::default(); 3];
        assert_eq!(
            Mesh::new(vertices, vec![0, 1, 2, 0]),
            Err(MeshError::NotTriangles(4))
        );
    }

    #[test]
    fn rejects_out_of_range_index() {
        let vertices = vec![Vertex::default(); 3];
        assert_eq!(
            Mesh::new(vertices, vec![0, 1, 3]),
            Err(MeshError::IndexOutOfRange {
                index: 3,
                vertex_count: 3
            })
        );
    }

    #[test]
    fn cube_has_twelve_triangles_on_its_surface() {
        let cube = Mesh::cube(2.0);
        assert_eq!(cube.vertices().len(), 24);
        assert_eq!(cube.index_count(), 36);
        for v in cube.vertices() {
            assert_eq!(v.position().abs().max_element(), 2.0);
            let n = Vec3::from_array(v.normal);
            let t = Vec3::from_array(v.tangent);
            assert_eq!(n.dot(t), 0.0);
        }
        assert!(Mesh::new(cube.vertices().to_vec(), cube.indices().to_vec()).is_ok());
    }

    #[test]
    fn quad_is_valid() {
        let quad = Mesh::quad(1.0);
        assert!(Mesh::new(quad.vertices().to_vec(), quad.indices().to_vec()).is_ok());
        assert_eq!(quad.index_count(), 6);
    }
}
