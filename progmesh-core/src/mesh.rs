//! Mesh data structures and functionality

use crate::error::{Error, Result};
use crate::point::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A triangle mesh with vertices and faces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3f>>,
    pub colors: Option<Vec<[u8; 3]>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            normals: None,
            colors: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
            colors: None,
        }
    }

    /// Create a mesh from general polygon cells.
    ///
    /// Every cell must be a triangle; anything else is rejected with
    /// [`Error::NonTriangleCell`].
    pub fn from_polygons(vertices: Vec<Point3f>, cells: &[Vec<usize>]) -> Result<Self> {
        let mut faces = Vec::with_capacity(cells.len());
        for (cell, corners) in cells.iter().enumerate() {
            match corners.as_slice() {
                &[a, b, c] => faces.push([a, b, c]),
                other => {
                    return Err(Error::NonTriangleCell {
                        cell,
                        corners: other.len(),
                    })
                }
            }
        }
        let mesh = Self::from_vertices_and_faces(vertices, faces);
        mesh.validate()?;
        Ok(mesh)
    }

    /// Create a mesh from flat coordinate (`N*3`) and index (`M*3`) arrays.
    pub fn from_flat(coords: &[f32], indices: &[usize]) -> Result<Self> {
        if coords.len() % 3 != 0 {
            return Err(Error::SizeMismatch {
                what: "coordinate array",
                expected: coords.len() / 3 * 3,
                actual: coords.len(),
            });
        }
        if indices.len() % 3 != 0 {
            return Err(Error::SizeMismatch {
                what: "index array",
                expected: indices.len() / 3 * 3,
                actual: indices.len(),
            });
        }
        let vertices = coords
            .chunks_exact(3)
            .map(|c| Point3f::new(c[0], c[1], c[2]))
            .collect();
        let faces = indices
            .chunks_exact(3)
            .map(|f| [f[0], f[1], f[2]])
            .collect();
        let mesh = Self::from_vertices_and_faces(vertices, faces);
        mesh.validate()?;
        Ok(mesh)
    }

    /// Check that faces reference existing vertices and that optional
    /// per-vertex attributes match the vertex count.
    pub fn validate(&self) -> Result<()> {
        let vertex_count = self.vertices.len();
        for (face, corners) in self.faces.iter().enumerate() {
            for &index in corners {
                if index >= vertex_count {
                    return Err(Error::IndexOutOfRange {
                        face,
                        index,
                        vertex_count,
                    });
                }
            }
        }
        if let Some(ref normals) = self.normals {
            if normals.len() != vertex_count {
                return Err(Error::SizeMismatch {
                    what: "normals",
                    expected: vertex_count,
                    actual: normals.len(),
                });
            }
        }
        if let Some(ref colors) = self.colors {
            if colors.len() != vertex_count {
                return Err(Error::SizeMismatch {
                    what: "colors",
                    expected: vertex_count,
                    actual: colors.len(),
                });
            }
        }
        Ok(())
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Count how many faces use each undirected edge.
    ///
    /// Keys are `(min, max)` vertex index pairs.
    pub fn edge_face_counts(&self) -> HashMap<(usize, usize), usize> {
        let mut counts = HashMap::with_capacity(self.faces.len() * 3 / 2);
        for face in &self.faces {
            for j in 0..3 {
                let a = face[j];
                let b = face[(j + 1) % 3];
                *counts.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3f>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Set vertex colors
    pub fn set_colors(&mut self, colors: Vec<[u8; 3]>) {
        if colors.len() == self.vertices.len() {
            self.colors = Some(colors);
        }
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Vec<Point3f> {
        vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_from_polygons_triangles() {
        let mesh =
            TriangleMesh::from_polygons(unit_square(), &[vec![0, 1, 2], vec![0, 2, 3]]).unwrap();
        assert_eq!(mesh.face_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn test_from_polygons_rejects_quads() {
        let err = TriangleMesh::from_polygons(unit_square(), &[vec![0, 1, 2, 3]]).unwrap_err();
        assert_eq!(err, Error::NonTriangleCell { cell: 0, corners: 4 });
    }

    #[test]
    fn test_from_flat_size_mismatch() {
        let coords = [0.0, 0.0, 0.0, 1.0, 0.0];
        assert!(matches!(
            TriangleMesh::from_flat(&coords, &[0, 1, 2]),
            Err(Error::SizeMismatch { .. })
        ));

        let coords = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        assert!(matches!(
            TriangleMesh::from_flat(&coords, &[0, 1]),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_from_flat_index_out_of_range() {
        let coords = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let err = TriangleMesh::from_flat(&coords, &[0, 1, 3]).unwrap_err();
        assert_eq!(
            err,
            Error::IndexOutOfRange {
                face: 0,
                index: 3,
                vertex_count: 3
            }
        );
    }

    #[test]
    fn test_validate_attribute_lengths() {
        let mut mesh = TriangleMesh::from_vertices_and_faces(unit_square(), vec![[0, 1, 2]]);
        mesh.normals = Some(vec![Vector3f::z(); 2]);
        assert!(matches!(mesh.validate(), Err(Error::SizeMismatch { what: "normals", .. })));
    }

    #[test]
    fn test_edge_face_counts() {
        let mesh =
            TriangleMesh::from_vertices_and_faces(unit_square(), vec![[0, 1, 2], [0, 2, 3]]);
        let counts = mesh.edge_face_counts();
        assert_eq!(counts.len(), 5);
        assert_eq!(counts[&(0, 2)], 2);
        assert_eq!(counts[&(0, 1)], 1);
    }
}
