//! Loop evaluation
//!
//! Computes the area-weighted average plane of a vertex loop and refines the
//! topological class with feature edges.

use crate::classify::{VertexClass, VertexLoop};
use crate::topology::MeshTopology;
use nalgebra::{Point3, Vector3};

/// Dihedral sentinel for boundary chain ends: equivalent to a 180° angle, so
/// the ends always count as features.
pub const BOUNDARY_FEATURE: f64 = -1.0;

/// Plane and feature data of a vertex loop.
#[derive(Debug, Clone)]
pub struct LoopEvaluation {
    pub class: VertexClass,
    /// Area-weighted unit normal.
    pub normal: Vector3<f64>,
    /// Area-weighted centroid.
    pub centroid: Point3<f64>,
    pub area: f64,
    /// Per loop vertex: dot product of the normals of the two loop triangles
    /// sharing the edge pole–vertex, or [`BOUNDARY_FEATURE`] at chain ends.
    pub dihedrals: Vec<f64>,
    /// Loop positions of feature edges, in loop order.
    pub features: Vec<usize>,
}

/// Thresholds used to refine a loop's class.
#[derive(Debug, Clone, Copy)]
pub struct FeatureCriteria {
    /// Cosine of the feature angle; edges with `dot <= feature_cos` are features.
    pub feature_cos: f64,
    /// When false, dihedral features are ignored and only chain ends count.
    pub preserve_edges: bool,
    /// Areas at or below this value are treated as zero.
    pub area_tolerance: f64,
}

/// Evaluate a manifold loop produced by the classifier.
///
/// Returns `Err(VertexClass::Degenerate)` when the loop has no area or no
/// usable normal.
pub fn evaluate_loop(
    topology: &MeshTopology,
    star: &VertexLoop,
    criteria: &FeatureCriteria,
) -> Result<LoopEvaluation, VertexClass> {
    let x = topology.position(star.pole);
    let n = star.len();
    let triangle_count = star.triangles.len();

    let mut normal = Vector3::zeros();
    let mut weighted = Vector3::zeros();
    let mut area = 0.0;
    let mut normals = Vec::with_capacity(triangle_count);

    for i in 0..triangle_count {
        let a = topology.position(star.vertices[i]);
        let b = topology.position(star.vertices[(i + 1) % n]);
        let cross = (a - x).cross(&(b - x));
        let length = cross.norm();
        let tri_area = 0.5 * length;
        let tri_normal = if length > 0.0 { cross / length } else { Vector3::zeros() };

        normal += tri_normal * tri_area;
        weighted += (x.coords + a.coords + b.coords) * (tri_area / 3.0);
        area += tri_area;
        normals.push(tri_normal);
    }

    if area <= criteria.area_tolerance {
        return Err(VertexClass::Degenerate);
    }
    let Some(normal) = normal.try_normalize(f64::EPSILON * area) else {
        return Err(VertexClass::Degenerate);
    };
    let centroid = Point3::from(weighted / area);

    let mut dihedrals = vec![1.0; n];
    if star.closed {
        for (i, dihedral) in dihedrals.iter_mut().enumerate() {
            let before = &normals[(i + n - 1) % n];
            *dihedral = before.dot(&normals[i]);
        }
    } else {
        for i in 1..n - 1 {
            dihedrals[i] = normals[i - 1].dot(&normals[i]);
        }
        dihedrals[0] = BOUNDARY_FEATURE;
        dihedrals[n - 1] = BOUNDARY_FEATURE;
    }

    let features: Vec<usize> = dihedrals
        .iter()
        .enumerate()
        .filter(|&(i, &dot)| {
            let end = !star.closed && (i == 0 || i == n - 1);
            end || (criteria.preserve_edges && dot <= criteria.feature_cos)
        })
        .map(|(i, _)| i)
        .collect();

    let class = if star.closed {
        match features.len() {
            0 => VertexClass::Simple,
            1 => VertexClass::EdgeEnd,
            2 => VertexClass::InteriorEdge,
            _ => VertexClass::Corner,
        }
    } else if features.len() > 2 {
        VertexClass::Corner
    } else if topology.position(star.vertices[0]) == topology.position(star.vertices[n - 1]) {
        VertexClass::CrackTip
    } else {
        VertexClass::Boundary
    };

    Ok(LoopEvaluation {
        class,
        normal,
        centroid,
        area,
        dihedrals,
        features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_vertex;
    use approx::assert_relative_eq;
    use progmesh_core::{Point3f, TriangleMesh};

    fn criteria(angle_deg: f64) -> FeatureCriteria {
        FeatureCriteria {
            feature_cos: angle_deg.to_radians().cos(),
            preserve_edges: true,
            area_tolerance: 1e-12,
        }
    }

    /// Closed fan of `k` triangles around point 0 whose rim heights are given.
    fn fan(heights: &[f32]) -> TriangleMesh {
        let k = heights.len();
        let mut vertices = vec![Point3f::new(0.0, 0.0, 0.0)];
        for (i, &h) in heights.iter().enumerate() {
            let angle = i as f32 * 2.0 * std::f32::consts::PI / k as f32;
            vertices.push(Point3f::new(angle.cos(), angle.sin(), h));
        }
        let faces = (0..k).map(|i| [0, 1 + i, 1 + (i + 1) % k]).collect();
        TriangleMesh::from_vertices_and_faces(vertices, faces)
    }

    fn evaluate(mesh: &TriangleMesh, angle: f64) -> Result<LoopEvaluation, VertexClass> {
        let topo = MeshTopology::from_mesh(mesh).unwrap();
        let (_, star) = classify_vertex(&topo, 0, 25).unwrap();
        evaluate_loop(&topo, &star, &criteria(angle))
    }

    #[test]
    fn test_flat_fan_is_simple() {
        let eval = evaluate(&fan(&[0.0; 6]), 30.0).unwrap();
        assert_eq!(eval.class, VertexClass::Simple);
        assert_relative_eq!(eval.normal.z, 1.0, epsilon = 1e-12);
        assert_relative_eq!(eval.centroid.z, 0.0, epsilon = 1e-12);
        assert!(eval.features.is_empty());
    }

    #[test]
    fn test_ridge_is_interior_edge() {
        // roof: rim points 0 and 3 on the ridge line, the others fall away
        let mesh = fan(&[0.0, -1.0, -1.0, 0.0, -1.0, -1.0]);
        let eval = evaluate(&mesh, 30.0).unwrap();
        assert_eq!(eval.class, VertexClass::InteriorEdge);
        assert_eq!(eval.features, vec![0, 3]);
    }

    #[test]
    fn test_single_crease_is_edge_end() {
        // z = |y| * max(x, 0): a crease along +x that fades out at the pole
        let heights: Vec<f32> = (0..8)
            .map(|i| {
                let angle = i as f32 * std::f32::consts::PI / 4.0;
                angle.sin().abs() * angle.cos().max(0.0)
            })
            .collect();
        let eval = evaluate(&fan(&heights), 60.0).unwrap();
        assert_eq!(eval.class, VertexClass::EdgeEnd);
        assert_eq!(eval.features, vec![0]);
    }

    #[test]
    fn test_spike_is_corner() {
        let mesh = fan(&[-2.0, -2.0, -2.0]);
        let eval = evaluate(&mesh, 30.0).unwrap();
        assert_eq!(eval.class, VertexClass::Corner);
    }

    #[test]
    fn test_edges_ignored_without_preservation() {
        let mesh = fan(&[-2.0, -2.0, -2.0]);
        let topo = MeshTopology::from_mesh(&mesh).unwrap();
        let (_, star) = classify_vertex(&topo, 0, 25).unwrap();
        let mut relaxed = criteria(30.0);
        relaxed.preserve_edges = false;
        let eval = evaluate_loop(&topo, &star, &relaxed).unwrap();
        assert_eq!(eval.class, VertexClass::Simple);
    }

    #[test]
    fn test_boundary_ends_are_features() {
        let mut mesh = fan(&[0.0; 6]);
        mesh.faces.truncate(3);
        let eval = evaluate(&mesh, 30.0).unwrap();
        assert_eq!(eval.class, VertexClass::Boundary);
        assert_eq!(eval.dihedrals[0], BOUNDARY_FEATURE);
        assert_eq!(*eval.dihedrals.last().unwrap(), BOUNDARY_FEATURE);
        assert_eq!(eval.features, vec![0, 3]);
    }

    #[test]
    fn test_coincident_ends_make_crack_tip() {
        let mut mesh = fan(&[0.0; 4]);
        // duplicate rim point 1 and use the copy to close the fan
        mesh.vertices.push(mesh.vertices[1]);
        mesh.faces[3] = [0, 4, 5];
        let eval = evaluate(&mesh, 30.0).unwrap();
        assert_eq!(eval.class, VertexClass::CrackTip);
    }

    #[test]
    fn test_zero_area_is_degenerate() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(2.0, 0.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        assert_eq!(evaluate(&mesh, 30.0).unwrap_err(), VertexClass::Degenerate);
    }
}
