//! Vertex classification
//!
//! Walks the triangle fan around a pole point and arranges it into an ordered
//! [`VertexLoop`]. Fans that cannot be arranged into a single closed cycle or
//! a single open chain are rejected with the class explaining why.

use crate::topology::{MeshTopology, PointId, TriangleId};
use serde::{Deserialize, Serialize};

/// Topological/geometric class of a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexClass {
    /// Closed fan without feature edges.
    Simple,
    /// Open fan on the mesh boundary.
    Boundary,
    /// Closed fan crossed by exactly two feature edges.
    InteriorEdge,
    /// Closed fan with a single feature edge ending at the vertex.
    EdgeEnd,
    /// Three or more feature edges, or a boundary vertex with interior features.
    Corner,
    /// Open fan whose two boundary ends coincide.
    CrackTip,
    /// Triangles that do not form a single fan.
    NonManifold,
    /// Fan with no area or no well-defined normal.
    Degenerate,
    /// Fan with at least the configured maximum number of triangles.
    HighDegree,
}

impl VertexClass {
    pub const ALL: [VertexClass; 9] = [
        VertexClass::Simple,
        VertexClass::Boundary,
        VertexClass::InteriorEdge,
        VertexClass::EdgeEnd,
        VertexClass::Corner,
        VertexClass::CrackTip,
        VertexClass::NonManifold,
        VertexClass::Degenerate,
        VertexClass::HighDegree,
    ];

    /// Classes that can only be simplified by splitting the vertex first.
    pub fn is_complex(self) -> bool {
        matches!(
            self,
            VertexClass::Corner | VertexClass::NonManifold | VertexClass::HighDegree
        )
    }

    /// Classes whose fan is an open chain.
    pub fn is_boundary(self) -> bool {
        matches!(self, VertexClass::Boundary | VertexClass::CrackTip)
    }

    /// Scheduling rank among candidates of equal error; interior points go
    /// before feature points, and those before boundary points.
    pub fn removal_rank(self) -> u8 {
        match self {
            VertexClass::Simple => 0,
            VertexClass::InteriorEdge | VertexClass::EdgeEnd => 1,
            VertexClass::Boundary | VertexClass::CrackTip => 2,
            _ => 3,
        }
    }
}

/// Ordered star of a pole vertex.
///
/// Triangle `i` joins `vertices[i]` and `vertices[i + 1]` (wrapping around
/// when the loop is closed). An open loop has one triangle fewer than it has
/// vertices; its first and last vertices are the boundary ends.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexLoop {
    pub pole: PointId,
    pub vertices: Vec<PointId>,
    pub triangles: Vec<TriangleId>,
    pub closed: bool,
}

impl VertexLoop {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Whether two loop positions are joined by a loop edge.
    pub fn adjacent(&self, i: usize, j: usize) -> bool {
        let n = self.len();
        let (lo, hi) = (i.min(j), i.max(j));
        hi == lo + 1 || (self.closed && lo == 0 && hi == n - 1)
    }
}

/// Corners of `triangle` rotated so the pole comes first.
fn rotate_to_pole(topology: &MeshTopology, triangle: TriangleId, pole: PointId) -> Option<(PointId, PointId)> {
    let corners = topology.corners_of(triangle);
    let k = corners.iter().position(|&c| c == pole)?;
    Some((corners[(k + 1) % 3], corners[(k + 2) % 3]))
}

enum Walk {
    /// Reached an edge with no further neighbour.
    Open,
    /// Came back around to the starting triangle.
    Closed,
    /// Branching or otherwise impossible fan.
    Invalid,
}

/// Walk across single-neighbour edges starting from `(pole, other)` of
/// `start`, appending each new vertex and triangle.
fn walk(
    topology: &MeshTopology,
    pole: PointId,
    start: TriangleId,
    mut other: PointId,
    budget: usize,
    vertices: &mut Vec<PointId>,
    triangles: &mut Vec<TriangleId>,
) -> Walk {
    let mut current = start;
    loop {
        let neighbors = topology.edge_neighbors(current, pole, other);
        let next = match neighbors.as_slice() {
            [] => return Walk::Open,
            [next] => *next,
            _ => return Walk::Invalid,
        };
        if next == start {
            return Walk::Closed;
        }
        if triangles.len() >= budget {
            return Walk::Invalid;
        }
        let Some(third) = topology.third_corner(next, pole, other) else {
            return Walk::Invalid;
        };
        vertices.push(third);
        triangles.push(next);
        current = next;
        other = third;
    }
}

/// Arrange the fan of `pole` into a loop, ignoring the degree limit.
pub fn build_loop(topology: &MeshTopology, pole: PointId) -> Result<VertexLoop, VertexClass> {
    let fan = topology.triangles_at(pole);
    let n = fan.len();
    let Some(&start) = fan.first() else {
        return Err(VertexClass::Degenerate);
    };
    let (first, second) = rotate_to_pole(topology, start, pole).ok_or(VertexClass::NonManifold)?;

    let mut vertices = vec![first, second];
    let mut triangles = vec![start];
    match walk(topology, pole, start, second, n, &mut vertices, &mut triangles) {
        Walk::Closed => {
            if triangles.len() != n {
                return Err(VertexClass::NonManifold);
            }
            // the walk re-enters the start triangle after revisiting `first`
            vertices.pop();
            Ok(VertexLoop {
                pole,
                vertices,
                triangles,
                closed: true,
            })
        }
        Walk::Invalid => Err(VertexClass::NonManifold),
        Walk::Open => {
            let mut back_vertices = Vec::new();
            let mut back_triangles = Vec::new();
            let remaining = n.saturating_sub(triangles.len());
            match walk(
                topology,
                pole,
                start,
                first,
                remaining,
                &mut back_vertices,
                &mut back_triangles,
            ) {
                Walk::Open if triangles.len() + back_triangles.len() == n => {
                    back_vertices.reverse();
                    back_triangles.reverse();
                    back_vertices.extend(vertices);
                    back_triangles.extend(triangles);
                    Ok(VertexLoop {
                        pole,
                        vertices: back_vertices,
                        triangles: back_triangles,
                        closed: false,
                    })
                }
                _ => Err(VertexClass::NonManifold),
            }
        }
    }
}

/// Classify the fan of `pole` topologically.
///
/// Returns the loop for manifold fans (`Simple` when closed, `Boundary` when
/// open); otherwise the rejecting class.
pub fn classify_vertex(
    topology: &MeshTopology,
    pole: PointId,
    max_degree: usize,
) -> Result<(VertexClass, VertexLoop), VertexClass> {
    if topology.triangles_at(pole).len() >= max_degree {
        return Err(VertexClass::HighDegree);
    }
    let star = build_loop(topology, pole)?;
    let class = if star.closed {
        VertexClass::Simple
    } else {
        VertexClass::Boundary
    };
    Ok((class, star))
}

#[cfg(test)]
mod tests {
    use super::*;
    use progmesh_core::{Point3f, TriangleMesh};

    /// Hexagonal fan around point 0, consistently wound.
    fn hexagon_fan(closed: bool) -> TriangleMesh {
        let mut vertices = vec![Point3f::new(0.0, 0.0, 0.0)];
        for k in 0..6 {
            let angle = k as f32 * std::f32::consts::PI / 3.0;
            vertices.push(Point3f::new(angle.cos(), angle.sin(), 0.0));
        }
        let count = if closed { 6 } else { 4 };
        let faces = (0..count).map(|k| [0, 1 + k, 1 + (k + 1) % 6]).collect();
        TriangleMesh::from_vertices_and_faces(vertices, faces)
    }

    #[test]
    fn test_removal_rank_orders_interior_first() {
        assert!(VertexClass::Simple.removal_rank() < VertexClass::EdgeEnd.removal_rank());
        assert_eq!(
            VertexClass::InteriorEdge.removal_rank(),
            VertexClass::EdgeEnd.removal_rank()
        );
        assert!(VertexClass::InteriorEdge.removal_rank() < VertexClass::Boundary.removal_rank());
        assert_eq!(VertexClass::CrackTip.removal_rank(), VertexClass::Boundary.removal_rank());
    }

    #[test]
    fn test_closed_fan_is_simple() {
        let topo = MeshTopology::from_mesh(&hexagon_fan(true)).unwrap();
        let (class, star) = classify_vertex(&topo, 0, 25).unwrap();
        assert_eq!(class, VertexClass::Simple);
        assert!(star.closed);
        assert_eq!(star.vertices, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(star.triangles, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_open_fan_is_boundary() {
        let topo = MeshTopology::from_mesh(&hexagon_fan(false)).unwrap();
        let (class, star) = classify_vertex(&topo, 0, 25).unwrap();
        assert_eq!(class, VertexClass::Boundary);
        assert!(!star.closed);
        assert_eq!(star.vertices.len(), 5);
        assert_eq!(star.triangles.len(), 4);
        assert_eq!(star.vertices.first(), Some(&1));
        assert_eq!(star.vertices.last(), Some(&5));
    }

    #[test]
    fn test_open_fan_started_mid_chain() {
        // starting triangle sits in the middle of the chain
        let mut mesh = hexagon_fan(false);
        mesh.faces.rotate_left(2);
        let topo = MeshTopology::from_mesh(&mesh).unwrap();
        let (_, star) = classify_vertex(&topo, 0, 25).unwrap();
        assert_eq!(star.vertices, vec![1, 2, 3, 4, 5]);
        for (i, &t) in star.triangles.iter().enumerate() {
            let corners = topo.corners_of(t);
            assert!(corners.contains(&star.vertices[i]));
            assert!(corners.contains(&star.vertices[i + 1]));
        }
    }

    #[test]
    fn test_high_degree() {
        let topo = MeshTopology::from_mesh(&hexagon_fan(true)).unwrap();
        assert_eq!(classify_vertex(&topo, 0, 6), Err(VertexClass::HighDegree));
        assert!(build_loop(&topo, 0).is_ok());
    }

    #[test]
    fn test_bowtie_is_non_manifold() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(-1.0, 0.0, 0.0),
                Point3f::new(-1.0, -1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 3, 4]],
        );
        let topo = MeshTopology::from_mesh(&mesh).unwrap();
        assert_eq!(classify_vertex(&topo, 0, 25), Err(VertexClass::NonManifold));
    }

    #[test]
    fn test_fin_edge_is_non_manifold() {
        // three triangles share the edge 0-1
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.5, 1.0, 0.0),
                Point3f::new(0.5, -1.0, 0.0),
                Point3f::new(0.5, 0.0, 1.0),
            ],
            vec![[0, 1, 2], [1, 0, 3], [0, 1, 4]],
        );
        let topo = MeshTopology::from_mesh(&mesh).unwrap();
        assert_eq!(classify_vertex(&topo, 0, 25), Err(VertexClass::NonManifold));
    }

    #[test]
    fn test_isolated_point_is_degenerate() {
        let mut mesh = hexagon_fan(true);
        mesh.vertices.push(Point3f::new(5.0, 5.0, 5.0));
        let topo = MeshTopology::from_mesh(&mesh).unwrap();
        assert_eq!(classify_vertex(&topo, 7, 25), Err(VertexClass::Degenerate));
    }

    #[test]
    fn test_loop_adjacency() {
        let star = VertexLoop {
            pole: 0,
            vertices: vec![1, 2, 3, 4],
            triangles: vec![0, 1, 2, 3],
            closed: true,
        };
        assert!(star.adjacent(0, 3));
        assert!(star.adjacent(2, 1));
        assert!(!star.adjacent(0, 2));
        let open = VertexLoop { closed: false, ..star };
        assert!(!open.adjacent(0, 3));
    }
}
