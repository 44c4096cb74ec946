//! Arena mesh topology
//!
//! Dense point and triangle arrays keyed by integer id with tombstone
//! deletion. Every point keeps the list of live triangles using it, so
//! point→triangle and triangle→point lookups are O(1). Ids are never reused
//! during a run; [`MeshTopology::compact`] remaps survivors to a dense range.

use nalgebra::Vector3;
use progmesh_core::{to_f64, Point3d, Result, TriangleMesh};
use tracing::warn;

pub type PointId = usize;
pub type TriangleId = usize;

#[derive(Debug, Clone)]
struct PointRecord {
    position: Point3d,
    error: f64,
    origin: PointId,
    triangles: Vec<TriangleId>,
    deleted: bool,
}

#[derive(Debug, Clone)]
struct TriangleRecord {
    corners: [PointId; 3],
    normal: Vector3<f64>,
    area: f64,
    deleted: bool,
}

/// Mesh produced by [`MeshTopology::compact`].
#[derive(Debug, Clone)]
pub struct CompactMesh {
    pub positions: Vec<Point3d>,
    pub triangles: Vec<[usize; 3]>,
    /// Cumulative error of every output point.
    pub errors: Vec<f64>,
    /// Input point each output point derives from.
    pub origins: Vec<PointId>,
    /// Arena id → output id, `None` for removed points.
    pub point_map: Vec<Option<usize>>,
}

/// Point/triangle incidence store with tombstone deletion.
#[derive(Debug, Clone)]
pub struct MeshTopology {
    points: Vec<PointRecord>,
    triangles: Vec<TriangleRecord>,
    live_points: usize,
    live_triangles: usize,
    degenerate_faces: usize,
}

fn triangle_geometry(a: &Point3d, b: &Point3d, c: &Point3d) -> (Vector3<f64>, f64) {
    let cross = (b - a).cross(&(c - a));
    let norm = cross.norm();
    let normal = if norm > 0.0 { cross / norm } else { Vector3::zeros() };
    (normal, norm * 0.5)
}

impl MeshTopology {
    /// Build the topology of an indexed triangle mesh.
    ///
    /// Faces repeating a corner keep their triangle id but are stored as
    /// tombstones and never attached to their corners.
    pub fn from_mesh(mesh: &TriangleMesh) -> Result<Self> {
        mesh.validate()?;

        let mut topology = MeshTopology {
            points: Vec::with_capacity(mesh.vertices.len()),
            triangles: Vec::with_capacity(mesh.faces.len()),
            live_points: 0,
            live_triangles: 0,
            degenerate_faces: 0,
        };
        for vertex in &mesh.vertices {
            topology.insert_point(to_f64(vertex));
        }
        for (face, &[a, b, c]) in mesh.faces.iter().enumerate() {
            if a == b || b == c || c == a {
                warn!(face, "Skipping face with a repeated corner");
                topology.triangles.push(TriangleRecord {
                    corners: [a, b, c],
                    normal: Vector3::zeros(),
                    area: 0.0,
                    deleted: true,
                });
                topology.degenerate_faces += 1;
                continue;
            }
            topology.insert_triangle(a, b, c);
        }
        Ok(topology)
    }

    /// Number of input faces skipped for repeating a corner.
    pub fn degenerate_face_count(&self) -> usize {
        self.degenerate_faces
    }

    /// Number of live points.
    pub fn point_count(&self) -> usize {
        self.live_points
    }

    /// Number of live triangles.
    pub fn triangle_count(&self) -> usize {
        self.live_triangles
    }

    /// Number of point ids ever allocated, live or not.
    pub fn point_capacity(&self) -> usize {
        self.points.len()
    }

    /// Number of triangle ids ever allocated, live or not.
    pub fn triangle_capacity(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_point_alive(&self, id: PointId) -> bool {
        self.points.get(id).is_some_and(|p| !p.deleted)
    }

    pub fn is_triangle_alive(&self, id: TriangleId) -> bool {
        self.triangles.get(id).is_some_and(|t| !t.deleted)
    }

    /// Iterate over the ids of live points.
    pub fn live_points(&self) -> impl Iterator<Item = PointId> + '_ {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.deleted)
            .map(|(id, _)| id)
    }

    pub fn position(&self, id: PointId) -> &Point3d {
        &self.points[id].position
    }

    /// Cumulative error recorded for a point.
    pub fn error(&self, id: PointId) -> f64 {
        self.points[id].error
    }

    /// Add to the cumulative error of a point. Negative amounts are ignored so
    /// the error never decreases.
    pub fn add_error(&mut self, id: PointId, amount: f64) {
        if amount > 0.0 {
            self.points[id].error += amount;
        }
    }

    /// Input point a point derives from.
    pub fn origin(&self, id: PointId) -> PointId {
        self.points[id].origin
    }

    /// Live triangles using a point.
    pub fn triangles_at(&self, id: PointId) -> &[TriangleId] {
        &self.points[id].triangles
    }

    pub fn corners_of(&self, id: TriangleId) -> [PointId; 3] {
        self.triangles[id].corners
    }

    /// Cached unit normal; zero for a degenerate triangle.
    pub fn normal_of(&self, id: TriangleId) -> &Vector3<f64> {
        &self.triangles[id].normal
    }

    pub fn area_of(&self, id: TriangleId) -> f64 {
        self.triangles[id].area
    }

    /// Triangles other than `triangle` that share the edge `a`–`b`.
    pub fn edge_neighbors(&self, triangle: TriangleId, a: PointId, b: PointId) -> Vec<TriangleId> {
        self.points[a]
            .triangles
            .iter()
            .copied()
            .filter(|&t| t != triangle && self.triangles[t].corners.contains(&b))
            .collect()
    }

    /// Whether any live triangle uses the edge `a`–`b`.
    pub fn is_edge(&self, a: PointId, b: PointId) -> bool {
        self.points[a]
            .triangles
            .iter()
            .any(|&t| self.triangles[t].corners.contains(&b))
    }

    /// Find a live triangle with exactly the given corners, in any order.
    pub fn find_triangle(&self, a: PointId, b: PointId, c: PointId) -> Option<TriangleId> {
        self.points[a].triangles.iter().copied().find(|&t| {
            let corners = &self.triangles[t].corners;
            corners.contains(&b) && corners.contains(&c)
        })
    }

    /// The corner of `triangle` that is neither `a` nor `b`.
    pub fn third_corner(&self, triangle: TriangleId, a: PointId, b: PointId) -> Option<PointId> {
        self.triangles[triangle]
            .corners
            .iter()
            .copied()
            .find(|&c| c != a && c != b)
    }

    /// Distinct points sharing an edge with `id`.
    pub fn neighbors(&self, id: PointId) -> Vec<PointId> {
        let mut result: Vec<PointId> = self.points[id]
            .triangles
            .iter()
            .flat_map(|&t| self.triangles[t].corners)
            .filter(|&c| c != id)
            .collect();
        result.sort_unstable();
        result.dedup();
        result
    }

    pub fn insert_point(&mut self, position: Point3d) -> PointId {
        let id = self.points.len();
        self.points.push(PointRecord {
            position,
            error: 0.0,
            origin: id,
            triangles: Vec::new(),
            deleted: false,
        });
        self.live_points += 1;
        id
    }

    /// Insert a coincident copy of `source` carrying its error and origin.
    pub fn split_point(&mut self, source: PointId) -> PointId {
        let id = self.insert_point(self.points[source].position);
        self.points[id].error = self.points[source].error;
        self.points[id].origin = self.points[source].origin;
        id
    }

    pub fn insert_triangle(&mut self, a: PointId, b: PointId, c: PointId) -> TriangleId {
        let id = self.triangles.len();
        let (normal, area) = triangle_geometry(
            &self.points[a].position,
            &self.points[b].position,
            &self.points[c].position,
        );
        self.triangles.push(TriangleRecord {
            corners: [a, b, c],
            normal,
            area,
            deleted: false,
        });
        for corner in [a, b, c] {
            self.points[corner].triangles.push(id);
        }
        self.live_triangles += 1;
        id
    }

    /// Tombstone a point. The point must no longer be used by any triangle.
    pub fn delete_point(&mut self, id: PointId) {
        let record = &mut self.points[id];
        debug_assert!(record.triangles.is_empty(), "point {id} still in use");
        if !record.deleted {
            record.deleted = true;
            self.live_points -= 1;
        }
    }

    /// Revive a tombstoned point.
    pub fn restore_point(&mut self, id: PointId) {
        let record = &mut self.points[id];
        if record.deleted {
            record.deleted = false;
            self.live_points += 1;
        }
    }

    /// Tombstone a triangle and drop it from its corners' incidence lists.
    /// The corners are kept so the triangle can be restored later.
    pub fn delete_triangle(&mut self, id: TriangleId) {
        if self.triangles[id].deleted {
            return;
        }
        for corner in self.triangles[id].corners {
            self.detach(corner, id);
        }
        self.triangles[id].deleted = true;
        self.live_triangles -= 1;
    }

    /// Replace one corner of a triangle.
    pub fn replace_corner(&mut self, id: TriangleId, old: PointId, new: PointId) {
        let mut corners = self.triangles[id].corners;
        if let Some(slot) = corners.iter_mut().find(|c| **c == old) {
            *slot = new;
            self.set_corners(id, corners);
        }
    }

    /// Overwrite all corners of a live triangle, keeping incidence symmetric.
    pub fn set_corners(&mut self, id: TriangleId, corners: [PointId; 3]) {
        let old = self.triangles[id].corners;
        for corner in old {
            if !corners.contains(&corner) {
                self.detach(corner, id);
            }
        }
        for corner in corners {
            if !old.contains(&corner) {
                self.points[corner].triangles.push(id);
            }
        }
        self.triangles[id].corners = corners;
        self.refresh_geometry(id);
    }

    /// Set a triangle to a recorded state: `None` deletes it, `Some` makes it
    /// live with the given corners.
    pub fn set_triangle_state(&mut self, id: TriangleId, state: Option<[PointId; 3]>) {
        match (self.triangles[id].deleted, state) {
            (false, None) => self.delete_triangle(id),
            (false, Some(corners)) => self.set_corners(id, corners),
            (true, Some(corners)) => {
                self.triangles[id].corners = corners;
                self.triangles[id].deleted = false;
                for corner in corners {
                    self.points[corner].triangles.push(id);
                }
                self.live_triangles += 1;
                self.refresh_geometry(id);
            }
            (true, None) => {}
        }
    }

    /// Current state of a triangle: its corners when live, `None` otherwise.
    pub fn triangle_state(&self, id: TriangleId) -> Option<[PointId; 3]> {
        let record = &self.triangles[id];
        (!record.deleted).then_some(record.corners)
    }

    fn detach(&mut self, point: PointId, triangle: TriangleId) {
        let list = &mut self.points[point].triangles;
        if let Some(pos) = list.iter().position(|&t| t == triangle) {
            list.swap_remove(pos);
        }
    }

    fn refresh_geometry(&mut self, id: TriangleId) {
        let [a, b, c] = self.triangles[id].corners;
        let (normal, area) = triangle_geometry(
            &self.points[a].position,
            &self.points[b].position,
            &self.points[c].position,
        );
        self.triangles[id].normal = normal;
        self.triangles[id].area = area;
    }

    /// Check incidence symmetry: every live triangle references live points
    /// that list it, and every incidence entry names a live triangle using
    /// the point.
    pub fn is_consistent(&self) -> bool {
        let mut incidences = 0usize;
        for (id, tri) in self.triangles.iter().enumerate() {
            if tri.deleted {
                continue;
            }
            for corner in tri.corners {
                let point = &self.points[corner];
                if point.deleted || !point.triangles.contains(&id) {
                    return false;
                }
            }
            incidences += 3;
        }
        let mut listed = 0usize;
        for (id, point) in self.points.iter().enumerate() {
            if point.deleted && !point.triangles.is_empty() {
                return false;
            }
            for &t in &point.triangles {
                let tri = &self.triangles[t];
                if tri.deleted || !tri.corners.contains(&id) {
                    return false;
                }
            }
            listed += point.triangles.len();
        }
        incidences == listed
    }

    /// Remap surviving points and triangles to dense ids. Points no live
    /// triangle uses are dropped.
    pub fn compact(&self) -> CompactMesh {
        let mut point_map = vec![None; self.points.len()];
        let mut positions = Vec::with_capacity(self.live_points);
        let mut errors = Vec::with_capacity(self.live_points);
        let mut origins = Vec::with_capacity(self.live_points);
        for (id, point) in self.points.iter().enumerate() {
            if point.deleted || point.triangles.is_empty() {
                continue;
            }
            point_map[id] = Some(positions.len());
            positions.push(point.position);
            errors.push(point.error);
            origins.push(point.origin);
        }

        let triangles = self
            .triangles
            .iter()
            .filter(|t| !t.deleted)
            .filter_map(|t| {
                let [a, b, c] = t.corners;
                Some([point_map[a]?, point_map[b]?, point_map[c]?])
            })
            .collect();

        CompactMesh {
            positions,
            triangles,
            errors,
            origins,
            point_map,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progmesh_core::Point3f;

    fn make_square() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_construction() {
        let topo = MeshTopology::from_mesh(&make_square()).unwrap();
        assert_eq!(topo.point_count(), 4);
        assert_eq!(topo.triangle_count(), 2);
        assert_eq!(topo.triangles_at(0).len(), 2);
        assert_eq!(topo.triangles_at(1), &[0]);
        assert!((topo.area_of(0) - 0.5).abs() < 1e-12);
        assert!((topo.normal_of(0).z - 1.0).abs() < 1e-12);
        assert!(topo.is_consistent());
    }

    #[test]
    fn test_skips_repeated_corner() {
        let mut mesh = make_square();
        mesh.faces.push([1, 1, 2]);
        let topo = MeshTopology::from_mesh(&mesh).unwrap();
        assert_eq!(topo.triangle_count(), 2);
        assert_eq!(topo.triangle_capacity(), 3);
        assert_eq!(topo.degenerate_face_count(), 1);
        assert!(!topo.is_triangle_alive(2));
        assert_eq!(topo.triangles_at(1).len(), 1);
        assert!(topo.is_consistent());

        mesh.faces.push([0, 7, 1]);
        assert!(MeshTopology::from_mesh(&mesh).is_err());
    }

    #[test]
    fn test_edge_queries() {
        let topo = MeshTopology::from_mesh(&make_square()).unwrap();
        assert_eq!(topo.edge_neighbors(0, 0, 2), vec![1]);
        assert!(topo.edge_neighbors(0, 0, 1).is_empty());
        assert!(topo.is_edge(0, 2));
        assert!(!topo.is_edge(1, 3));
        assert_eq!(topo.find_triangle(2, 3, 0), Some(1));
        assert_eq!(topo.third_corner(0, 0, 2), Some(1));
        assert_eq!(topo.neighbors(0), vec![1, 2, 3]);
    }

    #[test]
    fn test_replace_and_delete() {
        let mut topo = MeshTopology::from_mesh(&make_square()).unwrap();
        topo.delete_triangle(1);
        assert_eq!(topo.triangle_count(), 1);
        assert!(topo.triangles_at(3).is_empty());
        topo.delete_point(3);
        assert_eq!(topo.point_count(), 3);

        let p = topo.insert_point(Point3d::new(0.0, 1.0, 0.0));
        topo.replace_corner(0, 2, p);
        assert_eq!(topo.corners_of(0), [0, 1, p]);
        assert!(topo.triangles_at(2).is_empty());
        assert_eq!(topo.triangles_at(p), &[0]);
        assert!(topo.is_consistent());
    }

    #[test]
    fn test_restore_triangle_state() {
        let mut topo = MeshTopology::from_mesh(&make_square()).unwrap();
        let before = topo.triangle_state(1);
        topo.delete_triangle(1);
        assert_eq!(topo.triangle_state(1), None);
        topo.set_triangle_state(1, before);
        assert_eq!(topo.triangle_count(), 2);
        assert_eq!(topo.corners_of(1), [0, 2, 3]);
        assert!(topo.is_consistent());
    }

    #[test]
    fn test_split_point_copies_state() {
        let mut topo = MeshTopology::from_mesh(&make_square()).unwrap();
        topo.add_error(2, 0.25);
        topo.add_error(2, -1.0);
        let copy = topo.split_point(2);
        assert_eq!(topo.position(copy), topo.position(2));
        assert_eq!(topo.error(copy), 0.25);
        assert_eq!(topo.origin(copy), 2);
    }

    #[test]
    fn test_compact() {
        let mut topo = MeshTopology::from_mesh(&make_square()).unwrap();
        topo.delete_triangle(0);
        topo.delete_point(1);
        let compact = topo.compact();
        assert_eq!(compact.positions.len(), 3);
        assert_eq!(compact.triangles, vec![[0, 1, 2]]);
        assert_eq!(compact.point_map, vec![Some(0), None, Some(1), Some(2)]);
        assert_eq!(compact.origins, vec![0, 2, 3]);
    }

    #[test]
    fn test_compact_drops_unused_points() {
        let mut mesh = make_square();
        mesh.vertices.push(Point3f::new(5.0, 5.0, 0.0));
        let mut topo = MeshTopology::from_mesh(&mesh).unwrap();
        topo.delete_triangle(1);
        let compact = topo.compact();
        // point 3 lost its last triangle, point 4 never had one
        assert_eq!(compact.point_map, vec![Some(0), Some(1), Some(2), None, None]);
        assert_eq!(compact.triangles, vec![[0, 1, 2]]);
        assert_eq!(compact.origins, vec![0, 1, 2]);
    }
}
