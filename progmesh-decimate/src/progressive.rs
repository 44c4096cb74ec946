//! Progressive mesh log
//!
//! Every topology operation is journaled as a list of triangle edits plus the
//! points it removed and added. Undoing operations in reverse order from the
//! final state rebuilds any intermediate level of detail.

use crate::topology::{MeshTopology, PointId, TriangleId};
use nalgebra::Point3;
use progmesh_core::{to_f32, TriangleMesh};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Pole merged into a loop neighbour.
    Collapse,
    /// Pole deleted and its loop refilled.
    Retriangulate,
    /// Pole fan divided between coincident copies.
    Split,
}

/// Corners of a triangle before and after an operation; `None` means the
/// triangle was not live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriangleEdit {
    pub triangle: TriangleId,
    pub before: Option<[PointId; 3]>,
    pub after: Option<[PointId; 3]>,
}

/// A journaled topology operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub pole: PointId,
    /// Collapse target, or the first new point of a split.
    pub target: Option<PointId>,
    pub position: Point3<f64>,
    /// Removal error; zero for splits.
    pub error: f64,
    pub removed_points: Vec<PointId>,
    pub added_points: Vec<PointId>,
    pub edits: Vec<TriangleEdit>,
}

impl Operation {
    /// Whether the operation removed a vertex.
    pub fn is_removal(&self) -> bool {
        self.kind != OperationKind::Split
    }

    /// Apply the operation's points and triangle edits to `topology`.
    pub(crate) fn apply(&self, topology: &mut MeshTopology) {
        for edit in &self.edits {
            topology.set_triangle_state(edit.triangle, edit.after);
        }
        for &point in &self.removed_points {
            topology.delete_point(point);
        }
    }

    /// Revert the operation on a topology in its post-operation state.
    pub(crate) fn undo(&self, topology: &mut MeshTopology) {
        for &point in &self.removed_points {
            topology.restore_point(point);
        }
        for edit in self.edits.iter().rev() {
            topology.set_triangle_state(edit.triangle, edit.before);
        }
        for &point in &self.added_points {
            topology.delete_point(point);
        }
    }
}

/// Ordered operation log of a run together with its final topology.
#[derive(Debug, Clone)]
pub struct ProgressiveMesh {
    topology: MeshTopology,
    operations: Vec<Operation>,
    inflection_points: Vec<usize>,
}

impl ProgressiveMesh {
    pub(crate) fn new(topology: MeshTopology, operations: Vec<Operation>, ratio: f64) -> Self {
        let inflection_points = inflection_points(&operations, ratio);
        Self {
            topology,
            operations,
            inflection_points,
        }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Indices of removals whose error jumps past the configured ratio of
    /// the previous non-zero removal error.
    pub fn inflection_points(&self) -> &[usize] {
        &self.inflection_points
    }

    /// Mesh after the first `n` operations; `0` is the input mesh and
    /// [`len`](Self::len) the final one.
    pub fn level_of_detail(&self, n: usize) -> TriangleMesh {
        let mut topology = self.topology.clone();
        for operation in self.operations.iter().skip(n).rev() {
            operation.undo(&mut topology);
        }
        let compact = topology.compact();
        TriangleMesh::from_vertices_and_faces(
            compact.positions.iter().map(to_f32).collect(),
            compact.triangles,
        )
    }
}

fn inflection_points(operations: &[Operation], ratio: f64) -> Vec<usize> {
    let mut previous = 0.0;
    let mut flagged = Vec::new();
    for (index, op) in operations.iter().enumerate().filter(|(_, op)| op.is_removal()) {
        if previous > 0.0 && op.error > ratio * previous {
            flagged.push(index);
        }
        if op.error > 0.0 {
            previous = op.error;
        }
    }
    flagged
}
