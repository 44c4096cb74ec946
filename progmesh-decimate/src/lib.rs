//! Progressive triangle mesh decimation
//!
//! Reduces the triangle count of a manifold or near-manifold mesh while
//! bounding the deviation from the original surface:
//! - Vertex classification by walking the triangle fan of every vertex
//! - Feature edge detection from dihedral angles
//! - Error-driven priority scheduling with recycle and deferred-split tiers
//! - Edge collapse, loop retriangulation and vertex split
//! - Progressive mesh recording for level-of-detail reconstruction

pub mod topology;
pub mod classify;
pub mod evaluate;
pub mod metric;
pub mod scheduler;
pub mod surgery;
pub mod progressive;
pub mod stats;
pub mod params;
pub mod decimate;

pub use topology::{CompactMesh, MeshTopology, PointId, TriangleId};
pub use classify::{build_loop, classify_vertex, VertexClass, VertexLoop};
pub use evaluate::{evaluate_loop, FeatureCriteria, LoopEvaluation};
pub use progressive::*;
pub use stats::*;
pub use params::*;
pub use decimate::*;

use progmesh_core::{TriangleMesh, Result};

/// Simplify a mesh by reducing the number of faces/vertices
pub trait MeshSimplifier {
    /// Simplify mesh with target reduction ratio (0.0 = no reduction, 1.0 = maximum reduction)
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh>;
}
