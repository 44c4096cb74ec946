//! Vertex removal error
//!
//! All errors are squared distances so they can be compared against the
//! squared error budget and accumulated without square roots.

use crate::classify::{VertexClass, VertexLoop};
use crate::evaluate::LoopEvaluation;
use crate::topology::MeshTopology;
use nalgebra::{Point3, Vector3};

/// Squared distance from `x` to the plane through `centroid` with unit `normal`.
pub fn plane_error(x: &Point3<f64>, normal: &Vector3<f64>, centroid: &Point3<f64>) -> f64 {
    let d = normal.dot(&(x - centroid));
    d * d
}

/// Squared distance from `x` to the segment `a`–`b`, capped by the squared
/// length of the segment.
pub fn edge_error(x: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    let ab = b - a;
    let length2 = ab.norm_squared();
    if length2 <= 0.0 {
        return 0.0;
    }
    let t = ((x - a).dot(&ab) / length2).clamp(0.0, 1.0);
    let closest = a + ab * t;
    (x - closest).norm_squared().min(length2)
}

/// Area of the triangle `x`, `a`, `b`.
pub fn triangle_area_error(x: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    0.5 * (a - x).cross(&(b - x)).norm()
}

/// Squared distance between two points.
pub fn point_error(x: &Point3<f64>, a: &Point3<f64>) -> f64 {
    (x - a).norm_squared()
}

/// Error of removing the pole of an evaluated loop, selected by class.
///
/// Complex and degenerate classes have no removal error and yield `None`.
pub fn removal_error(
    topology: &MeshTopology,
    star: &VertexLoop,
    eval: &LoopEvaluation,
) -> Option<f64> {
    let x = topology.position(star.pole);
    let at = |i: usize| topology.position(star.vertices[i]);
    let last = star.len() - 1;

    let error = match eval.class {
        VertexClass::Simple | VertexClass::EdgeEnd => plane_error(x, &eval.normal, &eval.centroid),
        VertexClass::InteriorEdge => {
            let (a, b) = (eval.features[0], eval.features[1]);
            edge_error(x, at(a), at(b))
        }
        VertexClass::Boundary if star.triangles.len() == 1 => triangle_area_error(x, at(0), at(1)),
        VertexClass::Boundary => edge_error(x, at(0), at(last)),
        VertexClass::CrackTip => point_error(x, at(0)),
        VertexClass::Corner
        | VertexClass::NonManifold
        | VertexClass::Degenerate
        | VertexClass::HighDegree => return None,
    };
    Some(error)
}

/// Squared error allowance for the current outer iteration.
#[derive(Debug, Clone, Copy)]
pub struct ErrorBudget {
    /// Allowed squared error.
    pub allowed: f64,
    /// Slack absorbing round-off in errors that should be exactly zero.
    pub slack: f64,
}

impl ErrorBudget {
    /// Budget for an error fraction of the bounding box diagonal.
    pub fn new(fraction: f64, diagonal: f64, tolerance: f64) -> Self {
        let allowed = fraction * diagonal;
        Self {
            allowed: allowed * allowed,
            slack: tolerance * tolerance,
        }
    }

    /// Remaining allowance for a vertex that has accumulated `cumulative`.
    pub fn remaining(&self, cumulative: f64) -> f64 {
        self.allowed - cumulative
    }

    /// Whether removing a vertex with `error` fits its remaining allowance.
    pub fn admits(&self, error: f64, cumulative: f64) -> bool {
        error <= self.remaining(cumulative) + self.slack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plane_error() {
        let x = Point3::new(0.0, 0.0, 2.0);
        let e = plane_error(&x, &Vector3::z(), &Point3::new(5.0, -3.0, 0.5));
        assert_relative_eq!(e, 2.25);
    }

    #[test]
    fn test_edge_error_projects_onto_segment() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(4.0, 0.0, 0.0);
        assert_relative_eq!(edge_error(&Point3::new(1.0, 1.0, 0.0), &a, &b), 1.0);
        // beyond the end: distance to the endpoint
        assert_relative_eq!(edge_error(&Point3::new(5.0, 1.0, 0.0), &a, &b), 2.0);
    }

    #[test]
    fn test_edge_error_capped_by_length() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(0.5, 0.0, 0.0);
        assert_relative_eq!(edge_error(&Point3::new(0.25, 3.0, 0.0), &a, &b), 0.25);
    }

    #[test]
    fn test_triangle_area_and_point_error() {
        let x = Point3::new(0.0, 0.0, 0.0);
        let a = Point3::new(2.0, 0.0, 0.0);
        let b = Point3::new(0.0, 3.0, 0.0);
        assert_relative_eq!(triangle_area_error(&x, &a, &b), 3.0);
        assert_relative_eq!(point_error(&a, &b), 13.0);
    }

    #[test]
    fn test_budget() {
        let budget = ErrorBudget::new(0.1, 10.0, 1e-4);
        assert_relative_eq!(budget.allowed, 1.0);
        assert!(budget.admits(0.5, 0.5));
        assert!(!budget.admits(0.5, 0.6));
        // round-off around zero stays admissible
        let zero = ErrorBudget::new(0.0, 10.0, 1e-4);
        assert!(zero.admits(1e-12, 0.0));
    }
}
