//! Parameters for progressive decimation.

use progmesh_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// How a removable vertex is taken out of the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strategy {
    /// Merge the vertex into a loop neighbour. Falls back to retriangulation
    /// when no neighbour passes validation.
    #[default]
    EdgeCollapse,
    /// Delete the vertex and fill its loop by recursive bisection.
    Retriangulate,
}

/// Parameters for progressive decimation. Angles are in degrees; error
/// fractions are relative to the bounding box diagonal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecimateParams {
    /// Fraction of input triangles to remove (0.0 to 1.0). Default: 0.9
    pub target_reduction: f64,

    /// Feature angle of the first outer iteration. Default: 30
    pub initial_feature_angle: f64,
    /// Feature angle growth per outer iteration. Default: 0
    pub feature_angle_increment: f64,
    /// Upper bound of the feature angle. Default: 60
    pub max_feature_angle: f64,

    /// Error fraction of the first outer iteration. Default: 0
    pub initial_error: f64,
    /// Error fraction growth per outer iteration. Default: 0.005
    pub error_increment: f64,
    /// Upper bound of the error fraction. Default: 0.1
    pub max_error: f64,

    /// Maximum number of outer iterations. Default: 6
    pub max_iterations: usize,
    /// Maximum number of sub-iterations per outer iteration. Default: 2
    pub max_sub_iterations: usize,

    /// Keep feature edges: vertices on them only collapse along the edge.
    /// Default: true
    pub preserve_edges: bool,
    /// Allow removal of boundary vertices. Default: true
    pub boundary_vertex_deletion: bool,
    /// Forbid operations that change the topology (holes, splits).
    /// Default: true
    pub preserve_topology: bool,

    /// Vertices with at least this many triangles are not removed. Default: 25
    pub max_vertex_degree: usize,
    /// Smallest acceptable split-plane distance is `1 / max_aspect_ratio` of
    /// the diagonal length. Default: 25
    pub max_aspect_ratio: f64,

    pub strategy: Strategy,

    /// Split complex vertices once no other candidate remains. Only
    /// effective when `preserve_topology` is off. Default: true
    pub splitting: bool,
    /// Dihedral angle separating split groups. Default: 75
    pub split_angle: f64,

    /// Error ratio between consecutive removals that marks an inflection
    /// point. Default: 10
    pub inflection_point_ratio: f64,

    /// Emit the cumulative error of every output point. Default: false
    pub generate_error_scalars: bool,
    /// Record a progressive mesh of every operation. Default: false
    pub record_progressive: bool,
}

impl Default for DecimateParams {
    fn default() -> Self {
        Self {
            target_reduction: 0.9,
            initial_feature_angle: 30.0,
            feature_angle_increment: 0.0,
            max_feature_angle: 60.0,
            initial_error: 0.0,
            error_increment: 0.005,
            max_error: 0.1,
            max_iterations: 6,
            max_sub_iterations: 2,
            preserve_edges: true,
            boundary_vertex_deletion: true,
            preserve_topology: true,
            max_vertex_degree: 25,
            max_aspect_ratio: 25.0,
            strategy: Strategy::EdgeCollapse,
            splitting: true,
            split_angle: 75.0,
            inflection_point_ratio: 10.0,
            generate_error_scalars: false,
            record_progressive: false,
        }
    }
}

impl DecimateParams {
    /// Create params removing the given fraction of triangles.
    #[must_use]
    pub fn with_target_reduction(reduction: f64) -> Self {
        Self {
            target_reduction: reduction.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    /// Topology may change; complex vertices are split and removed.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            target_reduction: 0.95,
            preserve_topology: false,
            splitting: true,
            max_error: 0.2,
            error_increment: 0.02,
            max_iterations: 10,
            ..Default::default()
        }
    }

    /// Small error budget, sharp features and boundaries kept.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            target_reduction: 0.5,
            boundary_vertex_deletion: false,
            max_error: 0.01,
            error_increment: 0.002,
            max_aspect_ratio: 10.0,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_feature_angle(mut self, degrees: f64) -> Self {
        self.initial_feature_angle = degrees;
        self.max_feature_angle = self.max_feature_angle.max(degrees);
        self
    }

    /// Set the error schedule: initial fraction, growth and bound.
    #[must_use]
    pub const fn with_error_schedule(mut self, initial: f64, increment: f64, max: f64) -> Self {
        self.initial_error = initial;
        self.error_increment = increment;
        self.max_error = max;
        self
    }

    #[must_use]
    pub const fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    #[must_use]
    pub const fn with_preserve_edges(mut self, preserve: bool) -> Self {
        self.preserve_edges = preserve;
        self
    }

    #[must_use]
    pub const fn with_boundary_vertex_deletion(mut self, delete: bool) -> Self {
        self.boundary_vertex_deletion = delete;
        self
    }

    #[must_use]
    pub const fn with_preserve_topology(mut self, preserve: bool) -> Self {
        self.preserve_topology = preserve;
        self
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub const fn with_splitting(mut self, splitting: bool) -> Self {
        self.splitting = splitting;
        self
    }

    #[must_use]
    pub const fn with_error_scalars(mut self, generate: bool) -> Self {
        self.generate_error_scalars = generate;
        self
    }

    #[must_use]
    pub const fn with_progressive(mut self, record: bool) -> Self {
        self.record_progressive = record;
        self
    }

    /// Whether the run leaves the input unchanged.
    pub fn is_pass_through(&self) -> bool {
        self.target_reduction <= 0.0 || self.max_iterations == 0
    }

    /// Whether complex vertices are deferred to a split phase.
    pub fn defers_splits(&self) -> bool {
        self.splitting && !self.preserve_topology
    }

    /// Feature angle of outer iteration `k`.
    pub fn feature_angle_at(&self, k: usize) -> f64 {
        (self.initial_feature_angle + k as f64 * self.feature_angle_increment)
            .min(self.max_feature_angle)
    }

    /// Error fraction of outer iteration `k`.
    pub fn error_at(&self, k: usize) -> f64 {
        (self.initial_error + k as f64 * self.error_increment).min(self.max_error)
    }

    /// Check ranges.
    pub fn validate(&self) -> Result<()> {
        fn check(ok: bool, message: impl FnOnce() -> String) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(Error::InvalidParameter(message()))
            }
        }

        check((0.0..=1.0).contains(&self.target_reduction), || {
            format!("target_reduction must be in [0, 1], got {}", self.target_reduction)
        })?;
        for (name, angle) in [
            ("initial_feature_angle", self.initial_feature_angle),
            ("max_feature_angle", self.max_feature_angle),
            ("split_angle", self.split_angle),
        ] {
            check((0.0..=180.0).contains(&angle), || {
                format!("{name} must be in [0, 180] degrees, got {angle}")
            })?;
        }
        for (name, value) in [
            ("feature_angle_increment", self.feature_angle_increment),
            ("initial_error", self.initial_error),
            ("error_increment", self.error_increment),
            ("max_error", self.max_error),
        ] {
            check(value.is_finite() && value >= 0.0, || {
                format!("{name} must be a non-negative number, got {value}")
            })?;
        }
        check(self.max_vertex_degree >= 3, || {
            format!("max_vertex_degree must be at least 3, got {}", self.max_vertex_degree)
        })?;
        check(self.max_aspect_ratio >= 1.0, || {
            format!("max_aspect_ratio must be at least 1, got {}", self.max_aspect_ratio)
        })?;
        check(self.inflection_point_ratio > 0.0, || {
            format!(
                "inflection_point_ratio must be positive, got {}",
                self.inflection_point_ratio
            )
        })
    }
}
