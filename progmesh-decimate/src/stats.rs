//! Run statistics.

// Point and triangle counts don't overflow in practice
#![allow(clippy::cast_precision_loss)]

use crate::classify::VertexClass;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a removal attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    NonManifold,
    DegreeExceeded,
    DegenerateLoop,
    /// No collapse target passed the split-plane test.
    SplitPlane,
    /// No valid diagonal or a rejected triangle during retriangulation.
    TriangulationFailure,
    /// Valid diagonals existed but all were below the aspect ratio limit.
    AspectRatio,
}

/// Number of rejections per [`FailureReason`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCounts {
    pub non_manifold: usize,
    pub degree_exceeded: usize,
    pub degenerate_loop: usize,
    pub split_plane: usize,
    pub triangulation_failure: usize,
    pub aspect_ratio: usize,
}

impl FailureCounts {
    pub fn record(&mut self, reason: FailureReason) {
        *self.slot(reason) += 1;
    }

    pub fn get(&self, reason: FailureReason) -> usize {
        match reason {
            FailureReason::NonManifold => self.non_manifold,
            FailureReason::DegreeExceeded => self.degree_exceeded,
            FailureReason::DegenerateLoop => self.degenerate_loop,
            FailureReason::SplitPlane => self.split_plane,
            FailureReason::TriangulationFailure => self.triangulation_failure,
            FailureReason::AspectRatio => self.aspect_ratio,
        }
    }

    pub fn total(&self) -> usize {
        self.non_manifold
            + self.degree_exceeded
            + self.degenerate_loop
            + self.split_plane
            + self.triangulation_failure
            + self.aspect_ratio
    }

    fn slot(&mut self, reason: FailureReason) -> &mut usize {
        match reason {
            FailureReason::NonManifold => &mut self.non_manifold,
            FailureReason::DegreeExceeded => &mut self.degree_exceeded,
            FailureReason::DegenerateLoop => &mut self.degenerate_loop,
            FailureReason::SplitPlane => &mut self.split_plane,
            FailureReason::TriangulationFailure => &mut self.triangulation_failure,
            FailureReason::AspectRatio => &mut self.aspect_ratio,
        }
    }
}

/// Census of surviving points per [`VertexClass`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    counts: [usize; 9],
}

impl ClassCounts {
    pub fn record(&mut self, class: VertexClass) {
        self.counts[class as usize] += 1;
    }

    pub fn get(&self, class: VertexClass) -> usize {
        self.counts[class as usize]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Non-zero counts in [`VertexClass::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (VertexClass, usize)> + '_ {
        VertexClass::ALL
            .into_iter()
            .map(|class| (class, self.get(class)))
            .filter(|&(_, count)| count > 0)
    }
}

/// Statistics of a decimation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecimationStats {
    pub input_points: usize,
    pub input_triangles: usize,
    /// Input faces skipped because they repeat a corner.
    pub degenerate_faces: usize,
    pub output_points: usize,
    pub output_triangles: usize,
    /// Outer iterations started.
    pub iterations: usize,
    /// Sub-iterations run across all outer iterations.
    pub sub_iterations: usize,
    pub collapses: usize,
    pub retriangulations: usize,
    pub splits: usize,
    /// Classes of the surviving points at the end of the run.
    pub classes: ClassCounts,
    /// Rejections recorded during the run.
    pub failures: FailureCounts,
    /// The run was stopped by the progress monitor.
    pub cancelled: bool,
}

impl DecimationStats {
    /// Fraction of input triangles removed.
    #[must_use]
    pub fn reduction(&self) -> f64 {
        if self.input_triangles == 0 {
            0.0
        } else {
            1.0 - self.output_triangles as f64 / self.input_triangles as f64
        }
    }

    /// Number of points removed by collapse or retriangulation.
    #[must_use]
    pub fn removals(&self) -> usize {
        self.collapses + self.retriangulations
    }
}

impl fmt::Display for DecimationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Decimation: {} → {} triangles ({:.1}% reduction, {} collapses, {} retriangulations, {} splits, {} iterations)",
            self.input_triangles,
            self.output_triangles,
            self.reduction() * 100.0,
            self.collapses,
            self.retriangulations,
            self.splits,
            self.iterations
        )?;
        if self.cancelled {
            write!(f, " [cancelled]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_counts() {
        let mut failures = FailureCounts::default();
        failures.record(FailureReason::NonManifold);
        failures.record(FailureReason::NonManifold);
        failures.record(FailureReason::AspectRatio);
        assert_eq!(failures.get(FailureReason::NonManifold), 2);
        assert_eq!(failures.aspect_ratio, 1);
        assert_eq!(failures.total(), 3);
    }

    #[test]
    fn test_class_counts() {
        let mut classes = ClassCounts::default();
        classes.record(VertexClass::Corner);
        classes.record(VertexClass::Corner);
        classes.record(VertexClass::Simple);
        assert_eq!(classes.get(VertexClass::Corner), 2);
        assert_eq!(classes.total(), 3);
        let listed: Vec<_> = classes.iter().collect();
        assert_eq!(
            listed,
            vec![(VertexClass::Simple, 1), (VertexClass::Corner, 2)]
        );
    }

    #[test]
    fn test_reduction_and_display() {
        let stats = DecimationStats {
            input_triangles: 200,
            output_triangles: 50,
            collapses: 70,
            ..Default::default()
        };
        assert!((stats.reduction() - 0.75).abs() < 1e-12);
        let text = stats.to_string();
        assert!(text.contains("200 → 50 triangles"));
        assert!(text.contains("75.0% reduction"));
    }
}
