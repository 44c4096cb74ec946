//! Progressive decimation driver
//!
//! Runs outer iterations with a growing error budget and feature angle. Each
//! outer iteration runs sub-iterations that rebuild the scheduler over every
//! live point and pop candidates until the queue is exhausted, the target
//! reduction is reached or the progress monitor cancels the run.

// Point and triangle counts don't overflow in practice
#![allow(clippy::cast_precision_loss)]

use crate::classify::{classify_vertex, VertexClass, VertexLoop};
use crate::evaluate::{evaluate_loop, FeatureCriteria, LoopEvaluation};
use crate::metric::{removal_error, ErrorBudget};
use crate::params::{DecimateParams, Strategy};
use crate::progressive::{Operation, OperationKind, ProgressiveMesh};
use crate::scheduler::{Key, Rekey, Scheduler};
use crate::stats::{ClassCounts, DecimationStats, FailureCounts, FailureReason};
use crate::surgery::{collapse, retriangulate, split_vertex, SurgeryLimits};
use crate::topology::{MeshTopology, PointId};
use crate::MeshSimplifier;
use progmesh_core::{to_f32, Bounded, Error, Result, TriangleMesh};
use std::ops::ControlFlow;
use tracing::{debug, info};

/// Pops between two calls of the progress monitor.
pub const CHECKPOINT_INTERVAL: usize = 256;

/// Split candidates go after every removal candidate of equal error.
const SPLIT_RANK: u8 = 3;

/// Scale of the absolute tolerance relative to the bounding box diagonal.
const TOLERANCE_FRACTION: f64 = 1e-5;

/// Receives progress between batches of pops and may cancel the run.
pub trait ProgressMonitor {
    /// Called with the fraction of the target reduction achieved so far.
    fn progress(&mut self, fraction: f64) -> ControlFlow<()>;
}

impl<F> ProgressMonitor for F
where
    F: FnMut(f64) -> ControlFlow<()>,
{
    fn progress(&mut self, fraction: f64) -> ControlFlow<()> {
        self(fraction)
    }
}

/// Result of a decimation run.
#[derive(Debug, Clone)]
pub struct DecimationOutput {
    /// The decimated mesh. Normals and colors are carried over from the
    /// source point of every output point.
    pub mesh: TriangleMesh,
    /// Input point id → output point id, `None` for removed points.
    pub point_map: Vec<Option<usize>>,
    /// Output point id → input point it derives from.
    pub source_points: Vec<usize>,
    /// Cumulative error of every output point, when requested.
    pub error_scalars: Option<Vec<f64>>,
    pub stats: DecimationStats,
    /// Operation log, when requested.
    pub progressive: Option<ProgressiveMesh>,
}

/// Decision for a single point under the current configuration.
enum Candidate {
    Remove {
        star: VertexLoop,
        eval: LoopEvaluation,
        error: f64,
    },
    Split,
    Defer,
    Skip(Option<FailureReason>),
}

/// Mutable state of one run: the topology plus everything derived from the
/// current outer iteration.
struct Engine<'a> {
    params: &'a DecimateParams,
    topology: MeshTopology,
    original_triangles: usize,
    diagonal: f64,
    tolerance: f64,
    feature_cos: f64,
    iteration_feature_cos: f64,
    split_cos: f64,
    budget: ErrorBudget,
    split_phase: bool,
    iterations: usize,
    sub_iterations: usize,
    failures: FailureCounts,
    collapses: usize,
    retriangulations: usize,
    splits: usize,
    operations: Vec<Operation>,
}

impl<'a> Engine<'a> {
    fn new(params: &'a DecimateParams, mesh: &TriangleMesh) -> Result<Self> {
        let topology = MeshTopology::from_mesh(mesh)?;
        let diagonal = mesh.diagonal_length();
        let tolerance = TOLERANCE_FRACTION * diagonal;
        let feature_cos = params.feature_angle_at(0).to_radians().cos();
        Ok(Self {
            params,
            original_triangles: topology.triangle_count(),
            topology,
            diagonal,
            tolerance,
            feature_cos,
            iteration_feature_cos: feature_cos,
            split_cos: params.split_angle.to_radians().cos(),
            budget: ErrorBudget::new(0.0, diagonal, tolerance),
            split_phase: false,
            iterations: 0,
            sub_iterations: 0,
            failures: FailureCounts::default(),
            collapses: 0,
            retriangulations: 0,
            splits: 0,
            operations: Vec::new(),
        })
    }

    /// Set the feature angle and error budget of outer iteration `k`.
    fn configure(&mut self, k: usize) {
        let angle = self.params.feature_angle_at(k);
        let fraction = self.params.error_at(k);
        self.iteration_feature_cos = angle.to_radians().cos();
        self.budget = ErrorBudget::new(fraction, self.diagonal, self.tolerance);
        self.iterations += 1;
        debug!(
            iteration = k,
            feature_angle = angle,
            error_fraction = fraction,
            "Starting outer iteration"
        );
    }

    fn reduction(&self) -> f64 {
        if self.original_triangles == 0 {
            return 0.0;
        }
        let remaining = self.topology.triangle_count().min(self.original_triangles);
        (self.original_triangles - remaining) as f64 / self.original_triangles as f64
    }

    fn target_reached(&self) -> bool {
        self.original_triangles == 0 || self.reduction() >= self.params.target_reduction
    }

    fn progress(&self) -> f64 {
        if self.params.target_reduction <= 0.0 {
            1.0
        } else {
            (self.reduction() / self.params.target_reduction).min(1.0)
        }
    }

    fn criteria(&self) -> FeatureCriteria {
        FeatureCriteria {
            feature_cos: self.feature_cos,
            preserve_edges: self.params.preserve_edges,
            area_tolerance: self.tolerance * self.tolerance,
        }
    }

    fn limits(&self) -> SurgeryLimits {
        SurgeryLimits {
            tolerance: self.tolerance,
            preserve_topology: self.params.preserve_topology,
            max_aspect_ratio: self.params.max_aspect_ratio,
        }
    }

    fn analyze(&self, point: PointId) -> Candidate {
        if !self.topology.is_point_alive(point) {
            return Candidate::Skip(None);
        }
        let star = match classify_vertex(&self.topology, point, self.params.max_vertex_degree) {
            Ok((_, star)) => star,
            Err(class) => return self.complex(class),
        };
        let eval = match evaluate_loop(&self.topology, &star, &self.criteria()) {
            Ok(eval) => eval,
            Err(_) => return Candidate::Skip(Some(FailureReason::DegenerateLoop)),
        };
        if eval.class.is_complex() {
            return self.complex(eval.class);
        }
        if eval.class.is_boundary() && !self.params.boundary_vertex_deletion {
            return Candidate::Skip(None);
        }
        if star.triangles.len() == 1 && self.params.preserve_topology {
            return Candidate::Skip(None);
        }
        let Some(error) = removal_error(&self.topology, &star, &eval) else {
            return Candidate::Skip(None);
        };
        if !self.budget.admits(error, self.topology.error(point)) {
            return Candidate::Skip(None);
        }
        Candidate::Remove { star, eval, error }
    }

    fn complex(&self, class: VertexClass) -> Candidate {
        let reason = match class {
            VertexClass::NonManifold => Some(FailureReason::NonManifold),
            VertexClass::HighDegree => Some(FailureReason::DegreeExceeded),
            // a point without triangles
            VertexClass::Degenerate => return Candidate::Skip(None),
            _ => None,
        };
        if !self.params.defers_splits() {
            Candidate::Skip(reason)
        } else if self.split_phase {
            Candidate::Split
        } else {
            Candidate::Defer
        }
    }

    /// Try to remove or split a popped point. Returns whether a point was
    /// removed.
    fn attempt(&mut self, point: PointId, scheduler: &mut Scheduler) -> bool {
        match self.analyze(point) {
            Candidate::Remove { star, eval, error } => {
                let limits = self.limits();
                let result = match self.params.strategy {
                    Strategy::EdgeCollapse => collapse(&mut self.topology, &star, &eval, &limits)
                        .or_else(|reason| {
                            if eval.class == VertexClass::CrackTip {
                                Err(reason)
                            } else {
                                retriangulate(&mut self.topology, &star, &eval, &limits)
                            }
                        }),
                    Strategy::Retriangulate => {
                        retriangulate(&mut self.topology, &star, &eval, &limits)
                    }
                };
                match result {
                    Ok(mut op) => {
                        let realized = error + self.topology.error(point);
                        for &v in &star.vertices {
                            self.topology.add_error(v, realized);
                        }
                        match op.kind {
                            OperationKind::Collapse => self.collapses += 1,
                            _ => self.retriangulations += 1,
                        }
                        for &removed in &op.removed_points {
                            scheduler.delete(removed);
                        }
                        scheduler.mark_progress();
                        for &v in &star.vertices {
                            if self.topology.is_point_alive(v) {
                                scheduler.insert(v, self);
                            }
                        }
                        op.error = error;
                        self.record(op);
                        true
                    }
                    Err(reason) => {
                        self.failures.record(reason);
                        scheduler.recycle(point);
                        false
                    }
                }
            }
            Candidate::Split => {
                let max_degree = self.params.max_vertex_degree;
                match split_vertex(&mut self.topology, point, self.split_cos, max_degree) {
                    Ok(op) => {
                        self.splits += 1;
                        scheduler.mark_progress();
                        let mut touched: Vec<PointId> = std::iter::once(point)
                            .chain(op.added_points.iter().copied())
                            .collect();
                        for p in touched.clone() {
                            touched.extend(self.topology.neighbors(p));
                        }
                        touched.sort_unstable();
                        touched.dedup();
                        for p in touched {
                            scheduler.insert(p, self);
                        }
                        self.record(op);
                    }
                    Err(reason) => {
                        self.failures.record(reason);
                        scheduler.recycle(point);
                    }
                }
                false
            }
            Candidate::Defer => {
                scheduler.insert_key(point, Key::Deferred);
                false
            }
            Candidate::Skip(_) => false,
        }
    }

    fn record(&mut self, op: Operation) {
        if self.params.record_progressive {
            self.operations.push(op);
        }
    }

    /// Run one sub-iteration. Returns the number of removed points, or
    /// `None` when the monitor cancelled the run.
    fn sub_iterate<M: ProgressMonitor + ?Sized>(&mut self, monitor: &mut M) -> Option<usize> {
        self.feature_cos = self.iteration_feature_cos;
        self.split_phase = false;
        self.sub_iterations += 1;

        let mut scheduler = Scheduler::new(self.params.defers_splits());
        let points: Vec<PointId> = self.topology.live_points().collect();
        for point in points {
            scheduler.insert(point, self);
        }

        let mut pops = 0usize;
        let mut removed = 0usize;
        while let Some((point, _)) = scheduler.pop(self) {
            pops += 1;
            if pops % CHECKPOINT_INTERVAL == 0 && monitor.progress(self.progress()).is_break() {
                return None;
            }
            if self.attempt(point, &mut scheduler) {
                removed += 1;
                if self.target_reached() {
                    break;
                }
            }
        }
        debug!(
            removed,
            pops,
            triangles = self.topology.triangle_count(),
            "Sub-iteration finished"
        );
        Some(removed)
    }

    /// Remap the surviving points and triangles into the output mesh.
    fn compact(&mut self, mesh: &TriangleMesh, cancelled: bool) -> DecimationOutput {
        let params = self.params;
        let classes = self.census();
        let compacted = self.topology.compact();
        let vertices = compacted.positions.iter().map(to_f32).collect();
        let mut out = TriangleMesh::from_vertices_and_faces(vertices, compacted.triangles);
        let source_points = compacted.origins;
        if let Some(normals) = &mesh.normals {
            out.normals = Some(source_points.iter().map(|&s| normals[s]).collect());
        }
        if let Some(colors) = &mesh.colors {
            out.colors = Some(source_points.iter().map(|&s| colors[s]).collect());
        }

        let mut point_map = compacted.point_map;
        point_map.truncate(mesh.vertex_count());

        let stats = self.stats(mesh, &out, classes, cancelled);
        DecimationOutput {
            mesh: out,
            point_map,
            source_points,
            error_scalars: params.generate_error_scalars.then_some(compacted.errors),
            stats,
            progressive: self.progressive(),
        }
    }

    /// Output of a run that removes nothing: the input mesh as given.
    fn pass_through(&mut self, mesh: &TriangleMesh) -> DecimationOutput {
        let classes = self.census();
        let n = mesh.vertex_count();
        DecimationOutput {
            mesh: mesh.clone(),
            point_map: (0..n).map(Some).collect(),
            source_points: (0..n).collect(),
            error_scalars: self.params.generate_error_scalars.then(|| vec![0.0; n]),
            stats: self.stats(mesh, mesh, classes, false),
            progressive: self.progressive(),
        }
    }

    fn census(&self) -> ClassCounts {
        let mut classes = ClassCounts::default();
        for point in self.topology.live_points() {
            classes.record(self.census_class(point));
        }
        classes
    }

    fn stats(
        &self,
        mesh: &TriangleMesh,
        out: &TriangleMesh,
        classes: ClassCounts,
        cancelled: bool,
    ) -> DecimationStats {
        DecimationStats {
            input_points: mesh.vertex_count(),
            input_triangles: mesh.face_count(),
            degenerate_faces: self.topology.degenerate_face_count(),
            output_points: out.vertex_count(),
            output_triangles: out.face_count(),
            iterations: self.iterations,
            sub_iterations: self.sub_iterations,
            collapses: self.collapses,
            retriangulations: self.retriangulations,
            splits: self.splits,
            classes,
            failures: self.failures,
            cancelled,
        }
    }

    fn progressive(&mut self) -> Option<ProgressiveMesh> {
        let params = self.params;
        params.record_progressive.then(|| {
            let operations = std::mem::take(&mut self.operations);
            ProgressiveMesh::new(self.topology.clone(), operations, params.inflection_point_ratio)
        })
    }

    /// Final class of a surviving point.
    fn census_class(&self, point: PointId) -> VertexClass {
        match classify_vertex(&self.topology, point, self.params.max_vertex_degree) {
            Err(class) => class,
            Ok((_, star)) => match evaluate_loop(&self.topology, &star, &self.criteria()) {
                Ok(eval) => eval.class,
                Err(class) => class,
            },
        }
    }
}

enum State {
    Initializing,
    SubIterating,
    CheckConvergence,
    NextOuterIteration,
    Compacting,
    Done(Box<DecimationOutput>),
}

/// Progressive mesh decimator.
#[derive(Debug, Clone, Default)]
pub struct Decimator {
    params: DecimateParams,
}

impl Decimator {
    pub fn new(params: DecimateParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DecimateParams {
        &self.params
    }

    /// Decimate a mesh.
    pub fn decimate(&self, mesh: &TriangleMesh) -> Result<DecimationOutput> {
        self.decimate_with_progress(mesh, &mut |_fraction: f64| ControlFlow::Continue(()))
    }

    /// Decimate a mesh, reporting progress every [`CHECKPOINT_INTERVAL`]
    /// pops. Breaking from the monitor stops the run and returns the mesh as
    /// decimated so far.
    pub fn decimate_with_progress<M: ProgressMonitor + ?Sized>(
        &self,
        mesh: &TriangleMesh,
        monitor: &mut M,
    ) -> Result<DecimationOutput> {
        let params = &self.params;
        params.validate()?;
        let mut engine = Engine::new(params, mesh)?;

        let mut state = State::Initializing;
        let mut iteration = 0usize;
        let mut sub_iteration = 0usize;
        let mut last_removed = 0usize;
        let mut cancelled = false;

        let output = loop {
            state = match state {
                State::Initializing => {
                    info!(
                        points = mesh.vertex_count(),
                        triangles = mesh.face_count(),
                        target_reduction = params.target_reduction,
                        "Starting progressive decimation"
                    );
                    if params.is_pass_through() || engine.target_reached() {
                        State::Done(Box::new(engine.pass_through(mesh)))
                    } else {
                        engine.configure(0);
                        State::SubIterating
                    }
                }
                State::SubIterating => {
                    sub_iteration += 1;
                    match engine.sub_iterate(monitor) {
                        Some(removed) => {
                            last_removed = removed;
                            State::CheckConvergence
                        }
                        None => {
                            cancelled = true;
                            State::Compacting
                        }
                    }
                }
                State::CheckConvergence => {
                    if engine.target_reached() {
                        State::Compacting
                    } else if last_removed == 0 || sub_iteration >= params.max_sub_iterations {
                        State::NextOuterIteration
                    } else {
                        State::SubIterating
                    }
                }
                State::NextOuterIteration => {
                    iteration += 1;
                    sub_iteration = 0;
                    if iteration >= params.max_iterations {
                        State::Compacting
                    } else {
                        engine.configure(iteration);
                        State::SubIterating
                    }
                }
                State::Compacting => State::Done(Box::new(engine.compact(mesh, cancelled))),
                State::Done(output) => break *output,
            };
        };

        info!(
            triangles = output.stats.output_triangles,
            points = output.stats.output_points,
            reduction = output.stats.reduction(),
            cancelled = output.stats.cancelled,
            "Decimation complete"
        );
        Ok(output)
    }
}

impl Rekey for Engine<'_> {
    fn rekey(&mut self, point: PointId) -> Key {
        match self.analyze(point) {
            Candidate::Remove { error, eval, .. } => Key::Cost {
                cost: error + self.topology.error(point),
                rank: eval.class.removal_rank(),
            },
            Candidate::Split => Key::Cost {
                cost: self.topology.error(point),
                rank: SPLIT_RANK,
            },
            Candidate::Defer => Key::Deferred,
            Candidate::Skip(reason) => {
                if let Some(reason) = reason {
                    self.failures.record(reason);
                }
                Key::Retained
            }
        }
    }

    fn relax_features(&mut self) {
        self.split_phase = true;
        self.feature_cos = self.feature_cos.min(self.split_cos);
    }
}

/// Decimate a mesh with the given parameters.
pub fn decimate(mesh: &TriangleMesh, params: &DecimateParams) -> Result<DecimationOutput> {
    Decimator::new(params.clone()).decimate(mesh)
}

impl MeshSimplifier for Decimator {
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh> {
        if !(0.0..=1.0).contains(&reduction_ratio) {
            return Err(Error::InvalidParameter(
                "Reduction ratio must be between 0.0 and 1.0".to_string(),
            ));
        }
        let params = DecimateParams {
            target_reduction: f64::from(reduction_ratio),
            ..self.params.clone()
        };
        Ok(Decimator::new(params).decimate(mesh)?.mesh)
    }
}
