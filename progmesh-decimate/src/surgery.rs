//! Topology surgery
//!
//! Edge collapse, loop retriangulation and vertex split. Each operation is
//! planned and validated against the unmodified topology first; only a valid
//! plan is turned into an [`Operation`] and applied, so a failed attempt never
//! mutates the mesh.

use crate::classify::{build_loop, VertexClass, VertexLoop};
use crate::evaluate::LoopEvaluation;
use crate::progressive::{Operation, OperationKind, TriangleEdit};
use crate::stats::FailureReason;
use crate::topology::{MeshTopology, PointId, TriangleId};
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;
use tracing::trace;

/// Limits shared by all surgery operations of a run.
#[derive(Debug, Clone, Copy)]
pub struct SurgeryLimits {
    /// Absolute distance tolerance derived from the bounding box.
    pub tolerance: f64,
    pub preserve_topology: bool,
    pub max_aspect_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Empty,
    Above,
    Below,
}

/// Side of the plane all `distances` fall on, `None` when they straddle it
/// or come within `tolerance`.
fn side_of(distances: impl IntoIterator<Item = f64>, tolerance: f64) -> Option<Side> {
    let mut side = Side::Empty;
    for d in distances {
        let s = if d > tolerance {
            Side::Above
        } else if d < -tolerance {
            Side::Below
        } else {
            return None;
        };
        if side == Side::Empty {
            side = s;
        } else if side != s {
            return None;
        }
    }
    Some(side)
}

/// Plane through the segment `a`–`b` containing the direction `normal`.
struct SplitPlane {
    origin: Point3<f64>,
    normal: Vector3<f64>,
    length: f64,
}

impl SplitPlane {
    fn new(a: &Point3<f64>, b: &Point3<f64>, normal: &Vector3<f64>, tolerance: f64) -> Option<Self> {
        let direction = b - a;
        let length = direction.norm();
        if length <= tolerance {
            return None;
        }
        let normal = direction.cross(normal).try_normalize(f64::EPSILON)?;
        Some(Self {
            origin: *a,
            normal,
            length,
        })
    }

    fn distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&(p - self.origin))
    }

    /// Whether the two groups lie strictly on opposite sides. Returns the
    /// smallest absolute distance when they do.
    fn separates(
        &self,
        first: &[Point3<f64>],
        second: &[Point3<f64>],
        tolerance: f64,
    ) -> Option<f64> {
        let a = side_of(first.iter().map(|p| self.distance(p)), tolerance)?;
        let b = side_of(second.iter().map(|p| self.distance(p)), tolerance)?;
        if a == b {
            return None;
        }
        let closest = first
            .iter()
            .chain(second)
            .map(|p| self.distance(p).abs())
            .fold(f64::INFINITY, f64::min);
        Some(closest)
    }
}

/// Split-plane star test for collapsing onto loop position `target`.
///
/// Every diagonal from the target to a non-adjacent loop vertex becomes an
/// edge after the collapse; the loop vertices on either side of each such
/// diagonal must stay on opposite sides of its split plane.
fn star_test(
    positions: &[Point3<f64>],
    closed: bool,
    target: usize,
    normal: &Vector3<f64>,
    tolerance: f64,
) -> bool {
    let n = positions.len();
    let origin = &positions[target];
    let diagonals: Vec<usize> = if closed {
        (0..n.saturating_sub(3)).map(|j| (target + 2 + j) % n).collect()
    } else {
        (0..n).filter(|&k| k.abs_diff(target) >= 2).collect()
    };

    diagonals.into_iter().all(|k| {
        let Some(plane) = SplitPlane::new(origin, &positions[k], normal, tolerance) else {
            return false;
        };
        let (first, second): (Vec<_>, Vec<_>) = if closed {
            let first = (1..(k + n - target) % n).map(|s| positions[(target + s) % n]);
            let second = (1..(target + n - k) % n).map(|s| positions[(k + s) % n]);
            (first.collect(), second.collect())
        } else {
            let (lo, hi) = (target.min(k), target.max(k));
            let inner = positions[lo + 1..hi].to_vec();
            let outer = positions[..lo]
                .iter()
                .chain(&positions[hi + 1..])
                .copied()
                .collect();
            (inner, outer)
        };
        plane.separates(&first, &second, tolerance).is_some()
    })
}

/// Loop positions to try as collapse targets, most preferred first.
fn collapse_targets(
    topology: &MeshTopology,
    star: &VertexLoop,
    eval: &LoopEvaluation,
) -> Vec<usize> {
    let x = topology.position(star.pole);
    let mut targets = match eval.class {
        VertexClass::Simple => (0..star.len()).collect(),
        VertexClass::InteriorEdge => eval.features.clone(),
        VertexClass::EdgeEnd => vec![eval.features[0]],
        VertexClass::Boundary => vec![0, star.len() - 1],
        VertexClass::CrackTip => return vec![0],
        _ => return Vec::new(),
    };
    let distance = |i: usize| (topology.position(star.vertices[i]) - x).norm_squared();
    targets.sort_by(|&a, &b| distance(a).total_cmp(&distance(b)));
    targets
}

/// Remove the pole by merging it into one of its loop vertices.
///
/// Crack tips collapse onto the first chain end and zip the second end into
/// it.
pub fn collapse(
    topology: &mut MeshTopology,
    star: &VertexLoop,
    eval: &LoopEvaluation,
    limits: &SurgeryLimits,
) -> Result<Operation, FailureReason> {
    if star.triangles.len() == 1 && limits.preserve_topology {
        return Err(FailureReason::SplitPlane);
    }
    let crack = eval.class == VertexClass::CrackTip;
    let n = star.len();
    // the zipped crack end is not part of the star seen by the target
    let effective = if crack { n - 1 } else { n };
    let positions: Vec<Point3<f64>> = star.vertices[..effective]
        .iter()
        .map(|&v| *topology.position(v))
        .collect();

    if crack && !crack_can_zip(topology, star) {
        return Err(FailureReason::NonManifold);
    }

    for target in collapse_targets(topology, star, eval) {
        if !star_test(&positions, star.closed, target, &eval.normal, limits.tolerance) {
            continue;
        }
        let t = star.vertices[target];
        let linked = (0..effective)
            .filter(|&k| k != target && !star.adjacent(k, target))
            .any(|k| topology.is_edge(t, star.vertices[k]));
        if linked {
            continue;
        }
        let Some(edits) = collapse_edits(topology, star, t, crack) else {
            continue;
        };

        let mut removed_points = vec![star.pole];
        if crack {
            removed_points.push(star.vertices[n - 1]);
        }
        if leaves_orphans(topology, &edits, &removed_points) {
            continue;
        }
        let op = Operation {
            kind: OperationKind::Collapse,
            pole: star.pole,
            target: Some(t),
            position: *topology.position(star.pole),
            error: 0.0,
            removed_points,
            added_points: Vec::new(),
            edits,
        };
        trace!(pole = star.pole, target = t, "Collapse");
        op.apply(topology);
        return Ok(op);
    }
    Err(FailureReason::SplitPlane)
}

/// Crack ends may only be merged when they share no triangle and no
/// neighbour other than the pole.
fn crack_can_zip(topology: &MeshTopology, star: &VertexLoop) -> bool {
    let (first, last) = (star.vertices[0], star.vertices[star.len() - 1]);
    if topology.is_edge(first, last) {
        return false;
    }
    let ours = topology.neighbors(first);
    topology
        .neighbors(last)
        .iter()
        .all(|v| *v == star.pole || ours.binary_search(v).is_err())
}

/// Whether applying `edits` would leave a surviving point without triangles.
fn leaves_orphans(topology: &MeshTopology, edits: &[TriangleEdit], removed: &[PointId]) -> bool {
    let mut delta: HashMap<PointId, isize> = HashMap::new();
    for edit in edits {
        let before = edit.before.as_ref().map_or(&[][..], |c| &c[..]);
        let after = edit.after.as_ref().map_or(&[][..], |c| &c[..]);
        for p in before.iter().filter(|p| !after.contains(p)) {
            *delta.entry(*p).or_default() -= 1;
        }
        for p in after.iter().filter(|p| !before.contains(p)) {
            *delta.entry(*p).or_default() += 1;
        }
    }
    delta
        .into_iter()
        .filter(|(p, _)| !removed.contains(p))
        .any(|(p, d)| topology.triangles_at(p).len() as isize + d <= 0)
}

/// Triangle edits collapsing the pole onto `target`; `None` when a rewritten
/// triangle would duplicate an existing one.
fn collapse_edits(
    topology: &MeshTopology,
    star: &VertexLoop,
    target: PointId,
    crack: bool,
) -> Option<Vec<TriangleEdit>> {
    let zipped = crack.then(|| star.vertices[star.len() - 1]);
    let mut edits = Vec::with_capacity(star.triangles.len());

    for &t in &star.triangles {
        let corners = topology.corners_of(t);
        let degenerate =
            corners.contains(&target) || zipped.is_some_and(|z| corners.contains(&z));
        let after = if degenerate {
            None
        } else {
            let rewritten = corners.map(|c| if c == star.pole { target } else { c });
            let [a, b, c] = rewritten;
            if topology.find_triangle(a, b, c).is_some() {
                return None;
            }
            Some(rewritten)
        };
        edits.push(TriangleEdit {
            triangle: t,
            before: Some(corners),
            after,
        });
    }

    if let Some(z) = zipped {
        for &t in topology.triangles_at(z) {
            if star.triangles.contains(&t) {
                continue;
            }
            let corners = topology.corners_of(t);
            edits.push(TriangleEdit {
                triangle: t,
                before: Some(corners),
                after: Some(corners.map(|c| if c == z { target } else { c })),
            });
        }
    }
    Some(edits)
}

/// Remove the pole and fill its loop by recursive bisection.
///
/// Interior-edge loops are first cut along their feature diagonal. Each
/// remaining polygon is cut by the diagonal whose split plane keeps the two
/// halves furthest apart relative to its length.
pub fn retriangulate(
    topology: &mut MeshTopology,
    star: &VertexLoop,
    eval: &LoopEvaluation,
    limits: &SurgeryLimits,
) -> Result<Operation, FailureReason> {
    if eval.class == VertexClass::CrackTip {
        return Err(FailureReason::TriangulationFailure);
    }
    if star.triangles.len() == 1 && limits.preserve_topology {
        return Err(FailureReason::TriangulationFailure);
    }
    let n = star.len();
    if !star.closed && n >= 3 && topology.is_edge(star.vertices[0], star.vertices[n - 1]) {
        return Err(FailureReason::TriangulationFailure);
    }

    let triangles = triangulate_loop(topology, star, eval, limits)?;

    let mut edits = Vec::with_capacity(star.triangles.len());
    for (k, &t) in star.triangles.iter().enumerate() {
        let after = triangles.get(k).map(|&[a, b, c]| {
            [star.vertices[a], star.vertices[b], star.vertices[c]]
        });
        edits.push(TriangleEdit {
            triangle: t,
            before: Some(topology.corners_of(t)),
            after,
        });
    }

    if leaves_orphans(topology, &edits, &[star.pole]) {
        return Err(FailureReason::TriangulationFailure);
    }

    let op = Operation {
        kind: OperationKind::Retriangulate,
        pole: star.pole,
        target: None,
        position: *topology.position(star.pole),
        error: 0.0,
        removed_points: vec![star.pole],
        added_points: Vec::new(),
        edits,
    };
    trace!(pole = star.pole, triangles = triangles.len(), "Retriangulate");
    op.apply(topology);
    Ok(op)
}

/// Triangles (as loop positions) covering the loop polygon.
fn triangulate_loop(
    topology: &MeshTopology,
    star: &VertexLoop,
    eval: &LoopEvaluation,
    limits: &SurgeryLimits,
) -> Result<Vec<[usize; 3]>, FailureReason> {
    let n = star.len();
    let positions: Vec<Point3<f64>> = star.vertices.iter().map(|&v| *topology.position(v)).collect();
    let min_score = 1.0 / limits.max_aspect_ratio;
    let mut worklist: Vec<Vec<usize>> = Vec::new();
    let mut triangles = Vec::with_capacity(n.saturating_sub(2));

    let polygon: Vec<usize> = (0..n).collect();
    if eval.class == VertexClass::InteriorEdge && !star.adjacent(eval.features[0], eval.features[1]) {
        let (i, j) = (eval.features[0], eval.features[1]);
        if topology.is_edge(star.vertices[i], star.vertices[j]) {
            return Err(FailureReason::TriangulationFailure);
        }
        let (first, second) = bisect(&polygon, i, j);
        let plane = SplitPlane::new(&positions[i], &positions[j], &eval.normal, limits.tolerance)
            .ok_or(FailureReason::TriangulationFailure)?;
        let inner: Vec<_> = first[1..first.len() - 1].iter().map(|&k| positions[k]).collect();
        let outer: Vec<_> = second[1..second.len() - 1].iter().map(|&k| positions[k]).collect();
        plane
            .separates(&inner, &outer, limits.tolerance)
            .ok_or(FailureReason::TriangulationFailure)?;
        worklist.push(first);
        worklist.push(second);
    } else {
        worklist.push(polygon);
    }

    while let Some(polygon) = worklist.pop() {
        let m = polygon.len();
        if m < 3 {
            continue;
        }
        if m == 3 {
            let corners = [polygon[0], polygon[1], polygon[2]];
            let [a, b, c] = corners.map(|k| star.vertices[k]);
            if limits.preserve_topology && topology.find_triangle(a, b, c).is_some() {
                return Err(FailureReason::TriangulationFailure);
            }
            let [pa, pb, pc] = corners.map(|k| positions[k]);
            let cross = (pb - pa).cross(&(pc - pa));
            let area = cross.norm() / 2.0;
            if area <= limits.tolerance * limits.tolerance || cross.dot(&eval.normal) <= 0.0 {
                return Err(FailureReason::TriangulationFailure);
            }
            let longest = [pb - pa, pc - pb, pa - pc]
                .iter()
                .map(|e| e.norm_squared())
                .fold(0.0, f64::max);
            if 2.0 * area / longest < min_score {
                return Err(FailureReason::AspectRatio);
            }
            triangles.push(corners);
            continue;
        }

        let mut best: Option<(f64, usize, usize)> = None;
        let mut separable = false;
        for i in 0..m {
            for j in i + 2..m {
                if i == 0 && j == m - 1 {
                    continue;
                }
                let (a, b) = (polygon[i], polygon[j]);
                if topology.is_edge(star.vertices[a], star.vertices[b]) {
                    continue;
                }
                let Some(plane) =
                    SplitPlane::new(&positions[a], &positions[b], &eval.normal, limits.tolerance)
                else {
                    continue;
                };
                let inner: Vec<_> = polygon[i + 1..j].iter().map(|&k| positions[k]).collect();
                let outer: Vec<_> = polygon[j + 1..]
                    .iter()
                    .chain(&polygon[..i])
                    .map(|&k| positions[k])
                    .collect();
                let Some(closest) = plane.separates(&inner, &outer, limits.tolerance) else {
                    continue;
                };
                separable = true;
                let score = closest / plane.length;
                if score >= min_score && best.map_or(true, |(s, _, _)| score > s) {
                    best = Some((score, i, j));
                }
            }
        }

        match best {
            Some((_, i, j)) => {
                let (first, second) = bisect(&polygon, i, j);
                worklist.push(first);
                worklist.push(second);
            }
            None if separable => return Err(FailureReason::AspectRatio),
            None => return Err(FailureReason::TriangulationFailure),
        }
    }
    Ok(triangles)
}

/// Cut a polygon along the diagonal between positions `i < j`, keeping the
/// cyclic vertex order in both halves.
fn bisect(polygon: &[usize], i: usize, j: usize) -> (Vec<usize>, Vec<usize>) {
    let (i, j) = (i.min(j), i.max(j));
    let first = polygon[i..=j].to_vec();
    let second = polygon[j..].iter().chain(&polygon[..=i]).copied().collect();
    (first, second)
}

/// Divide the fan of a complex point between coincident copies.
///
/// Triangles stay together when they share a manifold edge whose dihedral
/// is below the split angle. A fan that forms a single such group is cut
/// into chunks along its walk order when it has at least `max_degree`
/// triangles.
pub fn split_vertex(
    topology: &mut MeshTopology,
    pole: PointId,
    split_cos: f64,
    max_degree: usize,
) -> Result<Operation, FailureReason> {
    let fan = topology.triangles_at(pole).to_vec();
    let mut groups = fan_groups(topology, pole, &fan, split_cos);

    if groups.len() < 2 {
        if fan.len() < max_degree {
            return Err(FailureReason::NonManifold);
        }
        let star = build_loop(topology, pole).map_err(|_| FailureReason::NonManifold)?;
        let chunk = (max_degree / 2).max(1);
        groups = star.triangles.chunks(chunk).map(<[_]>::to_vec).collect();
        if groups.len() < 2 {
            return Err(FailureReason::DegreeExceeded);
        }
    }

    let mut added_points = Vec::with_capacity(groups.len() - 1);
    let mut edits = Vec::new();
    for group in &groups[1..] {
        let copy = topology.split_point(pole);
        added_points.push(copy);
        for &t in group {
            let corners = topology.corners_of(t);
            edits.push(TriangleEdit {
                triangle: t,
                before: Some(corners),
                after: Some(corners.map(|c| if c == pole { copy } else { c })),
            });
        }
    }

    let op = Operation {
        kind: OperationKind::Split,
        pole,
        target: added_points.first().copied(),
        position: *topology.position(pole),
        error: 0.0,
        removed_points: Vec::new(),
        added_points,
        edits,
    };
    trace!(pole, groups = groups.len(), "Split");
    op.apply(topology);
    Ok(op)
}

/// Connected components of a fan joined across manifold, non-feature edges
/// at the pole, in order of first appearance.
fn fan_groups(
    topology: &MeshTopology,
    pole: PointId,
    fan: &[TriangleId],
    split_cos: f64,
) -> Vec<Vec<TriangleId>> {
    let index: HashMap<TriangleId, usize> = fan.iter().enumerate().map(|(i, &t)| (t, i)).collect();
    let mut parent: Vec<usize> = (0..fan.len()).collect();

    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for (i, &t) in fan.iter().enumerate() {
        for corner in topology.corners_of(t) {
            if corner == pole {
                continue;
            }
            let neighbors = topology.edge_neighbors(t, pole, corner);
            let [other] = neighbors.as_slice() else {
                continue;
            };
            if topology.normal_of(t).dot(topology.normal_of(*other)) <= split_cos {
                continue;
            }
            if let Some(&j) = index.get(other) {
                let (a, b) = (root(&mut parent, i), root(&mut parent, j));
                parent[a.max(b)] = a.min(b);
            }
        }
    }

    let mut groups: Vec<Vec<TriangleId>> = Vec::new();
    let mut slot: HashMap<usize, usize> = HashMap::new();
    for (i, &t) in fan.iter().enumerate() {
        let r = root(&mut parent, i);
        let g = *slot.entry(r).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[g].push(t);
    }
    groups
}
