//! Rebuilds the exposed surface of each triangle as a set of simple polygons.
//!
//! For one triangle, every crossing with another mesh of the group becomes an intersection
//! segment ([`PolyEdge`]). The segments and the parts of the triangle's own edges that are
//! not enclosed by another mesh form a [`PolygonGraph`], whose closed loops are the exposed
//! regions.

use bitflags::bitflags;
use glam::Vec3A;
use slotmap::{SlotMap, new_key_type};
use thiserror::Error;

use crate::{
    geometry::{polygon_normal, triangle_triangle_intersection, triangles_may_intersect, turn},
    math::{Tolerances, TriangleVertices as _},
    mesh::Mesh,
    obscuration::{SurfaceScratch, surface_hidden},
};

bitflags! {
    /// Edges of a triangle: `AB` joins corners 0 and 1, `BC` corners 1 and 2, `CA` corners 2
    /// and 0.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EdgeFlags: u8 {
        /// Corner 0 to corner 1.
        const AB = 1;
        /// Corner 1 to corner 2.
        const BC = 1 << 1;
        /// Corner 2 to corner 0.
        const CA = 1 << 2;
    }
}

impl EdgeFlags {
    /// The flag of edge `index`, starting at corner `index`.
    #[inline]
    pub fn edge(index: usize) -> Self {
        [Self::AB, Self::BC, Self::CA][index]
    }
}

bitflags! {
    /// Which endpoints of a [`PolyEdge`] lie on the triangle's boundary.
    ///
    /// Boundary endpoints terminate on a triangle edge. Free endpoints continue into another
    /// segment inside the triangle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EndpointFlags: u8 {
        /// Endpoint `a` is on the boundary.
        const A_OK = 1;
        /// Endpoint `b` is on the boundary.
        const B_OK = 1 << 1;
    }
}

/// A segment along which a triangle crosses a triangle of another mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolyEdge {
    /// The first endpoint
    pub a: Vec3A,
    /// The second endpoint
    pub b: Vec3A,
    /// Edges of the triangle that `a` lies on
    pub a_edges: EdgeFlags,
    /// Edges of the triangle that `b` lies on
    pub b_edges: EdgeFlags,
    /// Endpoints on the triangle's boundary
    pub endpoints: EndpointFlags,
    /// Index of the other mesh in the group
    pub other_mesh: usize,
}

impl PolyEdge {
    /// Edges of the triangle that the whole segment lies along.
    #[inline]
    pub fn on_edge(&self) -> EdgeFlags {
        self.a_edges & self.b_edges
    }

    /// Whether the segment cuts through the triangle rather than running along its boundary.
    #[inline]
    pub fn is_interior(&self) -> bool {
        self.on_edge().is_empty()
    }

    /// The endpoints on the triangle's boundary, with the edges each lies on.
    pub fn boundary_endpoints(&self) -> impl Iterator<Item = (Vec3A, EdgeFlags)> + '_ {
        [
            (EndpointFlags::A_OK, self.a, self.a_edges),
            (EndpointFlags::B_OK, self.b, self.b_edges),
        ]
        .into_iter()
        .filter(move |(flag, _, _)| self.endpoints.contains(*flag))
        .map(|(_, point, edges)| (point, edges))
    }
}

/// Edges of `triangle` passing within `snap` of `point`.
pub fn edges_containing(point: Vec3A, triangle: [Vec3A; 3], snap: f32) -> EdgeFlags {
    let mut flags = EdgeFlags::empty();
    for i in 0..3 {
        if distance_to_segment(point, triangle[i], triangle[(i + 1) % 3]) <= snap {
            flags |= EdgeFlags::edge(i);
        }
    }
    flags
}

fn distance_to_segment(point: Vec3A, start: Vec3A, end: Vec3A) -> f32 {
    let dir = end - start;
    let len_sq = dir.length_squared();
    if len_sq <= f32::EPSILON {
        return point.distance(start);
    }
    let t = ((point - start).dot(dir) / len_sq).clamp(0.0, 1.0);
    point.distance(start + dir * t)
}

/// Collects the intersection segments of triangle `triangle` of `group[own]` with every
/// other mesh of the group.
pub fn collect_segments(
    group: &[Mesh],
    own: usize,
    triangle: usize,
    tolerances: &Tolerances,
) -> Vec<PolyEdge> {
    let mesh = &group[own];
    let source = &mesh.triangles()[triangle];
    let positions = mesh.triangle_positions(triangle);
    let aabb = positions.aabb();
    let centroid = positions.centroid();

    let mut segments = Vec::new();
    for (other_mesh, other) in group.iter().enumerate() {
        if other_mesh == own || !aabb.intersects(other.grid().aabb()) {
            continue;
        }
        for candidate in other.grid().overlapping(&aabb) {
            let other_positions = candidate.positions(other.vertices());
            if !triangles_may_intersect(
                centroid,
                source.longest_side,
                other_positions.centroid(),
                candidate.longest_side,
            ) {
                continue;
            }
            let Some([a, b]) =
                triangle_triangle_intersection(positions, other_positions, tolerances)
            else {
                continue;
            };
            if a.distance(b) <= tolerances.snap {
                continue;
            }
            let a_edges = edges_containing(a, positions, tolerances.snap);
            let b_edges = edges_containing(b, positions, tolerances.snap);
            let mut endpoints = EndpointFlags::empty();
            endpoints.set(EndpointFlags::A_OK, !a_edges.is_empty());
            endpoints.set(EndpointFlags::B_OK, !b_edges.is_empty());
            segments.push(PolyEdge {
                a,
                b,
                a_edges,
                b_edges,
                endpoints,
                other_mesh,
            });
        }
    }
    segments
}

new_key_type! {
    /// Key of a node in a [`PolygonGraph`].
    pub struct NodeKey;
    /// Key of an edge in a [`PolygonGraph`].
    pub struct EdgeKey;
}

/// Where a graph edge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// An exposed stretch of the triangle's own boundary.
    Boundary,
    /// A piece of an intersection segment.
    Segment,
}

#[derive(Debug, Clone)]
struct Node {
    position: Vec3A,
    edges: Vec<EdgeKey>,
}

#[derive(Debug, Clone)]
struct GraphEdge {
    a: NodeKey,
    b: NodeKey,
    kind: EdgeKind,
    used: bool,
}

impl GraphEdge {
    #[inline]
    fn other(&self, node: NodeKey) -> NodeKey {
        if self.a == node { self.b } else { self.a }
    }
}

/// A closed loop found by [`PolygonGraph::trace_loops`].
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    /// The positions around the loop
    pub positions: Vec<Vec3A>,
    /// Whether every edge of the loop is an intersection segment
    pub segment_only: bool,
}

/// The graph of boundary stretches and intersection segments of one triangle.
///
/// Nodes closer than the snap distance are merged, so an edge only ever joins two distinct
/// locations.
#[derive(Debug, Clone)]
pub struct PolygonGraph {
    nodes: SlotMap<NodeKey, Node>,
    edges: SlotMap<EdgeKey, GraphEdge>,
    snap: f32,
}

impl PolygonGraph {
    /// Creates an empty graph merging nodes closer than `snap`.
    pub fn new(snap: f32) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            snap,
        }
    }

    /// Returns the node at `position`, creating it if there is none within the snap distance.
    pub fn insert_node(&mut self, position: Vec3A) -> NodeKey {
        if let Some((key, _)) = self
            .nodes
            .iter()
            .find(|(_, node)| node.position.distance(position) <= self.snap)
        {
            return key;
        }
        self.nodes.insert(Node {
            position,
            edges: Vec::new(),
        })
    }

    /// Adds an edge between the nodes at `a` and `b`.
    ///
    /// Returns `None` if both ends snap to the same node or the edge already exists.
    pub fn add_edge(&mut self, a: Vec3A, b: Vec3A, kind: EdgeKind) -> Option<EdgeKey> {
        let a = self.insert_node(a);
        let b = self.insert_node(b);
        if a == b {
            return None;
        }
        let exists = self.nodes[a]
            .edges
            .iter()
            .any(|edge| self.edges[*edge].other(a) == b);
        if exists {
            return None;
        }
        let key = self.edges.insert(GraphEdge {
            a,
            b,
            kind,
            used: false,
        });
        self.nodes[a].edges.push(key);
        self.nodes[b].edges.push(key);
        Some(key)
    }

    /// Number of nodes.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Splits the graph into closed loops, using every edge exactly once.
    ///
    /// Every node must have even degree. Whenever a walk reaches a node it already visited,
    /// the part of the walk since that visit is split off as its own loop, so loops never
    /// touch themselves.
    pub fn trace_loops(&mut self) -> Result<Vec<Loop>, TraceError> {
        if let Some(node) = self.nodes.values().find(|node| node.edges.len() % 2 == 1) {
            return Err(TraceError::OddDegree {
                position: node.position,
                degree: node.edges.len(),
            });
        }
        let connected = self.nodes.values().filter(|node| !node.edges.is_empty()).count();
        if connected < 3 {
            return Err(TraceError::TooFewNodes { count: connected });
        }
        for edge in self.edges.values_mut() {
            edge.used = false;
        }

        let mut loops = Vec::new();
        let keys: Vec<EdgeKey> = self.edges.keys().collect();
        for first in keys {
            if self.edges[first].used {
                continue;
            }
            let start = self.edges[first].a;
            // Nodes of the current walk, and the kind of edge leading to each of them
            let mut walk: Vec<(NodeKey, EdgeKind)> = vec![(start, EdgeKind::Segment)];
            let mut current = start;
            let mut next_edge = Some(first);
            while let Some(edge_key) = next_edge {
                let edge = &mut self.edges[edge_key];
                edge.used = true;
                let kind = edge.kind;
                current = edge.other(current);

                if let Some(seen) = walk.iter().position(|(node, _)| *node == current) {
                    // `walk` keeps everything up to and including `current`
                    let closed = walk.split_off(seen + 1);
                    let segment_only = kind == EdgeKind::Segment
                        && closed.iter().all(|(_, kind)| *kind == EdgeKind::Segment);
                    let positions: Vec<Vec3A> = std::iter::once(current)
                        .chain(closed.iter().map(|(node, _)| *node))
                        .map(|node| self.nodes[node].position)
                        .collect();
                    if positions.len() < 3 {
                        return Err(TraceError::TooFewNodes {
                            count: positions.len(),
                        });
                    }
                    loops.push(Loop {
                        positions,
                        segment_only,
                    });
                } else {
                    walk.push((current, kind));
                }

                next_edge = self.nodes[current]
                    .edges
                    .iter()
                    .copied()
                    .find(|edge| !self.edges[*edge].used);
                if next_edge.is_none() && walk.len() > 1 {
                    return Err(TraceError::OpenLoop {
                        position: self.nodes[current].position,
                    });
                }
            }
        }
        Ok(loops)
    }
}

/// Reasons a [`PolygonGraph`] cannot be split into loops.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TraceError {
    /// A node is the end of an odd number of edges.
    #[error("node at {position} has odd degree {degree}")]
    OddDegree {
        /// Where the node is
        position: Vec3A,
        /// How many edges meet there
        degree: usize,
    },
    /// Fewer than three distinct nodes were left to form a loop.
    #[error("only {count} nodes available to form a loop")]
    TooFewNodes {
        /// Number of nodes
        count: usize,
    },
    /// A walk ran out of edges before closing.
    #[error("loop is open at {position}")]
    OpenLoop {
        /// Where the walk got stuck
        position: Vec3A,
    },
}

/// Whether a polygon adds surface or cuts a hole into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolygonMode {
    /// The polygon is exposed surface.
    #[default]
    Add,
    /// The polygon is a hole inside exposed surface.
    Subtract,
}

/// A closed ring of vertices bounding part of a triangle's exposed surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    /// The ring. Vertex `i` is joined to [`Polygon::prev`] and [`Polygon::next`].
    pub vertices: Vec<Vec3A>,
    /// Index of the originating triangle within its mesh.
    pub triangle: usize,
    /// The originating triangle's normal.
    pub normal: Vec3A,
    /// Whether this is surface or a hole.
    pub mode: PolygonMode,
}

impl Polygon {
    /// Creates a polygon, winding it counter-clockwise around `normal` for
    /// [`PolygonMode::Add`] and clockwise for [`PolygonMode::Subtract`].
    pub fn new(vertices: Vec<Vec3A>, triangle: usize, normal: Vec3A, mode: PolygonMode) -> Self {
        let mut polygon = Self {
            vertices,
            triangle,
            normal,
            mode,
        };
        let counter_clockwise = polygon_normal(&polygon.vertices).dot(normal) >= 0.0;
        if counter_clockwise != (mode == PolygonMode::Add) {
            polygon.vertices.reverse();
        }
        polygon
    }

    /// Number of vertices.
    #[inline]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the ring has no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Index of the vertex before `i`.
    #[inline]
    pub fn prev(&self, i: usize) -> usize {
        (i + self.len() - 1) % self.len()
    }

    /// Index of the vertex after `i`.
    #[inline]
    pub fn next(&self, i: usize) -> usize {
        (i + 1) % self.len()
    }

    /// The enclosed area.
    #[inline]
    pub fn area(&self) -> f32 {
        crate::geometry::polygon_area(&self.vertices)
    }

    /// Drops vertices that lie on the line through their neighbours, and duplicates.
    pub fn remove_collinear(&mut self, tolerances: &Tolerances) {
        let mut i = 0;
        while self.len() > 3 && i < self.len() {
            let previous = self.vertices[self.prev(i)];
            let current = self.vertices[i];
            let next = self.vertices[self.next(i)];
            let scale = current.distance(previous) * current.distance(next);
            let duplicate = current.distance(previous) <= tolerances.snap;
            if duplicate
                || turn(previous, current, next, self.normal).abs() <= tolerances.geometric * scale
            {
                self.vertices.remove(i);
                i = i.saturating_sub(1);
            } else {
                i += 1;
            }
        }
    }
}

/// Why a triangle's exposed surface could not be rebuilt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemReason {
    /// No segment crosses the triangle, yet only some of its corners are enclosed.
    #[error("{obscured} of 3 corners are obscured, but no segment crosses the triangle")]
    PartiallyObscured {
        /// Number of obscured corners
        obscured: u32,
    },
    /// The segment graph has no valid loops.
    #[error(transparent)]
    Trace(#[from] TraceError),
    /// The exposed surface has a hole, which cannot be ear clipped.
    #[error("exposed surface has a hole")]
    Hole,
}

/// What happens to a triangle.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconstruction {
    /// Nothing crosses the triangle and it is exposed. It goes to the output as it is.
    Unchanged,
    /// The triangle is entirely enclosed by other meshes.
    Culled,
    /// The exposed surface could not be resolved, the triangle is removed.
    Problem(ProblemReason),
    /// The triangle is replaced by these polygons.
    Polygons(Vec<Polygon>),
}

/// Rebuilds the exposed surface of triangle `triangle` of `group[own]`.
///
/// Corner obscuration flags must already be set, see
/// [`classify_group`](crate::obscuration::classify_group).
///
/// A boundary stretch is kept when the surface just inside it is exposed. A piece of an
/// intersection segment is kept when it separates hidden from exposed surface, so pieces
/// buried in a third mesh or running between two exposed regions are dropped.
pub fn reconstruct_triangle(
    group: &[Mesh],
    own: usize,
    triangle: usize,
    tolerances: &Tolerances,
    scratch: &mut SurfaceScratch,
) -> Reconstruction {
    let segments = collect_segments(group, own, triangle, tolerances);
    let source = &group[own].triangles()[triangle];
    let positions = group[own].triangle_positions(triangle);
    if !segments.iter().any(PolyEdge::is_interior) {
        return match source.obscured_count() {
            0 => Reconstruction::Unchanged,
            3 => Reconstruction::Culled,
            obscured => Reconstruction::Problem(ProblemReason::PartiallyObscured { obscured }),
        };
    }

    let normal = source.normal;
    let offset = tolerances.offset();
    let mut hidden = |point: Vec3A| surface_hidden(point, normal, group, own, tolerances, scratch);

    let mut graph = PolygonGraph::new(tolerances.snap);
    let mut stretches = 0;
    let mut kept_stretches = 0;
    for edge in 0..3 {
        let start = positions[edge];
        let end = positions[(edge + 1) % 3];
        let dir = end - start;
        let len_sq = dir.length_squared();
        let margin = tolerances.snap / len_sq.sqrt();
        // Triangles wind counter-clockwise around their normal
        let inward = normal.cross(dir).normalize_or_zero();

        let flag = EdgeFlags::edge(edge);
        let mut splits: Vec<(f32, Vec3A)> = segments
            .iter()
            .flat_map(|segment| segment.boundary_endpoints())
            .filter(|(_, edges)| edges.contains(flag))
            .map(|(point, _)| ((point - start).dot(dir) / len_sq, point))
            .filter(|(t, _)| *t > margin && *t < 1.0 - margin)
            .collect();
        splits.sort_by(|a, b| a.0.total_cmp(&b.0));
        splits.dedup_by(|a, b| a.1.distance(b.1) <= tolerances.snap);

        let stops: Vec<Vec3A> = std::iter::once(start)
            .chain(splits.into_iter().map(|(_, point)| point))
            .chain(std::iter::once(end))
            .collect();
        for pair in stops.windows(2) {
            let midpoint = (pair[0] + pair[1]) * 0.5;
            let depth = offset.min(pair[0].distance(pair[1]) * 0.5);
            stretches += 1;
            if !hidden(midpoint + inward * depth) {
                graph.add_edge(pair[0], pair[1], EdgeKind::Boundary);
                kept_stretches += 1;
            }
        }
    }

    let interior: Vec<[Vec3A; 2]> = segments
        .iter()
        .filter(|segment| segment.is_interior())
        .map(|segment| [segment.a, segment.b])
        .collect();
    let mut kept_pieces = 0;
    for [a, b] in split_segments(&interior, tolerances.snap) {
        let midpoint = (a + b) * 0.5;
        let side = normal.cross(b - a).normalize_or_zero() * offset;
        if hidden(midpoint + side) != hidden(midpoint - side)
            && graph.add_edge(a, b, EdgeKind::Segment).is_some()
        {
            kept_pieces += 1;
        }
    }
    if kept_pieces == 0 {
        if kept_stretches == 0 {
            return Reconstruction::Culled;
        }
        if kept_stretches == stretches {
            return Reconstruction::Unchanged;
        }
    }

    let loops = match graph.trace_loops() {
        Ok(loops) => loops,
        Err(error) => return Reconstruction::Problem(error.into()),
    };

    let mut polygons = Vec::with_capacity(loops.len());
    for found in loops {
        let mode = if found.segment_only {
            let centroid =
                found.positions.iter().copied().sum::<Vec3A>() / found.positions.len() as f32;
            if hidden(centroid) {
                PolygonMode::Subtract
            } else {
                PolygonMode::Add
            }
        } else {
            PolygonMode::Add
        };
        if mode == PolygonMode::Subtract {
            return Reconstruction::Problem(ProblemReason::Hole);
        }
        let mut polygon = Polygon::new(found.positions, triangle, normal, mode);
        polygon.remove_collinear(tolerances);
        if polygon.area() <= tolerances.geometric * source.area {
            continue;
        }
        polygons.push(polygon);
    }
    if polygons.is_empty() {
        return Reconstruction::Culled;
    }
    Reconstruction::Polygons(polygons)
}

/// Rebuilds every triangle of every mesh in the group. The result is indexed like
/// `group[mesh].triangles()[triangle]`.
pub fn reconstruct_group(group: &[Mesh], tolerances: &Tolerances) -> Vec<Vec<Reconstruction>> {
    let mut scratch = SurfaceScratch::default();
    group
        .iter()
        .enumerate()
        .map(|(own, mesh)| {
            (0..mesh.triangles().len())
                .map(|triangle| reconstruct_triangle(group, own, triangle, tolerances, &mut scratch))
                .collect()
        })
        .collect()
}

/// Splits segments wherever another segment ends on them or crosses them, so that
/// overlapping and crossing segments share nodes.
fn split_segments(segments: &[[Vec3A; 2]], snap: f32) -> Vec<[Vec3A; 2]> {
    let mut pieces = Vec::new();
    for (i, [start, end]) in segments.iter().enumerate() {
        let dir = *end - *start;
        let len_sq = dir.length_squared();
        if len_sq <= snap * snap {
            continue;
        }
        let margin = snap / len_sq.sqrt();
        let mut cuts: Vec<f32> = vec![0.0, 1.0];
        for (j, other) in segments.iter().enumerate() {
            if i == j {
                continue;
            }
            for point in other {
                let t = (*point - *start).dot(dir) / len_sq;
                if t > margin && t < 1.0 - margin && point.distance(*start + dir * t) <= snap {
                    cuts.push(t);
                }
            }
            if let Some((t, _)) = closest_parameters(*start, *end, other[0], other[1])
                .filter(|(t, u)| {
                    *t > margin
                        && *t < 1.0 - margin
                        && (*start + dir * *t).distance(other[0] + (other[1] - other[0]) * *u)
                            <= snap
                })
            {
                cuts.push(t);
            }
        }
        cuts.sort_by(f32::total_cmp);
        cuts.dedup_by(|a, b| (*a - *b).abs() <= margin);
        for pair in cuts.windows(2) {
            pieces.push([*start + dir * pair[0], *start + dir * pair[1]]);
        }
    }
    pieces
}

/// Parameters of the closest points between segments `p1`-`q1` and `p2`-`q2`, clamped to
/// both segments. `None` for parallel segments.
fn closest_parameters(p1: Vec3A, q1: Vec3A, p2: Vec3A, q2: Vec3A) -> Option<(f32, f32)> {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);
    let b = d1.dot(d2);
    let c = d1.dot(r);
    let denom = a * e - b * b;
    if denom <= f32::EPSILON * a * e {
        return None;
    }
    let s = ((b * f - c * e) / denom).clamp(0.0, 1.0);
    let t = ((b * s + f) / e).clamp(0.0, 1.0);
    let s = ((b * t - c) / a).clamp(0.0, 1.0);
    Some((s, t))
}
