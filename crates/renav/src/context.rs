//! State of one generation run and the diagnostics it collects.

use std::sync::{Mutex, PoisonError};

use glam::Vec3A;
use thiserror::Error;

use crate::{
    assemble::AssembleError,
    bounding_box::BoundingBox,
    mesh::{Mesh, NavMesh, SourceId},
    polygon::ProblemReason,
    pool::PoolError,
    triangulate::TriangulateError,
    trimesh::MeshError,
};

/// A triangle whose exposed surface could not be resolved. It is missing from the output.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemTriangle {
    /// The mesh the triangle belongs to
    pub source: SourceId,
    /// World-space corners
    pub positions: [Vec3A; 3],
    /// What went wrong
    pub reason: ProblemReason,
}

/// A rebuilt polygon that could not be triangulated. It is missing from the output.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedPolygon {
    /// The mesh the polygon belongs to
    pub source: SourceId,
    /// The ring of the polygon
    pub vertices: Vec<Vec3A>,
    /// What went wrong
    pub error: TriangulateError,
}

/// A triangle removed because it is entirely enclosed by other meshes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CulledTriangle {
    /// The mesh the triangle belongs to
    pub source: SourceId,
    /// World-space corners
    pub positions: [Vec3A; 3],
}

/// An input mesh excluded from the run.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedMesh {
    /// The rejected mesh
    pub source: SourceId,
    /// Why it was rejected
    pub error: MeshError,
}

/// A group for which no navigation mesh was produced.
#[derive(Debug)]
pub struct FailedGroup {
    /// Index of the group in the grouping order
    pub group: usize,
    /// The meshes of the group
    pub sources: Vec<SourceId>,
    /// What went wrong
    pub reason: GroupFailure,
}

/// Why a group produced no navigation mesh.
#[derive(Error, Debug)]
pub enum GroupFailure {
    /// The group never got a worker.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// The group was processed, but assembling its mesh failed.
    #[error(transparent)]
    Assemble(#[from] AssembleError),
}

/// Everything that went wrong or was removed during a run. Entries are only ever appended.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Triangles whose exposed surface could not be resolved
    pub problem_triangles: Vec<ProblemTriangle>,
    /// Polygons that could not be triangulated
    pub failed_polygons: Vec<FailedPolygon>,
    /// Triangles enclosed by other meshes
    pub culled_triangles: Vec<CulledTriangle>,
    /// Meshes excluded from the run
    pub rejected_meshes: Vec<RejectedMesh>,
    /// Groups without output
    pub failed_groups: Vec<FailedGroup>,
}

impl Diagnostics {
    /// Appends all entries of `other`.
    pub fn append(&mut self, mut other: Diagnostics) {
        self.problem_triangles.append(&mut other.problem_triangles);
        self.failed_polygons.append(&mut other.failed_polygons);
        self.culled_triangles.append(&mut other.culled_triangles);
        self.rejected_meshes.append(&mut other.rejected_meshes);
        self.failed_groups.append(&mut other.failed_groups);
    }

    /// Whether geometry is missing from the output because something failed.
    ///
    /// Culled triangles are expected and do not count.
    pub fn has_failures(&self) -> bool {
        !self.problem_triangles.is_empty()
            || !self.failed_polygons.is_empty()
            || !self.rejected_meshes.is_empty()
            || !self.failed_groups.is_empty()
    }
}

#[derive(Debug, Default)]
struct Collected {
    output: Vec<(usize, NavMesh)>,
    diagnostics: Diagnostics,
}

/// The state of a single generation run.
///
/// Meshes are moved out into their groups before processing. Results and diagnostics of
/// all workers are collected behind a single lock.
#[derive(Debug)]
pub struct PipelineContext {
    /// The region of interest
    pub bounds_volume: BoundingBox,
    /// The accepted meshes, until they are handed to their groups
    pub meshes: Vec<Mesh>,
    /// Groups as indices into `meshes`
    pub groups: Vec<Vec<usize>>,
    collected: Mutex<Collected>,
}

impl PipelineContext {
    /// Starts a run for the given region of interest.
    pub fn new(bounds_volume: BoundingBox) -> Self {
        Self {
            bounds_volume,
            meshes: Vec::new(),
            groups: Vec::new(),
            collected: Mutex::default(),
        }
    }

    /// Moves every mesh into its group, leaving `meshes` empty.
    pub fn take_groups(&mut self) -> Vec<Vec<Mesh>> {
        let mut slots: Vec<Option<Mesh>> = self.meshes.drain(..).map(Some).collect();
        self.groups
            .iter()
            .map(|members| {
                members
                    .iter()
                    .filter_map(|&member| slots.get_mut(member).and_then(Option::take))
                    .collect()
            })
            .collect()
    }

    /// Appends diagnostics.
    pub fn record(&self, diagnostics: Diagnostics) {
        self.lock().diagnostics.append(diagnostics);
    }

    /// Records that group `group` produced no navigation mesh.
    pub fn fail_group(&self, group: usize, sources: Vec<SourceId>, reason: GroupFailure) {
        self.lock().diagnostics.failed_groups.push(FailedGroup {
            group,
            sources,
            reason,
        });
    }

    /// Records the navigation mesh produced for group `group`.
    pub fn publish(&self, group: usize, navmesh: NavMesh) {
        self.lock().output.push((group, navmesh));
    }

    /// Ends the run, returning the navigation meshes with their group index and the
    /// collected diagnostics.
    ///
    /// With `deterministic_order`, meshes are sorted by group index. Otherwise they stay in
    /// the order they were published.
    pub fn finish(self, deterministic_order: bool) -> (Vec<(usize, NavMesh)>, Diagnostics) {
        let Collected {
            mut output,
            diagnostics,
        } = self
            .collected
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if deterministic_order {
            output.sort_by_key(|(group, _)| *group);
        }
        (output, diagnostics)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collected> {
        self.collected.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use glam::{Affine3A, UVec3, Vec3};

    use super::*;
    use crate::{math::Aabb3d, test_util::cube};

    fn new_context() -> PipelineContext {
        PipelineContext::new(BoundingBox::from_aabb(&Aabb3d::new(Vec3A::ZERO, Vec3A::splat(10.0))))
    }

    fn navmesh(source: u64) -> NavMesh {
        NavMesh::new(
            vec![SourceId(source)],
            vec![Vec3A::ZERO, Vec3A::X, Vec3A::Y],
            vec![UVec3::new(0, 1, 2)],
        )
        .unwrap()
    }

    #[test]
    fn groups_take_ownership_of_meshes() {
        let mut context = new_context();
        context.meshes = (0..3)
            .map(|i| {
                Mesh::from_trimesh(
                    SourceId(i),
                    &cube(1.0),
                    Affine3A::from_translation(Vec3::new(i as f32 * 5.0, 0.0, 0.0)),
                )
                .unwrap()
            })
            .collect();
        context.groups = vec![vec![0, 2], vec![1]];
        let groups = context.take_groups();
        assert!(context.meshes.is_empty());
        let sources: Vec<Vec<SourceId>> = groups
            .iter()
            .map(|group| group.iter().map(|mesh| mesh.source).collect())
            .collect();
        assert_eq!(sources, vec![vec![SourceId(0), SourceId(2)], vec![SourceId(1)]]);
    }

    #[test]
    fn finish_orders_by_group_when_asked() {
        let context = new_context();
        context.publish(2, navmesh(2));
        context.publish(0, navmesh(0));
        let (output, _) = context.finish(true);
        assert_eq!(output.iter().map(|(g, _)| *g).collect::<Vec<_>>(), vec![0, 2]);

        let context = new_context();
        context.publish(2, navmesh(2));
        context.publish(0, navmesh(0));
        let (output, _) = context.finish(false);
        assert_eq!(output.iter().map(|(g, _)| *g).collect::<Vec<_>>(), vec![2, 0]);
    }

    #[test]
    fn diagnostics_are_appended() {
        let context = new_context();
        let mut first = Diagnostics::default();
        first.culled_triangles.push(CulledTriangle {
            source: SourceId(0),
            positions: [Vec3A::ZERO; 3],
        });
        context.record(first);
        let mut second = Diagnostics::default();
        second.rejected_meshes.push(RejectedMesh {
            source: SourceId(1),
            error: MeshError::Empty,
        });
        context.record(second);
        let (_, diagnostics) = context.finish(true);
        assert_eq!(diagnostics.culled_triangles.len(), 1);
        assert_eq!(diagnostics.rejected_meshes.len(), 1);
        assert!(diagnostics.has_failures());
    }
}
