//! The top-level [`generate`] entry point.

use std::sync::atomic::{AtomicBool, Ordering};

use glam::{Affine3A, Vec3A};
use thiserror::Error;

use crate::{
    assemble::{AssembleError, PolygonTriangles, assemble_group},
    bounding_box::BoundingBox,
    config::GeneratorConfig,
    context::{
        CulledTriangle, Diagnostics, FailedPolygon, GroupFailure, PipelineContext,
        ProblemTriangle, RejectedMesh,
    },
    grouping::group_meshes,
    math::Tolerances,
    mesh::{Mesh, NavMesh, SourceId},
    obscuration::classify_group,
    polygon::{Reconstruction, reconstruct_group},
    pool::{PoolError, TaskOutcome, WorkerPool},
    triangle::TriangleState,
    triangulate::triangulate,
    trimesh::{MeshError, TriMesh},
};

/// A mesh as provided by the surrounding world.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SceneMesh {
    /// Identity of the mesh in the surrounding world.
    pub source: SourceId,
    /// Local to world transform.
    pub transform: Affine3A,
    /// Local-space geometry.
    pub geometry: TriMesh,
}

/// The input of a generation run.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Scene {
    /// Volumes marking the region of interest. Exactly one is required.
    pub bounds_volumes: Vec<SceneMesh>,
    /// The static meshes to generate from.
    pub meshes: Vec<SceneMesh>,
}

/// The result of a generation run.
#[derive(Debug, Default)]
pub struct NavOutput {
    /// One navigation mesh per group with exposed surface.
    pub navmeshes: Vec<NavMesh>,
    /// Everything that was removed or went wrong.
    pub diagnostics: Diagnostics,
}

impl NavOutput {
    /// Whether some groups produced no output because they were never processed or failed
    /// to assemble.
    pub fn is_partial(&self) -> bool {
        !self.diagnostics.failed_groups.is_empty()
    }
}

/// Errors that abort a whole generation run. They are reported before any geometry is
/// processed.
#[derive(Error, Debug)]
pub enum GenerateError {
    /// The scene has no bounds volume.
    #[error("the scene has no bounds volume")]
    NoBoundsVolume,
    /// The scene has more than one bounds volume.
    #[error("the scene has {count} bounds volumes, but exactly one is required")]
    MultipleBoundsVolumes {
        /// Number of bounds volumes found
        count: usize,
    },
    /// The bounds volume geometry is unusable.
    #[error("invalid bounds volume: {0}")]
    InvalidBoundsVolume(#[source] MeshError),
    /// No mesh overlaps the bounds volume.
    #[error("no mesh overlaps the bounds volume")]
    NoMeshesInBounds,
    /// The worker pool could not be created.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Generates navigation meshes for `scene` on a new worker pool.
pub fn generate(scene: &Scene, config: &GeneratorConfig) -> Result<NavOutput, GenerateError> {
    let pool = WorkerPool::new(config.pool)?;
    generate_on(&pool, scene, config)
}

/// Generates navigation meshes for `scene` on an existing worker pool.
///
/// Calling [`WorkerPool::cancel`] from another thread stops the run. Groups that were
/// interrupted are reported in [`Diagnostics::failed_groups`].
pub fn generate_on(
    pool: &WorkerPool,
    scene: &Scene,
    config: &GeneratorConfig,
) -> Result<NavOutput, GenerateError> {
    let tolerances = config.tolerances;
    let bounds_volume = match scene.bounds_volumes.as_slice() {
        [] => return Err(GenerateError::NoBoundsVolume),
        [bounds_volume] => bounds_volume_box(bounds_volume)?,
        volumes => {
            return Err(GenerateError::MultipleBoundsVolumes {
                count: volumes.len(),
            });
        }
    };

    let mut rejected = Diagnostics::default();
    let candidates: Vec<&SceneMesh> = scene
        .meshes
        .iter()
        .filter(|mesh| match mesh.geometry.compute_aabb() {
            Some(aabb) => {
                BoundingBox::from_local_aabb(mesh.transform, &aabb).overlaps(&bounds_volume)
            }
            None => {
                reject(&mut rejected, mesh.source, MeshError::Empty);
                false
            }
        })
        .collect();
    if candidates.is_empty() {
        return Err(GenerateError::NoMeshesInBounds);
    }
    tracing::debug!(
        "{} of {} meshes overlap the bounds volume",
        candidates.len(),
        scene.meshes.len()
    );

    let mut context = PipelineContext::new(bounds_volume);
    for candidate in candidates {
        match Mesh::from_trimesh(candidate.source, &candidate.geometry, candidate.transform) {
            Ok(mesh) => context.meshes.push(mesh),
            Err(error) => reject(&mut rejected, candidate.source, error),
        }
    }
    context.record(rejected);

    context.groups = group_meshes(&context.meshes, &tolerances);
    let group_sources: Vec<Vec<SourceId>> = context
        .groups
        .iter()
        .map(|members| members.iter().map(|&i| context.meshes[i].source).collect())
        .collect();
    let groups = context.take_groups();

    let shared = &context;
    let tasks: Vec<_> = groups
        .into_iter()
        .enumerate()
        .map(|(index, group)| {
            move |cancel: &AtomicBool| process_group(shared, index, group, &tolerances, cancel)
        })
        .collect();
    pool.run(tasks, &|outcome: TaskOutcome<()>| {
        if let Err(error) = outcome.result {
            let sources = group_sources[outcome.index].clone();
            shared.fail_group(outcome.index, sources, error.into());
        }
    });

    let (output, diagnostics) = context.finish(config.deterministic_order);
    let output = NavOutput {
        navmeshes: output.into_iter().map(|(_, navmesh)| navmesh).collect(),
        diagnostics,
    };
    tracing::info!(
        "Generated {} navmeshes from {} groups: {} triangles culled, {} problem triangles, {} failed polygons",
        output.navmeshes.len(),
        group_sources.len(),
        output.diagnostics.culled_triangles.len(),
        output.diagnostics.problem_triangles.len(),
        output.diagnostics.failed_polygons.len(),
    );
    if output.is_partial() {
        tracing::warn!(
            "{} groups produced no navmesh, the output is partial",
            output.diagnostics.failed_groups.len()
        );
    }
    Ok(output)
}

fn bounds_volume_box(bounds_volume: &SceneMesh) -> Result<BoundingBox, GenerateError> {
    bounds_volume
        .geometry
        .validate()
        .map_err(GenerateError::InvalidBoundsVolume)?;
    let aabb = bounds_volume
        .geometry
        .compute_aabb()
        .ok_or(GenerateError::InvalidBoundsVolume(MeshError::Empty))?;
    Ok(BoundingBox::from_local_aabb(bounds_volume.transform, &aabb))
}

fn reject(diagnostics: &mut Diagnostics, source: SourceId, error: MeshError) {
    tracing::warn!("Mesh {source} rejected: {error}");
    diagnostics.rejected_meshes.push(RejectedMesh { source, error });
}

/// Runs every stage after grouping for one group and hands the result to `context`.
fn process_group(
    context: &PipelineContext,
    index: usize,
    group: Vec<Mesh>,
    tolerances: &Tolerances,
    cancel: &AtomicBool,
) {
    let sources: Vec<SourceId> = group.iter().map(|mesh| mesh.source).collect();
    let (diagnostics, result) =
        rebuild_group(group, &context.bounds_volume, tolerances, cancel);
    context.record(diagnostics);
    match result {
        Ok(Some(navmesh)) => context.publish(index, navmesh),
        Ok(None) => tracing::debug!("Group {index} has no exposed surface"),
        Err(error) => {
            tracing::warn!("Group {index} failed: {error}");
            context.fail_group(index, sources, GroupFailure::Assemble(error));
        }
    }
}

/// Classifies, reconstructs, triangulates and assembles one group.
fn rebuild_group(
    mut group: Vec<Mesh>,
    bounds_volume: &BoundingBox,
    tolerances: &Tolerances,
    cancel: &AtomicBool,
) -> (Diagnostics, Result<Option<NavMesh>, AssembleError>) {
    let mut diagnostics = Diagnostics::default();
    classify_group(&mut group, Some(bounds_volume), tolerances);
    let reconstructions = reconstruct_group(&group, tolerances);

    let mut replacements: Vec<PolygonTriangles> = Vec::with_capacity(group.len());
    for (mesh, results) in group.iter_mut().zip(reconstructions) {
        if cancel.load(Ordering::Relaxed) {
            return (diagnostics, Err(AssembleError::Cancelled));
        }
        let source = mesh.source;
        let mut triangles = PolygonTriangles::new();
        for (index, result) in results.into_iter().enumerate() {
            let positions = mesh.triangle_positions(index);
            let state = &mut mesh.triangles_mut()[index].state;
            apply_reconstruction(
                source,
                positions,
                state,
                result,
                tolerances,
                &mut triangles,
                &mut diagnostics,
            );
        }
        replacements.push(triangles);
    }
    tracing::debug!(
        "Group of {} meshes: {} culled, {} problem triangles",
        group.len(),
        diagnostics.culled_triangles.len(),
        diagnostics.problem_triangles.len()
    );
    let result = assemble_group(group, replacements, cancel);
    (diagnostics, result)
}

/// Flags one triangle with what happens to it. Removed triangles go to `diagnostics`, and
/// replacement polygons are triangulated into `triangles`.
fn apply_reconstruction(
    source: SourceId,
    positions: [Vec3A; 3],
    state: &mut TriangleState,
    result: Reconstruction,
    tolerances: &Tolerances,
    triangles: &mut PolygonTriangles,
    diagnostics: &mut Diagnostics,
) {
    match result {
        Reconstruction::Unchanged => {}
        Reconstruction::Culled => {
            *state |= TriangleState::CULL;
            diagnostics
                .culled_triangles
                .push(CulledTriangle { source, positions });
        }
        Reconstruction::Problem(reason) => {
            *state |= TriangleState::PROBLEM;
            tracing::warn!("Mesh {source}: problem triangle {positions:?}: {reason}");
            diagnostics.problem_triangles.push(ProblemTriangle {
                source,
                positions,
                reason,
            });
        }
        Reconstruction::Polygons(polygons) => {
            *state |= TriangleState::TO_POLYGON;
            for polygon in polygons {
                match triangulate(&polygon, tolerances) {
                    Ok(clipped) => triangles.push(clipped),
                    Err(error) => {
                        tracing::warn!(
                            "Mesh {source}: failed to triangulate polygon with {} vertices: {error}",
                            polygon.len()
                        );
                        diagnostics.failed_polygons.push(FailedPolygon {
                            source,
                            vertices: polygon.vertices,
                            error,
                        });
                    }
                }
            }
        }
    }
}
