//! Merges the surviving and the newly triangulated surface of a group into one
//! [`NavMesh`].

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use glam::{UVec3, Vec3A};
use thiserror::Error;

use crate::{
    math::position_key,
    mesh::{Mesh, NavMesh},
    trimesh::MeshError,
};

/// Triangles replacing part of a mesh, one entry per triangulated polygon.
pub type PolygonTriangles = Vec<Vec<[Vec3A; 3]>>;

/// Errors that stop a group from being assembled.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssembleError {
    /// The run was cancelled. The partial mesh has been dropped.
    #[error("assembly was cancelled")]
    Cancelled,
    /// The merged buffers do not form a valid mesh.
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

/// Deduplicating vertex buffer for the triangles of one source mesh.
#[derive(Debug, Default)]
struct VertexWelder {
    vertices: Vec<Vec3A>,
    lookup: HashMap<[u32; 3], u32>,
}

impl VertexWelder {
    fn insert(&mut self, position: Vec3A) -> u32 {
        *self.lookup.entry(position_key(position)).or_insert_with(|| {
            self.vertices.push(position);
            self.vertices.len() as u32 - 1
        })
    }
}

/// Merges the group into a single navigation mesh.
///
/// `replacements[i]` holds the triangles replacing the changed triangles of `group[i]`.
/// Triangles of `group[i]` whose state is still empty are kept as they are. Vertices are
/// deduplicated within each source mesh, never across meshes.
///
/// Returns `Ok(None)` if nothing of the group survived.
pub fn assemble_group(
    group: Vec<Mesh>,
    replacements: Vec<PolygonTriangles>,
    cancel: &AtomicBool,
) -> Result<Option<NavMesh>, AssembleError> {
    let mut sources = Vec::with_capacity(group.len());
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    let mut replacements = replacements.into_iter();
    for mesh in group {
        if cancel.load(Ordering::Relaxed) {
            return Err(AssembleError::Cancelled);
        }
        let polygons = replacements.next().unwrap_or_default();
        let (source, mesh_vertices, grid) = mesh.into_parts();
        sources.push(source);

        let kept: Vec<UVec3> = grid
            .triangles()
            .iter()
            .filter(|triangle| triangle.is_unchanged())
            .map(|triangle| triangle.indices)
            .collect();
        // Welding the used vertices in their original order keeps untouched meshes intact.
        let mut used = vec![false; mesh_vertices.len()];
        for index in kept.iter().flat_map(|indices| indices.to_array()) {
            used[index as usize] = true;
        }
        let mut welder = VertexWelder::default();
        let remap: Vec<u32> = mesh_vertices
            .iter()
            .zip(&used)
            .map(|(position, used)| if *used { welder.insert(*position) } else { u32::MAX })
            .collect();
        let mut mesh_indices: Vec<UVec3> = kept
            .iter()
            .map(|indices| {
                UVec3::new(
                    remap[indices.x as usize],
                    remap[indices.y as usize],
                    remap[indices.z as usize],
                )
            })
            .collect();

        for polygon in polygons {
            if cancel.load(Ordering::Relaxed) {
                return Err(AssembleError::Cancelled);
            }
            mesh_indices.extend(polygon.into_iter().map(|[a, b, c]| {
                UVec3::new(welder.insert(a), welder.insert(b), welder.insert(c))
            }));
        }

        let offset = u32::try_from(vertices.len()).map_err(|_| MeshError::TooManyVertices {
            vertex_count: vertices.len(),
        })?;
        indices.extend(mesh_indices.into_iter().map(|i| i + offset));
        vertices.extend(welder.vertices);
    }

    if indices.is_empty() {
        return Ok(None);
    }
    tracing::debug!(
        "Assembled {} triangles and {} vertices from {} meshes",
        indices.len(),
        vertices.len(),
        sources.len()
    );
    Ok(Some(NavMesh::new(sources, vertices, indices)?))
}

#[cfg(test)]
mod tests {
    use glam::{Affine3A, Vec3};

    use super::*;
    use crate::{SourceId, TriMesh, TriangleState, test_util::cube};

    fn cube_mesh(id: u64, offset: Vec3) -> Mesh {
        Mesh::from_trimesh(SourceId(id), &cube(1.0), Affine3A::from_translation(offset)).unwrap()
    }

    #[test]
    fn untouched_meshes_round_trip() {
        let group = vec![cube_mesh(0, Vec3::ZERO)];
        let navmesh = assemble_group(group, vec![Vec::new()], &AtomicBool::new(false))
            .unwrap()
            .unwrap();
        assert_eq!(navmesh.sources, vec![SourceId(0)]);
        assert_eq!(navmesh.vertex_count(), 8);
        assert_eq!(navmesh.triangle_count(), 12);
        assert_eq!(navmesh.vertices, cube(1.0).vertices);
        assert!((navmesh.total_area() - 24.0).abs() < 1e-4);
    }

    #[test]
    fn coincident_vertices_are_welded() {
        // Two triangles of a quad that do not share vertex indices
        let trimesh = TriMesh {
            vertices: vec![
                Vec3A::new(0.0, 0.0, 0.0),
                Vec3A::new(1.0, 0.0, 0.0),
                Vec3A::new(1.0, 1.0, 0.0),
                Vec3A::new(0.0, 0.0, 0.0),
                Vec3A::new(1.0, 1.0, 0.0),
                Vec3A::new(0.0, 1.0, 0.0),
            ],
            indices: vec![UVec3::new(0, 1, 2), UVec3::new(3, 4, 5)],
        };
        let mesh = Mesh::from_trimesh(SourceId(0), &trimesh, Affine3A::IDENTITY).unwrap();
        let navmesh = assemble_group(vec![mesh], vec![Vec::new()], &AtomicBool::new(false))
            .unwrap()
            .unwrap();
        assert_eq!(navmesh.vertex_count(), 4);
        assert!(navmesh.indices.contains(&UVec3::new(0, 2, 3)));
    }

    #[test]
    fn replacements_share_vertices_with_kept_triangles() {
        let mut mesh = cube_mesh(0, Vec3::ZERO);
        mesh.triangles_mut()[0].state |= TriangleState::TO_POLYGON;
        let [a, b, c] = mesh.triangle_positions(0);
        let mid = (a + b) * 0.5;
        let replacement = vec![vec![[a, mid, c], [mid, b, c]]];
        let navmesh = assemble_group(vec![mesh], vec![replacement], &AtomicBool::new(false))
            .unwrap()
            .unwrap();
        assert_eq!(navmesh.triangle_count(), 13);
        assert_eq!(navmesh.vertex_count(), 9);
    }

    #[test]
    fn meshes_do_not_share_vertices() {
        let group = vec![cube_mesh(0, Vec3::ZERO), cube_mesh(1, Vec3::ZERO)];
        let navmesh = assemble_group(group, vec![Vec::new(), Vec::new()], &AtomicBool::new(false))
            .unwrap()
            .unwrap();
        assert_eq!(navmesh.vertex_count(), 16);
        assert!(navmesh.indices[12..].iter().all(|i| i.min_element() >= 8));
    }

    #[test]
    fn fully_culled_group_yields_nothing() {
        let mut mesh = cube_mesh(0, Vec3::ZERO);
        for triangle in mesh.triangles_mut() {
            triangle.state |= TriangleState::CULL;
        }
        let result = assemble_group(vec![mesh], vec![Vec::new()], &AtomicBool::new(false));
        assert_eq!(result.map(|navmesh| navmesh.is_none()), Ok(true));
    }

    #[test]
    fn cancelled_assembly_stops() {
        let group = vec![cube_mesh(0, Vec3::ZERO)];
        let result = assemble_group(group, vec![Vec::new()], &AtomicBool::new(true));
        assert!(matches!(result, Err(AssembleError::Cancelled)));
    }
}
