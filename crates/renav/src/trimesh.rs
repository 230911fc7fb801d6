//! Raw triangle geometry as handed over by a mesh provider.

use glam::{UVec3, Vec3A};
use thiserror::Error;

use crate::math::Aabb3d;

/// Vertex and index buffers of one source mesh.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TriMesh {
    /// The vertices composing the mesh.
    /// Follows the convention of a triangle list.
    pub vertices: Vec<Vec3A>,

    /// The indices composing the mesh.
    /// Follows the convention of a triangle list.
    pub indices: Vec<UVec3>,
}

impl TriMesh {
    /// Computes the AABB of the trimesh.
    /// Returns `None` if the trimesh is empty.
    pub fn compute_aabb(&self) -> Option<Aabb3d> {
        Aabb3d::from_verts(&self.vertices)
    }

    /// Checks that every index points at a vertex.
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.indices.is_empty() || self.vertices.is_empty() {
            return Err(MeshError::Empty);
        }
        let vertex_count = self.vertices.len();
        if vertex_count > u32::MAX as usize {
            return Err(MeshError::TooManyVertices { vertex_count });
        }
        for (triangle, indices) in self.indices.iter().enumerate() {
            if let Some(index) = indices
                .to_array()
                .into_iter()
                .find(|&index| index as usize >= vertex_count)
            {
                return Err(MeshError::IndexOutOfRange {
                    triangle,
                    index,
                    vertex_count,
                });
            }
        }
        Ok(())
    }
}

/// Errors that reject a single input mesh.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    /// The mesh has no vertices or no triangles.
    #[error("mesh has no geometry")]
    Empty,
    /// An index points past the end of the vertex buffer.
    #[error("triangle {triangle} references vertex {index}, but the mesh only has {vertex_count} vertices")]
    IndexOutOfRange {
        /// The offending triangle
        triangle: usize,
        /// The offending index
        index: u32,
        /// The number of vertices in the mesh
        vertex_count: usize,
    },
    /// Indices are 32 bit, so larger vertex buffers cannot be addressed.
    #[error("mesh has {vertex_count} vertices, which cannot be indexed with u32")]
    TooManyVertices {
        /// The number of vertices in the mesh
        vertex_count: usize,
    },
    /// Storage for the mesh could not be reserved.
    #[error("could not allocate storage for {count} {what}")]
    AllocationFailed {
        /// What was being allocated
        what: &'static str,
        /// How many elements were requested
        count: usize,
    },
    /// Every triangle of the mesh has zero area.
    #[error("all {triangle_count} triangles are degenerate")]
    Degenerate {
        /// The number of triangles in the mesh
        triangle_count: usize,
    },
    /// The spatial grid over the mesh could not be built.
    #[error(transparent)]
    Grid(#[from] crate::grid::GridError),
}
