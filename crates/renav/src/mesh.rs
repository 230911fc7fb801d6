//! Input meshes and the navigation meshes produced from them.

use std::fmt;

use glam::{Affine3A, UVec3, Vec3A};

use crate::{
    bounding_box::BoundingBox,
    geometry::triangle_area,
    grid::TriGrid,
    math::{Aabb3d, TriangleIndices as _},
    triangle::Triangle,
    trimesh::{MeshError, TriMesh},
};

/// Identity of a mesh in the surrounding world, e.g. an actor or entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A world-space mesh taking part in generation.
///
/// The vertex buffer and the grid over its triangles belong together: they are built
/// together and dropped together.
#[derive(Debug, Clone)]
pub struct Mesh {
    /// Where the mesh came from.
    pub source: SourceId,
    /// The oriented bounds of the mesh.
    pub bounds: BoundingBox,
    vertices: Vec<Vec3A>,
    grid: TriGrid,
}

impl Mesh {
    /// Validates `trimesh`, moves it into world space and builds its grid.
    pub fn from_trimesh(
        source: SourceId,
        trimesh: &TriMesh,
        transform: Affine3A,
    ) -> Result<Self, MeshError> {
        trimesh.validate()?;
        let local_aabb = trimesh.compute_aabb().ok_or(MeshError::Empty)?;

        let mut vertices = Vec::new();
        vertices
            .try_reserve_exact(trimesh.vertices.len())
            .map_err(|_| MeshError::AllocationFailed {
                what: "vertices",
                count: trimesh.vertices.len(),
            })?;
        vertices.extend(
            trimesh
                .vertices
                .iter()
                .map(|v| transform.transform_point3a(*v)),
        );

        let mut triangles = Vec::new();
        triangles
            .try_reserve_exact(trimesh.indices.len())
            .map_err(|_| MeshError::AllocationFailed {
                what: "triangles",
                count: trimesh.indices.len(),
            })?;
        triangles.extend(
            trimesh
                .indices
                .iter()
                .filter_map(|indices| Triangle::new(*indices, &vertices)),
        );
        if triangles.is_empty() {
            return Err(MeshError::Degenerate {
                triangle_count: trimesh.indices.len(),
            });
        }
        let skipped = trimesh.indices.len() - triangles.len();
        if skipped > 0 {
            tracing::debug!("Mesh {source}: skipped {skipped} degenerate triangles");
        }

        let aabb = Aabb3d::from_verts(&vertices).ok_or(MeshError::Empty)?;
        let grid = TriGrid::new(aabb, triangles, &vertices)?;
        Ok(Self {
            source,
            bounds: BoundingBox::from_local_aabb(transform, &local_aabb),
            vertices,
            grid,
        })
    }

    /// The world-space vertex buffer.
    #[inline]
    pub fn vertices(&self) -> &[Vec3A] {
        &self.vertices
    }

    /// The spatial grid owning the triangles.
    #[inline]
    pub fn grid(&self) -> &TriGrid {
        &self.grid
    }

    /// The triangles, in grid order.
    #[inline]
    pub fn triangles(&self) -> &[Triangle] {
        self.grid.triangles()
    }

    /// The triangles, in grid order, for updating their flags.
    #[inline]
    pub fn triangles_mut(&mut self) -> &mut [Triangle] {
        self.grid.triangles_mut()
    }

    /// The world-space positions of triangle `index`.
    #[inline]
    pub fn triangle_positions(&self, index: usize) -> [Vec3A; 3] {
        self.triangles()[index].positions(&self.vertices)
    }

    /// Splits the mesh into its identity, vertex buffer and grid.
    pub fn into_parts(self) -> (SourceId, Vec<Vec3A>, TriGrid) {
        (self.source, self.vertices, self.grid)
    }
}

/// A generated navigation mesh.
#[derive(Debug, Clone)]
pub struct NavMesh {
    /// The meshes merged into this one.
    pub sources: Vec<SourceId>,
    /// The vertex buffer.
    pub vertices: Vec<Vec3A>,
    /// Triangles as indices into [`NavMesh::vertices`].
    pub indices: Vec<UVec3>,
    /// One unit normal per triangle.
    pub normals: Vec<Vec3A>,
    grid: TriGrid,
}

impl NavMesh {
    /// Builds the navigation mesh and its spatial grid.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    pub fn new(
        sources: Vec<SourceId>,
        vertices: Vec<Vec3A>,
        indices: Vec<UVec3>,
    ) -> Result<Self, MeshError> {
        let normals = indices.iter().map(|i| i.normal(&vertices)).collect();
        let triangles = indices
            .iter()
            .filter_map(|i| Triangle::new(*i, &vertices))
            .collect();
        let aabb = Aabb3d::from_verts(&vertices).ok_or(MeshError::Empty)?;
        let grid = TriGrid::new(aabb, triangles, &vertices)?;
        Ok(Self {
            sources,
            vertices,
            indices,
            normals,
            grid,
        })
    }

    /// Number of triangles.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// Number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// The sum of all triangle areas.
    pub fn total_area(&self) -> f32 {
        self.indices
            .iter()
            .map(|i| {
                let [a, b, c] = i.positions(&self.vertices);
                triangle_area(a, b, c)
            })
            .sum()
    }

    /// The spatial grid over the triangles.
    #[inline]
    pub fn grid(&self) -> &TriGrid {
        &self.grid
    }
}
