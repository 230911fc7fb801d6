//! A coarse 3D bucket grid over the triangles of one mesh.
//!
//! Triangles are bucketed by centroid once, at construction. All triangles live in one
//! contiguous buffer ordered by bucket, and each bucket is a range into it.

use glam::{IVec3, UVec3, Vec3A};
use thiserror::Error;

use crate::{
    math::Aabb3d,
    triangle::Triangle,
};

/// Number of buckets along each axis.
pub const GRID_RESOLUTION: u32 = 8;

/// The grid bounds are grown by this fraction of the diagonal so that no centroid lands
/// exactly on the boundary.
const GRID_NUDGE: f32 = 0.005;

const BUCKET_COUNT: usize = (GRID_RESOLUTION * GRID_RESOLUTION * GRID_RESOLUTION) as usize;

/// A range of [`TriGrid::triangles`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bucket {
    /// Offset of the first triangle
    pub start: u32,
    /// Number of triangles
    pub len: u32,
}

/// Owns the triangles of a mesh, grouped into [`GRID_RESOLUTION`]³ buckets.
#[derive(Debug, Clone)]
pub struct TriGrid {
    aabb: Aabb3d,
    inv_cell_size: Vec3A,
    triangles: Vec<Triangle>,
    buckets: Vec<Bucket>,
    max_longest_side: f32,
}

impl TriGrid {
    /// Builds the grid over `triangles`, whose positions are in `vertices`.
    ///
    /// `aabb` should contain every vertex; it is nudged outward before use.
    pub fn new(
        aabb: Aabb3d,
        triangles: Vec<Triangle>,
        vertices: &[Vec3A],
    ) -> Result<Self, GridError> {
        let aabb = aabb.expanded(aabb.diagonal().length() * GRID_NUDGE);
        let dims = aabb.diagonal();
        if dims.cmple(Vec3A::ZERO).any() {
            return Err(GridError::Degenerate);
        }
        let mut grid = Self {
            aabb,
            inv_cell_size: Vec3A::splat(GRID_RESOLUTION as f32) / dims,
            triangles: Vec::new(),
            buckets: vec![Bucket::default(); BUCKET_COUNT],
            max_longest_side: 0.0,
        };

        let mut keys = Vec::with_capacity(triangles.len());
        for triangle in &triangles {
            let position = triangle.centroid(vertices);
            let cell = grid
                .world_to_cell(position)
                .ok_or(GridError::OutOfBounds { position })?;
            let key = bucket_index(cell);
            grid.buckets[key].len += 1;
            keys.push(key);
        }

        let mut offset = 0;
        for bucket in &mut grid.buckets {
            bucket.start = offset;
            offset += bucket.len;
        }

        // Counting sort into bucket order
        let mut cursor: Vec<u32> = grid.buckets.iter().map(|bucket| bucket.start).collect();
        let mut slots: Vec<Option<Triangle>> = vec![None; triangles.len()];
        for (triangle, key) in triangles.into_iter().zip(keys) {
            grid.max_longest_side = grid.max_longest_side.max(triangle.longest_side);
            slots[cursor[key] as usize] = Some(triangle);
            cursor[key] += 1;
        }
        grid.triangles = slots.into_iter().flatten().collect();
        Ok(grid)
    }

    /// The nudged bounds of the grid.
    #[inline]
    pub fn aabb(&self) -> &Aabb3d {
        &self.aabb
    }

    /// All triangles, in bucket order.
    #[inline]
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// All triangles, in bucket order. Only flags should be changed.
    #[inline]
    pub fn triangles_mut(&mut self) -> &mut [Triangle] {
        &mut self.triangles
    }

    /// The longest side of any triangle in the grid.
    #[inline]
    pub fn max_longest_side(&self) -> f32 {
        self.max_longest_side
    }

    /// The bucket containing `position`, or `None` if it is outside the grid.
    pub fn world_to_cell(&self, position: Vec3A) -> Option<UVec3> {
        let relative = (position - self.aabb.min) * self.inv_cell_size;
        let in_range = relative.cmpge(Vec3A::ZERO).all()
            && relative.cmplt(Vec3A::splat(GRID_RESOLUTION as f32)).all();
        in_range.then(|| relative.floor().as_uvec3())
    }

    /// The triangles of the bucket at `cell`.
    #[inline]
    pub fn bucket(&self, cell: UVec3) -> &[Triangle] {
        let bucket = self.buckets[bucket_index(cell)];
        let start = bucket.start as usize;
        &self.triangles[start..start + bucket.len as usize]
    }

    /// The triangles in the bucket of `position` and its up to 26 neighbours.
    ///
    /// Positions outside the grid query the closest bucket.
    pub fn nearby(&self, position: Vec3A) -> impl Iterator<Item = &Triangle> + '_ {
        let cell = self.clamped_cell(position);
        let min = (cell - IVec3::ONE).max(IVec3::ZERO);
        let max = (cell + IVec3::ONE).min(IVec3::splat(GRID_RESOLUTION as i32 - 1));
        self.cells_between(Some((min, max)))
    }

    /// The triangles whose bucket could hold a triangle touching `aabb`.
    ///
    /// Triangles are bucketed by centroid, so the query is grown by the longest side in the
    /// grid.
    pub fn overlapping(&self, aabb: &Aabb3d) -> impl Iterator<Item = &Triangle> + '_ {
        let query = aabb.expanded(self.max_longest_side);
        let range = query
            .intersects(&self.aabb)
            .then(|| (self.clamped_cell(query.min), self.clamped_cell(query.max)));
        self.cells_between(range)
    }

    fn clamped_cell(&self, position: Vec3A) -> IVec3 {
        let relative = (position - self.aabb.min) * self.inv_cell_size;
        relative
            .floor()
            .as_ivec3()
            .clamp(IVec3::ZERO, IVec3::splat(GRID_RESOLUTION as i32 - 1))
    }

    fn cells_between(&self, range: Option<(IVec3, IVec3)>) -> impl Iterator<Item = &Triangle> + '_ {
        range.into_iter().flat_map(move |(min, max)| {
            (min.z..=max.z).flat_map(move |z| {
                (min.y..=max.y).flat_map(move |y| {
                    (min.x..=max.x)
                        .flat_map(move |x| self.bucket(UVec3::new(x as u32, y as u32, z as u32)))
                })
            })
        })
    }
}

#[inline]
fn bucket_index(cell: UVec3) -> usize {
    (cell.x + cell.y * GRID_RESOLUTION + cell.z * GRID_RESOLUTION * GRID_RESOLUTION) as usize
}

/// Errors that can occur when building a [`TriGrid`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    /// A centroid fell outside the grid bounds.
    #[error("triangle centroid {position} lies outside the grid")]
    OutOfBounds {
        /// The centroid
        position: Vec3A,
    },
    /// The bounds have no volume, even after nudging.
    #[error("grid bounds are degenerate")]
    Degenerate,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A row of small triangles along the X axis.
    fn strip(count: u32) -> (Vec<Vec3A>, Vec<Triangle>) {
        let mut vertices = Vec::new();
        let mut triangles = Vec::new();
        for i in 0..count {
            let x = i as f32;
            let base = vertices.len() as u32;
            vertices.extend([
                Vec3A::new(x, 0.0, 0.0),
                Vec3A::new(x + 0.5, 0.0, 0.0),
                Vec3A::new(x, 0.5, 0.5),
            ]);
            triangles.push(Triangle::new(UVec3::new(base, base + 1, base + 2), &vertices).unwrap());
        }
        (vertices, triangles)
    }

    fn grid(count: u32) -> (Vec<Vec3A>, TriGrid) {
        let (vertices, triangles) = strip(count);
        let aabb = Aabb3d::from_verts(&vertices).unwrap();
        let grid = TriGrid::new(aabb, triangles, &vertices).unwrap();
        (vertices, grid)
    }

    #[test]
    fn every_triangle_lands_in_exactly_one_bucket() {
        let (_, grid) = grid(32);
        let mut total = 0;
        for z in 0..GRID_RESOLUTION {
            for y in 0..GRID_RESOLUTION {
                for x in 0..GRID_RESOLUTION {
                    total += grid.bucket(UVec3::new(x, y, z)).len();
                }
            }
        }
        assert_eq!(total, 32);
        assert_eq!(grid.triangles().len(), 32);
    }

    #[test]
    fn triangles_are_stored_in_bucket_order() {
        let (vertices, grid) = grid(32);
        let keys: Vec<usize> = grid
            .triangles()
            .iter()
            .map(|triangle| bucket_index(grid.world_to_cell(triangle.centroid(&vertices)).unwrap()))
            .collect();
        assert!(keys.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn outside_positions_have_no_cell() {
        let (_, grid) = grid(4);
        assert!(grid.world_to_cell(Vec3A::new(-10.0, 0.0, 0.0)).is_none());
        assert!(grid.world_to_cell(Vec3A::new(1.0, 0.2, 0.2)).is_some());
    }

    #[test]
    fn nearby_covers_neighbouring_buckets_on_every_axis() {
        let (vertices, grid) = grid(32);
        let query = Vec3A::new(16.0, 0.1, 0.1);
        let found: Vec<&Triangle> = grid.nearby(query).collect();
        assert!(!found.is_empty());
        // 32 units over 8 buckets: only the bucket and its X neighbours contribute
        assert!(found.len() < 32);
        for triangle in &found {
            let centroid = triangle.centroid(&vertices);
            assert!((centroid.x - query.x).abs() < 8.5, "{centroid}");
        }
    }

    #[test]
    fn overlapping_finds_far_reaching_triangles() {
        let (_, grid) = grid(32);
        let query = Aabb3d::new(Vec3A::new(31.2, 0.1, 0.1), Vec3A::splat(0.05));
        assert!(grid.overlapping(&query).count() > 0);
        let outside = Aabb3d::new(Vec3A::new(100.0, 0.0, 0.0), Vec3A::splat(0.5));
        assert_eq!(grid.overlapping(&outside).count(), 0);
    }

    #[test]
    fn flat_meshes_still_build() {
        let vertices = vec![
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(1.0, 0.0, 0.0),
            Vec3A::new(0.0, 1.0, 0.0),
        ];
        let triangle = Triangle::new(UVec3::new(0, 1, 2), &vertices).unwrap();
        let aabb = Aabb3d::from_verts(&vertices).unwrap();
        let grid = TriGrid::new(aabb, vec![triangle], &vertices).unwrap();
        assert_eq!(grid.triangles().len(), 1);
    }
}
