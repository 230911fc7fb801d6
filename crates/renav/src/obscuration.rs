//! Decides which parts of a mesh surface are hidden by other meshes of their group.
//!
//! A point is inside a mesh when the vertical line through it crosses that mesh's surface
//! an odd number of times below it. The line always runs along world Z, so surfaces
//! parallel to Z are never crossed. Points within snap distance of a surface are resolved
//! separately, by lifting them off the tested surface along its normal.

use glam::Vec3A;

use crate::{
    bounding_box::BoundingBox,
    geometry::{closest_point_on_triangle, ray_triangle_intersection, step_towards},
    math::{Aabb3d, Tolerances, TriangleVertices as _},
    mesh::Mesh,
    triangle::VertexFlags,
};

/// Minimum cosine between the normals of two coinciding surfaces that face the same way.
const FACING_COS: f32 = 0.999;

/// Something that can report where a point sits relative to its surface.
pub trait SurfaceQuery {
    /// Pushes the heights at which the vertical line through `(x, y)` crosses the surface.
    /// The heights may be unsorted and may contain near-duplicates.
    fn vertical_crossings(&self, x: f32, y: f32, tolerances: &Tolerances, out: &mut Vec<f32>);

    /// Pushes the normals of the surface triangles passing within snap distance of `point`.
    fn normals_near(&self, point: Vec3A, tolerances: &Tolerances, out: &mut Vec<Vec3A>);
}

impl SurfaceQuery for Mesh {
    fn vertical_crossings(&self, x: f32, y: f32, tolerances: &Tolerances, out: &mut Vec<f32>) {
        let grid = self.grid();
        let column = Aabb3d {
            min: Vec3A::new(x - tolerances.snap, y - tolerances.snap, grid.aabb().min.z),
            max: Vec3A::new(x + tolerances.snap, y + tolerances.snap, grid.aabb().max.z),
        };
        let origin = Vec3A::new(x, y, 0.0);
        for triangle in grid.overlapping(&column) {
            let positions = triangle.positions(self.vertices());
            let bounds = positions.aabb().expanded(tolerances.snap);
            if x < bounds.min.x || x > bounds.max.x || y < bounds.min.y || y > bounds.max.y {
                continue;
            }
            if let Some(height) =
                ray_triangle_intersection(origin, Vec3A::Z, positions, tolerances.geometric)
            {
                out.push(height);
            }
        }
    }

    fn normals_near(&self, point: Vec3A, tolerances: &Tolerances, out: &mut Vec<Vec3A>) {
        let query = Aabb3d::new(point, Vec3A::splat(tolerances.snap));
        for triangle in self.grid().overlapping(&query) {
            let positions = triangle.positions(self.vertices());
            if closest_point_on_triangle(point, positions).distance(point) <= tolerances.snap {
                out.push(triangle.normal);
            }
        }
    }
}

/// Where a point sits relative to a closed surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// Outside the enclosed volume.
    Outside,
    /// Inside the enclosed volume.
    Inside,
    /// Within snap distance of the surface.
    OnSurface,
}

/// Buffers reused between containment tests to avoid allocations.
#[derive(Debug, Default)]
pub struct SurfaceScratch {
    heights: Vec<f32>,
    normals: Vec<Vec3A>,
}

/// Whether `point` is inside `surface`, by the parity of the crossings below it.
///
/// `heights` is reused between calls.
pub fn point_enclosed<Q: SurfaceQuery + ?Sized>(
    point: Vec3A,
    surface: &Q,
    tolerances: &Tolerances,
    heights: &mut Vec<f32>,
) -> bool {
    heights.clear();
    surface.vertical_crossings(point.x, point.y, tolerances, heights);
    if heights.is_empty() {
        return false;
    }
    heights.sort_by(f32::total_cmp);
    // An edge shared by two triangles is crossed twice at the same height.
    heights.dedup_by(|a, b| (*a - *b).abs() <= tolerances.snap);
    let below = heights.iter().take_while(|height| **height < point.z).count();
    below % 2 == 1
}

/// Where `point` sits relative to `surface`.
///
/// On [`Containment::OnSurface`], the normals of the nearby surface are left in `scratch`.
pub fn containment<Q: SurfaceQuery + ?Sized>(
    point: Vec3A,
    surface: &Q,
    tolerances: &Tolerances,
    scratch: &mut SurfaceScratch,
) -> Containment {
    scratch.normals.clear();
    surface.normals_near(point, tolerances, &mut scratch.normals);
    if !scratch.normals.is_empty() {
        Containment::OnSurface
    } else if point_enclosed(point, surface, tolerances, &mut scratch.heights) {
        Containment::Inside
    } else {
        Containment::Outside
    }
}

/// Whether the surface of `group[own]` at `point`, facing along `normal`, is hidden by
/// another mesh of the group.
///
/// A point inside another mesh is hidden. A point on another mesh's surface is lifted off
/// along `normal`: when the lifted point is inside that mesh the two surfaces are pressed
/// back to back and hide each other. Where two surfaces coincide and face the same way,
/// only the copy of the lower mesh index stays visible.
pub fn surface_hidden(
    point: Vec3A,
    normal: Vec3A,
    group: &[Mesh],
    own: usize,
    tolerances: &Tolerances,
    scratch: &mut SurfaceScratch,
) -> bool {
    group
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != own)
        .any(|(i, mesh)| match containment(point, mesh, tolerances, scratch) {
            Containment::Inside => true,
            Containment::Outside => false,
            Containment::OnSurface => {
                let co_facing = scratch.normals.iter().any(|n| n.dot(normal) >= FACING_COS);
                let lifted = point + normal * tolerances.offset();
                match containment(lifted, mesh, tolerances, scratch) {
                    Containment::Inside => true,
                    Containment::Outside | Containment::OnSurface => co_facing && i < own,
                }
            }
        })
}

/// Sets the `obscured` and `inside_bounds` flags of every triangle in the group.
///
/// A corner is tested a little inside its triangle, so that corners shared by faces with
/// different fates are judged per face.
pub fn classify_group(
    group: &mut [Mesh],
    bounds_volume: Option<&BoundingBox>,
    tolerances: &Tolerances,
) {
    let mut scratch = SurfaceScratch::default();
    for own in 0..group.len() {
        let meshes: &[Mesh] = group;
        let mesh = &meshes[own];
        let obscured: Vec<VertexFlags> = mesh
            .triangles()
            .iter()
            .map(|triangle| {
                let positions = triangle.positions(mesh.vertices());
                let centroid = positions.centroid();
                let mut flags = VertexFlags::empty();
                for (corner, position) in positions.into_iter().enumerate() {
                    let point = step_towards(position, centroid, tolerances.offset());
                    if surface_hidden(point, triangle.normal, meshes, own, tolerances, &mut scratch)
                    {
                        flags |= VertexFlags::corner(corner);
                    }
                }
                flags
            })
            .collect();
        let inside: Vec<bool> = mesh
            .vertices()
            .iter()
            .map(|v| bounds_volume.is_none_or(|bounds| bounds.contains_point(*v)))
            .collect();

        let mesh = &mut group[own];
        let mut obscured_triangles = 0;
        for (triangle, obscured) in mesh.triangles_mut().iter_mut().zip(obscured) {
            triangle.obscured = obscured;
            triangle.inside_bounds = VertexFlags::empty();
            for (corner, index) in triangle.indices.to_array().into_iter().enumerate() {
                if inside[index as usize] {
                    triangle.inside_bounds |= VertexFlags::corner(corner);
                }
            }
            triangle.on_box_edge =
                !triangle.inside_bounds.is_empty() && !triangle.inside_bounds.is_all();
            if !triangle.obscured.is_empty() {
                obscured_triangles += 1;
            }
        }
        tracing::debug!(
            "Mesh {}: {obscured_triangles} of {} triangles have obscured corners",
            mesh.source,
            mesh.triangles().len()
        );
    }
}
