//! The triangle record stored in a [`TriGrid`](crate::TriGrid).

use bitflags::bitflags;
use glam::{UVec3, Vec3A};

use crate::math::{TriangleIndices as _, TriangleVertices as _};

bitflags! {
    /// One bit per triangle corner.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    pub struct VertexFlags: u8 {
        /// The first corner.
        const A = 1;
        /// The second corner.
        const B = 1 << 1;
        /// The third corner.
        const C = 1 << 2;
    }
}

impl VertexFlags {
    /// The flag of corner `index`.
    /// # Panics
    /// Panics if `index` is not 0, 1 or 2.
    #[inline]
    pub fn corner(index: usize) -> Self {
        [Self::A, Self::B, Self::C][index]
    }
}

bitflags! {
    /// What the pipeline decided to do with a triangle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    pub struct TriangleState: u8 {
        /// Removed from the output.
        const CULL = 1;
        /// The exposed surface could not be resolved.
        const PROBLEM = 1 << 1;
        /// Replaced by newly triangulated polygons.
        const TO_POLYGON = 1 << 2;
    }
}

/// A triangle of a mesh.
///
/// Positions live in the owning mesh's vertex buffer and are referenced by index. The
/// geometry never changes after construction, only the flags do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// Indices into the owning mesh's vertices.
    pub indices: UVec3,
    /// The unit normal, following the winding of `indices`.
    pub normal: Vec3A,
    /// The area of the triangle.
    pub area: f32,
    /// The length of the longest side.
    pub longest_side: f32,
    /// Corners enclosed by another mesh of the same group.
    pub obscured: VertexFlags,
    /// Corners inside the bounds volume.
    pub inside_bounds: VertexFlags,
    /// Decisions taken by the reconstruction stage.
    pub state: TriangleState,
    /// Whether the triangle straddles the boundary of the bounds volume.
    pub on_box_edge: bool,
}

impl Triangle {
    /// Builds the triangle referencing `indices` of `vertices`.
    ///
    /// Returns `None` for degenerate triangles.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds. Validate the mesh first.
    pub fn new(indices: UVec3, vertices: &[Vec3A]) -> Option<Self> {
        let [a, b, c] = indices.positions(vertices);
        let cross = (a - b).cross(a - c);
        let area = cross.length() * 0.5;
        if area <= f32::EPSILON {
            return None;
        }
        let longest_side = a.distance(b).max(b.distance(c)).max(c.distance(a));
        Some(Self {
            indices,
            normal: indices.normal(vertices),
            area,
            longest_side,
            obscured: VertexFlags::empty(),
            inside_bounds: VertexFlags::empty(),
            state: TriangleState::empty(),
            on_box_edge: false,
        })
    }

    /// The positions of the corners.
    #[inline]
    pub fn positions(&self, vertices: &[Vec3A]) -> [Vec3A; 3] {
        self.indices.positions(vertices)
    }

    /// The mean of the corners.
    #[inline]
    pub fn centroid(&self, vertices: &[Vec3A]) -> Vec3A {
        self.positions(vertices).centroid()
    }

    /// How many corners are obscured.
    #[inline]
    pub fn obscured_count(&self) -> u32 {
        self.obscured.bits().count_ones()
    }

    /// Whether the triangle goes to the output as it is.
    #[inline]
    pub fn is_unchanged(&self) -> bool {
        self.state.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn new_precomputes_geometry() {
        let vertices = [
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(3.0, 0.0, 0.0),
            Vec3A::new(0.0, 4.0, 0.0),
        ];
        let triangle = Triangle::new(UVec3::new(0, 1, 2), &vertices).unwrap();
        assert_relative_eq!(triangle.area, 6.0);
        assert_relative_eq!(triangle.longest_side, 5.0);
        assert_eq!(triangle.normal, Vec3A::Z);
        assert!(triangle.is_unchanged());
    }

    #[test]
    fn degenerate_triangles_are_rejected() {
        let vertices = [
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(1.0, 0.0, 0.0),
            Vec3A::new(2.0, 0.0, 0.0),
        ];
        assert!(Triangle::new(UVec3::new(0, 1, 2), &vertices).is_none());
    }

    #[test]
    fn flag_groups_are_independent() {
        let vertices = [Vec3A::ZERO, Vec3A::X, Vec3A::Y];
        let mut triangle = Triangle::new(UVec3::new(0, 1, 2), &vertices).unwrap();
        triangle.obscured |= VertexFlags::corner(0) | VertexFlags::corner(2);
        triangle.inside_bounds = VertexFlags::all();
        assert_eq!(triangle.obscured_count(), 2);
        assert!(triangle.is_unchanged());
        triangle.state |= TriangleState::CULL;
        assert!(!triangle.is_unchanged());
        assert_eq!(triangle.obscured, VertexFlags::A | VertexFlags::C);
    }
}
