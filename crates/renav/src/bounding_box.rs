//! Oriented bounding boxes used to pre-filter mesh pairs.

use glam::{Affine3A, Vec3A};

use crate::{
    geometry::segment_face_intersection,
    math::{Aabb3d, Tolerances},
};

/// Sign pattern of each corner. The order is fixed so that [`BoundingBox::EDGES`] and
/// [`BoundingBox::FACES`] are valid for every box.
const CORNER_SIGNS: [[f32; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, 1.0, -1.0],
    [1.0, -1.0, 1.0],
    [-1.0, 1.0, 1.0],
    [1.0, 1.0, 1.0],
];

/// A possibly rotated box given by its eight corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// The corners, in the order of the local sign pattern
    /// `(-,-,-) (+,-,-) (-,+,-) (-,-,+) (+,+,-) (+,-,+) (-,+,+) (+,+,+)`.
    pub vertices: [Vec3A; 8],
    /// Outward normals of [`BoundingBox::FACES`].
    pub normals: [Vec3A; 6],
    /// Edge vectors from corner 0 used by [`BoundingBox::contains_point`].
    overlap_vectors: [Vec3A; 3],
    /// Squared lengths of `overlap_vectors`.
    overlap_lengths: [f32; 3],
    diagonal: f32,
}

impl BoundingBox {
    /// Corner indices of the twelve box edges.
    pub const EDGES: [[usize; 2]; 12] = [
        [0, 1],
        [2, 4],
        [3, 5],
        [6, 7],
        [0, 2],
        [1, 4],
        [3, 6],
        [5, 7],
        [0, 3],
        [1, 5],
        [2, 6],
        [4, 7],
    ];

    /// Corner indices of the six faces, ordered around each face.
    /// Order: -X, +X, -Y, +Y, -Z, +Z.
    pub const FACES: [[usize; 4]; 6] = [
        [0, 3, 6, 2],
        [1, 4, 7, 5],
        [0, 1, 5, 3],
        [2, 6, 7, 4],
        [0, 2, 4, 1],
        [3, 5, 7, 6],
    ];

    /// Creates a box of half size `extent` around the origin of `transform`.
    pub fn new(transform: Affine3A, extent: Vec3A) -> Self {
        let vertices =
            CORNER_SIGNS.map(|sign| transform.transform_point3a(Vec3A::from_array(sign) * extent));
        Self::from_vertices(vertices)
    }

    /// Creates an unrotated box matching `aabb`.
    pub fn from_aabb(aabb: &Aabb3d) -> Self {
        Self::new(
            Affine3A::from_translation(aabb.center().into()),
            aabb.half_extents(),
        )
    }

    /// Creates the box around a local-space `aabb` after applying `transform`.
    pub fn from_local_aabb(transform: Affine3A, aabb: &Aabb3d) -> Self {
        let transform = transform * Affine3A::from_translation(aabb.center().into());
        Self::new(transform, aabb.half_extents())
    }

    fn from_vertices(vertices: [Vec3A; 8]) -> Self {
        let overlap_vectors = [
            vertices[1] - vertices[0],
            vertices[2] - vertices[0],
            vertices[3] - vertices[0],
        ];
        let overlap_lengths = overlap_vectors.map(Vec3A::length_squared);
        let center = vertices.iter().copied().sum::<Vec3A>() / 8.0;
        let normals = Self::FACES.map(|face| {
            let face_center = face.iter().map(|&i| vertices[i]).sum::<Vec3A>() / 4.0;
            (face_center - center).normalize_or_zero()
        });
        Self {
            vertices,
            normals,
            overlap_vectors,
            overlap_lengths,
            diagonal: vertices[0].distance(vertices[7]),
        }
    }

    /// Distance between corner 0 and corner 7.
    #[inline]
    pub fn diagonal_length(&self) -> f32 {
        self.diagonal
    }

    /// The corners of face `index`, see [`BoundingBox::FACES`].
    #[inline]
    pub fn face(&self, index: usize) -> [Vec3A; 4] {
        Self::FACES[index].map(|i| self.vertices[i])
    }

    /// The smallest axis-aligned box containing this one.
    pub fn aabb(&self) -> Aabb3d {
        // Eight corners are never empty.
        let (min, max) = self.vertices.iter().skip(1).fold(
            (self.vertices[0], self.vertices[0]),
            |(min, max), v| (min.min(*v), max.max(*v)),
        );
        Aabb3d { min, max }
    }

    /// Whether `point` lies strictly inside the box.
    ///
    /// The offset from corner 0 is projected onto the three edges leaving it. Each projection
    /// must land strictly between 0 and the squared edge length, which holds for rotated
    /// boxes as well.
    pub fn contains_point(&self, point: Vec3A) -> bool {
        let offset = point - self.vertices[0];
        self.overlap_vectors
            .iter()
            .zip(self.overlap_lengths)
            .all(|(axis, length)| {
                let projection = offset.dot(*axis);
                projection > 0.0 && projection < length
            })
    }

    /// Whether the segment `p`-`q` crosses one of the box faces.
    pub fn segment_hits_face(&self, p: Vec3A, q: Vec3A, tolerance: f32) -> bool {
        (0..6).any(|i| segment_face_intersection(p, q, self.face(i), self.normals[i], tolerance).is_some())
    }

    /// Whether the two boxes overlap.
    ///
    /// Either box has a corner inside the other, or an edge of either box crosses a face of
    /// the other. Touching faces count as overlapping.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        // Separated on the world axes
        if !self.aabb().intersects(&other.aabb()) {
            return false;
        }
        let corner_inside = |outer: &BoundingBox, inner: &BoundingBox| {
            inner.vertices.iter().any(|v| outer.contains_point(*v))
        };
        if corner_inside(self, other) || corner_inside(other, self) {
            return true;
        }
        let tolerance = Tolerances::default().geometric;
        let edge_crosses = |edges: &BoundingBox, faces: &BoundingBox| {
            Self::EDGES.iter().any(|[a, b]| {
                faces.segment_hits_face(edges.vertices[*a], edges.vertices[*b], tolerance)
            })
        };
        edge_crosses(self, other) || edge_crosses(other, self)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::Quat;

    use super::*;

    fn unit_box_at(x: f32, y: f32, z: f32) -> BoundingBox {
        BoundingBox::new(Affine3A::from_translation([x, y, z].into()), Vec3A::ONE)
    }

    #[test]
    fn corners_follow_sign_pattern() {
        let bounds = unit_box_at(0.0, 0.0, 0.0);
        assert_eq!(bounds.vertices[0], Vec3A::new(-1.0, -1.0, -1.0));
        assert_eq!(bounds.vertices[4], Vec3A::new(1.0, 1.0, -1.0));
        assert_eq!(bounds.vertices[7], Vec3A::ONE);
        assert_eq!(bounds.normals[0], -Vec3A::X);
        assert_eq!(bounds.normals[5], Vec3A::Z);
        assert_relative_eq!(bounds.diagonal_length(), 12.0_f32.sqrt());
    }

    #[test]
    fn contains_point_is_strict() {
        let bounds = unit_box_at(0.0, 0.0, 0.0);
        assert!(bounds.contains_point(Vec3A::new(0.5, -0.5, 0.9)));
        assert!(!bounds.contains_point(Vec3A::new(1.0, 0.0, 0.0)));
        assert!(!bounds.contains_point(Vec3A::new(1.5, 0.0, 0.0)));
    }

    #[test]
    fn contains_point_in_rotated_box() {
        let transform = Affine3A::from_rotation_translation(
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_4),
            glam::Vec3::ZERO,
        );
        let bounds = BoundingBox::new(transform, Vec3A::new(2.0, 0.25, 1.0));
        // Along the rotated long axis
        assert!(bounds.contains_point(Vec3A::new(1.0, 1.0, 0.0)));
        // Inside the AABB of the rotated box, but not inside the box itself
        assert!(!bounds.contains_point(Vec3A::new(1.0, -1.0, 0.0)));
    }

    #[test]
    fn overlap_is_symmetric() {
        let a = unit_box_at(0.0, 0.0, 0.0);
        let cases = [
            unit_box_at(1.0, 0.0, 0.0),
            unit_box_at(2.0, 0.0, 0.0),
            unit_box_at(2.5, 0.0, 0.0),
            unit_box_at(0.5, 0.5, 0.5),
            BoundingBox::new(Affine3A::IDENTITY, Vec3A::splat(0.25)),
        ];
        for b in cases {
            assert_eq!(a.overlaps(&b), b.overlaps(&a));
        }
        assert!(a.overlaps(&cases[0]));
        assert!(a.overlaps(&cases[1]));
        assert!(!a.overlaps(&cases[2]));
        assert!(a.overlaps(&cases[4]));
    }

    #[test]
    fn crossed_boxes_overlap_without_corners_inside() {
        // A long thin box along X piercing a long thin box along Y.
        let a = BoundingBox::new(Affine3A::IDENTITY, Vec3A::new(3.0, 0.5, 0.5));
        let b = BoundingBox::new(Affine3A::IDENTITY, Vec3A::new(0.5, 3.0, 0.5));
        assert!(a.vertices.iter().all(|v| !b.contains_point(*v)));
        assert!(b.vertices.iter().all(|v| !a.contains_point(*v)));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }
}
