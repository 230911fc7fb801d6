use glam::{UVec3, Vec3A};

use crate::TriMesh;

/// An axis-aligned cube around the origin with outward facing triangles.
/// The top and bottom faces are split along `x == y`.
pub(crate) fn cube(half: f32) -> TriMesh {
    let h = half;
    TriMesh {
        vertices: vec![
            Vec3A::new(-h, -h, -h),
            Vec3A::new(h, -h, -h),
            Vec3A::new(h, h, -h),
            Vec3A::new(-h, h, -h),
            Vec3A::new(-h, -h, h),
            Vec3A::new(h, -h, h),
            Vec3A::new(h, h, h),
            Vec3A::new(-h, h, h),
        ],
        indices: vec![
            UVec3::new(0, 2, 1),
            UVec3::new(0, 3, 2),
            UVec3::new(4, 5, 6),
            UVec3::new(4, 6, 7),
            UVec3::new(0, 1, 5),
            UVec3::new(0, 5, 4),
            UVec3::new(3, 7, 6),
            UVec3::new(3, 6, 2),
            UVec3::new(0, 4, 7),
            UVec3::new(0, 7, 3),
            UVec3::new(1, 2, 6),
            UVec3::new(1, 6, 5),
        ],
    }
}
