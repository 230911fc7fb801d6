//! Small math helpers shared by the geometry stages.

use glam::{UVec3, Vec3A};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb3d {
    /// The minimum corner
    pub min: Vec3A,
    /// The maximum corner
    pub max: Vec3A,
}

impl Aabb3d {
    /// Creates an AABB from a center and half extents.
    #[inline]
    pub fn new(center: impl Into<Vec3A>, half_extents: impl Into<Vec3A>) -> Self {
        let center = center.into();
        let half_extents = half_extents.into();
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Computes the AABB of a set of vertices.
    /// Returns `None` if `verts` is empty.
    pub fn from_verts(verts: &[Vec3A]) -> Option<Self> {
        let first = *verts.first()?;
        let (min, max) = verts
            .iter()
            .skip(1)
            .fold((first, first), |(min, max), v| (min.min(*v), max.max(*v)));
        Some(Self { min, max })
    }

    /// The center of the box.
    #[inline]
    pub fn center(&self) -> Vec3A {
        (self.min + self.max) * 0.5
    }

    /// Half of the size of the box along each axis.
    #[inline]
    pub fn half_extents(&self) -> Vec3A {
        (self.max - self.min) * 0.5
    }

    /// The vector from `min` to `max`.
    #[inline]
    pub fn diagonal(&self) -> Vec3A {
        self.max - self.min
    }

    /// Returns a copy grown by `amount` on every side.
    #[inline]
    pub fn expanded(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec3A::splat(amount),
            max: self.max + Vec3A::splat(amount),
        }
    }

    /// Whether the two boxes share any point, boundaries included.
    #[inline]
    pub fn intersects(&self, other: &Aabb3d) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }
}

/// Tolerances used by the geometric predicates.
///
/// `geometric` is relative: it is scaled by the area or side length of whatever is
/// being tested. `snap` is absolute, in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Tolerances {
    /// Relative tolerance for containment and parallelism tests.
    pub geometric: f32,
    /// Distance below which two points are the same point.
    pub snap: f32,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            geometric: 1.0e-4,
            snap: 1.0e-2,
        }
    }
}

impl Tolerances {
    /// How far test points are moved off the edge or surface they sit on.
    #[inline]
    pub fn offset(&self) -> f32 {
        self.snap * 4.0
    }
}

pub(crate) trait TriangleIndices {
    fn positions(&self, vertices: &[Vec3A]) -> [Vec3A; 3];
    fn normal(&self, vertices: &[Vec3A]) -> Vec3A;
}

impl TriangleIndices for UVec3 {
    #[inline]
    fn positions(&self, vertices: &[Vec3A]) -> [Vec3A; 3] {
        [
            vertices[self.x as usize],
            vertices[self.y as usize],
            vertices[self.z as usize],
        ]
    }

    #[inline]
    fn normal(&self, vertices: &[Vec3A]) -> Vec3A {
        let [a, b, c] = self.positions(vertices);
        (b - a).cross(c - a).normalize_or_zero()
    }
}

pub(crate) trait TriangleVertices {
    fn aabb(&self) -> Aabb3d;
    fn centroid(&self) -> Vec3A;
}

impl TriangleVertices for [Vec3A; 3] {
    #[inline]
    fn aabb(&self) -> Aabb3d {
        let min = self[0].min(self[1]).min(self[2]);
        let max = self[0].max(self[1]).max(self[2]);
        Aabb3d { min, max }
    }

    #[inline]
    fn centroid(&self) -> Vec3A {
        (self[0] + self[1] + self[2]) / 3.0
    }
}

/// Bit-exact key for a position, used to merge identical vertices.
#[inline]
pub(crate) fn position_key(v: Vec3A) -> [u32; 3] {
    // -0.0 and 0.0 are the same vertex
    let v = v + Vec3A::ZERO;
    v.to_array().map(f32::to_bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aabb_from_verts() {
        let verts = [
            Vec3A::new(1.0, -2.0, 0.5),
            Vec3A::new(-1.0, 3.0, 0.0),
            Vec3A::new(0.0, 0.0, 4.0),
        ];
        let aabb = Aabb3d::from_verts(&verts).unwrap();
        assert_eq!(aabb.min, Vec3A::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3A::new(1.0, 3.0, 4.0));
        assert_eq!(Aabb3d::from_verts(&[]), None);
    }

    #[test]
    fn aabb_intersects_includes_touching() {
        let a = Aabb3d::new(Vec3A::ZERO, Vec3A::ONE);
        let b = Aabb3d::new(Vec3A::new(2.0, 0.0, 0.0), Vec3A::ONE);
        let c = Aabb3d::new(Vec3A::new(2.5, 0.0, 0.0), Vec3A::ONE);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn position_key_merges_signed_zero() {
        assert_eq!(
            position_key(Vec3A::new(0.0, 1.0, 2.0)),
            position_key(Vec3A::new(-0.0, 1.0, 2.0))
        );
    }
}
