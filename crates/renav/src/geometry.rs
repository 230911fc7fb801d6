//! Pure geometric predicates.
//!
//! Nothing in here mutates its inputs. Tolerances follow [`Tolerances`]: the geometric
//! tolerance is relative to the size of whatever is being tested, the snap tolerance is an
//! absolute distance.

use glam::Vec3A;

use crate::math::Tolerances;

/// Area of the triangle `abc`.
#[inline]
pub fn triangle_area(a: Vec3A, b: Vec3A, c: Vec3A) -> f32 {
    (a - b).cross(a - c).length() * 0.5
}

/// Whether `p` lies within the triangle, boundary included.
///
/// The three sub-triangles formed by `p` and each edge must not add up to more than
/// `area * (1 + tolerance)`. Points off the triangle's plane fail the test unless they are
/// very close to it.
#[inline]
pub fn point_in_triangle(p: Vec3A, [a, b, c]: [Vec3A; 3], area: f32, tolerance: f32) -> bool {
    let sum = triangle_area(p, a, b) + triangle_area(p, b, c) + triangle_area(p, c, a);
    sum <= area * (1.0 + tolerance)
}

/// Whether `p` lies strictly inside the triangle, as seen along `normal`.
/// Points on the boundary are outside.
pub fn point_strictly_in_triangle(p: Vec3A, [a, b, c]: [Vec3A; 3], normal: Vec3A) -> bool {
    let side = |from: Vec3A, to: Vec3A| (to - from).cross(p - from).dot(normal);
    let ab = side(a, b);
    let bc = side(b, c);
    let ca = side(c, a);
    (ab > 0.0 && bc > 0.0 && ca > 0.0) || (ab < 0.0 && bc < 0.0 && ca < 0.0)
}

/// Intersects the segment `p`-`q` with a triangle.
///
/// Segments parallel to the triangle's plane never hit. Returns the hit position.
pub fn segment_triangle_intersection(
    p: Vec3A,
    q: Vec3A,
    triangle: [Vec3A; 3],
    tolerance: f32,
) -> Option<Vec3A> {
    let [a, b, c] = triangle;
    let cross = (b - a).cross(c - a);
    let double_area = cross.length();
    if double_area <= f32::EPSILON {
        return None;
    }
    let normal = cross / double_area;
    let dir = q - p;
    let len = dir.length();
    if len <= f32::EPSILON {
        return None;
    }
    let denom = normal.dot(dir);
    if denom.abs() <= tolerance * len {
        // Parallel to the plane
        return None;
    }
    let t = normal.dot(a - p) / denom;
    if !(-tolerance..=1.0 + tolerance).contains(&t) {
        return None;
    }
    let hit = p + dir * t.clamp(0.0, 1.0);
    point_in_triangle(hit, triangle, double_area * 0.5, tolerance).then_some(hit)
}

/// Intersects the infinite line through `origin` along `dir` with a triangle.
///
/// Two-sided Möller-Trumbore. Returns the signed ray parameter, so hits behind the origin
/// are negative.
pub fn ray_triangle_intersection(
    origin: Vec3A,
    dir: Vec3A,
    [a, b, c]: [Vec3A; 3],
    tolerance: f32,
) -> Option<f32> {
    let edge1 = b - a;
    let edge2 = c - a;
    let h = dir.cross(edge2);
    let det = edge1.dot(h);
    if det.abs() <= tolerance * edge1.length() * edge2.length() * dir.length() {
        // Parallel to the triangle
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = inv_det * s.dot(h);
    if u < -tolerance || u > 1.0 + tolerance {
        return None;
    }
    let q = s.cross(edge1);
    let v = inv_det * dir.dot(q);
    if v < -tolerance || u + v > 1.0 + tolerance {
        return None;
    }
    Some(inv_det * edge2.dot(q))
}

/// Intersects the segment `p`-`q` with a planar quad face.
///
/// `quad` lists the corners in order around the face, `normal` is the face normal. Parallel
/// segments are rejected, then the hit distance is compared against the segment length and
/// finally the hit is projected onto the two edges leaving `quad[0]`.
pub fn segment_face_intersection(
    p: Vec3A,
    q: Vec3A,
    quad: [Vec3A; 4],
    normal: Vec3A,
    tolerance: f32,
) -> Option<Vec3A> {
    let dir = q - p;
    let len = dir.length();
    if len <= f32::EPSILON {
        return None;
    }
    let denom = normal.dot(dir);
    if denom.abs() <= tolerance * len {
        return None;
    }
    let t = normal.dot(quad[0] - p) / denom;
    if !(-tolerance..=1.0 + tolerance).contains(&t) {
        return None;
    }
    let hit = p + dir * t;
    let edge_u = quad[1] - quad[0];
    let edge_v = quad[3] - quad[0];
    let offset = hit - quad[0];
    let u = offset.dot(edge_u) / edge_u.length_squared();
    let v = offset.dot(edge_v) / edge_v.length_squared();
    let range = -tolerance..=1.0 + tolerance;
    (range.contains(&u) && range.contains(&v)).then_some(hit)
}

/// Cheap candidacy filter for [`triangle_triangle_intersection`]: two triangles can only
/// touch if their centroids are no farther apart than the sum of their longest sides.
#[inline]
pub fn triangles_may_intersect(
    centroid_a: Vec3A,
    longest_side_a: f32,
    centroid_b: Vec3A,
    longest_side_b: f32,
) -> bool {
    let reach = longest_side_a + longest_side_b;
    centroid_a.distance_squared(centroid_b) <= reach * reach
}

/// Computes the segment along which two triangles cross.
///
/// Every edge of `a` is intersected with `b` and every edge of `b` with `a`. Hits closer
/// than the snap tolerance are merged and the two hits farthest apart bound the segment.
/// Parallel and coplanar pairs never intersect.
pub fn triangle_triangle_intersection(
    a: [Vec3A; 3],
    b: [Vec3A; 3],
    tolerances: &Tolerances,
) -> Option<[Vec3A; 2]> {
    let normal_a = (a[1] - a[0]).cross(a[2] - a[0]).normalize_or_zero();
    let normal_b = (b[1] - b[0]).cross(b[2] - b[0]).normalize_or_zero();
    if normal_a == Vec3A::ZERO || normal_b == Vec3A::ZERO {
        return None;
    }
    if normal_a.cross(normal_b).length() <= tolerances.geometric {
        return None;
    }

    let mut hits: Vec<Vec3A> = Vec::with_capacity(6);
    let mut push = |hit: Vec3A| {
        if hits
            .iter()
            .all(|existing| existing.distance(hit) > tolerances.snap)
        {
            hits.push(hit);
        }
    };
    for (from, to) in [(a, b), (b, a)] {
        for i in 0..3 {
            let p = from[i];
            let q = from[(i + 1) % 3];
            if let Some(hit) = segment_triangle_intersection(p, q, to, tolerances.geometric) {
                push(hit);
            }
        }
    }
    if hits.len() < 2 {
        return None;
    }

    let mut best = (0, 1);
    let mut best_distance = 0.0;
    for i in 0..hits.len() {
        for j in i + 1..hits.len() {
            let distance = hits[i].distance_squared(hits[j]);
            if distance > best_distance {
                best_distance = distance;
                best = (i, j);
            }
        }
    }
    Some([hits[best.0], hits[best.1]])
}

/// The point of the triangle closest to `p`, found by locating `p` among the triangle's
/// vertex, edge and face regions.
pub fn closest_point_on_triangle(p: Vec3A, [a, b, c]: [Vec3A; 3]) -> Vec3A {
    let ab = b - a;
    let ac = c - a;
    let d1 = ab.dot(p - a);
    let d2 = ac.dot(p - a);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }
    let d3 = ab.dot(p - b);
    let d4 = ac.dot(p - b);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }
    let d5 = ab.dot(p - c);
    let d6 = ac.dot(p - c);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && d4 - d3 >= 0.0 && d5 - d6 >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }
    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

/// Moves `from` towards `to` by `distance`, but never more than half way.
#[inline]
pub fn step_towards(from: Vec3A, to: Vec3A, distance: f32) -> Vec3A {
    let step = to - from;
    from + step.clamp_length_max(distance.min(step.length() * 0.5))
}

/// Normal of a planar polygon using Newell's method. Its length is twice the polygon's area.
pub fn polygon_normal(points: &[Vec3A]) -> Vec3A {
    let mut normal = Vec3A::ZERO;
    for (i, current) in points.iter().enumerate() {
        let next = points[(i + 1) % points.len()];
        normal.x += (current.y - next.y) * (current.z + next.z);
        normal.y += (current.z - next.z) * (current.x + next.x);
        normal.z += (current.x - next.x) * (current.y + next.y);
    }
    normal
}

/// Area of a planar polygon.
#[inline]
pub fn polygon_area(points: &[Vec3A]) -> f32 {
    polygon_normal(points).length() * 0.5
}

/// Signed turn at `current` when walking `previous -> current -> next`, seen along `normal`.
#[inline]
pub(crate) fn turn(previous: Vec3A, current: Vec3A, next: Vec3A, normal: Vec3A) -> f32 {
    (current - previous).cross(next - current).dot(normal)
}

/// Classifies each vertex of a simple polygon as interior (convex, `true`) or exterior
/// (reflex or collinear, `false`).
///
/// The vertex farthest from the polygon's centroid is on the convex hull, so its turn
/// direction is the interior one. Every other vertex is interior exactly when it turns the
/// same way.
pub fn classify_vertices(points: &[Vec3A], normal: Vec3A, tolerance: f32) -> Vec<bool> {
    let n = points.len();
    if n < 3 {
        return vec![false; n];
    }
    let turns: Vec<f32> = (0..n)
        .map(|i| turn(points[(i + n - 1) % n], points[i], points[(i + 1) % n], normal))
        .collect();
    let scales: Vec<f32> = (0..n)
        .map(|i| {
            let previous = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            points[i].distance(previous) * points[i].distance(next)
        })
        .collect();

    let centroid = points.iter().copied().sum::<Vec3A>() / n as f32;
    let seed = (0..n)
        .max_by(|&i, &j| {
            centroid
                .distance_squared(points[i])
                .total_cmp(&centroid.distance_squared(points[j]))
        })
        .unwrap_or(0);
    let mut interior_sign = turns[seed].signum();
    if turns[seed].abs() <= tolerance * scales[seed] {
        // Farthest vertex is collinear with its neighbours, fall back to the winding.
        interior_sign = polygon_normal(points).dot(normal).signum();
    }

    (0..n)
        .map(|i| turns[i].abs() > tolerance * scales[i] && turns[i].signum() == interior_sign)
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn unit_triangle() -> [Vec3A; 3] {
        [
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(1.0, 0.0, 0.0),
            Vec3A::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn area_of_unit_triangle() {
        let [a, b, c] = unit_triangle();
        assert_relative_eq!(triangle_area(a, b, c), 0.5);
    }

    #[test]
    fn point_in_triangle_boundary_counts() {
        let tri = unit_triangle();
        assert!(point_in_triangle(Vec3A::new(0.25, 0.25, 0.0), tri, 0.5, 1e-4));
        assert!(point_in_triangle(Vec3A::new(0.5, 0.0, 0.0), tri, 0.5, 1e-4));
        assert!(!point_in_triangle(Vec3A::new(0.6, 0.6, 0.0), tri, 0.5, 1e-4));
        assert!(!point_in_triangle(Vec3A::new(0.25, 0.25, 0.5), tri, 0.5, 1e-4));
    }

    #[test]
    fn point_strictly_in_triangle_excludes_boundary() {
        let tri = unit_triangle();
        assert!(point_strictly_in_triangle(
            Vec3A::new(0.25, 0.25, 0.0),
            tri,
            Vec3A::Z
        ));
        assert!(!point_strictly_in_triangle(
            Vec3A::new(0.5, 0.0, 0.0),
            tri,
            Vec3A::Z
        ));
    }

    #[test]
    fn segment_hits_triangle() {
        let hit = segment_triangle_intersection(
            Vec3A::new(0.25, 0.25, -1.0),
            Vec3A::new(0.25, 0.25, 1.0),
            unit_triangle(),
            1e-4,
        )
        .unwrap();
        assert_relative_eq!(hit.z, 0.0);
    }

    #[test]
    fn segment_misses_when_short_or_parallel() {
        let tri = unit_triangle();
        assert!(
            segment_triangle_intersection(
                Vec3A::new(0.25, 0.25, 1.0),
                Vec3A::new(0.25, 0.25, 2.0),
                tri,
                1e-4
            )
            .is_none()
        );
        assert!(
            segment_triangle_intersection(
                Vec3A::new(-1.0, 0.25, 0.0),
                Vec3A::new(2.0, 0.25, 0.0),
                tri,
                1e-4
            )
            .is_none()
        );
    }

    #[test]
    fn ray_hits_on_both_sides() {
        let tri = unit_triangle();
        let above = ray_triangle_intersection(Vec3A::new(0.2, 0.2, 3.0), Vec3A::Z, tri, 1e-4);
        let below = ray_triangle_intersection(Vec3A::new(0.2, 0.2, -2.0), Vec3A::Z, tri, 1e-4);
        assert_relative_eq!(above.unwrap(), -3.0);
        assert_relative_eq!(below.unwrap(), 2.0);
        assert!(ray_triangle_intersection(Vec3A::new(0.2, 0.2, 0.0), Vec3A::X, tri, 1e-4).is_none());
    }

    #[test]
    fn segment_hits_quad_face() {
        let quad = [
            Vec3A::new(0.0, -1.0, -1.0),
            Vec3A::new(0.0, 1.0, -1.0),
            Vec3A::new(0.0, 1.0, 1.0),
            Vec3A::new(0.0, -1.0, 1.0),
        ];
        let hit = segment_face_intersection(
            Vec3A::new(-1.0, 0.5, 0.5),
            Vec3A::new(1.0, 0.5, 0.5),
            quad,
            Vec3A::X,
            1e-4,
        );
        assert_eq!(hit, Some(Vec3A::new(0.0, 0.5, 0.5)));
        let miss = segment_face_intersection(
            Vec3A::new(-1.0, 1.5, 0.5),
            Vec3A::new(1.0, 1.5, 0.5),
            quad,
            Vec3A::X,
            1e-4,
        );
        assert_eq!(miss, None);
    }

    #[test]
    fn crossing_triangles_share_a_segment() {
        let a = [
            Vec3A::new(-1.0, -1.0, 0.0),
            Vec3A::new(1.0, -1.0, 0.0),
            Vec3A::new(0.0, 1.0, 0.0),
        ];
        let b = [
            Vec3A::new(0.0, -2.0, -1.0),
            Vec3A::new(0.0, 2.0, -1.0),
            Vec3A::new(0.0, 0.0, 1.0),
        ];
        let [start, end] = triangle_triangle_intersection(a, b, &Tolerances::default()).unwrap();
        for point in [start, end] {
            assert_relative_eq!(point.x, 0.0);
            assert_relative_eq!(point.z, 0.0);
        }
        let length = start.distance(end);
        // From the bottom edge of `a` at y=-1 up to its apex at y=1.
        assert_relative_eq!(length, 2.0, epsilon = 1e-4);
    }

    #[test]
    fn coplanar_and_distant_triangles_do_not_intersect() {
        let tolerances = Tolerances::default();
        let a = unit_triangle();
        let shifted = a.map(|v| v + Vec3A::new(0.2, 0.2, 0.0));
        assert!(triangle_triangle_intersection(a, shifted, &tolerances).is_none());
        let far = [
            Vec3A::new(5.0, 0.0, -1.0),
            Vec3A::new(5.0, 1.0, -1.0),
            Vec3A::new(5.0, 0.0, 1.0),
        ];
        assert!(triangle_triangle_intersection(a, far, &tolerances).is_none());
    }

    #[test]
    fn closest_point_by_region() {
        let tri = unit_triangle();
        let cases = [
            (Vec3A::new(0.25, 0.25, 2.0), Vec3A::new(0.25, 0.25, 0.0)),
            (Vec3A::new(-1.0, -1.0, 0.5), tri[0]),
            (Vec3A::new(0.5, -3.0, 0.0), Vec3A::new(0.5, 0.0, 0.0)),
            (Vec3A::new(1.0, 1.0, 0.0), Vec3A::new(0.5, 0.5, 0.0)),
        ];
        for (point, expected) in cases {
            let closest = closest_point_on_triangle(point, tri);
            assert!(closest.abs_diff_eq(expected, 1e-6), "{point} -> {closest}");
        }
    }

    #[test]
    fn step_stops_half_way() {
        let step = step_towards(Vec3A::ZERO, Vec3A::X, 0.1);
        assert!(step.abs_diff_eq(Vec3A::new(0.1, 0.0, 0.0), 1e-6));
        let step = step_towards(Vec3A::ZERO, Vec3A::X, 3.0);
        assert!(step.abs_diff_eq(Vec3A::new(0.5, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn candidacy_filter_uses_summed_sides() {
        assert!(triangles_may_intersect(Vec3A::ZERO, 1.0, Vec3A::new(1.9, 0.0, 0.0), 1.0));
        assert!(!triangles_may_intersect(Vec3A::ZERO, 1.0, Vec3A::new(2.1, 0.0, 0.0), 1.0));
    }

    #[test]
    fn reflex_vertex_is_exterior() {
        // An L shape, counter-clockwise around +Z. Vertex 3 is the reflex corner.
        let points = [
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(2.0, 0.0, 0.0),
            Vec3A::new(2.0, 1.0, 0.0),
            Vec3A::new(1.0, 1.0, 0.0),
            Vec3A::new(1.0, 2.0, 0.0),
            Vec3A::new(0.0, 2.0, 0.0),
        ];
        let interior = classify_vertices(&points, Vec3A::Z, 1e-4);
        assert_eq!(interior, vec![true, true, true, false, true, true]);

        // Independent of which way we look at it.
        let flipped = classify_vertices(&points, -Vec3A::Z, 1e-4);
        assert_eq!(flipped, interior);
    }

    #[test]
    fn polygon_area_of_square() {
        let square = [
            Vec3A::new(0.0, 0.0, 1.0),
            Vec3A::new(2.0, 0.0, 1.0),
            Vec3A::new(2.0, 2.0, 1.0),
            Vec3A::new(0.0, 2.0, 1.0),
        ];
        assert_relative_eq!(polygon_area(&square), 4.0);
        assert!(polygon_normal(&square).z > 0.0);
    }
}
