//! Ear clipping for the polygons rebuilt by [`polygon`](crate::polygon).

use glam::Vec3A;
use thiserror::Error;

use crate::{
    geometry::{classify_vertices, point_strictly_in_triangle, polygon_normal, turn},
    math::Tolerances,
    polygon::Polygon,
};

/// Errors that prevent a polygon from being triangulated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriangulateError {
    /// The polygon has fewer than three vertices.
    #[error("polygon has only {count} vertices")]
    TooFewVertices {
        /// Number of vertices
        count: usize,
    },
    /// A full sweep around the ring found no vertex that can be clipped.
    #[error("no ear left with {remaining} vertices remaining")]
    NoEar {
        /// Vertices left in the ring when clipping stopped
        remaining: usize,
    },
}

/// Splits a simple planar polygon into `n - 2` triangles wound like the polygon.
pub fn triangulate(
    polygon: &Polygon,
    tolerances: &Tolerances,
) -> Result<Vec<[Vec3A; 3]>, TriangulateError> {
    let points = &polygon.vertices;
    let n = points.len();
    if n < 3 {
        return Err(TriangulateError::TooFewVertices { count: n });
    }
    if n == 3 {
        return Ok(vec![[points[0], points[1], points[2]]]);
    }

    // Seen along `up`, the ring runs counter-clockwise.
    let up = if polygon_normal(points).dot(polygon.normal) >= 0.0 {
        polygon.normal
    } else {
        -polygon.normal
    };
    let convex = |previous: Vec3A, current: Vec3A, next: Vec3A| {
        let scale = current.distance(previous) * current.distance(next);
        turn(previous, current, next, up) > tolerances.geometric * scale
    };

    let mut interior = classify_vertices(points, up, tolerances.geometric);
    let mut prev: Vec<usize> = (0..n).map(|i| (i + n - 1) % n).collect();
    let mut next: Vec<usize> = (0..n).map(|i| (i + 1) % n).collect();
    let mut remaining = n;
    let mut triangles = Vec::with_capacity(n - 2);

    let is_ear = |vertex: usize, prev: &[usize], next: &[usize], interior: &[bool]| {
        if !interior[vertex] {
            return false;
        }
        let ear = [points[prev[vertex]], points[vertex], points[next[vertex]]];
        let mut other = next[next[vertex]];
        while other != prev[vertex] {
            if point_strictly_in_triangle(points[other], ear, up) {
                return false;
            }
            other = next[other];
        }
        true
    };

    let mut current = 0;
    let mut fails = 0;
    while remaining > 3 {
        if !is_ear(current, &prev, &next, &interior) {
            fails += 1;
            if fails >= remaining {
                return Err(TriangulateError::NoEar { remaining });
            }
            current = next[current];
            continue;
        }
        let (before, after) = (prev[current], next[current]);
        triangles.push([points[before], points[current], points[after]]);
        next[before] = after;
        prev[after] = before;
        remaining -= 1;
        fails = 0;

        interior[before] = convex(points[prev[before]], points[before], points[after]);
        interior[after] = convex(points[before], points[after], points[next[after]]);
        current = after;
    }
    triangles.push([points[prev[current]], points[current], points[next[current]]]);
    Ok(triangles)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{geometry::triangle_area, polygon::PolygonMode};

    fn polygon(points: &[[f32; 2]]) -> Polygon {
        Polygon::new(
            points.iter().map(|[x, y]| Vec3A::new(*x, *y, 0.0)).collect(),
            0,
            Vec3A::Z,
            PolygonMode::Add,
        )
    }

    #[track_caller]
    fn assert_valid(polygon: &Polygon, triangles: &[[Vec3A; 3]]) {
        assert_eq!(triangles.len(), polygon.len() - 2);
        let area: f32 = triangles.iter().map(|[a, b, c]| triangle_area(*a, *b, *c)).sum();
        assert_relative_eq!(area, polygon.area(), epsilon = 1e-4);
        for [a, b, c] in triangles {
            assert!((*b - *a).cross(*c - *a).dot(polygon.normal) > 0.0);
        }
    }

    #[test]
    fn triangle_passes_through() {
        let polygon = polygon(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        let triangles = triangulate(&polygon, &Tolerances::default()).unwrap();
        assert_eq!(triangles, vec![[polygon.vertices[0], polygon.vertices[1], polygon.vertices[2]]]);
    }

    #[test]
    fn too_few_vertices() {
        let polygon = Polygon {
            vertices: vec![Vec3A::ZERO, Vec3A::X],
            triangle: 0,
            normal: Vec3A::Z,
            mode: PolygonMode::Add,
        };
        assert_eq!(
            triangulate(&polygon, &Tolerances::default()),
            Err(TriangulateError::TooFewVertices { count: 2 })
        );
    }

    #[test]
    fn flat_ring_has_no_ear() {
        let polygon = polygon(&[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0]]);
        assert_eq!(
            triangulate(&polygon, &Tolerances::default()),
            Err(TriangulateError::NoEar { remaining: 4 })
        );
    }

    #[test]
    fn convex_hexagon() {
        let points: Vec<[f32; 2]> = (0..6)
            .map(|i| {
                let angle = i as f32 * std::f32::consts::TAU / 6.0;
                [angle.cos(), angle.sin()]
            })
            .collect();
        let polygon = polygon(&points);
        let triangles = triangulate(&polygon, &Tolerances::default()).unwrap();
        assert_valid(&polygon, &triangles);
    }

    #[test]
    fn l_shape_avoids_reflex_ear() {
        let polygon = polygon(&[
            [0.0, 0.0],
            [2.0, 0.0],
            [2.0, 1.0],
            [1.0, 1.0],
            [1.0, 2.0],
            [0.0, 2.0],
        ]);
        let triangles = triangulate(&polygon, &Tolerances::default()).unwrap();
        assert_valid(&polygon, &triangles);
    }

    #[test]
    fn clockwise_input_is_handled() {
        // Bypasses the winding repair of `Polygon::new`
        let mut polygon = polygon(&[[0.0, 0.0], [3.0, 0.0], [3.0, 3.0], [1.5, 1.0], [0.0, 3.0]]);
        polygon.vertices.reverse();
        let triangles = triangulate(&polygon, &Tolerances::default()).unwrap();
        assert_eq!(triangles.len(), 3);
        let area: f32 = triangles.iter().map(|[a, b, c]| triangle_area(*a, *b, *c)).sum();
        assert_relative_eq!(area, polygon.area(), epsilon = 1e-4);
    }

    #[test]
    fn comb_shape() {
        let polygon = polygon(&[
            [0.0, 0.0],
            [5.0, 0.0],
            [5.0, 3.0],
            [4.0, 3.0],
            [4.0, 1.0],
            [3.0, 1.0],
            [3.0, 3.0],
            [2.0, 3.0],
            [2.0, 1.0],
            [1.0, 1.0],
            [1.0, 3.0],
            [0.0, 3.0],
        ]);
        let triangles = triangulate(&polygon, &Tolerances::default()).unwrap();
        assert_valid(&polygon, &triangles);
    }
}
