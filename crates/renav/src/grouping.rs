//! Partitions meshes into groups connected by surface intersections.

use crate::{
    geometry::{triangle_triangle_intersection, triangles_may_intersect},
    math::{Tolerances, TriangleVertices as _},
    mesh::Mesh,
};

/// Whether the surfaces of `a` and `b` cross anywhere.
pub fn meshes_intersect(a: &Mesh, b: &Mesh, tolerances: &Tolerances) -> bool {
    a.triangles().iter().any(|triangle_a| {
        let positions_a = triangle_a.positions(a.vertices());
        let centroid_a = positions_a.centroid();
        b.grid()
            .overlapping(&positions_a.aabb())
            .any(|triangle_b| {
                let positions_b = triangle_b.positions(b.vertices());
                triangles_may_intersect(
                    centroid_a,
                    triangle_a.longest_side,
                    positions_b.centroid(),
                    triangle_b.longest_side,
                ) && triangle_triangle_intersection(positions_a, positions_b, tolerances)
                    .is_some_and(|[start, end]| start.distance(end) > tolerances.snap)
            })
    })
}

/// Splits `meshes` into groups of meshes whose surfaces intersect, directly or through a
/// chain of other meshes.
///
/// Every mesh ends up in exactly one group. Groups are ordered by their lowest member and
/// members are sorted, so the result does not depend on intermediate group ids.
pub fn group_meshes(meshes: &[Mesh], tolerances: &Tolerances) -> Vec<Vec<usize>> {
    let mut group_of: Vec<Option<usize>> = vec![None; meshes.len()];
    let mut next_group = 0;
    for i in 0..meshes.len() {
        let current = *group_of[i].get_or_insert_with(|| {
            next_group += 1;
            next_group - 1
        });
        for j in i + 1..meshes.len() {
            if group_of[j] == Some(current) {
                continue;
            }
            if !meshes[i].bounds.overlaps(&meshes[j].bounds) {
                continue;
            }
            if !meshes_intersect(&meshes[i], &meshes[j], tolerances) {
                continue;
            }
            match group_of[j] {
                None => group_of[j] = Some(current),
                Some(old) => {
                    // Merge by remapping everything carrying the old id
                    for group in group_of.iter_mut().filter(|g| **g == Some(old)) {
                        *group = Some(current);
                    }
                }
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut slot_of_group: Vec<Option<usize>> = vec![None; next_group];
    for (mesh, group) in group_of.into_iter().enumerate() {
        // Every mesh was assigned in the outer loop.
        let Some(group) = group else { continue };
        let slot = *slot_of_group[group].get_or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(mesh);
    }
    tracing::debug!("Grouped {} meshes into {} groups", meshes.len(), groups.len());
    groups
}
