// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Physical measurements of a closed triangle mesh

use super::mesh::TriangleMesh;
use super::BoundingBox;
use nalgebra::{Point3, Vector3};

/// Below this the mesh is treated as flat when weighting the center of mass
const DEGENERATE_VOLUME: f64 = 1e-12;

/// Signed volume of the tetrahedron spanned by a triangle and the origin
fn signed_tetra_volume(v0: &Point3<f64>, v1: &Point3<f64>, v2: &Point3<f64>) -> f64 {
    v0.coords.dot(&v1.coords.cross(&v2.coords)) / 6.0
}

/// Enclosed volume from the sum of signed tetrahedra
pub fn volume(mesh: &TriangleMesh) -> f64 {
    mesh.corners()
        .map(|[v0, v1, v2]| signed_tetra_volume(v0, v1, v2))
        .sum::<f64>()
        .abs()
}

pub fn surface_area(mesh: &TriangleMesh) -> f64 {
    mesh.corners()
        .map(|[v0, v1, v2]| (v1 - v0).cross(&(v2 - v0)).norm() / 2.0)
        .sum()
}

pub fn bounding_box(mesh: &TriangleMesh) -> BoundingBox {
    let mut min = [f64::MAX; 3];
    let mut max = [f64::MIN; 3];

    for vertex in &mesh.vertices {
        for axis in 0..3 {
            min[axis] = min[axis].min(vertex[axis]);
            max[axis] = max[axis].max(vertex[axis]);
        }
    }

    BoundingBox { min, max }
}

/// Center of mass of the enclosed solid, assuming uniform density.
///
/// Each tetrahedron contributes its centroid weighted by its signed volume,
/// so the result does not depend on how the surface is triangulated. Open
/// or flat meshes fall back to the mean of the vertex positions.
pub fn center_of_mass(mesh: &TriangleMesh) -> [f64; 3] {
    let mut weighted = Vector3::<f64>::zeros();
    let mut total = 0.0_f64;

    for [v0, v1, v2] in mesh.corners() {
        let vol = signed_tetra_volume(v0, v1, v2);
        weighted += (v0.coords + v1.coords + v2.coords) * (vol / 4.0);
        total += vol;
    }

    if total.abs() > DEGENERATE_VOLUME {
        let com = weighted / total;
        return [com.x, com.y, com.z];
    }

    vertex_mean(mesh)
}

fn vertex_mean(mesh: &TriangleMesh) -> [f64; 3] {
    let sum = mesh
        .vertices
        .iter()
        .fold(Vector3::<f64>::zeros(), |acc, v| acc + v.coords);
    let mean = sum / mesh.vertices.len().max(1) as f64;
    [mean.x, mean.y, mean.z]
}
