// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Triangle mesh decoded from compiled STL bytes

use super::AnalysisError;
use nalgebra::Point3;
use std::io::Cursor;

/// Indexed triangle mesh in double precision
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[usize; 3]>,
}

impl TriangleMesh {
    /// Parse ASCII or binary STL
    pub fn from_stl(bytes: &[u8]) -> Result<Self, AnalysisError> {
        let mut cursor = Cursor::new(bytes);
        let stl = stl_io::read_stl(&mut cursor)
            .map_err(|err| AnalysisError::Parse(err.to_string()))?;

        // stl_io returns an IndexedMesh with shared vertices
        let vertices: Vec<Point3<f64>> = stl
            .vertices
            .iter()
            .map(|v| Point3::new(v[0] as f64, v[1] as f64, v[2] as f64))
            .collect();

        let mut triangles = Vec::with_capacity(stl.faces.len());
        for face in &stl.faces {
            if face.vertices.iter().any(|&i| i >= vertices.len()) {
                return Err(AnalysisError::Parse(
                    "face references a missing vertex".to_string(),
                ));
            }
            triangles.push(face.vertices);
        }

        let mesh = Self {
            vertices,
            triangles,
        };
        if mesh.is_empty() {
            return Err(AnalysisError::EmptyMesh);
        }
        Ok(mesh)
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.triangles.is_empty()
    }

    /// Corner positions of every triangle
    pub fn corners(&self) -> impl Iterator<Item = [&Point3<f64>; 3]> + '_ {
        self.triangles.iter().map(move |t| {
            [
                &self.vertices[t[0]],
                &self.vertices[t[1]],
                &self.vertices[t[2]],
            ]
        })
    }
}
