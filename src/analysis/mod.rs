// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Mesh analysis for compiled artifacts
//!
//! The orchestrator hands STL bytes to a [`MeshAnalyzer`] to produce a
//! [`DimensionReport`]. [`StlAnalyzer`] is the default; callers with their
//! own geometry stack can plug in a different analyzer.

pub mod mesh;
mod metrics;

pub use mesh::TriangleMesh;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid STL data: {0}")]
    Parse(String),

    #[error("mesh has no triangles")]
    EmptyMesh,
}

/// Axis-aligned bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    /// Extent along each axis
    pub fn size(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// Physical dimensions of a compiled solid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionReport {
    /// Cubic model units
    pub volume: f64,
    /// Square model units
    pub surface_area: f64,
    pub bounding_box: BoundingBox,
    pub center_of_mass: [f64; 3],
}

/// Computes a [`DimensionReport`] from mesh bytes
pub trait MeshAnalyzer: Send + Sync {
    fn analyze(&self, mesh: &[u8]) -> Result<DimensionReport, AnalysisError>;
}

/// Analyzer for ASCII and binary STL
#[derive(Debug, Clone, Copy, Default)]
pub struct StlAnalyzer;

impl MeshAnalyzer for StlAnalyzer {
    fn analyze(&self, bytes: &[u8]) -> Result<DimensionReport, AnalysisError> {
        let mesh = TriangleMesh::from_stl(bytes)?;
        Ok(measure(&mesh))
    }
}

/// Measure an already decoded mesh
pub fn measure(mesh: &TriangleMesh) -> DimensionReport {
    DimensionReport {
        volume: metrics::volume(mesh),
        surface_area: metrics::surface_area(mesh),
        bounding_box: metrics::bounding_box(mesh),
        center_of_mass: metrics::center_of_mass(mesh),
    }
}
