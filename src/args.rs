// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! OpenSCAD command-line argument generation
//!
//! Pure mapping from {engine version, quality, output format} to the ordered
//! argument list handed to the engine. Nothing here touches the engine or the
//! filesystem, so every branch can be unit tested directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exact OpenSCAD flag spellings
pub mod flags {
    pub const OUTPUT: &str = "-o";
    pub const VERSION: &str = "--version";
    /// Fast-preview spelling understood by 2021.x releases
    pub const PREVIEW_LEGACY: &str = "--preview";
    pub const PREVIEW_FAST: &str = "--preview=fast";
    pub const BACKEND_MANIFOLD: &str = "--backend=manifold";
    pub const ENABLE_LAZY_UNION: &str = "--enable=lazy-union";
    pub const ENABLE_ROOF: &str = "--enable=roof";
    pub const ENABLE_FAST_CSG: &str = "--enable=fast-csg";
    pub const AUTOCENTER: &str = "--autocenter";
    pub const VIEWALL: &str = "--viewall";

    /// `--imgsize=<W>,<H>`
    pub fn imgsize(width: u32, height: u32) -> String {
        format!("--imgsize={},{}", width, height)
    }

    /// `--camera=<spec>`
    pub fn camera(spec: &str) -> String {
        format!("--camera={}", spec)
    }
}

/// Version prefix that selects the legacy preview flag
const LEGACY_YEAR: &str = "2021";

/// Path the source is staged at in an engine's virtual filesystem
pub const VIRTUAL_INPUT: &str = "/input.scad";

/// Speed/fidelity knob
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Fast, approximate draft render
    #[default]
    Preview,
    /// Full-fidelity render
    Render,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Preview => write!(f, "preview"),
            Quality::Render => write!(f, "render"),
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "preview" | "fast" => Ok(Quality::Preview),
            "render" | "full" => Ok(Quality::Render),
            other => Err(format!(
                "unknown quality '{}', expected 'preview' or 'render'",
                other
            )),
        }
    }
}

/// How a backend hands input and output locations to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoConvention {
    /// Native executable: `-o <output> <input>`
    Filesystem,
    /// In-memory filesystem of an embedded module: `<input> -o <output>`
    Virtual,
}

/// Per-quality extra argument sets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraArgs {
    /// Appended for `Quality::Preview`
    pub fast: Vec<String>,
    /// Appended for `Quality::Render`
    pub full: Vec<String>,
}

impl ExtraArgs {
    /// Extra arguments for a quality level; empty when unset
    pub fn for_quality(&self, quality: Quality) -> &[String] {
        match quality {
            Quality::Preview => &self.fast,
            Quality::Render => &self.full,
        }
    }

    /// The acceleration set used by the browser builds
    pub fn accelerated() -> Self {
        let accel: Vec<String> = [
            flags::BACKEND_MANIFOLD,
            flags::ENABLE_LAZY_UNION,
            flags::ENABLE_ROOF,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self {
            fast: accel.clone(),
            full: accel,
        }
    }
}

/// Argument generator for a single invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArgs {
    pub version: String,
    pub quality: Quality,
    pub output_format: String,
    pub convention: IoConvention,
}

impl CommandArgs {
    pub fn new(
        version: impl Into<String>,
        quality: Quality,
        output_format: impl Into<String>,
        convention: IoConvention,
    ) -> Self {
        Self {
            version: version.into(),
            quality,
            output_format: output_format.into(),
            convention,
        }
    }

    /// I/O tokens followed by quality flags
    pub fn build(&self, input: &str, output: &str) -> Vec<String> {
        let mut args = match self.convention {
            IoConvention::Filesystem => vec![
                flags::OUTPUT.to_string(),
                output.to_string(),
                input.to_string(),
            ],
            IoConvention::Virtual => vec![
                input.to_string(),
                flags::OUTPUT.to_string(),
                output.to_string(),
            ],
        };
        args.extend(self.quality_flags());
        args
    }

    /// Base arguments with caller-supplied extras merged after them
    pub fn build_with_extra(&self, input: &str, output: &str, extra: &[String]) -> Vec<String> {
        let mut args = self.build(input, output);
        args.extend(extra.iter().cloned());
        args
    }

    /// Artifact path in an engine's virtual filesystem, named after the
    /// output format
    pub fn virtual_output(&self) -> String {
        format!("/output.{}", self.output_format)
    }

    /// Full argument list for an engine with a virtual filesystem
    pub fn build_virtual(&self, extra: &[String]) -> Vec<String> {
        self.build_with_extra(VIRTUAL_INPUT, &self.virtual_output(), extra)
    }

    /// Flags implied by quality alone, without I/O tokens
    pub fn quality_flags(&self) -> Vec<String> {
        match self.quality {
            Quality::Render => Vec::new(),
            Quality::Preview if self.version.starts_with(LEGACY_YEAR) => {
                vec![flags::PREVIEW_LEGACY.to_string()]
            }
            Quality::Preview => vec![flags::PREVIEW_FAST.to_string()],
        }
    }
}
