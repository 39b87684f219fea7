// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyframe Compiler
//!
//! Compiles OpenSCAD source to rendered artifacts (meshes, 3D-print packages,
//! raster previews, scene-graph dumps) through one of three interchangeable
//! engines: a native executable in a child process, an embedded engine module,
//! or an engine module hosted on a shared background worker.
//!
//! ```no_run
//! use polyframe_compiler::{Compiler, CompilerConfig, Quality};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let compiler = Compiler::new(CompilerConfig::default())?;
//! let stl = compiler.compile("cube(10);", Quality::Render).finish().await.into_artifact()?;
//! let dims = compiler.get_dimensions("cube(10);").await?;
//! println!("{} bytes, volume {}", stl.len(), dims.volume);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod args;
pub mod backend;
pub mod compiler;
pub mod config;
pub mod error;
pub mod event;
pub mod version;

pub use analysis::{BoundingBox, DimensionReport, MeshAnalyzer, StlAnalyzer};
pub use args::{CommandArgs, ExtraArgs, IoConvention, Quality};
pub use backend::{
    Backend, CompilationRequest, EngineError, EngineInstance, EngineKind, EngineModule,
    ExecutionBackend, OutputSink,
};
pub use compiler::{CompileOptions, Compiler, CompilerBuilder, PreviewOptions};
pub use config::CompilerConfig;
pub use error::{CompileError, CompileResult};
pub use event::{Compilation, CompileOutcome, LifecycleEvent, OutputStream};
