// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Compilation orchestrator
//!
//! [`Compiler`] picks an execution backend once, from its configuration, and
//! exposes the compile primitive plus the operations derived from it. Derived
//! operations build their own [`CompileOptions`] for each call; the compiler's
//! configuration is never modified after construction.

use crate::analysis::{DimensionReport, MeshAnalyzer, StlAnalyzer};
use crate::args::{flags, Quality};
use crate::backend::{
    Backend, CompilationRequest, EmbeddedBackend, EngineKind, EngineModule, ExecutionBackend,
    SubprocessBackend, WorkerBackend,
};
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::event::Compilation;
use crate::version;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Scene-graph dump format
pub const SCENE_GRAPH_FORMAT: &str = "csg";
/// Mesh format fed to the analyzer
pub const MESH_FORMAT: &str = "stl";
/// Raster format for previews
pub const PREVIEW_FORMAT: &str = "png";

/// Settings for a single compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub output_format: String,
    pub quality: Quality,
    /// Appended after the base arguments
    pub extra_arguments: Vec<String>,
}

impl CompileOptions {
    pub fn new(output_format: impl Into<String>, quality: Quality) -> Self {
        Self {
            output_format: output_format.into(),
            quality,
            extra_arguments: Vec::new(),
        }
    }

    /// Options `compile` would use for `quality` under `config`
    pub fn from_config(config: &CompilerConfig, quality: Quality) -> Self {
        Self {
            output_format: config.output_format.clone(),
            quality,
            extra_arguments: config.extra_args(quality).to_vec(),
        }
    }

    pub fn with_output_format(mut self, output_format: impl Into<String>) -> Self {
        self.output_format = output_format.into();
        self
    }

    pub fn with_extra_arguments<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_arguments.extend(extra.into_iter().map(Into::into));
        self
    }
}

/// View framing for [`Compiler::get_preview`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewOptions {
    pub width: u32,
    pub height: u32,
    /// Passed through as `--camera=<spec>`
    pub camera: Option<String>,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            camera: None,
        }
    }
}

impl PreviewOptions {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            camera: None,
        }
    }

    pub fn with_camera(mut self, camera: impl Into<String>) -> Self {
        self.camera = Some(camera.into());
        self
    }

    /// View-framing flags, in the order they are passed to the engine
    pub fn flags(&self) -> Vec<String> {
        let mut args = vec![
            flags::AUTOCENTER.to_string(),
            flags::VIEWALL.to_string(),
            flags::imgsize(self.width, self.height),
        ];
        if let Some(camera) = &self.camera {
            args.push(flags::camera(camera));
        }
        args
    }
}

/// Builder for [`Compiler`]
pub struct CompilerBuilder {
    config: CompilerConfig,
    module: Option<Arc<dyn EngineModule>>,
    analyzer: Option<Arc<dyn MeshAnalyzer>>,
}

impl CompilerBuilder {
    /// Engine module for the embedded and worker engines
    pub fn module(mut self, module: Arc<dyn EngineModule>) -> Self {
        self.module = Some(module);
        self
    }

    /// Replace the default STL analyzer used by `get_dimensions`
    pub fn analyzer(mut self, analyzer: Arc<dyn MeshAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn build(self) -> CompileResult<Compiler> {
        let config = self.config;
        let backend = match config.engine {
            EngineKind::Subprocess => {
                let mut backend = SubprocessBackend::new(config.executable.clone());
                if let Some(dir) = &config.temp_dir {
                    backend = backend.with_temp_dir(dir.clone());
                }
                Backend::Subprocess(backend)
            }
            EngineKind::Embedded => {
                Backend::Embedded(EmbeddedBackend::new(require_module(self.module, config.engine)?))
            }
            EngineKind::Worker => Backend::Worker(WorkerBackend::with_timeouts(
                require_module(self.module, config.engine)?,
                config.worker.timeouts(),
            )),
        };
        info!(engine = %config.engine, format = %config.output_format, "compiler ready");

        Ok(Compiler {
            config,
            backend,
            analyzer: self.analyzer.unwrap_or_else(|| Arc::new(StlAnalyzer)),
        })
    }
}

fn require_module(
    module: Option<Arc<dyn EngineModule>>,
    engine: EngineKind,
) -> CompileResult<Arc<dyn EngineModule>> {
    module.ok_or_else(|| {
        CompileError::Configuration(format!("the {} engine needs an engine module", engine))
    })
}

/// Uniform front end over the configured engine
pub struct Compiler {
    config: CompilerConfig,
    backend: Backend,
    analyzer: Arc<dyn MeshAnalyzer>,
}

impl Compiler {
    /// Compiler for `config`. Embedded and worker engines need
    /// [`Compiler::builder`] to supply a module.
    pub fn new(config: CompilerConfig) -> CompileResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: CompilerConfig) -> CompilerBuilder {
        CompilerBuilder {
            config,
            module: None,
            analyzer: None,
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn engine(&self) -> EngineKind {
        self.backend.kind()
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Compile with the configured output format and the extra arguments
    /// configured for `quality`
    pub fn compile(&self, source: impl Into<String>, quality: Quality) -> Compilation {
        self.compile_with(source, &CompileOptions::from_config(&self.config, quality))
    }

    pub fn compile_with(&self, source: impl Into<String>, options: &CompileOptions) -> Compilation {
        let request = CompilationRequest::new(source, options.output_format.clone())
            .with_quality(options.quality)
            .with_version_hint(self.config.engine_version.clone())
            .with_extra_arguments(options.extra_arguments.clone());
        debug!(
            engine = %self.engine(),
            format = %request.output_format,
            quality = %request.quality,
            "dispatching compilation"
        );
        self.backend.invoke(request)
    }

    /// Engine version as a date-style token, `None` when the engine's output has none
    pub async fn get_version(&self) -> CompileResult<Option<String>> {
        let raw = self.backend.raw_version().await?;
        let version = version::normalize(&raw);
        debug!(?version, "engine version");
        Ok(version)
    }

    /// Full-quality compile in `format`, using the configured full-quality extras
    fn derived_options(&self, format: &str) -> CompileOptions {
        CompileOptions::from_config(&self.config, Quality::Render).with_output_format(format)
    }

    /// Scene-graph dump, returned unmodified
    pub async fn get_scene_graph(&self, source: impl Into<String>) -> CompileResult<Vec<u8>> {
        let options = self.derived_options(SCENE_GRAPH_FORMAT);
        self.compile_with(source, &options).finish().await.into_artifact()
    }

    /// Compile to a mesh and measure it
    pub async fn get_dimensions(
        &self,
        source: impl Into<String>,
    ) -> CompileResult<DimensionReport> {
        let options = self.derived_options(MESH_FORMAT);
        let mesh = self.compile_with(source, &options).finish().await.into_artifact()?;

        self.analyzer
            .analyze(&mesh)
            .map_err(|err| CompileError::Analysis(err.to_string()))
    }

    /// Render a raster preview. Failures carry the engine's stderr.
    pub async fn get_preview(
        &self,
        source: impl Into<String>,
        preview: &PreviewOptions,
    ) -> CompileResult<Vec<u8>> {
        let options = self
            .derived_options(PREVIEW_FORMAT)
            .with_extra_arguments(preview.flags());
        let outcome = self.compile_with(source, &options).finish().await;

        outcome.result.map_err(|err| CompileError::Preview {
            source: Box::new(err),
            stderr: outcome.stderr,
        })
    }

    /// Discard the worker context so the next call starts a fresh one.
    /// No-op for the other engines.
    pub fn reset_worker(&self) {
        self.backend.reset();
    }
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("config", &self.config)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ExtraArgs;

    #[test]
    fn test_options_from_config() {
        let config = CompilerConfig {
            args: ExtraArgs {
                fast: vec!["--enable=fast-csg".into()],
                full: Vec::new(),
            },
            ..CompilerConfig::default()
        };

        let fast = CompileOptions::from_config(&config, Quality::Preview);
        assert_eq!(fast.output_format, "stl");
        assert_eq!(fast.extra_arguments, ["--enable=fast-csg"]);

        let full = CompileOptions::from_config(&config, Quality::Render);
        assert!(full.extra_arguments.is_empty());
    }

    #[test]
    fn test_preview_flags() {
        assert_eq!(
            PreviewOptions::default().flags(),
            ["--autocenter", "--viewall", "--imgsize=800,600"]
        );
        assert_eq!(
            PreviewOptions::new(320, 240).with_camera("0,0,0,55,0,25,140").flags(),
            [
                "--autocenter",
                "--viewall",
                "--imgsize=320,240",
                "--camera=0,0,0,55,0,25,140"
            ]
        );
    }

    #[test]
    fn test_embedded_requires_module() {
        let config = CompilerConfig {
            engine: EngineKind::Embedded,
            ..CompilerConfig::default()
        };
        let err = Compiler::new(config).unwrap_err();
        assert!(matches!(err, CompileError::Configuration(_)));
    }

    #[test]
    fn test_worker_requires_module() {
        let config = CompilerConfig {
            engine: EngineKind::Worker,
            ..CompilerConfig::default()
        };
        assert!(Compiler::new(config).is_err());
    }

    #[test]
    fn test_subprocess_from_config() {
        let config = CompilerConfig {
            executable: "/usr/local/bin/openscad".into(),
            ..CompilerConfig::default()
        };
        let compiler = Compiler::new(config).unwrap();
        assert_eq!(compiler.engine(), EngineKind::Subprocess);
        match compiler.backend() {
            Backend::Subprocess(b) => assert_eq!(b.executable(), "/usr/local/bin/openscad"),
            other => panic!("unexpected backend {:?}", other),
        }
    }
}
