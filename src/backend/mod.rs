// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Execution backends - the three ways of running the OpenSCAD engine
//!
//! Every backend turns a [`CompilationRequest`] into a [`Compilation`] event
//! stream. Callers only depend on [`ExecutionBackend`]; the concrete strategy
//! is picked once, when the [`Backend`] is constructed.

mod embedded;
mod subprocess;
mod temp;
mod worker;

pub use embedded::{EmbeddedBackend, EngineError, EngineInstance, EngineModule, OutputSink};
pub use subprocess::SubprocessBackend;
pub use temp::TemporaryArtifactPair;
pub use worker::{
    WorkerBackend, WorkerCommand, WorkerMessage, WorkerRequest, WorkerResponse, WorkerTimeouts,
};

use crate::args::{CommandArgs, IoConvention, Quality};
use crate::error::{CompileError, CompileResult};
use crate::event::Compilation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;

/// Which strategy runs the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Engine module called in-process
    #[serde(alias = "wasm")]
    Embedded,
    /// Native executable in a child process
    #[serde(alias = "native")]
    #[default]
    Subprocess,
    /// Engine module hosted on a shared background thread
    #[serde(alias = "webworker")]
    Worker,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineKind::Embedded => "embedded",
            EngineKind::Subprocess => "subprocess",
            EngineKind::Worker => "worker",
        };
        f.write_str(name)
    }
}

impl FromStr for EngineKind {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "embedded" | "wasm" => Ok(EngineKind::Embedded),
            "subprocess" | "native" => Ok(EngineKind::Subprocess),
            "worker" | "webworker" => Ok(EngineKind::Worker),
            other => Err(CompileError::Configuration(format!(
                "engine must be 'embedded', 'subprocess' or 'worker', got '{}'",
                other
            ))),
        }
    }
}

/// Everything one invocation needs. Built fresh for every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationRequest {
    pub source_text: String,
    pub quality: Quality,
    pub output_format: String,
    pub engine_version_hint: String,
    /// Appended after the builder's base arguments
    pub extra_arguments: Vec<String>,
}

impl CompilationRequest {
    pub fn new(source_text: impl Into<String>, output_format: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            quality: Quality::Render,
            output_format: output_format.into(),
            engine_version_hint: String::new(),
            extra_arguments: Vec::new(),
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_version_hint(mut self, version: impl Into<String>) -> Self {
        self.engine_version_hint = version.into();
        self
    }

    pub fn with_extra_arguments(mut self, extra: Vec<String>) -> Self {
        self.extra_arguments = extra;
        self
    }

    /// Argument builder for this request under a backend's I/O convention
    pub fn command_args(&self, convention: IoConvention) -> CommandArgs {
        CommandArgs::new(
            self.engine_version_hint.clone(),
            self.quality,
            self.output_format.clone(),
            convention,
        )
    }
}

/// Contract shared by the subprocess, embedded and worker strategies
pub trait ExecutionBackend: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Start one invocation. Must be called from within a tokio runtime.
    fn invoke(&self, request: CompilationRequest) -> Compilation;

    /// Everything the engine prints for a version query, unparsed
    fn raw_version(&self) -> impl Future<Output = CompileResult<String>> + Send;
}

/// Backend selected at construction
pub enum Backend {
    Subprocess(SubprocessBackend),
    Embedded(EmbeddedBackend),
    Worker(WorkerBackend),
}

impl Backend {
    /// Tear down any long-lived engine session. Only the worker keeps one.
    pub fn reset(&self) {
        if let Backend::Worker(worker) = self {
            worker.reset();
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Backend").field(&self.kind()).finish()
    }
}

impl ExecutionBackend for Backend {
    fn kind(&self) -> EngineKind {
        match self {
            Backend::Subprocess(b) => b.kind(),
            Backend::Embedded(b) => b.kind(),
            Backend::Worker(b) => b.kind(),
        }
    }

    fn invoke(&self, request: CompilationRequest) -> Compilation {
        match self {
            Backend::Subprocess(b) => b.invoke(request),
            Backend::Embedded(b) => b.invoke(request),
            Backend::Worker(b) => b.invoke(request),
        }
    }

    fn raw_version(&self) -> impl Future<Output = CompileResult<String>> + Send {
        async move {
            match self {
                Backend::Subprocess(b) => b.raw_version().await,
                Backend::Embedded(b) => b.raw_version().await,
                Backend::Worker(b) => b.raw_version().await,
            }
        }
    }
}
