// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! In-process engine backend
//!
//! The engine is an embeddable module (a WebAssembly build of OpenSCAD, for
//! example) exposing a virtual filesystem and a synchronous `main`. The
//! module itself is supplied by the caller through [`EngineModule`].

use super::{CompilationRequest, EngineKind, ExecutionBackend};
use crate::args::{flags, CommandArgs, IoConvention, VIRTUAL_INPUT};
use crate::error::{CompileError, CompileResult};
use crate::event::{self, Compilation, EventSender, OutputStream, ProgressSender};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// Error raised by an engine module
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl From<String> for EngineError {
    fn from(message: String) -> Self {
        EngineError(message)
    }
}

impl From<&str> for EngineError {
    fn from(message: &str) -> Self {
        EngineError(message.to_string())
    }
}

/// Receives the engine's print/printErr callbacks.
///
/// Engines call [`OutputSink::print`] once per line, without the trailing
/// newline; the sink restores it before forwarding.
#[derive(Clone)]
pub struct OutputSink {
    emit: Arc<dyn Fn(OutputStream, String) + Send + Sync>,
}

impl OutputSink {
    pub fn new(emit: impl Fn(OutputStream, String) + Send + Sync + 'static) -> Self {
        Self {
            emit: Arc::new(emit),
        }
    }

    pub fn print(&self, line: &str) {
        (self.emit)(OutputStream::Stdout, format!("{}\n", line));
    }

    pub fn print_err(&self, line: &str) {
        (self.emit)(OutputStream::Stderr, format!("{}\n", line));
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}

/// Loader for an embeddable engine
pub trait EngineModule: Send + Sync + 'static {
    /// Create a fresh runtime instance wired to `sink`
    fn instantiate(&self, sink: OutputSink) -> Result<Box<dyn EngineInstance>, EngineError>;
}

/// One live engine runtime
pub trait EngineInstance: Send {
    fn write_file(&mut self, path: &str, contents: &[u8]) -> Result<(), EngineError>;
    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, EngineError>;
    /// Run the engine's `main` synchronously, returning its exit code
    fn call_main(&mut self, args: &[String]) -> Result<i32, EngineError>;
}

/// Engine instance after `main` returned
pub(crate) struct FinishedRun {
    instance: Box<dyn EngineInstance>,
    exit_code: i32,
    output_path: String,
    stderr: Arc<Mutex<String>>,
}

/// Instantiate, stage the source, and run `main`. Blocking.
pub(crate) fn start_run(
    module: &dyn EngineModule,
    progress: impl Fn(OutputStream, String) + Send + Sync + 'static,
    source_text: &str,
    command: &CommandArgs,
    extra: &[String],
) -> CompileResult<FinishedRun> {
    let args = command.build_virtual(extra);
    debug!(?args, "calling embedded OpenSCAD");

    let stderr = Arc::new(Mutex::new(String::new()));
    let captured = stderr.clone();
    let sink = OutputSink::new(move |stream, text| {
        if stream == OutputStream::Stderr {
            if let Ok(mut buf) = captured.lock() {
                buf.push_str(&text);
            }
        }
        progress(stream, text);
    });

    let mut instance = module
        .instantiate(sink)
        .map_err(|err| CompileError::engine_exception(format!("failed to instantiate: {}", err)))?;
    instance
        .write_file(VIRTUAL_INPUT, source_text.as_bytes())
        .map_err(|err| CompileError::engine_exception(format!("failed to stage input: {}", err)))?;
    let exit_code = instance
        .call_main(&args)
        .map_err(|err| CompileError::engine_exception(format!("compilation failed: {}", err)))?;

    Ok(FinishedRun {
        instance,
        exit_code,
        output_path: command.virtual_output(),
        stderr,
    })
}

impl FinishedRun {
    /// Check the exit code and read the artifact back
    pub(crate) fn collect(mut self) -> CompileResult<Vec<u8>> {
        if self.exit_code != 0 {
            let stderr = self
                .stderr
                .lock()
                .map(|buf| buf.clone())
                .unwrap_or_default();
            return Err(CompileError::Engine {
                code: Some(self.exit_code),
                stderr,
            });
        }

        self.instance
            .read_file(&self.output_path)
            .map_err(|err| CompileError::ArtifactRead {
                path: self.output_path.clone(),
                reason: err.to_string(),
            })
    }
}

/// Run `--version` and capture everything printed. Blocking.
pub(crate) fn query_version(module: &dyn EngineModule) -> CompileResult<String> {
    let text = Arc::new(Mutex::new(String::new()));
    let captured = text.clone();
    let sink = OutputSink::new(move |_, line| {
        if let Ok(mut buf) = captured.lock() {
            buf.push_str(&line);
        }
    });

    let mut instance = module
        .instantiate(sink)
        .map_err(|err| CompileError::engine_exception(format!("failed to get version: {}", err)))?;
    // The exit code of a version query carries no information
    instance
        .call_main(&[flags::VERSION.to_string()])
        .map_err(|err| CompileError::engine_exception(format!("failed to get version: {}", err)))?;
    drop(instance);

    let result = text.lock().map(|buf| buf.clone()).unwrap_or_default();
    Ok(result)
}

/// Calls the engine module on tokio's blocking pool
#[derive(Clone)]
pub struct EmbeddedBackend {
    module: Arc<dyn EngineModule>,
}

impl EmbeddedBackend {
    pub fn new(module: Arc<dyn EngineModule>) -> Self {
        Self { module }
    }
}

impl fmt::Debug for EmbeddedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedBackend").finish_non_exhaustive()
    }
}

impl ExecutionBackend for EmbeddedBackend {
    fn kind(&self) -> EngineKind {
        EngineKind::Embedded
    }

    fn invoke(&self, request: CompilationRequest) -> Compilation {
        let (events, compilation) = event::channel();
        let module = self.module.clone();

        tokio::spawn(async move {
            let result = run(module, request, &events).await;
            events.resolve(result);
        });

        compilation
    }

    fn raw_version(&self) -> impl Future<Output = CompileResult<String>> + Send {
        let module = self.module.clone();
        async move {
            let text = tokio::task::spawn_blocking(move || query_version(module.as_ref()))
                .await
                .map_err(|err| {
                    CompileError::engine_exception(format!("version query aborted: {}", err))
                })??;
            // Let any late diagnostic text flush before handing it over
            tokio::task::yield_now().await;
            Ok(text)
        }
    }
}

async fn run(
    module: Arc<dyn EngineModule>,
    request: CompilationRequest,
    events: &EventSender,
) -> CompileResult<Vec<u8>> {
    let command = request.command_args(IoConvention::Virtual);

    events.started();
    let progress: ProgressSender = events.progress();

    let finished = tokio::task::spawn_blocking(move || {
        start_run(
            module.as_ref(),
            move |stream, text| progress.emit(stream, text),
            &request.source_text,
            &command,
            &request.extra_arguments,
        )
    })
    .await
    .map_err(|err| CompileError::engine_exception(format!("engine task aborted: {}", err)))??;

    // main() is synchronous; yield once so asynchronously flushed output settles
    tokio::task::yield_now().await;

    finished.collect()
}
