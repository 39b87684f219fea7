// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Native OpenSCAD executable run as a child process

use super::{CompilationRequest, EngineKind, ExecutionBackend, TemporaryArtifactPair};
use crate::args::{flags, IoConvention};
use crate::error::{CompileError, CompileResult};
use crate::event::{self, Compilation, EventSender, OutputStream, ProgressSender};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

const READ_CHUNK: usize = 8192;

/// Runs the engine executable once per invocation
#[derive(Debug, Clone)]
pub struct SubprocessBackend {
    executable: String,
    temp_dir: PathBuf,
}

impl SubprocessBackend {
    /// `executable` is a path or a bare name resolved through `PATH`
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Directory for the per-invocation input/output files
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }
}

impl Default for SubprocessBackend {
    fn default() -> Self {
        Self::new("openscad")
    }
}

impl ExecutionBackend for SubprocessBackend {
    fn kind(&self) -> EngineKind {
        EngineKind::Subprocess
    }

    fn invoke(&self, request: CompilationRequest) -> Compilation {
        let (events, compilation) = event::channel();
        let backend = self.clone();

        tokio::spawn(async move {
            let files = TemporaryArtifactPair::new(&backend.temp_dir, &request.output_format);
            let result = backend.run(&files, &request, &events).await;
            // Remove the files before the caller can observe the terminal event
            files.close();
            events.resolve(result);
        });

        compilation
    }

    fn raw_version(&self) -> impl Future<Output = CompileResult<String>> + Send {
        let executable = self.executable.clone();
        async move {
            let output = Command::new(&executable)
                .arg(flags::VERSION)
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|source| CompileError::Launch {
                    path: executable.clone(),
                    source,
                })?;

            // OpenSCAD prints its version on stderr; keep both streams
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            Ok(text)
        }
    }
}

impl SubprocessBackend {
    async fn run(
        &self,
        files: &TemporaryArtifactPair,
        request: &CompilationRequest,
        events: &EventSender,
    ) -> CompileResult<Vec<u8>> {
        files
            .write_input(&request.source_text)
            .await
            .map_err(|source| CompileError::InputWrite {
                path: files.input().to_path_buf(),
                source,
            })?;

        let args = request.command_args(IoConvention::Filesystem).build_with_extra(
            &files.input().to_string_lossy(),
            &files.output().to_string_lossy(),
            &request.extra_arguments,
        );
        debug!(executable = %self.executable, ?args, "spawning OpenSCAD");

        let mut child = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CompileError::Launch {
                path: self.executable.clone(),
                source,
            })?;

        events.started();

        let progress = events.progress();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (_, stderr_text, status) = tokio::join!(
            pump(stdout, OutputStream::Stdout, &progress),
            pump(stderr, OutputStream::Stderr, &progress),
            child.wait(),
        );

        let status = status.map_err(|err| CompileError::Engine {
            code: None,
            stderr: format!("failed to wait for OpenSCAD: {}", err),
        })?;
        debug!(%status, id = files.id(), "OpenSCAD exited");

        if !status.success() {
            return Err(CompileError::Engine {
                code: status.code(),
                stderr: stderr_text,
            });
        }

        files
            .read_output()
            .await
            .map_err(|err| CompileError::ArtifactRead {
                path: files.output().display().to_string(),
                reason: err.to_string(),
            })
    }
}

/// Forward a child pipe chunk by chunk, returning everything read
async fn pump<R>(reader: Option<R>, stream: OutputStream, progress: &ProgressSender) -> String
where
    R: AsyncRead + Unpin,
{
    let mut captured = String::new();
    let Some(mut reader) = reader else {
        return captured;
    };

    let mut decoder = ChunkDecoder::default();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = decoder.decode(&buf[..n]);
                if !chunk.is_empty() {
                    captured.push_str(&chunk);
                    progress.emit(stream, chunk);
                }
            }
            Err(err) => {
                warn!(?stream, error = %err, "failed to read OpenSCAD output");
                break;
            }
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        captured.push_str(&tail);
        progress.emit(stream, tail);
    }
    captured
}

/// Lossy UTF-8 decoding across read boundaries. A character split between
/// two reads is held back until its remaining bytes arrive.
#[derive(Debug, Default)]
struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut text = String::new();
        let mut rest = &self.pending[..];
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Truncated sequence at the end; wait for more bytes
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        text
    }

    /// Whatever is still held back once the stream has ended
    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}
