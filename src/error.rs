// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error taxonomy shared by every backend and the orchestrator

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias for compilation operations
pub type CompileResult<T> = Result<T, CompileError>;

/// Everything that can terminate a compilation with `Failed`
#[derive(Debug, Error)]
pub enum CompileError {
    /// Invalid engine selection or missing engine module. Fatal at construction.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The source text could not be staged for the engine
    #[error("failed to write engine input {}: {source}", .path.display())]
    InputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The engine executable could not be spawned
    #[error("failed to launch OpenSCAD executable '{path}': {source}")]
    Launch {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The engine ran and reported failure
    #[error("OpenSCAD exited with {}{}", describe_exit(.code), describe_stderr(.stderr))]
    Engine { code: Option<i32>, stderr: String },

    /// The embedded engine raised an error while instantiating or running
    #[error("embedded OpenSCAD engine failed: {message}")]
    EngineException { message: String },

    /// The run succeeded but its artifact could not be read back
    #[error("failed to read compiled artifact {path}: {reason}")]
    ArtifactRead { path: String, reason: String },

    /// A worker request exceeded its time bound
    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The shared worker context died or was shut down
    #[error("worker context fault: {0}")]
    WorkerFault(String),

    /// The mesh-analysis collaborator rejected the artifact
    #[error("failed to analyze mesh data: {0}")]
    Analysis(String),

    /// A preview render failed; carries the captured stderr
    #[error("preview rendering failed: {source}{}", describe_stderr(.stderr))]
    Preview {
        #[source]
        source: Box<CompileError>,
        stderr: String,
    },

    /// The event stream closed without a terminal event
    #[error("compilation ended without a result")]
    Aborted,
}

impl CompileError {
    /// Build an `EngineException` from any displayable engine error
    pub fn engine_exception(err: impl std::fmt::Display) -> Self {
        Self::EngineException {
            message: err.to_string(),
        }
    }

    /// Whether this error came from a worker time bound
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

fn describe_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{}", trimmed)
    }
}
