// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Engine hosted on a shared background thread
//!
//! The first invocation starts one background context; later invocations
//! reuse it so the engine module's load cost is paid once. Requests are
//! multiplexed over it by correlation id and each is bounded by a timeout.
//! When the context dies every in-flight request fails, and the backend
//! stays faulted until [`WorkerBackend::reset`] is called.

mod context;
mod protocol;

pub use protocol::{WorkerCommand, WorkerMessage, WorkerRequest, WorkerResponse};

use super::embedded::EngineModule;
use super::{CompilationRequest, EngineKind, ExecutionBackend};
use crate::args::IoConvention;
use crate::error::{CompileError, CompileResult};
use crate::event::{self, Compilation};
use context::{Pending, WorkerContext};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Time bounds for worker requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTimeouts {
    pub compile: Duration,
    pub version: Duration,
}

impl Default for WorkerTimeouts {
    fn default() -> Self {
        Self {
            compile: Duration::from_secs(60),
            version: Duration::from_secs(10),
        }
    }
}

pub struct WorkerBackend {
    module: Arc<dyn EngineModule>,
    context: Mutex<Option<Arc<WorkerContext>>>,
    next_id: AtomicU64,
    timeouts: WorkerTimeouts,
}

impl WorkerBackend {
    pub fn new(module: Arc<dyn EngineModule>) -> Self {
        Self::with_timeouts(module, WorkerTimeouts::default())
    }

    pub fn with_timeouts(module: Arc<dyn EngineModule>, timeouts: WorkerTimeouts) -> Self {
        Self {
            module,
            context: Mutex::new(None),
            next_id: AtomicU64::new(1),
            timeouts,
        }
    }

    pub fn timeouts(&self) -> WorkerTimeouts {
        self.timeouts
    }

    /// Whether a background context has been started and is still healthy
    pub fn is_running(&self) -> bool {
        self.context
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|ctx| ctx.is_alive()))
            .unwrap_or(false)
    }

    /// Tear down the background context. The next invocation starts a new one.
    ///
    /// In-flight requests fail with a worker fault.
    pub fn reset(&self) {
        let previous = match self.context.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(ctx) = previous {
            debug!("resetting worker context");
            ctx.shut_down("worker context was reset");
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// The shared context, started on first use
    fn context(&self) -> CompileResult<Arc<WorkerContext>> {
        let mut slot = self
            .context
            .lock()
            .map_err(|_| CompileError::WorkerFault("worker context lock poisoned".into()))?;

        if let Some(ctx) = slot.as_ref() {
            return Ok(ctx.clone());
        }

        let ctx = Arc::new(WorkerContext::spawn(self.module.clone())?);
        *slot = Some(ctx.clone());
        Ok(ctx)
    }
}

impl fmt::Debug for WorkerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerBackend")
            .field("running", &self.is_running())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl Drop for WorkerBackend {
    fn drop(&mut self) {
        self.reset();
    }
}

impl ExecutionBackend for WorkerBackend {
    fn kind(&self) -> EngineKind {
        EngineKind::Worker
    }

    fn invoke(&self, request: CompilationRequest) -> Compilation {
        let (events, compilation) = event::channel();
        let ctx = match self.context() {
            Ok(ctx) => ctx,
            Err(err) => {
                events.fail(err);
                return compilation;
            }
        };

        let id = self.next_id();
        let mut extra_arguments = request.command_args(IoConvention::Virtual).quality_flags();
        extra_arguments.extend(request.extra_arguments);

        debug!(id, format = %request.output_format, "posting compile to worker");
        ctx.submit(
            id,
            WorkerCommand::Compile {
                source_text: request.source_text,
                output_format: request.output_format,
                extra_arguments,
            },
            Pending::Compile(events),
        );
        ctx.arm_timeout(id, "compilation", self.timeouts.compile);

        compilation
    }

    fn raw_version(&self) -> impl Future<Output = CompileResult<String>> + Send {
        let context = self.context();
        let id = self.next_id();
        let after = self.timeouts.version;

        async move {
            let ctx = context?;
            let (tx, rx) = oneshot::channel();
            ctx.submit(id, WorkerCommand::GetVersion, Pending::Version(tx));

            match tokio::time::timeout(after, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(CompileError::WorkerFault(
                    "version request was dropped".into(),
                )),
                Err(_) => {
                    ctx.forget(id);
                    Err(CompileError::Timeout {
                        operation: "version query",
                        after,
                    })
                }
            }
        }
    }
}
