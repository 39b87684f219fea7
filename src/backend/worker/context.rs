// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Background engine thread and response dispatch

use super::protocol::{WorkerCommand, WorkerMessage, WorkerRequest, WorkerResponse};
use crate::args::{CommandArgs, IoConvention, Quality};
use crate::backend::embedded::{query_version, start_run, EngineModule};
use crate::error::{CompileError, CompileResult};
use crate::event::{EventSender, OutputStream};
use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Caller waiting on a correlation id
pub(super) enum Pending {
    Compile(EventSender),
    Version(oneshot::Sender<CompileResult<String>>),
}

impl Pending {
    fn started(&self) {
        if let Pending::Compile(events) = self {
            events.started();
        }
    }

    fn output(&self, stream: OutputStream, text: String) {
        if let Pending::Compile(events) = self {
            match stream {
                OutputStream::Stdout => events.stdout(text),
                OutputStream::Stderr => events.stderr(text),
            }
        }
    }

    fn done(self, artifact: Vec<u8>) {
        match self {
            Pending::Compile(events) => events.complete(artifact),
            Pending::Version(tx) => {
                let _ = tx.send(Ok(String::from_utf8_lossy(&artifact).into_owned()));
            }
        }
    }

    fn version(self, text: String) {
        match self {
            Pending::Compile(events) => events.complete(text.into_bytes()),
            Pending::Version(tx) => {
                let _ = tx.send(Ok(text));
            }
        }
    }

    pub(super) fn fail(self, error: CompileError) {
        match self {
            Pending::Compile(events) => events.fail(error),
            Pending::Version(tx) => {
                let _ = tx.send(Err(error));
            }
        }
    }
}

pub(super) type PendingMap = Arc<DashMap<u64, Pending>>;

/// One shared background thread hosting the engine module
pub(super) struct WorkerContext {
    requests: Sender<WorkerRequest>,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
}

impl WorkerContext {
    /// Start the engine thread and its dispatcher. Needs a tokio runtime.
    pub(super) fn spawn(module: Arc<dyn EngineModule>) -> CompileResult<Self> {
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<WorkerRequest>();
        let (response_tx, response_rx) = mpsc::unbounded_channel::<WorkerResponse>();

        std::thread::Builder::new()
            .name("openscad-worker".to_string())
            .spawn(move || worker_main(module, request_rx, response_tx))
            .map_err(|err| {
                CompileError::WorkerFault(format!("failed to start worker thread: {}", err))
            })?;

        let pending: PendingMap = Arc::new(DashMap::new());
        let alive = Arc::new(AtomicBool::new(true));
        tokio::spawn(dispatch(response_rx, pending.clone(), alive.clone()));
        debug!("worker context started");

        Ok(Self {
            requests: request_tx,
            pending,
            alive,
        })
    }

    pub(super) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Register `pending` under `id` and post the request.
    ///
    /// On failure the entry is resolved with a worker fault right away.
    pub(super) fn submit(&self, id: u64, command: WorkerCommand, pending: Pending) {
        if !self.is_alive() {
            pending.fail(fault(FAULTED));
            return;
        }

        pending.started();
        self.pending.insert(id, pending);
        if self.requests.send(WorkerRequest { id, command }).is_err() {
            if let Some((_, pending)) = self.pending.remove(&id) {
                pending.fail(fault("worker is no longer accepting requests"));
            }
        }
    }

    /// Expire `id` after `after` unless a terminal response arrives first
    pub(super) fn arm_timeout(&self, id: u64, operation: &'static str, after: Duration) {
        let pending = self.pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some((_, entry)) = pending.remove(&id) {
                warn!(id, operation, "worker request timed out");
                entry.fail(CompileError::Timeout { operation, after });
            }
        });
    }

    /// Drop a pending entry without resolving it
    pub(super) fn forget(&self, id: u64) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Fail everything in flight and refuse further work
    pub(super) fn shut_down(&self, reason: &str) {
        self.alive.store(false, Ordering::SeqCst);
        fail_all(&self.pending, reason);
    }
}

const FAULTED: &str = "worker context has faulted; reset it to continue";

fn fault(message: &str) -> CompileError {
    CompileError::WorkerFault(message.to_string())
}

fn fail_all(pending: &PendingMap, reason: &str) {
    let ids: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, entry)) = pending.remove(&id) {
            entry.fail(fault(reason));
        }
    }
}

/// Route responses to their pending entries until the engine thread exits
async fn dispatch(
    mut responses: mpsc::UnboundedReceiver<WorkerResponse>,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
) {
    while let Some(response) = responses.recv().await {
        route(&pending, response);
    }

    // The engine thread dropped its sender: it either panicked or was shut down
    if alive.swap(false, Ordering::SeqCst) {
        warn!("worker thread terminated unexpectedly");
    }
    fail_all(&pending, "worker thread terminated unexpectedly");
}

fn route(pending: &PendingMap, response: WorkerResponse) {
    let id = response.id;
    match response.message {
        WorkerMessage::Stdout { data } => {
            if let Some(entry) = pending.get(&id) {
                entry.output(OutputStream::Stdout, data);
            }
        }
        WorkerMessage::Stderr { data } => {
            if let Some(entry) = pending.get(&id) {
                entry.output(OutputStream::Stderr, data);
            }
        }
        WorkerMessage::Done { data } => match pending.remove(&id) {
            Some((_, entry)) => entry.done(data),
            None => debug!(id, "ignoring late worker result"),
        },
        WorkerMessage::Version { data } => match pending.remove(&id) {
            Some((_, entry)) => entry.version(data),
            None => debug!(id, "ignoring late worker version"),
        },
        WorkerMessage::Error { error } => match pending.remove(&id) {
            Some((_, entry)) => entry.fail(CompileError::EngineException { message: error }),
            None => debug!(id, "ignoring late worker error"),
        },
    }
}

/// Engine thread body: serve requests one at a time until the sender closes
fn worker_main(
    module: Arc<dyn EngineModule>,
    requests: Receiver<WorkerRequest>,
    responses: mpsc::UnboundedSender<WorkerResponse>,
) {
    while let Ok(request) = requests.recv() {
        let id = request.id;
        let message = match request.command {
            WorkerCommand::Compile {
                source_text,
                output_format,
                extra_arguments,
            } => compile(
                module.as_ref(),
                id,
                &source_text,
                &output_format,
                &extra_arguments,
                &responses,
            ),
            WorkerCommand::GetVersion => match query_version(module.as_ref()) {
                Ok(data) => WorkerMessage::Version { data },
                Err(err) => WorkerMessage::Error {
                    error: err.to_string(),
                },
            },
        };

        if responses.send(WorkerResponse::new(id, message)).is_err() {
            break;
        }
    }
}

fn compile(
    module: &dyn EngineModule,
    id: u64,
    source_text: &str,
    output_format: &str,
    extra_arguments: &[String],
    responses: &mpsc::UnboundedSender<WorkerResponse>,
) -> WorkerMessage {
    // Quality flags already travel in `extra_arguments`
    let command = CommandArgs::new("", Quality::Render, output_format, IoConvention::Virtual);

    let progress_tx = responses.clone();
    let progress = move |stream: OutputStream, data: String| {
        let message = match stream {
            OutputStream::Stdout => WorkerMessage::Stdout { data },
            OutputStream::Stderr => WorkerMessage::Stderr { data },
        };
        let _ = progress_tx.send(WorkerResponse::new(id, message));
    };

    match start_run(module, progress, source_text, &command, extra_arguments)
        .and_then(|run| run.collect())
    {
        Ok(data) => WorkerMessage::Done { data },
        Err(err) => WorkerMessage::Error {
            error: err.to_string(),
        },
    }
}
