// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Lifecycle event channel between a backend invocation and its caller
//!
//! A backend owns an [`EventSender`] for the duration of one invocation. The
//! terminal methods consume the sender, so nothing can be emitted after
//! `Completed` or `Failed`. If the sender is dropped without a terminal event
//! (a panicking task, for instance) the stream ends with `Failed(Aborted)`.
//! The caller side is a [`Compilation`], which can be polled event by event
//! or awaited as a whole with [`Compilation::finish`].

use crate::error::CompileError;
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// One step in an invocation's lifecycle
#[derive(Debug)]
pub enum LifecycleEvent {
    Started,
    StandardOutput(String),
    StandardError(String),
    Completed(Vec<u8>),
    Failed(CompileError),
}

impl LifecycleEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}

/// Which engine channel a chunk of text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Create a connected sender/stream pair for one invocation
pub fn channel() -> (EventSender, Compilation) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventSender { tx: Some(tx) },
        Compilation {
            rx,
            finished: false,
        },
    )
}

/// Producer half, owned by exactly one backend invocation
#[derive(Debug)]
pub struct EventSender {
    tx: Option<mpsc::UnboundedSender<LifecycleEvent>>,
}

impl EventSender {
    pub fn started(&self) {
        self.send(LifecycleEvent::Started);
    }

    pub fn stdout(&self, text: impl Into<String>) {
        self.send(LifecycleEvent::StandardOutput(text.into()));
    }

    pub fn stderr(&self, text: impl Into<String>) {
        self.send(LifecycleEvent::StandardError(text.into()));
    }

    /// Output-only handle for engine callbacks that outlive a borrow
    pub fn progress(&self) -> ProgressSender {
        ProgressSender {
            tx: self.tx.clone(),
        }
    }

    pub fn complete(mut self, artifact: Vec<u8>) {
        self.finish(LifecycleEvent::Completed(artifact));
    }

    pub fn fail(mut self, error: CompileError) {
        self.finish(LifecycleEvent::Failed(error));
    }

    /// Resolve with either outcome
    pub fn resolve(self, result: Result<Vec<u8>, CompileError>) {
        match result {
            Ok(artifact) => self.complete(artifact),
            Err(error) => self.fail(error),
        }
    }

    fn send(&self, event: LifecycleEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver just means nobody is listening anymore
            let _ = tx.send(event);
        }
    }

    fn finish(&mut self, event: LifecycleEvent) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(event);
        }
    }
}

impl Drop for EventSender {
    fn drop(&mut self) {
        self.finish(LifecycleEvent::Failed(CompileError::Aborted));
    }
}

/// Clonable handle that can only emit output events
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<LifecycleEvent>>,
}

impl ProgressSender {
    pub fn emit(&self, stream: OutputStream, text: impl Into<String>) {
        match stream {
            OutputStream::Stdout => self.stdout(text),
            OutputStream::Stderr => self.stderr(text),
        }
    }

    pub fn stdout(&self, text: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(LifecycleEvent::StandardOutput(text.into()));
        }
    }

    pub fn stderr(&self, text: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(LifecycleEvent::StandardError(text.into()));
        }
    }
}

/// Consumer half: the event stream of one invocation
#[derive(Debug)]
pub struct Compilation {
    rx: mpsc::UnboundedReceiver<LifecycleEvent>,
    finished: bool,
}

impl Compilation {
    /// A stream that has already failed, for errors detected before dispatch
    pub fn failed(error: CompileError) -> Self {
        let (sender, compilation) = channel();
        sender.fail(error);
        compilation
    }

    /// Next event, or `None` once the terminal event has been delivered
    pub async fn next_event(&mut self) -> Option<LifecycleEvent> {
        futures_util::future::poll_fn(|cx| self.poll_event(cx)).await
    }

    /// Drain the stream, collecting output and the terminal result
    pub async fn finish(mut self) -> CompileOutcome {
        let mut outcome = CompileOutcome {
            stdout: String::new(),
            stderr: String::new(),
            result: Err(CompileError::Aborted),
        };

        while let Some(event) = self.next_event().await {
            match event {
                LifecycleEvent::Started => {}
                LifecycleEvent::StandardOutput(text) => outcome.stdout.push_str(&text),
                LifecycleEvent::StandardError(text) => outcome.stderr.push_str(&text),
                LifecycleEvent::Completed(artifact) => outcome.result = Ok(artifact),
                LifecycleEvent::Failed(error) => outcome.result = Err(error),
            }
        }

        outcome
    }

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<LifecycleEvent>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                    self.rx.close();
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                // Every sender is gone without a terminal event
                self.finished = true;
                Poll::Ready(Some(LifecycleEvent::Failed(CompileError::Aborted)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Stream for Compilation {
    type Item = LifecycleEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_event(cx)
    }
}

/// Collected result of a finished compilation
#[derive(Debug)]
pub struct CompileOutcome {
    pub stdout: String,
    pub stderr: String,
    pub result: Result<Vec<u8>, CompileError>,
}

impl CompileOutcome {
    pub fn into_artifact(self) -> Result<Vec<u8>, CompileError> {
        self.result
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}
