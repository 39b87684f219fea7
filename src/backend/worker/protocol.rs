// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Message protocol between the worker backend and its background context

use serde::{Deserialize, Serialize};

/// Request posted to the background context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Correlation id; every response for this request carries it back
    pub id: u64,
    #[serde(flatten)]
    pub command: WorkerCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerCommand {
    #[serde(rename_all = "camelCase")]
    Compile {
        source_text: String,
        output_format: String,
        /// Quality flags and caller extras, I/O tokens excluded
        extra_arguments: Vec<String>,
    },
    GetVersion,
}

/// Message posted back by the background context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub id: u64,
    #[serde(flatten)]
    pub message: WorkerMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerMessage {
    Stdout { data: String },
    Stderr { data: String },
    /// Terminal: compiled artifact
    Done { data: Vec<u8> },
    /// Terminal: raw version text
    Version { data: String },
    /// Terminal: failure description
    Error { error: String },
}

impl WorkerResponse {
    pub fn new(id: u64, message: WorkerMessage) -> Self {
        Self { id, message }
    }
}
