// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Subprocess engine against fake OpenSCAD executables

#![cfg(unix)]

mod common;

use common::{copying_executable, entries, fake_executable};
use polyframe_compiler::backend::SubprocessBackend;
use polyframe_compiler::{
    CompilationRequest, CompileError, ExecutionBackend, LifecycleEvent, Quality,
};
use tempfile::TempDir;

fn backend(exe: &common::FakeExecutable, temp: &TempDir) -> SubprocessBackend {
    SubprocessBackend::new(exe.path.display().to_string()).with_temp_dir(temp.path())
}

#[tokio::test]
async fn test_successful_compile_streams_output() {
    let exe = copying_executable();
    let temp = TempDir::new().unwrap();

    let mut compilation = backend(&exe, &temp).invoke(CompilationRequest::new("cube(10);", "stl"));

    let mut events = Vec::new();
    while let Some(event) = compilation.next_event().await {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(LifecycleEvent::Started)));
    assert!(events
        .iter()
        .any(|e| matches!(e, LifecycleEvent::StandardOutput(t) if t.contains("Compiling"))));
    assert!(events
        .iter()
        .any(|e| matches!(e, LifecycleEvent::StandardError(t) if t.contains("WARNING"))));
    match events.last() {
        Some(LifecycleEvent::Completed(artifact)) => assert_eq!(artifact, b"cube(10);"),
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert_eq!(entries(temp.path()), 0, "temporary files left behind");
}

#[tokio::test]
async fn test_filesystem_argument_layout() {
    let exe = copying_executable();
    let temp = TempDir::new().unwrap();

    let request = CompilationRequest::new("cube(1);", "3mf")
        .with_quality(Quality::Preview)
        .with_version_hint("2024.05.12")
        .with_extra_arguments(vec!["--enable=roof".into()]);
    let outcome = backend(&exe, &temp).invoke(request).finish().await;
    assert!(outcome.is_success());

    let args = exe.last_args();
    assert_eq!(args.len(), 5, "{:?}", args);
    assert_eq!(args[0], "-o");
    assert!(args[1].contains("openscad-output-") && args[1].ends_with(".3mf"));
    assert!(args[2].contains("openscad-input-") && args[2].ends_with(".scad"));
    assert_eq!(&args[3..], ["--preview=fast", "--enable=roof"]);
}

#[tokio::test]
async fn test_nonzero_exit_reports_code_and_stderr() {
    let exe = fake_executable(
        "echo 'ERROR: Parser error in line 1' >&2\n\
         exit 3",
    );
    let temp = TempDir::new().unwrap();

    let outcome = backend(&exe, &temp)
        .invoke(CompilationRequest::new("cube(", "stl"))
        .finish()
        .await;

    assert!(outcome.stderr.contains("Parser error"));
    match outcome.result {
        Err(CompileError::Engine { code, stderr }) => {
            assert_eq!(code, Some(3));
            assert!(stderr.contains("ERROR: Parser error in line 1"));
        }
        other => panic!("expected engine failure, got {:?}", other),
    }
    assert_eq!(entries(temp.path()), 0);
}

#[tokio::test]
async fn test_missing_artifact_is_read_failure() {
    let exe = fake_executable("exit 0");
    let temp = TempDir::new().unwrap();

    let outcome = backend(&exe, &temp)
        .invoke(CompilationRequest::new("cube(1);", "stl"))
        .finish()
        .await;

    assert!(matches!(outcome.result, Err(CompileError::ArtifactRead { .. })));
    assert_eq!(entries(temp.path()), 0);
}

#[tokio::test]
async fn test_concurrent_invocations_use_distinct_files() {
    let exe = copying_executable();
    let temp = TempDir::new().unwrap();
    let backend = backend(&exe, &temp);

    let a = backend.invoke(CompilationRequest::new("cube(1);", "stl"));
    let b = backend.invoke(CompilationRequest::new("sphere(2);", "stl"));
    let (a, b) = tokio::join!(a.finish(), b.finish());

    assert_eq!(a.into_artifact().unwrap(), b"cube(1);");
    assert_eq!(b.into_artifact().unwrap(), b"sphere(2);");
    assert_eq!(entries(temp.path()), 0);
}

#[tokio::test]
async fn test_raw_version_captures_stderr() {
    let exe = copying_executable();
    let temp = TempDir::new().unwrap();

    let text = backend(&exe, &temp).raw_version().await.unwrap();
    assert_eq!(text.trim(), "OpenSCAD version 2021.01");
    assert_eq!(exe.last_args(), ["--version"]);
}

#[tokio::test]
async fn test_multibyte_stderr_across_read_boundary() {
    // 8191 ASCII bytes put the two-byte 'é' across the 8192-byte read buffer
    let exe = fake_executable(
        "head -c 8191 /dev/zero | tr '\\000' a >&2\n\
         printf '\\303\\251\\n' >&2\n\
         exit 1",
    );
    let temp = TempDir::new().unwrap();

    let outcome = backend(&exe, &temp)
        .invoke(CompilationRequest::new("cube(1);", "stl"))
        .finish()
        .await;

    assert_eq!(outcome.stderr.len(), 8191 + "é\n".len());
    assert!(outcome.stderr.ends_with("aé\n"));
    assert!(!outcome.stderr.contains(char::REPLACEMENT_CHARACTER));
    match outcome.result {
        Err(CompileError::Engine { code, stderr }) => {
            assert_eq!(code, Some(1));
            assert_eq!(stderr, outcome.stderr);
        }
        other => panic!("expected engine failure, got {:?}", other),
    }
}

#[test]
fn test_abandoned_run_kills_engine() {
    let exe = fake_executable(
        "sleep 1\n\
         echo late > \"$out\"",
    );
    let temp = TempDir::new().unwrap();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let mut compilation =
            backend(&exe, &temp).invoke(CompilationRequest::new("cube(1);", "stl"));
        assert!(matches!(compilation.next_event().await, Some(LifecycleEvent::Started)));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    });
    // Dropping the runtime drops the in-flight run along with its child
    drop(runtime);

    std::thread::sleep(std::time::Duration::from_millis(1500));
    assert_eq!(entries(temp.path()), 0, "engine outlived its run");
}
