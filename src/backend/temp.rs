// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Per-invocation temporary input/output files

use std::fmt::Write as _;
use std::io;
use std::path::Path;
use tempfile::TempPath;
use tracing::{debug, warn};

const PREFIX: &str = "openscad";

/// Uniquely named input/output paths. Both are deleted by [`close`], or by
/// `tempfile` when the pair is dropped on an abandoned run.
///
/// [`close`]: TemporaryArtifactPair::close
#[derive(Debug)]
pub struct TemporaryArtifactPair {
    id: String,
    input: TempPath,
    output: TempPath,
}

impl TemporaryArtifactPair {
    /// Allocate fresh names in `dir`. Nothing is created on disk yet.
    pub fn new(dir: &Path, output_format: &str) -> Self {
        let id = random_hex_id();
        let input = TempPath::from_path(dir.join(format!("{}-input-{}.scad", PREFIX, id)));
        let output =
            TempPath::from_path(dir.join(format!("{}-output-{}.{}", PREFIX, id, output_format)));
        Self { id, input, output }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Stage the engine input. Must complete before the engine is launched.
    pub async fn write_input(&self, source: &str) -> io::Result<()> {
        tokio::fs::write(self.input(), source).await
    }

    pub async fn read_output(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.output()).await
    }

    /// Delete both files now. A file the engine never created is not an
    /// error; any other failure is logged and swallowed.
    pub fn close(self) {
        for path in [self.input, self.output] {
            let path_str = path.display().to_string();
            match path.close() {
                Ok(()) => debug!(path = %path_str, "removed temporary file"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path_str, error = %err, "failed to remove temporary file"),
            }
        }
    }
}

/// 8 random bytes as 16 lowercase hex characters
fn random_hex_id() -> String {
    let bytes: [u8; 8] = rand::random();
    bytes.iter().fold(String::with_capacity(16), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_naming_scheme() {
        let dir = TempDir::new().unwrap();
        let pair = TemporaryArtifactPair::new(dir.path(), "3mf");

        assert_eq!(pair.id().len(), 16);
        assert!(pair.id().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(
            pair.input().file_name().unwrap().to_str().unwrap(),
            format!("openscad-input-{}.scad", pair.id())
        );
        assert_eq!(
            pair.output().file_name().unwrap().to_str().unwrap(),
            format!("openscad-output-{}.3mf", pair.id())
        );
    }

    #[test]
    fn test_ids_are_unique() {
        let dir = TempDir::new().unwrap();
        let a = TemporaryArtifactPair::new(dir.path(), "stl");
        let b = TemporaryArtifactPair::new(dir.path(), "stl");
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_files_removed_on_close() {
        let dir = TempDir::new().unwrap();
        let pair = TemporaryArtifactPair::new(dir.path(), "stl");
        pair.write_input("cube(10);").await.unwrap();
        std::fs::write(pair.output(), b"solid").unwrap();

        let (input, output) = (pair.input().to_path_buf(), pair.output().to_path_buf());
        pair.close();

        assert!(!input.exists());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_files_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let pair = TemporaryArtifactPair::new(dir.path(), "csg");
        pair.write_input("sphere(1);").await.unwrap();
        std::fs::write(pair.output(), b"group();").unwrap();

        drop(pair);

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_close_without_files_is_silent() {
        let dir = TempDir::new().unwrap();
        TemporaryArtifactPair::new(dir.path(), "stl").close();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
