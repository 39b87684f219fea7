// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Compiler configuration
//!
//! Loaded from `polyframe-compiler.toml` when present, then overridden from
//! the environment. The configuration is fixed once a [`Compiler`] is built.
//!
//! [`Compiler`]: crate::Compiler

use crate::args::{ExtraArgs, Quality};
use crate::backend::{EngineKind, WorkerTimeouts};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name, looked up in the working directory
pub const CONFIG_FILE: &str = "polyframe-compiler.toml";

/// Compilation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Engine strategy
    pub engine: EngineKind,
    /// OpenSCAD executable for the subprocess engine
    pub executable: String,
    /// Artifact format used by `compile`
    pub output_format: String,
    /// Quality used when the caller does not pick one
    pub quality: Quality,
    /// Engine version hint; selects the preview flag spelling
    pub engine_version: String,
    /// Scratch directory for subprocess input/output files
    pub temp_dir: Option<PathBuf>,
    /// Extra arguments per quality level
    pub args: ExtraArgs,
    pub worker: WorkerConfig,
}

/// Worker request time bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub compile_timeout_ms: u64,
    pub version_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            compile_timeout_ms: 60_000,
            version_timeout_ms: 10_000,
        }
    }
}

impl WorkerConfig {
    pub fn timeouts(&self) -> WorkerTimeouts {
        WorkerTimeouts {
            compile: Duration::from_millis(self.compile_timeout_ms),
            version: Duration::from_millis(self.version_timeout_ms),
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Subprocess,
            executable: "openscad".to_string(),
            output_format: "stl".to_string(),
            quality: Quality::Preview,
            engine_version: String::new(),
            temp_dir: None, // System temp dir
            args: ExtraArgs::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl CompilerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: CompilerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Load `polyframe-compiler.toml` if it exists, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = if Path::new(CONFIG_FILE).exists() {
            Self::from_file(CONFIG_FILE)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = var("OPENSCAD_PATH") {
            self.executable = path;
        }

        if let Some(engine) = var("POLYFRAME_ENGINE") {
            self.engine = engine
                .parse()
                .with_context(|| format!("Invalid POLYFRAME_ENGINE: {}", engine))?;
        }

        if let Some(format) = var("POLYFRAME_OUTPUT_FORMAT") {
            self.output_format = format;
        }

        if let Some(version) = var("POLYFRAME_ENGINE_VERSION") {
            self.engine_version = version;
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Extra arguments for a quality level
    pub fn extra_args(&self, quality: Quality) -> &[String] {
        self.args.for_quality(quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.engine, EngineKind::Subprocess);
        assert_eq!(config.executable, "openscad");
        assert_eq!(config.output_format, "stl");
        assert_eq!(config.quality, Quality::Preview);
        assert!(config.extra_args(Quality::Render).is_empty());
        assert_eq!(config.worker.timeouts(), WorkerTimeouts::default());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: CompilerConfig = toml::from_str(
            r#"
            engine = "native"
            output_format = "3mf"

            [args]
            fast = ["--enable=fast-csg"]

            [worker]
            compile_timeout_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.engine, EngineKind::Subprocess);
        assert_eq!(config.output_format, "3mf");
        assert_eq!(config.extra_args(Quality::Preview), ["--enable=fast-csg"]);
        assert!(config.extra_args(Quality::Render).is_empty());
        assert_eq!(config.worker.compile_timeout_ms, 500);
        assert_eq!(config.worker.version_timeout_ms, 10_000);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut config = CompilerConfig::default();
        config.engine = EngineKind::Worker;
        config.args = ExtraArgs::accelerated();
        config.save(&path).unwrap();

        assert_eq!(CompilerConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OPENSCAD_PATH", "/opt/openscad/bin/openscad"),
            ("POLYFRAME_ENGINE", "wasm"),
            ("POLYFRAME_ENGINE_VERSION", "2021.01"),
        ]
        .into_iter()
        .collect();

        let mut config = CompilerConfig::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.executable, "/opt/openscad/bin/openscad");
        assert_eq!(config.engine, EngineKind::Embedded);
        assert_eq!(config.engine_version, "2021.01");
        assert_eq!(config.output_format, "stl");
    }

    #[test]
    fn test_invalid_engine_override() {
        let mut config = CompilerConfig::default();
        let result =
            config.apply_env(|key| (key == "POLYFRAME_ENGINE").then(|| "cloud".to_string()));
        assert!(result.is_err());
    }
}
