// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Shared fixtures: a scriptable engine module and fake OpenSCAD executables

#![allow(dead_code)]

use polyframe_compiler::{EngineError, EngineInstance, EngineModule, OutputSink};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Binary STL of an axis-aligned cube from the origin to `side`
pub fn cube_stl(side: f32) -> Vec<u8> {
    use stl_io::{Normal, Triangle, Vertex};

    let quads: [[[f32; 3]; 4]; 6] = [
        [[0., 0., 0.], [0., 1., 0.], [1., 1., 0.], [1., 0., 0.]],
        [[0., 0., 1.], [1., 0., 1.], [1., 1., 1.], [0., 1., 1.]],
        [[0., 0., 0.], [1., 0., 0.], [1., 0., 1.], [0., 0., 1.]],
        [[0., 1., 0.], [0., 1., 1.], [1., 1., 1.], [1., 1., 0.]],
        [[0., 0., 0.], [0., 0., 1.], [0., 1., 1.], [0., 1., 0.]],
        [[1., 0., 0.], [1., 1., 0.], [1., 1., 1.], [1., 0., 1.]],
    ];
    let scale = |p: [f32; 3]| Vertex::new([p[0] * side, p[1] * side, p[2] * side]);

    let mut triangles = Vec::new();
    for [a, b, c, d] in quads {
        for [p, q, r] in [[a, b, c], [a, c, d]] {
            triangles.push(Triangle {
                normal: Normal::new([0.0, 0.0, 0.0]),
                vertices: [scale(p), scale(q), scale(r)],
            });
        }
    }

    let mut buffer = Vec::new();
    stl_io::write_stl(&mut Cursor::new(&mut buffer), triangles.iter()).unwrap();
    buffer
}

/// Engine module whose behavior is keyed off markers in the source text:
///
/// - `syntax error`: prints a parser error and exits 1
/// - `panic`: panics inside `main`
/// - `slow`: sleeps for the configured delay first
/// - `no output`: exits 0 without writing an artifact
/// - `broken mesh`: writes an unparseable STL
///
/// Otherwise STL requests containing `cube` yield a 10mm cube, PNG requests
/// yield a PNG header and anything else echoes the source back.
#[derive(Clone)]
pub struct FakeModule {
    pub version_text: String,
    pub delay: Duration,
    pub version_delay: Duration,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl Default for FakeModule {
    fn default() -> Self {
        Self {
            version_text: "OpenSCAD version 2021.01".to_string(),
            delay: Duration::from_millis(300),
            version_delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl FakeModule {
    pub fn with_version(mut self, text: &str) -> Self {
        self.version_text = text.to_string();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Stall every `--version` call by `delay`
    pub fn with_version_delay(mut self, delay: Duration) -> Self {
        self.version_delay = delay;
        self
    }

    /// Argument lists of every `main` call so far
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> Vec<String> {
        self.calls().last().cloned().unwrap_or_default()
    }
}

impl EngineModule for FakeModule {
    fn instantiate(&self, sink: OutputSink) -> Result<Box<dyn EngineInstance>, EngineError> {
        Ok(Box::new(FakeInstance {
            module: self.clone(),
            files: HashMap::new(),
            sink,
        }))
    }
}

struct FakeInstance {
    module: FakeModule,
    files: HashMap<String, Vec<u8>>,
    sink: OutputSink,
}

impl EngineInstance for FakeInstance {
    fn write_file(&mut self, path: &str, contents: &[u8]) -> Result<(), EngineError> {
        self.files.insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, EngineError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::from(format!("no such file: {}", path)))
    }

    fn call_main(&mut self, args: &[String]) -> Result<i32, EngineError> {
        self.module.calls.lock().unwrap().push(args.to_vec());

        if args.first().map(String::as_str) == Some("--version") {
            std::thread::sleep(self.module.version_delay);
            self.sink.print_err(&self.module.version_text);
            return Ok(0);
        }

        let (input, output) = match args {
            [input, flag, output, ..] if flag == "-o" => (input.clone(), output.clone()),
            _ => return Err(EngineError::from("unexpected argument layout")),
        };
        let staged = self.files.get(&input).map(Vec::as_slice).unwrap_or_default();
        let source = String::from_utf8_lossy(staged).into_owned();

        if source.contains("slow") {
            std::thread::sleep(self.module.delay);
        }
        if source.contains("panic") {
            panic!("engine crashed");
        }

        self.sink.print("Parsing design (AST generation)...");
        if source.contains("syntax error") {
            self.sink
                .print_err("ERROR: Parser error in file \"/input.scad\", line 1: syntax error");
            return Ok(1);
        }
        self.sink.print_err("WARNING: fake engine in use");

        if source.contains("no output") {
            return Ok(0);
        }

        let artifact = if source.contains("broken mesh") {
            b"not an stl".to_vec()
        } else if output.ends_with(".stl") && source.contains("cube") {
            cube_stl(10.0)
        } else if output.ends_with(".png") {
            PNG_MAGIC.to_vec()
        } else {
            source.into_bytes()
        };
        self.files.insert(output, artifact);
        Ok(0)
    }
}

pub fn module() -> (FakeModule, Arc<dyn EngineModule>) {
    let module = FakeModule::default();
    let shared: Arc<dyn EngineModule> = Arc::new(module.clone());
    (module, shared)
}

/// Fake OpenSCAD executable plus the file its arguments are logged to
#[cfg(unix)]
pub struct FakeExecutable {
    pub dir: tempfile::TempDir,
    pub path: PathBuf,
    pub args_log: PathBuf,
}

#[cfg(unix)]
impl FakeExecutable {
    /// Arguments of the most recent invocation, one per element
    pub fn last_args(&self) -> Vec<String> {
        std::fs::read_to_string(&self.args_log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Shell script standing in for OpenSCAD. `body` runs after the argument log
/// is written, with `$out` and `$in` set from the `-o <out> <in>` layout.
#[cfg(unix)]
pub fn fake_executable(body: &str) -> FakeExecutable {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("openscad");
    let args_log = dir.path().join("args.log");
    let script = format!(
        "#!/bin/sh\n\
         printf '%s\\n' \"$@\" > '{log}'\n\
         if [ \"$1\" = \"--version\" ]; then\n\
         echo 'OpenSCAD version 2021.01' >&2\n\
         exit 0\n\
         fi\n\
         out=\"$2\"\n\
         in=\"$3\"\n\
         {body}\n",
        log = args_log.display(),
        body = body
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

    FakeExecutable {
        dir,
        path,
        args_log,
    }
}

/// Copies the input to the output, like a successful render
#[cfg(unix)]
pub fn copying_executable() -> FakeExecutable {
    fake_executable(
        "echo \"Compiling $in\"\n\
         echo 'WARNING: fake engine in use' >&2\n\
         cp \"$in\" \"$out\"",
    )
}

/// Number of entries left in a directory
pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
