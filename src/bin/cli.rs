// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyframe Compiler CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use polyframe_compiler::{
    Compilation, CompileError, CompileOptions, Compiler, CompilerConfig, LifecycleEvent,
    PreviewOptions, Quality,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "polyframe-compile")]
#[command(about = "Compile OpenSCAD sources through the Polyframe compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./polyframe-compiler.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// OpenSCAD executable, overrides the configuration
    #[arg(long, global = true, value_name = "PATH")]
    openscad: Option<String>,

    /// Machine-readable output
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a SCAD file to an artifact
    Compile {
        /// Input SCAD file
        input: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Output format (stl, 3mf, png, csg, ...); defaults to the configured one
        #[arg(short, long)]
        format: Option<String>,

        /// preview (fast) or render (full)
        #[arg(short, long)]
        quality: Option<Quality>,
    },

    /// Show the OpenSCAD engine version
    Version,

    /// Compute volume, surface area, bounds and center of mass
    Dimensions {
        /// Input SCAD file
        input: PathBuf,
    },

    /// Render a PNG preview
    Preview {
        /// Input SCAD file
        input: PathBuf,

        /// Output PNG file
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value_t = 800)]
        width: u32,

        #[arg(long, default_value_t = 600)]
        height: u32,

        /// Camera specification passed through to OpenSCAD
        #[arg(long)]
        camera: Option<String>,
    },

    /// Dump the CSG scene graph
    SceneGraph {
        /// Input SCAD file
        input: PathBuf,

        /// Output file; printed to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let compiler = Compiler::new(load_config(&cli)?)?;

    match &cli.command {
        Commands::Compile {
            input,
            output,
            format,
            quality,
        } => {
            let quality = quality.unwrap_or(compiler.config().quality);
            let mut options = CompileOptions::from_config(compiler.config(), quality);
            if let Some(format) = format {
                options = options.with_output_format(format.as_str());
            }
            compile_command(&compiler, input, output, &options, cli.verbose).await?;
        }
        Commands::Version => {
            let version = compiler.get_version().await?;
            if cli.json {
                println!("{}", serde_json::json!({ "version": version }));
            } else {
                match version {
                    Some(v) => println!("OpenSCAD {}", v.cyan()),
                    None => println!("{}", "OpenSCAD version unknown".yellow()),
                }
                println!("Polyframe Compiler v{}", env!("CARGO_PKG_VERSION"));
            }
        }
        Commands::Dimensions { input } => {
            let source = read_source(input)?;
            let report = with_spinner("Analyzing", compiler.get_dimensions(source)).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let size = report.bounding_box.size();
                println!("  {} {:.4}", "Volume:".bright_black(), report.volume);
                println!("  {} {:.4}", "Surface Area:".bright_black(), report.surface_area);
                println!(
                    "  {} {:.2} × {:.2} × {:.2}",
                    "Size:".bright_black(),
                    size[0],
                    size[1],
                    size[2]
                );
                println!(
                    "  {} ({:.2}, {:.2}, {:.2})",
                    "Center of Mass:".bright_black(),
                    report.center_of_mass[0],
                    report.center_of_mass[1],
                    report.center_of_mass[2]
                );
            }
        }
        Commands::Preview {
            input,
            output,
            width,
            height,
            camera,
        } => {
            let source = read_source(input)?;
            let mut preview = PreviewOptions::new(*width, *height);
            if let Some(camera) = camera {
                preview = preview.with_camera(camera.as_str());
            }
            let png =
                with_spinner("Rendering preview", compiler.get_preview(source, &preview)).await?;
            write_artifact(output, &png)?;
        }
        Commands::SceneGraph { input, output } => {
            let source = read_source(input)?;
            let csg =
                with_spinner("Extracting scene graph", compiler.get_scene_graph(source)).await?;
            match output {
                Some(path) => write_artifact(path, &csg)?,
                None => print!("{}", String::from_utf8_lossy(&csg)),
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("polyframe_compiler=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<CompilerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = CompilerConfig::from_file(path)?;
            config.apply_env(|key| std::env::var(key).ok())?;
            config
        }
        None => CompilerConfig::load()?,
    };

    if let Some(openscad) = &cli.openscad {
        config.executable = openscad.clone();
    }
    Ok(config)
}

fn read_source(input: &Path) -> Result<String> {
    std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read input file: {:?}", input))
}

fn write_artifact(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes)
        .with_context(|| format!("Failed to write output file: {:?}", path))?;
    println!("{} {}", "✓".green(), path.display().to_string().cyan());
    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

async fn with_spinner<T>(message: &str, task: impl std::future::Future<Output = T>) -> T {
    let pb = spinner(message);
    let result = task.await;
    pb.finish_and_clear();
    result
}

async fn compile_command(
    compiler: &Compiler,
    input: &Path,
    output: &Path,
    options: &CompileOptions,
    verbose: bool,
) -> Result<()> {
    let source = read_source(input)?;
    let start = Instant::now();
    let pb = spinner(&format!("Compiling {}", input.display()));

    let mut compilation: Compilation = compiler.compile_with(source, options);
    let mut result = Err(CompileError::Aborted);

    while let Some(event) = compilation.next_event().await {
        match event {
            LifecycleEvent::Started => {
                pb.set_message(format!("OpenSCAD running ({})", options.quality))
            }
            LifecycleEvent::StandardOutput(text) | LifecycleEvent::StandardError(text) => {
                if let Some(line) = text.lines().rev().find(|l| !l.trim().is_empty()) {
                    pb.set_message(line.trim().to_string());
                }
                if verbose {
                    pb.println(text.trim_end());
                }
            }
            LifecycleEvent::Completed(artifact) => result = Ok(artifact),
            LifecycleEvent::Failed(err) => result = Err(err),
        }
    }
    pb.finish_and_clear();

    match result {
        Ok(artifact) => {
            write_artifact(output, &artifact)?;
            if verbose {
                println!("Compiled in {:.2?} ({} bytes)", start.elapsed(), artifact.len());
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("{} {}", "Error:".red(), err);
            std::process::exit(1);
        }
    }
}
