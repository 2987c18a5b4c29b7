//! refine: Command-line interface for the mesh refinement pipeline.
//!
//! This tool drives the mesh-refine library: batch refinement (repair,
//! smoothing, optional UV unwrapping and texture smoothing) and standalone
//! quality analysis, suitable for scripting and CI pipelines.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=mesh_refine=info` - Basic operation logging
//! - `RUST_LOG=mesh_refine=debug` - Detailed progress logging
//! - `RUST_LOG=debug` - All debug output
//!
//! Diagnostics go to stderr; results go to stdout.
//!
//! # Example
//!
//! ```bash
//! # Refine a directory of assets with info logging
//! RUST_LOG=mesh_refine=info refine refine assets/ -o output/
//!
//! # Analyze UV quality and write a JSON report
//! refine analyze model.glb --json-out report.json
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{analyze, refine};

/// refine - refine 3D mesh assets and report their quality.
///
/// Repairs mesh defects, smooths vertex positions and textures, optionally
/// re-unwraps UVs through Blender, and produces structured quality reports.
#[derive(Parser)]
#[command(name = "refine")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

/// Smoothing method selector; invalid values are rejected at argument
/// parsing, before any geometry is loaded.
#[derive(Clone, Copy, ValueEnum)]
pub enum SmoothMethodArg {
    Taubin,
    Laplacian,
}

/// Texture smoothing kernel selector.
#[derive(Clone, Copy, ValueEnum)]
pub enum TextureMethodArg {
    Bilateral,
    Gaussian,
}

#[derive(Subcommand)]
enum Commands {
    /// Refine a mesh file or a directory of meshes
    Refine(RefineArgs),

    /// Analyze mesh quality without refining
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
pub struct RefineArgs {
    /// Path to a file (.obj/.glb/.gltf/.stl) or a directory to process
    /// recursively
    pub input: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "output")]
    pub outdir: PathBuf,

    /// Mesh smoothing method
    #[arg(long, value_enum, default_value = "taubin")]
    pub method: SmoothMethodArg,

    /// Smoothing iterations
    #[arg(long, default_value_t = 10)]
    pub iterations: usize,

    /// Lambda parameter for smoothing
    #[arg(long = "lambda", default_value_t = 0.5)]
    pub lambda: f64,

    /// Nu parameter for Taubin smoothing
    #[arg(long, default_value_t = -0.53, allow_hyphen_values = true)]
    pub nu: f64,

    /// Disable mesh pre-repair before smoothing
    #[arg(long)]
    pub no_pre_repair: bool,

    /// Vertex welding tolerance for pre-repair
    #[arg(long)]
    pub weld_tolerance: Option<f64>,

    /// Enable smoothing of OBJ diffuse textures (map_Kd)
    #[arg(long)]
    pub smooth_textures: bool,

    /// Texture smoothing method
    #[arg(long, value_enum, default_value = "bilateral")]
    pub texture_method: TextureMethodArg,

    /// Bilateral filter diameter
    #[arg(long, default_value_t = 9)]
    pub bilateral_d: u32,

    /// Bilateral filter color sigma
    #[arg(long, default_value_t = 75.0)]
    pub bilateral_sigma_color: f64,

    /// Bilateral filter spatial sigma
    #[arg(long, default_value_t = 75.0)]
    pub bilateral_sigma_space: f64,

    /// Gaussian kernel size (odd)
    #[arg(long, default_value_t = 5)]
    pub gaussian_ksize: u32,

    /// Gaussian sigma
    #[arg(long, default_value_t = 1.2)]
    pub gaussian_sigma: f64,

    /// Unwrap UVs with Blender before refining (requires Blender)
    #[arg(long)]
    pub unwrap_uv: bool,

    /// Max unwrap attempts if UVs are missing or fail thresholds
    #[arg(long, default_value_t = 2)]
    pub unwrap_attempts: usize,

    /// Minimum UV coverage percent
    #[arg(long, default_value_t = 50.0)]
    pub uv_min_coverage: f64,

    /// Maximum UV overlap percent
    #[arg(long, default_value_t = 10.0)]
    pub uv_max_overlap_pct: f64,

    /// Maximum percent of UV vertices outside [0,1]
    #[arg(long, default_value_t = 5.0)]
    pub uv_max_oob_pct: f64,

    /// Smart-project angle limit
    #[arg(long, default_value_t = 66.0)]
    pub unwrap_angle_limit: f64,

    /// Smart-project island margin
    #[arg(long, default_value_t = 0.02)]
    pub unwrap_island_margin: f64,

    /// Island packing margin
    #[arg(long, default_value_t = 0.003)]
    pub unwrap_pack_margin: f64,

    /// Path to the Blender executable if not on PATH
    #[arg(long)]
    pub blender_exe: Option<PathBuf>,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Path to a file or a directory to analyze recursively
    pub input: PathBuf,

    /// Raster resolution for UV coverage/overlap
    #[arg(long, default_value_t = 1024)]
    pub resolution: usize,

    /// Do not wrap UVs into [0,1] for the coverage calculation
    #[arg(long)]
    pub no_wrap: bool,

    /// Write the full JSON report to this path
    #[arg(long)]
    pub json_out: Option<PathBuf>,
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "mesh_refine=info",
            2 => "mesh_refine=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Refine(args) => refine::run(args, &cli),
        Commands::Analyze(args) => analyze::run(args, &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            if let Some(refine_err) = e.downcast_ref::<mesh_refine::RefineError>() {
                eprintln!("{}: {}", "Error".red().bold(), refine_err);
                eprintln!("  {}: {}", "Code".cyan(), refine_err.code());
                eprintln!(
                    "  {}: {}",
                    "Suggestion".green(),
                    refine_err.recovery_suggestion()
                );
            } else {
                eprintln!("{}: {}", "Error".red().bold(), e);
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
