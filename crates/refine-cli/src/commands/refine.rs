//! refine command - run the refinement pipeline over a file or directory.

use anyhow::{Context, Result};
use mesh_refine::{
    Pipeline, PipelineConfig, RepairParams, SmoothMethod, SmoothingParams, TextureConfig,
    TextureMethod, UvConfig,
};
use serde::Serialize;

use crate::{Cli, OutputFormat, RefineArgs, SmoothMethodArg, TextureMethodArg, output};

#[derive(Serialize)]
struct RefineRunResult {
    input: String,
    outdir: String,
    count: usize,
    outputs: Vec<String>,
}

pub fn run(args: &RefineArgs, cli: &Cli) -> Result<()> {
    anyhow::ensure!(
        args.input.exists(),
        "Input path not found: {}",
        args.input.display()
    );

    let config = build_config(args);
    let pipeline = Pipeline::new(config);

    let results = pipeline
        .process_path(&args.input, &args.outdir)
        .with_context(|| format!("Failed to process {}", args.input.display()))?;

    let result = RefineRunResult {
        input: args.input.display().to_string(),
        outdir: args.outdir.display().to_string(),
        count: results.len(),
        outputs: results.iter().map(|p| p.display().to_string()).collect(),
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&result, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                if result.outputs.is_empty() {
                    println!("No files refined.");
                } else {
                    output::success(
                        &format!("Refined {} file(s) into {}", result.count, result.outdir),
                        cli.format,
                        cli.quiet,
                    );
                    for path in &result.outputs {
                        println!(" - {path}");
                    }
                }
            }
        }
    }

    Ok(())
}

fn build_config(args: &RefineArgs) -> PipelineConfig {
    let method = match args.method {
        SmoothMethodArg::Taubin => SmoothMethod::Taubin {
            lambda: args.lambda,
            nu: args.nu,
        },
        SmoothMethodArg::Laplacian => SmoothMethod::Laplacian {
            lambda: args.lambda,
        },
    };

    let mut repair = RepairParams {
        enabled: !args.no_pre_repair,
        ..Default::default()
    };
    if let Some(tolerance) = args.weld_tolerance {
        repair.weld_tolerance = tolerance;
    }

    PipelineConfig {
        smoothing: SmoothingParams {
            method,
            iterations: args.iterations,
        },
        texture: TextureConfig {
            smooth_textures: args.smooth_textures,
            method: match args.texture_method {
                TextureMethodArg::Bilateral => TextureMethod::Bilateral,
                TextureMethodArg::Gaussian => TextureMethod::Gaussian,
            },
            bilateral_d: args.bilateral_d,
            bilateral_sigma_color: args.bilateral_sigma_color,
            bilateral_sigma_space: args.bilateral_sigma_space,
            gaussian_ksize: args.gaussian_ksize,
            gaussian_sigma: args.gaussian_sigma,
        },
        uv: UvConfig {
            unwrap: args.unwrap_uv,
            attempts: args.unwrap_attempts,
            min_coverage: args.uv_min_coverage,
            max_overlap_pct: args.uv_max_overlap_pct,
            max_oob_pct: args.uv_max_oob_pct,
            angle_limit: args.unwrap_angle_limit,
            island_margin: args.unwrap_island_margin,
            pack_margin: args.unwrap_pack_margin,
        },
        repair,
        blender_exe: args.blender_exe.clone(),
    }
}
