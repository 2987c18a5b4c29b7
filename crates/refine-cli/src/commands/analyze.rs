//! analyze command - report mesh quality without refining.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use mesh_refine::{
    BatchAnalysis, FileAnalysis, UvRasterSettings, analyze_loaded, collect_supported_files,
    load_asset,
};
use tracing::error;

use crate::{AnalyzeArgs, Cli, OutputFormat, output};

pub fn run(args: &AnalyzeArgs, cli: &Cli) -> Result<()> {
    anyhow::ensure!(
        args.input.exists(),
        "Input path not found: {}",
        args.input.display()
    );

    let settings = UvRasterSettings {
        resolution: args.resolution,
        wrap: !args.no_wrap,
    };

    let payload = if args.input.is_dir() {
        let mut files = Vec::new();
        for path in collect_supported_files(&args.input) {
            match analyze_file(&path, &settings) {
                Ok(report) => {
                    print_file_summary(&report, cli);
                    files.push(report);
                }
                Err(e) => {
                    error!("Analysis failed for {:?}: {e}", path);
                }
            }
        }
        serde_json::to_value(BatchAnalysis {
            count: files.len(),
            files,
        })?
    } else {
        let report = analyze_file(&args.input, &settings)
            .with_context(|| format!("Failed to analyze {}", args.input.display()))?;
        print_file_summary(&report, cli);
        serde_json::to_value(report)?
    };

    if let OutputFormat::Json = cli.format {
        output::print(&payload, cli.format, cli.quiet);
    }

    if let Some(json_out) = &args.json_out {
        if let Some(parent) = json_out.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(json_out, serde_json::to_string_pretty(&payload)?)?;
        if !cli.quiet {
            println!("Analysis JSON written: {}", json_out.display());
        }
    }

    Ok(())
}

fn analyze_file(path: &Path, settings: &UvRasterSettings) -> Result<FileAnalysis> {
    let loaded = load_asset(path)?;
    Ok(FileAnalysis {
        file: path.display().to_string(),
        is_scene: loaded.is_scene(),
        meshes: analyze_loaded(&loaded, settings),
    })
}

fn print_file_summary(report: &FileAnalysis, cli: &Cli) {
    if cli.quiet || matches!(cli.format, OutputFormat::Json) {
        return;
    }

    println!("{}", report.file.bold());
    if report.meshes.is_empty() {
        println!("  (no meshes)");
        return;
    }
    for mesh in &report.meshes {
        println!("  {}", mesh.summary_line());
    }
}
