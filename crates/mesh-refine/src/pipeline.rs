//! The refinement pipeline orchestrator.
//!
//! Per input file the state machine is: load, optionally run the UV unwrap
//! gate, repair, smooth, export. Multi-part scenes are processed per part
//! with a merge-and-process fallback when every part fails. Batch mode walks
//! a directory recursively and processes files strictly sequentially; one
//! file's failure is logged and excluded without aborting the batch.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::RefineResult;
use crate::io::{SUPPORTED_EXTENSIONS, load_asset, save_asset};
use crate::repair::{RepairParams, pre_repair};
use crate::smoothing::{SmoothingParams, adaptive_params, smooth_mesh};
use crate::textures::{TextureConfig, find_exported_mtl, smooth_textures_in_mtl};
use crate::types::{Loaded, Mesh};
use crate::unwrap::{BlenderTool, UvConfig, run_unwrap_gate};

/// Filename suffix marking refined outputs.
pub const REFINED_SUFFIX: &str = "_refined";

/// Complete pipeline configuration combining all stage configs.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub smoothing: SmoothingParams,
    pub texture: TextureConfig,
    pub uv: UvConfig,
    pub repair: RepairParams,
    /// Explicit Blender executable override for the unwrap capability.
    pub blender_exe: Option<PathBuf>,
}

/// The pipeline orchestrator.
///
/// External capability availability (the unwrap tool) is probed once at
/// construction, not re-probed inside each call.
pub struct Pipeline {
    config: PipelineConfig,
    blender: Option<BlenderTool>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let blender = BlenderTool::detect(config.blender_exe.as_deref());
        if blender.is_none() {
            debug!("Blender not available; UV unwrapping will be skipped");
        }
        Self { config, blender }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process a file or directory.
    ///
    /// Directories are walked recursively for supported extensions and
    /// processed independently; a failing file is logged and excluded. An
    /// empty result list means nothing was processed, which is not an
    /// error. For a single-file input, load/export errors propagate.
    pub fn process_path(&self, input: &Path, outdir: &Path) -> RefineResult<Vec<PathBuf>> {
        std::fs::create_dir_all(outdir)
            .map_err(|e| crate::error::RefineError::io_write(outdir, e))?;

        let mut results = Vec::new();

        if input.is_dir() {
            for file in collect_supported_files(input) {
                match self.process_file(&file, outdir) {
                    Ok(Some(out)) => results.push(out),
                    Ok(None) => {}
                    Err(e) => {
                        error!("Failed to process {:?}: {e}", file);
                    }
                }
            }
        } else if let Some(out) = self.process_file(input, outdir)? {
            results.push(out);
        }

        Ok(results)
    }

    /// Process one input file.
    ///
    /// Returns the refined output path, or None when the file was skipped
    /// (unsupported extension, empty scene).
    pub fn process_file(&self, path: &Path, outdir: &Path) -> RefineResult<Option<PathBuf>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if ext == "fbx" {
            warn!(
                "FBX not processed automatically: {:?}. Consider converting to GLB/OBJ (e.g., via Blender) and rerun.",
                path.file_name().unwrap_or_default()
            );
            return Ok(None);
        }
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            warn!(
                "Skipping unsupported file: {:?}",
                path.file_name().unwrap_or_default()
            );
            return Ok(None);
        }

        let mut source_path = path.to_path_buf();
        let mut loaded = load_asset(&source_path)?;

        // UV unwrap gate: explicit request, or a single mesh with no UVs
        let unwrap_needed = self.config.uv.unwrap
            || (!loaded.is_scene() && !loaded.as_mesh().map(Mesh::has_uv).unwrap_or(true));

        if unwrap_needed {
            if let Some(blender) = &self.blender {
                let uv_dir = outdir.join("_uvwrap");
                let outcome = run_unwrap_gate(&source_path, &uv_dir, &self.config.uv, |src, dir| {
                    blender.unwrap_uv(src, dir, &self.config.uv)
                });
                if let Some((candidate_path, candidate)) = outcome.accepted {
                    source_path = candidate_path;
                    loaded = candidate;
                } else {
                    debug!(
                        "Unwrap gate exhausted after {} attempt(s); continuing with original",
                        outcome.attempts_made
                    );
                }
            } else {
                debug!("Unwrap needed but capability unavailable; skipping gate");
            }
        }

        if let Loaded::Scene(scene) = &loaded
            && scene.is_empty()
        {
            warn!(
                "Empty scene detected in {:?}; skipping.",
                path.file_name().unwrap_or_default()
            );
            return Ok(None);
        }

        let mut merged_replacement: Option<Mesh> = None;
        match &mut loaded {
            Loaded::Mesh(mesh) => {
                self.refine_mesh(mesh);
            }
            Loaded::Scene(scene) => {
                let mut processed = 0usize;
                for part in &mut scene.parts {
                    if part.mesh.is_empty() {
                        warn!("Part {:?} has no geometry; skipping", part.name);
                        continue;
                    }
                    self.refine_mesh(&mut part.mesh);
                    if part.mesh.is_empty() {
                        warn!("Part {:?} lost all geometry during repair", part.name);
                        continue;
                    }
                    processed += 1;
                }

                if processed == 0 {
                    warn!("No parts processed in scene; attempting merge-and-process fallback.");
                    match merge_scene_parts(scene) {
                        Some(mut merged) => {
                            // The merged mesh re-derives adaptive parameters
                            // from its own vertex count
                            self.refine_mesh(&mut merged);
                            merged_replacement = Some(merged);
                        }
                        None => {
                            warn!("Merge fallback found no valid geometry; exporting as-is.");
                        }
                    }
                }
            }
        }
        if let Some(merged) = merged_replacement {
            loaded = Loaded::Mesh(merged);
        }

        // Export in the same container format as the (possibly substituted)
        // source, with the refined suffix
        let stem = source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mesh".into());
        let out_ext = source_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| ext.clone());
        let out_path = outdir.join(format!("{stem}{REFINED_SUFFIX}.{out_ext}"));

        save_asset(&loaded, &out_path)?;
        info!("Refined {:?} -> {:?}", path, out_path);

        if self.config.texture.smooth_textures && out_ext.eq_ignore_ascii_case("obj") {
            match find_exported_mtl(&out_path) {
                Some(mtl_path) => {
                    let tex_dir = mtl_path
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| outdir.to_path_buf());
                    let (changed, _) =
                        smooth_textures_in_mtl(&mtl_path, &tex_dir, &self.config.texture);
                    info!(
                        "Texture smoothing: {} texture(s) updated for {:?}",
                        changed,
                        out_path.file_name().unwrap_or_default()
                    );
                }
                None => {
                    warn!(
                        "No MTL found for OBJ {:?}; skipping texture smoothing.",
                        out_path.file_name().unwrap_or_default()
                    );
                }
            }
        }

        Ok(Some(out_path))
    }

    /// Repair then smooth one mesh in place, with size-adaptive parameters.
    fn refine_mesh(&self, mesh: &mut Mesh) {
        if self.config.repair.enabled {
            pre_repair(mesh, &self.config.repair);
        }
        let params = adaptive_params(&self.config.smoothing, mesh.vertex_count());
        smooth_mesh(mesh, &params);
    }
}

/// Merge all scene parts with geometry into one mesh.
fn merge_scene_parts(scene: &crate::types::Scene) -> Option<Mesh> {
    let mut merged = Mesh::new();
    for part in &scene.parts {
        if !part.mesh.is_empty() {
            merged.append(&part.mesh);
        }
    }
    (!merged.is_empty()).then_some(merged)
}

/// Recursively collect files with supported extensions, sorted for
/// deterministic batch order.
pub fn collect_supported_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    collect_into(dir, &mut files);
    files.sort();
    files
}

fn collect_into(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        warn!("Could not read directory {:?}", dir);
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_into(&path, files);
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str())
            && SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str())
        {
            files.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TRIANGLE_OBJ: &str = "\
v 0 0 0
v 1 0 0
v 0 1 0
vt 0 0
vt 1 0
vt 0 1
f 1/1 2/2 3/3
";

    fn pipeline() -> Pipeline {
        // Point the override at a nonexistent path so detection fails and
        // no external tool is ever invoked from tests.
        Pipeline::new(PipelineConfig {
            blender_exe: Some(PathBuf::from("/nonexistent/blender")),
            ..Default::default()
        })
    }

    #[test]
    fn test_fbx_is_skipped_with_diagnostic() {
        let dir = tempdir().unwrap();
        let fbx = dir.path().join("model.fbx");
        std::fs::write(&fbx, b"not a real fbx").unwrap();

        let result = pipeline().process_file(&fbx, dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_unsupported_extension_skipped() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("model.xyz");
        std::fs::write(&file, b"whatever").unwrap();

        let result = pipeline().process_file(&file, dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_process_file_produces_refined_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("tri.obj");
        std::fs::write(&input, TRIANGLE_OBJ).unwrap();
        let outdir = dir.path().join("out");

        let out = pipeline()
            .process_file(&input, &outdir)
            .unwrap()
            .expect("should produce output");

        assert_eq!(out.file_name().unwrap(), "tri_refined.obj");
        assert!(out.exists());

        // Round trip: counts preserved through the pipeline's export
        let reloaded = load_asset(&out).unwrap();
        let mesh = reloaded.as_mesh().expect("single mesh");
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.face_count(), 1);
    }

    #[test]
    fn test_empty_scene_is_terminal_skip() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("empty.gltf");
        std::fs::write(&input, r#"{"asset":{"version":"2.0"}}"#).unwrap();

        let result = pipeline().process_file(&input, dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_batch_continues_past_bad_file() {
        let dir = tempdir().unwrap();
        let indir = dir.path().join("in");
        std::fs::create_dir_all(&indir).unwrap();

        std::fs::write(indir.join("good.obj"), TRIANGLE_OBJ).unwrap();
        std::fs::write(indir.join("bad.glb"), b"garbage").unwrap();

        let outdir = dir.path().join("out");
        let results = pipeline().process_path(&indir, &outdir).unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].file_name().unwrap().to_string_lossy().contains("good"));
    }

    #[test]
    fn test_batch_recurses_subdirectories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("in/deep/deeper");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("tri.obj"), TRIANGLE_OBJ).unwrap();

        let results = pipeline()
            .process_path(&dir.path().join("in"), &dir.path().join("out"))
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_empty_batch_is_not_an_error() {
        let dir = tempdir().unwrap();
        let indir = dir.path().join("in");
        std::fs::create_dir_all(&indir).unwrap();

        let results = pipeline()
            .process_path(&indir, &dir.path().join("out"))
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_collect_supported_files_filters_and_sorts() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.obj"), "").unwrap();
        std::fs::write(dir.path().join("a.stl"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = collect_supported_files(dir.path());
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.stl"));
        assert!(files[1].ends_with("b.obj"));
    }
}
