//! External UV unwrapping and the retry/acceptance gate.
//!
//! Unwrapping is delegated to a headless Blender invocation that smart-
//! projects and packs UV islands, then re-exports the asset as OBJ. The
//! gate around it retries a bounded number of times, re-loading and
//! re-measuring UV quality after each attempt, and stops at the first
//! accepted candidate. A failed external call ends the gate immediately; it
//! is never retried.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use crate::io::load_asset;
use crate::types::Loaded;

/// UV unwrapping and validation parameters.
#[derive(Debug, Clone)]
pub struct UvConfig {
    /// Unwrap requested explicitly. Missing UVs on a single mesh also
    /// trigger the gate.
    pub unwrap: bool,
    /// Maximum external unwrap attempts.
    pub attempts: usize,
    /// Minimum UV coverage percent (reserved for future gating).
    pub min_coverage: f64,
    /// Maximum UV overlap percent (reserved for future gating).
    pub max_overlap_pct: f64,
    /// Maximum percent of UV vertices outside [0, 1].
    pub max_oob_pct: f64,
    /// Smart-project angle limit.
    pub angle_limit: f64,
    /// Smart-project island margin.
    pub island_margin: f64,
    /// Island packing margin.
    pub pack_margin: f64,
}

impl Default for UvConfig {
    fn default() -> Self {
        Self {
            unwrap: false,
            attempts: 2,
            min_coverage: 50.0,
            max_overlap_pct: 10.0,
            max_oob_pct: 5.0,
            angle_limit: 66.0,
            island_margin: 0.02,
            pack_margin: 0.003,
        }
    }
}

/// Result of running the unwrap gate.
#[derive(Debug)]
pub struct GateOutcome {
    /// External unwrap calls actually made.
    pub attempts_made: usize,
    /// The accepted candidate (its path and the loaded mesh), if any
    /// attempt passed the acceptance check.
    pub accepted: Option<(PathBuf, Loaded)>,
}

impl GateOutcome {
    pub fn was_accepted(&self) -> bool {
        self.accepted.is_some()
    }
}

/// Run the unwrap retry-gate against a source file.
///
/// `unwrap` is the external capability: it receives (source path, output
/// directory) and returns the path to a freshly exported candidate, or None
/// on failure. Each attempt re-unwraps the same original source; candidates
/// are only adopted when accepted. On exhaustion the caller keeps whatever
/// it loaded before the gate.
pub fn run_unwrap_gate<F>(
    source: &Path,
    uv_dir: &Path,
    config: &UvConfig,
    mut unwrap: F,
) -> GateOutcome
where
    F: FnMut(&Path, &Path) -> Option<PathBuf>,
{
    let mut outcome = GateOutcome {
        attempts_made: 0,
        accepted: None,
    };

    for attempt in 1..=config.attempts.max(1) {
        outcome.attempts_made = attempt;

        let Some(candidate) = unwrap(source, uv_dir) else {
            // A failed external call is not retried; it ends the gate
            warn!("Unwrap tool produced no output on attempt {attempt}; ending gate");
            break;
        };

        if !candidate.exists() {
            warn!("Unwrap output {:?} does not exist; ending gate", candidate);
            break;
        }

        match load_asset(&candidate) {
            Ok(loaded @ Loaded::Mesh(_)) => {
                let mesh = loaded.as_mesh().expect("matched single mesh");
                let oob = uv_oob_pct(mesh);
                if mesh.has_uv() && oob <= config.max_oob_pct {
                    info!(
                        "Unwrap accepted on attempt {attempt} (oob {:.2}% <= {:.2}%)",
                        oob, config.max_oob_pct
                    );
                    outcome.accepted = Some((candidate, loaded));
                    break;
                }
                debug!(
                    "Unwrap candidate rejected on attempt {attempt} (has_uv={}, oob {:.2}%)",
                    mesh.has_uv(),
                    oob
                );
            }
            Ok(_) => {
                debug!("Unwrap candidate is a multi-part scene; rejected");
            }
            Err(e) => {
                warn!("Could not load unwrap candidate {:?}: {e}", candidate);
            }
        }
    }

    outcome
}

/// Percentage of UV vertices outside [0, 1]². Zero when the mesh carries no
/// UVs (the `has_uv` check gates acceptance separately).
fn uv_oob_pct(mesh: &crate::types::Mesh) -> f64 {
    let uvs: Vec<_> = mesh.vertices.iter().filter_map(|v| v.uv).collect();
    if uvs.is_empty() {
        return 0.0;
    }
    let oob = uvs
        .iter()
        .filter(|p| p.x < 0.0 || p.x > 1.0 || p.y < 0.0 || p.y > 1.0)
        .count();
    oob as f64 / uvs.len() as f64 * 100.0
}

/// A detected Blender executable.
///
/// Detection happens once per orchestrator run; every unwrap call reuses the
/// probed executable instead of re-searching PATH.
#[derive(Debug, Clone)]
pub struct BlenderTool {
    exe: PathBuf,
}

impl BlenderTool {
    /// Probe for a Blender executable, honoring an explicit override.
    /// Returns None when the capability is unavailable.
    pub fn detect(override_exe: Option<&Path>) -> Option<Self> {
        if let Some(exe) = override_exe {
            if exe.exists() {
                return Some(Self {
                    exe: exe.to_path_buf(),
                });
            }
            warn!("Blender override {:?} not found", exe);
            return None;
        }

        let names: &[&str] = if cfg!(windows) {
            &["blender.exe", "blender"]
        } else {
            &["blender"]
        };

        for name in names {
            if let Some(exe) = find_in_path(name) {
                debug!("Found Blender at {:?}", exe);
                return Some(Self { exe });
            }
        }
        None
    }

    /// Unwrap UVs by running Blender headless against the source file.
    ///
    /// Returns the path to the re-exported OBJ, or None when the tool exits
    /// non-zero or produces no output. The call blocks until the external
    /// process finishes.
    pub fn unwrap_uv(&self, source: &Path, out_dir: &Path, config: &UvConfig) -> Option<PathBuf> {
        if std::fs::create_dir_all(out_dir).is_err() {
            return None;
        }

        let stem = source.file_stem()?.to_string_lossy();
        let out_obj = out_dir.join(format!("{stem}_uv.obj"));
        let script_path = out_dir.join("unwrap_uv_and_export_obj.py");

        let script = unwrap_script(source, &out_obj, config);
        if let Err(e) = std::fs::write(&script_path, script) {
            warn!("Could not write unwrap script: {e}");
            return None;
        }

        let result = Command::new(&self.exe)
            .arg("-b")
            .arg("-noaudio")
            .arg("--python")
            .arg(&script_path)
            .current_dir(out_dir)
            .output();

        match result {
            Ok(output) if output.status.success() && out_obj.exists() => Some(out_obj),
            Ok(output) => {
                warn!(
                    "Blender unwrap failed (status {:?}): {}",
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr)
                );
                None
            }
            Err(e) => {
                warn!("Failed to run Blender: {e}");
                None
            }
        }
    }
}

/// Headless Blender script: import, smart-project each mesh object, pack
/// islands, export OBJ.
fn unwrap_script(input: &Path, output: &Path, config: &UvConfig) -> String {
    format!(
        r#"import bpy, sys, os
in_path = r"{in_path}"
out_path = r"{out_path}"
bpy.ops.wm.read_factory_settings(use_empty=True)
ext = os.path.splitext(in_path)[1].lower()
try:
    if ext in ['.glb', '.gltf']:
        bpy.ops.import_scene.gltf(filepath=in_path)
    elif ext in ['.obj']:
        bpy.ops.wm.obj_import(filepath=in_path)
    elif ext in ['.stl']:
        bpy.ops.wm.stl_import(filepath=in_path)
    else:
        sys.exit(5)
except Exception as ex:
    print('Blender import failed:', ex)
    sys.exit(6)

for obj in list(bpy.data.objects):
    if obj.type != 'MESH':
        continue
    bpy.context.view_layer.objects.active = obj
    for o in bpy.data.objects:
        o.select_set(False)
    obj.select_set(True)
    try:
        bpy.ops.object.mode_set(mode='EDIT')
        bpy.ops.mesh.select_all(action='SELECT')
        bpy.ops.uv.smart_project(angle_limit={angle_limit}, island_margin={island_margin})
        bpy.ops.uv.pack_islands(margin={pack_margin})
        bpy.ops.object.mode_set(mode='OBJECT')
    except Exception as ex:
        print('UV unwrap failed for object', obj.name, ex)

try:
    bpy.ops.wm.obj_export(filepath=out_path, export_materials=False)
except Exception as ex:
    print('Blender OBJ export failed:', ex)
    sys.exit(7)
print('Exported OBJ with UV:', out_path)
"#,
        in_path = input.display(),
        out_path = output.display(),
        angle_limit = config.angle_limit,
        island_margin = config.island_margin,
        pack_margin = config.pack_margin,
    )
}

/// Search PATH for an executable by name.
fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const OBJ_WITH_UV: &str = "\
v 0 0 0
v 1 0 0
v 0 1 0
vt 0 0
vt 1 0
vt 0 1
f 1/1 2/2 3/3
";

    const OBJ_WITHOUT_UV: &str = "\
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
";

    const OBJ_OOB_UV: &str = "\
v 0 0 0
v 1 0 0
v 0 1 0
vt -2 0
vt 3 0
vt 0 5
f 1/1 2/2 3/3
";

    #[test]
    fn test_gate_accepts_first_good_candidate() {
        let dir = tempdir().unwrap();
        let candidate = dir.path().join("out_uv.obj");
        std::fs::write(&candidate, OBJ_WITH_UV).unwrap();

        let mut calls = 0;
        let outcome = run_unwrap_gate(
            Path::new("source.obj"),
            dir.path(),
            &UvConfig::default(),
            |_, _| {
                calls += 1;
                Some(candidate.clone())
            },
        );

        assert_eq!(calls, 1);
        assert_eq!(outcome.attempts_made, 1);
        assert!(outcome.was_accepted());
    }

    #[test]
    fn test_gate_tool_failure_ends_immediately() {
        // Tool fails on the first call: one attempt, no retry.
        let dir = tempdir().unwrap();
        let mut calls = 0;
        let config = UvConfig {
            attempts: 2,
            ..Default::default()
        };

        let outcome = run_unwrap_gate(Path::new("source.obj"), dir.path(), &config, |_, _| {
            calls += 1;
            None
        });

        assert_eq!(calls, 1);
        assert_eq!(outcome.attempts_made, 1);
        assert!(!outcome.was_accepted());
    }

    #[test]
    fn test_gate_exhausts_attempts_on_bad_candidates() {
        let dir = tempdir().unwrap();
        let candidate = dir.path().join("out_uv.obj");
        std::fs::write(&candidate, OBJ_WITHOUT_UV).unwrap();

        let mut calls = 0;
        let config = UvConfig {
            attempts: 3,
            ..Default::default()
        };

        let outcome = run_unwrap_gate(Path::new("source.obj"), dir.path(), &config, |_, _| {
            calls += 1;
            Some(candidate.clone())
        });

        assert_eq!(calls, 3);
        assert_eq!(outcome.attempts_made, 3);
        assert!(!outcome.was_accepted());
    }

    #[test]
    fn test_gate_rejects_oob_uv() {
        let dir = tempdir().unwrap();
        let candidate = dir.path().join("out_uv.obj");
        std::fs::write(&candidate, OBJ_OOB_UV).unwrap();

        let outcome = run_unwrap_gate(
            Path::new("source.obj"),
            dir.path(),
            &UvConfig::default(),
            |_, _| Some(candidate.clone()),
        );

        assert!(!outcome.was_accepted());
        assert_eq!(outcome.attempts_made, 2); // default attempts
    }

    #[test]
    fn test_gate_retries_same_source() {
        let dir = tempdir().unwrap();
        let candidate = dir.path().join("out_uv.obj");
        std::fs::write(&candidate, OBJ_WITHOUT_UV).unwrap();

        let source = Path::new("original_source.obj");
        let mut seen_sources = Vec::new();

        run_unwrap_gate(
            source,
            dir.path(),
            &UvConfig {
                attempts: 2,
                ..Default::default()
            },
            |src, _| {
                seen_sources.push(src.to_path_buf());
                Some(candidate.clone())
            },
        );

        // Attempts are independent retries of the same external call
        assert_eq!(seen_sources, vec![source.to_path_buf(); 2]);
    }

    #[test]
    fn test_blender_detect_with_missing_override() {
        let tool = BlenderTool::detect(Some(Path::new("/nonexistent/blender")));
        assert!(tool.is_none());
    }

    #[test]
    fn test_unwrap_script_parameters() {
        let config = UvConfig {
            angle_limit: 60.0,
            island_margin: 0.05,
            pack_margin: 0.01,
            ..Default::default()
        };
        let script = unwrap_script(Path::new("in.glb"), Path::new("out.obj"), &config);
        assert!(script.contains("angle_limit=60"));
        assert!(script.contains("island_margin=0.05"));
        assert!(script.contains("pack_islands(margin=0.01)"));
    }
}
