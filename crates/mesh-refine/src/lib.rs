//! Mesh refinement pipeline: repair, smoothing, UV gating, and analysis.
//!
//! This crate refines 3D mesh assets: it repairs common defects, smooths
//! vertex positions (and optionally textures), can re-unwrap UV coordinates
//! through an external tool under a retry/quality gate, and produces
//! structured geometric/topological/UV quality reports.
//!
//! # Features
//!
//! - **File I/O**: Load and save OBJ, GLB, GLTF, and STL assets
//! - **Repair**: Remove degenerate and duplicate faces, drop unreferenced
//!   vertices, weld near-duplicates, fix winding and normals
//! - **Smoothing**: Taubin and Laplacian filters with a primary/fallback
//!   backend strategy and mesh-size-adaptive parameters
//! - **UV gate**: Bounded-retry external unwrapping with a UV quality
//!   acceptance check
//! - **Analysis**: Watertightness, winding consistency, Euler number,
//!   components, UV coverage/overlap/stretch, mirrored-Chamfer symmetry
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use mesh_refine::{Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::new(PipelineConfig::default());
//! let outputs = pipeline
//!     .process_path(Path::new("assets/"), Path::new("output/"))
//!     .unwrap();
//! for path in outputs {
//!     println!("refined: {}", path.display());
//! }
//! ```
//!
//! # Analysis
//!
//! ```no_run
//! use std::path::Path;
//! use mesh_refine::{analyze_loaded, load_asset, UvRasterSettings};
//!
//! let loaded = load_asset(Path::new("model.glb")).unwrap();
//! for report in analyze_loaded(&loaded, &UvRasterSettings::default()) {
//!     println!("{}", report.summary_line());
//! }
//! ```
//!
//! # Error Handling
//!
//! Fallible operations return [`RefineResult`]. Inside the pipeline most
//! failures are absorbed per step, per part, or per file: the outcome types
//! ([`RepairOutcome`], [`SmoothingOutcome`]) record what degraded, and a
//! batch never dies because one file did.

pub mod adjacency;
pub mod analyze;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod repair;
pub mod smoothing;
pub mod symmetry;
pub mod textures;
pub mod types;
pub mod unwrap;
pub mod uv;
pub mod winding;

// Re-export core types at crate root
pub use error::{ErrorCode, RecoverySuggestion, RefineError, RefineResult};
pub use types::{Loaded, MaterialDef, Mesh, Scene, ScenePart, Triangle, Vertex};

pub use adjacency::MeshAdjacency;
pub use analyze::{
    BatchAnalysis, FileAnalysis, GeometryReport, MeshAnalysis, UvReport, analyze_geometry,
    analyze_loaded, analyze_mesh,
};
pub use io::{MeshFormat, SUPPORTED_EXTENSIONS, load_asset, save_asset};
pub use pipeline::{Pipeline, PipelineConfig, REFINED_SUFFIX, collect_supported_files};
pub use repair::{
    RepairOutcome, RepairParams, RepairStep, compute_vertex_normals, pre_repair,
    remove_degenerate_faces, remove_duplicate_faces, remove_unreferenced_vertices, sanitize_faces,
    weld_vertices,
};
pub use smoothing::{
    SmoothBackend, SmoothMethod, SmoothingOutcome, SmoothingParams, adaptive_params, smooth_mesh,
};
pub use symmetry::{Axis, SymmetryScores, symmetry_probe};
pub use textures::{TextureConfig, TextureMethod, find_exported_mtl, smooth_textures_in_mtl};
pub use unwrap::{BlenderTool, GateOutcome, UvConfig, run_unwrap_gate};
pub use uv::{UvMetrics, UvRasterSettings, analyze_uv, rasterize_uv};
pub use winding::fix_winding_order;

// Convenience methods on Mesh
impl Mesh {
    /// Load a single mesh from a file, auto-detecting format.
    ///
    /// Multi-part scenes are rejected; use [`load_asset`] to handle both.
    pub fn load(path: impl AsRef<std::path::Path>) -> RefineResult<Self> {
        match io::load_asset(path.as_ref())? {
            Loaded::Mesh(mesh) => Ok(mesh),
            Loaded::Scene(scene) => Err(RefineError::parse_error(
                path.as_ref(),
                format!("expected a single mesh, found {} parts", scene.part_count()),
            )),
        }
    }

    /// Save the mesh to a file, auto-detecting format from extension.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> RefineResult<()> {
        io::save_asset(&Loaded::Mesh(self.clone()), path.as_ref())
    }

    /// Analyze this mesh and return its quality reports.
    pub fn analyze(&self) -> MeshAnalysis {
        analyze::analyze_mesh("mesh", self, &uv::UvRasterSettings::default())
    }

    /// Run the repair sequence with default parameters.
    pub fn repair(&mut self) -> RepairOutcome {
        repair::pre_repair(self, &RepairParams::default())
    }

    /// Smooth vertex positions with the given parameters.
    pub fn smooth(&mut self, params: &SmoothingParams) -> SmoothingOutcome {
        smoothing::smooth_mesh(self, params)
    }
}
