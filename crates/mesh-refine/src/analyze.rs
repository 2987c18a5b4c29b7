//! Mesh quality analysis: geometric, UV, and symmetry reports.
//!
//! Every metric is independently guarded: anything that cannot be computed
//! for an edge case (empty mesh, defective indices, degenerate bounding box)
//! is reported as `None` (serialized as an explicit `null`), never a crash.
//! Analysis never mutates its input, and reports carry no reference back to
//! the mesh they describe.

use serde::Serialize;
use tracing::debug;

use crate::adjacency::MeshAdjacency;
use crate::symmetry::{SymmetryScores, symmetry_probe};
use crate::types::{Loaded, Mesh};
use crate::uv::{UvRasterSettings, analyze_uv};

/// Geometric and topological snapshot of one mesh.
#[derive(Debug, Clone, Serialize)]
pub struct GeometryReport {
    pub has_geometry: bool,
    pub num_vertices: usize,
    pub num_faces: usize,
    pub is_watertight: Option<bool>,
    pub is_winding_consistent: Option<bool>,
    pub euler_number: Option<i64>,
    pub num_open_edges: Option<usize>,
    pub num_degenerate_faces: Option<usize>,
    pub nonfinite_vertex_values: Option<usize>,
    pub bbox_min: Option<[f64; 3]>,
    pub bbox_max: Option<[f64; 3]>,
    pub bbox_extents: Option<[f64; 3]>,
    pub centroid: Option<[f64; 3]>,
    pub num_components: Option<usize>,
}

/// UV-mapping snapshot of one mesh.
#[derive(Debug, Clone, Serialize)]
pub struct UvReport {
    pub has_uv: bool,
    pub uv_oob_vertex_pct: Option<f64>,
    pub coverage_pct: Option<f64>,
    pub overlap_px: Option<usize>,
    pub overlap_pct_of_covered: Option<f64>,
    pub stretch_ratio_mean: Option<f64>,
    pub stretch_ratio_median: Option<f64>,
    pub inverted_tri_pct: Option<f64>,
}

impl UvReport {
    fn unavailable() -> Self {
        Self {
            has_uv: false,
            uv_oob_vertex_pct: None,
            coverage_pct: None,
            overlap_px: None,
            overlap_pct_of_covered: None,
            stretch_ratio_mean: None,
            stretch_ratio_median: None,
            inverted_tri_pct: None,
        }
    }
}

/// Full analysis of one mesh (or one scene part).
#[derive(Debug, Clone, Serialize)]
pub struct MeshAnalysis {
    pub name: String,
    #[serde(flatten)]
    pub geometry: GeometryReport,
    #[serde(flatten)]
    pub uv: UvReport,
    pub symmetry: Option<SymmetryScores>,
}

impl MeshAnalysis {
    /// One-line human summary, as printed by the analyze command.
    pub fn summary_line(&self) -> String {
        if !self.geometry.has_geometry {
            return format!("{}: no geometry", self.name);
        }

        let uv_txt = if self.uv.has_uv {
            format!(
                "UV oob={:.2}%",
                self.uv.uv_oob_vertex_pct.unwrap_or(0.0)
            )
        } else {
            "no UVs".to_string()
        };

        let sym_txt = match &self.symmetry {
            Some(s) => match (s.best_axis, s.best_chamfer) {
                (Some(axis), Some(chamfer)) => {
                    format!("sym_best={} ({:.6})", axis.as_str(), chamfer)
                }
                _ => "sym_best=?".to_string(),
            },
            None => "sym_best=?".to_string(),
        };

        format!(
            "{}: V={} F={} watertight={} comps={} {} {}",
            self.name,
            self.geometry.num_vertices,
            self.geometry.num_faces,
            self.geometry
                .is_watertight
                .map(|w| w.to_string())
                .unwrap_or_else(|| "?".into()),
            self.geometry
                .num_components
                .map(|c| c.to_string())
                .unwrap_or_else(|| "?".into()),
            uv_txt,
            sym_txt
        )
    }
}

/// Analysis of one input file: one entry per mesh part.
#[derive(Debug, Clone, Serialize)]
pub struct FileAnalysis {
    pub file: String,
    pub is_scene: bool,
    pub meshes: Vec<MeshAnalysis>,
}

/// Directory-wide analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchAnalysis {
    pub count: usize,
    pub files: Vec<FileAnalysis>,
}

/// Analyze the geometric properties of a mesh.
pub fn analyze_geometry(mesh: &Mesh) -> GeometryReport {
    let num_vertices = mesh.vertex_count();
    let num_faces = mesh.face_count();
    let has_geometry = num_vertices > 0 && num_faces > 0;

    if !has_geometry {
        return GeometryReport {
            has_geometry,
            num_vertices,
            num_faces,
            is_watertight: None,
            is_winding_consistent: None,
            euler_number: None,
            num_open_edges: None,
            num_degenerate_faces: None,
            nonfinite_vertex_values: None,
            bbox_min: None,
            bbox_max: None,
            bbox_extents: None,
            centroid: None,
            num_components: None,
        };
    }

    let adjacency = MeshAdjacency::build(&mesh.faces);
    let boundary = adjacency.boundary_edge_count();

    let indices_valid = mesh
        .faces
        .iter()
        .all(|f| f.iter().all(|&v| (v as usize) < num_vertices));

    // Degenerate-face count needs vertex positions, so it is unavailable
    // when face indices are defective.
    let num_degenerate_faces = indices_valid.then(|| {
        mesh.faces
            .iter()
            .enumerate()
            .filter(|&(ref i, &[i0, i1, i2])| {
                i0 == i1
                    || i1 == i2
                    || i0 == i2
                    || mesh
                        .triangle(*i)
                        .map(|t| t.is_degenerate(1e-12))
                        .unwrap_or(true)
            })
            .count()
    });

    let nonfinite = mesh
        .vertices
        .iter()
        .map(|v| {
            v.position
                .coords
                .iter()
                .filter(|c| !c.is_finite())
                .count()
        })
        .sum();

    let bounds = mesh.bounds();
    let bbox_min = bounds.map(|(min, _)| [min.x, min.y, min.z]);
    let bbox_max = bounds.map(|(_, max)| [max.x, max.y, max.z]);
    let bbox_extents = bounds.map(|(min, max)| [max.x - min.x, max.y - min.y, max.z - min.z]);
    let centroid = indices_valid
        .then(|| mesh.centroid())
        .flatten()
        .map(|c| [c.x, c.y, c.z]);

    let report = GeometryReport {
        has_geometry,
        num_vertices,
        num_faces,
        is_watertight: Some(boundary == 0),
        is_winding_consistent: Some(adjacency.is_winding_consistent()),
        euler_number: Some(
            num_vertices as i64 - adjacency.edge_count() as i64 + num_faces as i64,
        ),
        num_open_edges: Some(boundary),
        num_degenerate_faces,
        nonfinite_vertex_values: Some(nonfinite),
        bbox_min,
        bbox_max,
        bbox_extents,
        centroid,
        num_components: Some(connected_component_count(&adjacency, num_faces)),
    };

    debug!(
        "Analyzed geometry: {} verts, {} faces, watertight={:?}",
        num_vertices, num_faces, report.is_watertight
    );

    report
}

/// Analyze one mesh end to end: geometry, UV, and symmetry.
pub fn analyze_mesh(name: impl Into<String>, mesh: &Mesh, uv: &UvRasterSettings) -> MeshAnalysis {
    let geometry = analyze_geometry(mesh);

    let indices_valid = mesh
        .faces
        .iter()
        .all(|f| f.iter().all(|&v| (v as usize) < mesh.vertices.len()));

    let uv_report = if indices_valid {
        match analyze_uv(mesh, uv) {
            Some(metrics) => UvReport {
                has_uv: true,
                uv_oob_vertex_pct: Some(metrics.oob_vertex_pct),
                coverage_pct: Some(metrics.coverage_pct),
                overlap_px: Some(metrics.overlap_px),
                overlap_pct_of_covered: Some(metrics.overlap_pct_of_covered),
                stretch_ratio_mean: Some(metrics.stretch_ratio_mean),
                stretch_ratio_median: Some(metrics.stretch_ratio_median),
                inverted_tri_pct: Some(metrics.inverted_tri_pct),
            },
            None => UvReport::unavailable(),
        }
    } else {
        UvReport::unavailable()
    };

    MeshAnalysis {
        name: name.into(),
        geometry,
        uv: uv_report,
        symmetry: symmetry_probe(mesh),
    }
}

/// Analyze a loaded asset: one independent analysis per mesh part.
pub fn analyze_loaded(loaded: &Loaded, uv: &UvRasterSettings) -> Vec<MeshAnalysis> {
    match loaded {
        Loaded::Mesh(mesh) => vec![analyze_mesh("mesh", mesh, uv)],
        Loaded::Scene(scene) => scene
            .parts
            .iter()
            .map(|part| {
                let name = if part.name.is_empty() {
                    "mesh"
                } else {
                    part.name.as_str()
                };
                analyze_mesh(name, &part.mesh, uv)
            })
            .collect(),
    }
}

/// Count connected components via flood fill over shared edges.
fn connected_component_count(adjacency: &MeshAdjacency, face_count: usize) -> usize {
    if face_count == 0 {
        return 0;
    }

    let mut face_neighbors: Vec<Vec<u32>> = vec![Vec::new(); face_count];
    for faces in adjacency.edge_to_faces.values() {
        for i in 0..faces.len() {
            for j in (i + 1)..faces.len() {
                face_neighbors[faces[i] as usize].push(faces[j]);
                face_neighbors[faces[j] as usize].push(faces[i]);
            }
        }
    }

    let mut visited = vec![false; face_count];
    let mut components = 0;

    for start in 0..face_count {
        if visited[start] {
            continue;
        }
        components += 1;
        let mut stack = vec![start as u32];
        visited[start] = true;

        while let Some(face_idx) = stack.pop() {
            for &neighbor in &face_neighbors[face_idx as usize] {
                if !visited[neighbor as usize] {
                    visited[neighbor as usize] = true;
                    stack.push(neighbor);
                }
            }
        }
    }

    components
}
