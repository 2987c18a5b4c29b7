//! Vertex-position smoothing with a primary/fallback backend strategy.
//!
//! Two filters are supported: Taubin (alternating shrink/expand passes that
//! resist the volume loss of plain Laplacian smoothing) and Laplacian. The
//! primary backend operates in place over a vertex adjacency built from the
//! face list. If it fails, the fallback backend rebuilds an independent
//! representation that tolerates defective faces, applies an equivalent
//! filter with the same iteration count, and copies vertex positions back
//! only if the vertex count still matches the original. Smoothing never
//! changes vertex or face counts, only positions.

use nalgebra::Vector3;
use tracing::{debug, warn};

use crate::error::{RefineError, RefineResult};
use crate::types::Mesh;

/// Smoothing filter selection, validated at configuration construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SmoothMethod {
    /// Taubin smoothing: per iteration, a +lambda pass then a nu pass
    /// (nu negative) to counteract shrinkage.
    Taubin { lambda: f64, nu: f64 },
    /// Plain Laplacian smoothing with step factor lambda.
    Laplacian { lambda: f64 },
}

impl SmoothMethod {
    /// Parse a method name with its parameters.
    ///
    /// Unknown names fail here, before any geometry is touched.
    pub fn parse(name: &str, lambda: f64, nu: f64) -> RefineResult<Self> {
        match name {
            "taubin" => Ok(SmoothMethod::Taubin { lambda, nu }),
            "laplacian" => Ok(SmoothMethod::Laplacian { lambda }),
            other => Err(RefineError::invalid_config(format!(
                "unknown smoothing method: {other:?} (expected taubin or laplacian)"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SmoothMethod::Taubin { .. } => "taubin",
            SmoothMethod::Laplacian { .. } => "laplacian",
        }
    }

    /// The lambda step factor of either variant.
    pub fn lambda(&self) -> f64 {
        match self {
            SmoothMethod::Taubin { lambda, .. } => *lambda,
            SmoothMethod::Laplacian { lambda } => *lambda,
        }
    }

    fn with_lambda(self, lambda: f64) -> Self {
        match self {
            SmoothMethod::Taubin { nu, .. } => SmoothMethod::Taubin { lambda, nu },
            SmoothMethod::Laplacian { .. } => SmoothMethod::Laplacian { lambda },
        }
    }
}

/// Parameters for one smoothing invocation.
#[derive(Debug, Clone, Copy)]
pub struct SmoothingParams {
    pub method: SmoothMethod,
    pub iterations: usize,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            method: SmoothMethod::Taubin {
                lambda: 0.5,
                nu: -0.53,
            },
            iterations: 10,
        }
    }
}

/// Which backend performed the smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothBackend {
    Primary,
    Fallback,
}

/// Result of a smoothing invocation. Never an error: a mesh that could not
/// be smoothed is left unmodified and reported as such.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothingOutcome {
    Applied(SmoothBackend),
    Unchanged(&'static str),
}

impl SmoothingOutcome {
    pub fn was_applied(&self) -> bool {
        matches!(self, SmoothingOutcome::Applied(_))
    }
}

/// Derive size-adapted parameters for a mesh.
///
/// Large meshes (> 500k vertices) get half the iterations (floor 1) and
/// lambda capped at 0.4 to bound cost; small meshes (< 50k) use the
/// requested parameters unchanged. A cost/quality tradeoff, not a
/// correctness requirement.
pub fn adaptive_params(params: &SmoothingParams, vertex_count: usize) -> SmoothingParams {
    let mut adapted = *params;
    adapted.iterations = params.iterations.max(1);

    if vertex_count > 500_000 {
        adapted.iterations = (params.iterations / 2).max(1);
        let capped = params.method.lambda().min(0.4);
        adapted.method = params.method.with_lambda(capped);
        debug!(
            "Adaptive smoothing for {} vertices: iterations {} -> {}, lambda {:.2}",
            vertex_count,
            params.iterations,
            adapted.iterations,
            adapted.method.lambda()
        );
    }

    adapted
}

/// Smooth vertex positions in place.
///
/// Tries the primary backend first, then the fallback; if both fail the mesh
/// is left unmodified. This is a recoverable, non-fatal outcome at the mesh
/// level.
pub fn smooth_mesh(mesh: &mut Mesh, params: &SmoothingParams) -> SmoothingOutcome {
    if mesh.vertices.is_empty() || mesh.faces.is_empty() {
        return SmoothingOutcome::Unchanged("empty mesh");
    }
    if params.iterations == 0 {
        return SmoothingOutcome::Unchanged("zero iterations");
    }

    match primary_smooth(mesh, params) {
        Ok(()) => {
            debug!(
                "Smoothed {} vertices with {} ({} iterations)",
                mesh.vertex_count(),
                params.method.name(),
                params.iterations
            );
            return SmoothingOutcome::Applied(SmoothBackend::Primary);
        }
        Err(reason) => {
            warn!("Primary smoothing failed ({reason}); trying fallback");
        }
    }

    match fallback_smooth(mesh, params) {
        Ok(()) => SmoothingOutcome::Applied(SmoothBackend::Fallback),
        Err(reason) => {
            warn!("Fallback smoothing failed ({reason}); mesh left unmodified");
            SmoothingOutcome::Unchanged(reason)
        }
    }
}

/// Primary backend: in-place filtering over the full face list.
///
/// Refuses meshes with defective face data; that is the fallback's job.
fn primary_smooth(mesh: &mut Mesh, params: &SmoothingParams) -> Result<(), &'static str> {
    let vertex_count = mesh.vertices.len() as u32;
    if mesh
        .faces
        .iter()
        .any(|f| f.iter().any(|&v| v >= vertex_count))
    {
        return Err("face index out of range");
    }
    if mesh
        .vertices
        .iter()
        .any(|v| !v.position.coords.iter().all(|c| c.is_finite()))
    {
        return Err("non-finite vertex positions");
    }

    let neighbors = build_vertex_neighbors(&mesh.faces, mesh.vertices.len());
    let mut positions: Vec<Vector3<f64>> =
        mesh.vertices.iter().map(|v| v.position.coords).collect();

    run_filter(&mut positions, &neighbors, params);

    for (vertex, pos) in mesh.vertices.iter_mut().zip(&positions) {
        vertex.position.coords.copy_from(pos);
    }
    Ok(())
}

/// Fallback backend: rebuilds an independent representation that drops
/// defective faces, smooths with matching iteration count, and copies
/// positions back only if the vertex count still matches (a safety invariant
/// against silent topology changes).
fn fallback_smooth(mesh: &mut Mesh, params: &SmoothingParams) -> Result<(), &'static str> {
    let vertex_count = mesh.vertices.len() as u32;
    let valid_faces: Vec<[u32; 3]> = mesh
        .faces
        .iter()
        .filter(|f| f.iter().all(|&v| v < vertex_count))
        .copied()
        .collect();

    if valid_faces.is_empty() {
        return Err("no valid faces");
    }

    let neighbors = build_vertex_neighbors(&valid_faces, mesh.vertices.len());
    let mut positions: Vec<Vector3<f64>> = mesh
        .vertices
        .iter()
        .map(|v| {
            let mut p = v.position.coords;
            // Neutralize non-finite inputs so they cannot spread
            if !p.iter().all(|c| c.is_finite()) {
                p = Vector3::zeros();
            }
            p
        })
        .collect();

    run_filter(&mut positions, &neighbors, params);

    if positions.len() != mesh.vertices.len() {
        return Err("vertex count changed");
    }

    for (vertex, pos) in mesh.vertices.iter_mut().zip(&positions) {
        vertex.position.coords.copy_from(pos);
    }
    Ok(())
}

fn run_filter(positions: &mut [Vector3<f64>], neighbors: &[Vec<u32>], params: &SmoothingParams) {
    for _ in 0..params.iterations {
        match params.method {
            SmoothMethod::Taubin { lambda, nu } => {
                laplacian_step(positions, neighbors, lambda);
                laplacian_step(positions, neighbors, nu);
            }
            SmoothMethod::Laplacian { lambda } => {
                laplacian_step(positions, neighbors, lambda);
            }
        }
    }
}

/// One uniform-weight Laplacian pass: each vertex moves toward (factor > 0)
/// or away from (factor < 0) the centroid of its neighbors.
fn laplacian_step(positions: &mut [Vector3<f64>], neighbors: &[Vec<u32>], factor: f64) {
    let displacements: Vec<Vector3<f64>> = positions
        .iter()
        .enumerate()
        .map(|(i, pos)| {
            let adjacent = &neighbors[i];
            if adjacent.is_empty() {
                return Vector3::zeros();
            }
            let sum: Vector3<f64> = adjacent.iter().map(|&n| positions[n as usize]).sum();
            let centroid = sum / adjacent.len() as f64;
            (centroid - pos) * factor
        })
        .collect();

    for (pos, disp) in positions.iter_mut().zip(displacements) {
        *pos += disp;
    }
}

/// Map from vertex index to its neighboring vertex indices.
fn build_vertex_neighbors(faces: &[[u32; 3]], vertex_count: usize) -> Vec<Vec<u32>> {
    let mut neighbors: Vec<hashbrown::HashSet<u32>> =
        vec![hashbrown::HashSet::new(); vertex_count];

    for face in faces {
        for i in 0..3 {
            let v = face[i] as usize;
            neighbors[v].insert(face[(i + 1) % 3]);
            neighbors[v].insert(face[(i + 2) % 3]);
        }
    }

    neighbors
        .into_iter()
        .map(|set| set.into_iter().collect())
        .collect()
}
