//! Mesh repair: defect removal, welding, normal fixing.
//!
//! The repair stage runs a fixed sequence of cleanup steps, each of which is
//! absorbed on failure so that partial repair is always preferred over total
//! failure. The [`RepairOutcome`] records what every step did (or that it was
//! skipped), so callers and tests can see exactly which sub-step degraded.

use hashbrown::{HashMap, HashSet};
use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::types::{Mesh, Triangle};
use crate::winding::fix_winding_order;

/// Configuration parameters for the repair stage.
#[derive(Debug, Clone)]
pub struct RepairParams {
    /// Whether the repair stage runs at all.
    pub enabled: bool,

    /// Distance threshold for vertex welding.
    ///
    /// Vertices closer than this distance are merged into one.
    pub weld_tolerance: f64,

    /// Minimum triangle area; smaller faces are removed as degenerate.
    pub degenerate_area_threshold: f64,

    /// Sine-of-angle threshold for the collinearity check.
    pub collinear_epsilon: f64,
}

impl Default for RepairParams {
    fn default() -> Self {
        Self {
            enabled: true,
            weld_tolerance: 1e-5,
            degenerate_area_threshold: 1e-12,
            collinear_epsilon: 1e-8,
        }
    }
}

/// One step of the repair sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStep {
    Sanitize,
    Degenerate,
    Duplicates,
    Unreferenced,
    Weld,
    Normals,
}

/// What the repair stage did to a mesh.
///
/// All counts are zero and `skipped_steps` empty for an already-clean mesh.
#[derive(Debug, Clone, Default)]
pub struct RepairOutcome {
    /// Faces dropped because they referenced out-of-range vertices.
    pub invalid_faces_removed: usize,
    /// Non-finite coordinate values observed (left in place, reported).
    pub nonfinite_coords: usize,
    /// Degenerate (zero-area / collinear / coincident) faces removed.
    pub degenerates_removed: usize,
    /// Duplicate faces removed.
    pub duplicates_removed: usize,
    /// Unreferenced vertices removed.
    pub unreferenced_removed: usize,
    /// Vertices merged by welding.
    pub vertices_welded: usize,
    /// Whether winding was made consistent and vertex normals recomputed.
    pub normals_fixed: bool,
    /// Steps that could not complete; their failures were absorbed.
    pub skipped_steps: Vec<RepairStep>,
}

impl RepairOutcome {
    /// Whether every step completed (regardless of how much it removed).
    pub fn is_complete(&self) -> bool {
        self.skipped_steps.is_empty()
    }

    /// Total faces removed across all steps.
    pub fn faces_removed(&self) -> usize {
        self.invalid_faces_removed + self.degenerates_removed + self.duplicates_removed
    }
}

/// Remove faces that reference out-of-range vertex indices, and count
/// non-finite coordinate values.
///
/// This is the normalization pass that precedes the geometric steps: after
/// it, every face index is a valid vertex index.
pub fn sanitize_faces(mesh: &mut Mesh) -> (usize, usize) {
    let vertex_count = mesh.vertices.len() as u32;
    let removed = mesh.retain_faces(|_, face| face.iter().all(|&v| v < vertex_count));

    let nonfinite = mesh
        .vertices
        .iter()
        .map(|v| {
            [v.position.x, v.position.y, v.position.z]
                .iter()
                .filter(|c| !c.is_finite())
                .count()
        })
        .sum();

    if removed > 0 {
        warn!("Removed {} faces with out-of-range vertex indices", removed);
    }
    if nonfinite > 0 {
        warn!("Mesh has {} non-finite coordinate values", nonfinite);
    }

    (removed, nonfinite)
}

/// Remove degenerate faces: coincident indices, zero area, or collinear
/// vertices. Returns the number of faces removed.
pub fn remove_degenerate_faces(mesh: &mut Mesh, area_threshold: f64, collinear_eps: f64) -> usize {
    let vertices: Vec<Point3<f64>> = mesh.vertices.iter().map(|v| v.position).collect();

    let removed = mesh.retain_faces(|_, &[i0, i1, i2]| {
        if i0 == i1 || i1 == i2 || i0 == i2 {
            return false;
        }
        // Out-of-range faces count as degenerate when this step is run
        // standalone; the sanitize step normally removes them first
        let (Some(&v0), Some(&v1), Some(&v2)) = (
            vertices.get(i0 as usize),
            vertices.get(i1 as usize),
            vertices.get(i2 as usize),
        ) else {
            return false;
        };
        let tri = Triangle::new(v0, v1, v2);
        !(tri.is_degenerate(area_threshold) || tri.is_nearly_collinear(collinear_eps))
    });

    if removed > 0 {
        info!("Removed {} degenerate faces", removed);
    }
    removed
}

/// Remove duplicate faces from the mesh.
///
/// Faces are considered duplicate if they have the same set of vertices
/// regardless of winding order or starting vertex; all copies except the
/// first occurrence are removed. Returns the number removed.
pub fn remove_duplicate_faces(mesh: &mut Mesh) -> usize {
    // Normalize face to smallest vertex first, maintaining cyclic order
    fn normalize_face(face: [u32; 3]) -> [u32; 3] {
        let mut min_idx = 0;
        for i in 1..3 {
            if face[i] < face[min_idx] {
                min_idx = i;
            }
        }
        [
            face[min_idx],
            face[(min_idx + 1) % 3],
            face[(min_idx + 2) % 3],
        ]
    }

    let mut seen: HashSet<[u32; 3]> = HashSet::new();
    let mut keep_mask: Vec<bool> = Vec::with_capacity(mesh.faces.len());

    for face in &mesh.faces {
        let fwd = normalize_face(*face);
        let rev = normalize_face([face[0], face[2], face[1]]);

        if seen.contains(&fwd) || seen.contains(&rev) {
            keep_mask.push(false);
        } else {
            seen.insert(fwd);
            keep_mask.push(true);
        }
    }

    let removed = mesh.retain_faces(|i, _| keep_mask[i]);
    if removed > 0 {
        info!("Removed {} duplicate faces", removed);
    }
    removed
}

/// Remove unreferenced vertices and compact the vertex array.
///
/// Returns the number of vertices removed.
pub fn remove_unreferenced_vertices(mesh: &mut Mesh) -> usize {
    let original_count = mesh.vertices.len();

    let mut referenced: HashSet<u32> = HashSet::new();
    for face in &mesh.faces {
        referenced.insert(face[0]);
        referenced.insert(face[1]);
        referenced.insert(face[2]);
    }

    if referenced.len() == original_count {
        return 0;
    }

    let mut new_vertices = Vec::with_capacity(referenced.len());
    let mut remap: HashMap<u32, u32> = HashMap::new();

    for (old_idx, vertex) in mesh.vertices.iter().enumerate() {
        if referenced.contains(&(old_idx as u32)) {
            let new_idx = new_vertices.len() as u32;
            remap.insert(old_idx as u32, new_idx);
            new_vertices.push(vertex.clone());
        }
    }

    for face in &mut mesh.faces {
        face[0] = remap[&face[0]];
        face[1] = remap[&face[1]];
        face[2] = remap[&face[2]];
    }

    let removed = original_count - new_vertices.len();
    mesh.vertices = new_vertices;

    if removed > 0 {
        info!("Removed {} unreferenced vertices", removed);
    }

    removed
}

/// Weld vertices that are within tolerance distance of each other.
///
/// Uses spatial hashing to find clusters, remaps faces to cluster
/// representatives, drops faces that collapse, and compacts the vertex
/// array. Running it a second time with the same tolerance is a no-op.
/// Returns the number of vertices merged away.
pub fn weld_vertices(mesh: &mut Mesh, tolerance: f64) -> usize {
    let original_count = mesh.vertices.len();
    if original_count == 0 || tolerance <= 0.0 {
        return 0;
    }

    // Cell size 2x tolerance so a 3x3x3 neighborhood covers the search radius
    let cell_size = tolerance * 2.0;

    let mut spatial_hash: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
    for (idx, vertex) in mesh.vertices.iter().enumerate() {
        let cell = pos_to_cell(&vertex.position, cell_size);
        spatial_hash.entry(cell).or_default().push(idx as u32);
    }

    // For each vertex, find its canonical representative (smallest index in cluster)
    let mut vertex_remap: Vec<u32> = (0..mesh.vertices.len() as u32).collect();
    let mut merged_count = 0;

    for (idx, vertex) in mesh.vertices.iter().enumerate() {
        let idx = idx as u32;
        if vertex_remap[idx as usize] != idx {
            continue;
        }

        let cell = pos_to_cell(&vertex.position, cell_size);

        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let neighbor_cell = (cell.0 + dx, cell.1 + dy, cell.2 + dz);

                    if let Some(candidates) = spatial_hash.get(&neighbor_cell) {
                        for &other_idx in candidates {
                            if other_idx <= idx {
                                continue;
                            }
                            if vertex_remap[other_idx as usize] != other_idx {
                                continue;
                            }

                            let other_pos = &mesh.vertices[other_idx as usize].position;
                            let dist = (vertex.position - other_pos).norm();

                            if dist < tolerance {
                                vertex_remap[other_idx as usize] = idx;
                                merged_count += 1;
                            }
                        }
                    }
                }
            }
        }
    }

    if merged_count == 0 {
        return 0;
    }

    // Resolve transitive merges (A->B, B->C => A->C)
    for i in 0..vertex_remap.len() {
        let mut target = vertex_remap[i];
        while vertex_remap[target as usize] != target {
            target = vertex_remap[target as usize];
        }
        vertex_remap[i] = target;
    }

    for face in &mut mesh.faces {
        face[0] = vertex_remap[face[0] as usize];
        face[1] = vertex_remap[face[1] as usize];
        face[2] = vertex_remap[face[2] as usize];
    }

    // Faces that collapsed onto a shared representative are degenerate now,
    // and distinct faces can have become copies of each other
    mesh.retain_faces(|_, &[i0, i1, i2]| i0 != i1 && i1 != i2 && i0 != i2);
    remove_duplicate_faces(mesh);

    // Merged-away vertices are unreferenced; compact so welding is idempotent
    remove_unreferenced_vertices(mesh);

    info!(
        "Welded {} vertices (tolerance = {:.1e}): {} -> {}",
        merged_count,
        tolerance,
        original_count,
        mesh.vertices.len()
    );

    merged_count
}

/// Compute vertex normals as area-weighted average of adjacent face normals.
pub fn compute_vertex_normals(mesh: &mut Mesh) {
    for vertex in &mut mesh.vertices {
        vertex.normal = None;
    }

    let mut normal_accum: Vec<nalgebra::Vector3<f64>> =
        vec![nalgebra::Vector3::zeros(); mesh.vertices.len()];

    for face in &mesh.faces {
        let tri = Triangle::new(
            mesh.vertices[face[0] as usize].position,
            mesh.vertices[face[1] as usize].position,
            mesh.vertices[face[2] as usize].position,
        );

        // Unnormalized normal has length 2*area, giving area weighting
        let weighted_normal = tri.normal_unnormalized();

        normal_accum[face[0] as usize] += weighted_normal;
        normal_accum[face[1] as usize] += weighted_normal;
        normal_accum[face[2] as usize] += weighted_normal;
    }

    for (idx, accum) in normal_accum.into_iter().enumerate() {
        let len_sq = accum.norm_squared();
        if len_sq > f64::EPSILON {
            mesh.vertices[idx].normal = Some(accum / len_sq.sqrt());
        }
    }

    debug!(
        "Computed vertex normals for {} vertices",
        mesh.vertices.len()
    );
}

/// Convert position to spatial hash cell.
fn pos_to_cell(pos: &Point3<f64>, cell_size: f64) -> (i64, i64, i64) {
    (
        (pos.x / cell_size).floor() as i64,
        (pos.y / cell_size).floor() as i64,
        (pos.z / cell_size).floor() as i64,
    )
}

/// Run the repair sequence on a mesh, in order:
///
/// 1. Sanitize face indices (and count non-finite coordinates)
/// 2. Remove degenerate faces
/// 3. Remove duplicate faces
/// 4. Remove unreferenced vertices
/// 5. Weld vertices within tolerance
/// 6. Fix winding order and recompute vertex normals
///
/// No step propagates a failure: the winding fix is the only fallible step,
/// and its failure is recorded in the outcome and absorbed. Mutates the mesh
/// in place.
pub fn pre_repair(mesh: &mut Mesh, params: &RepairParams) -> RepairOutcome {
    let mut outcome = RepairOutcome::default();

    if mesh.faces.is_empty() {
        debug!("Mesh has no faces, skipping repair");
        return outcome;
    }

    let initial_verts = mesh.vertex_count();
    let initial_faces = mesh.face_count();

    let (invalid, nonfinite) = sanitize_faces(mesh);
    outcome.invalid_faces_removed = invalid;
    outcome.nonfinite_coords = nonfinite;

    outcome.degenerates_removed = remove_degenerate_faces(
        mesh,
        params.degenerate_area_threshold,
        params.collinear_epsilon,
    );

    outcome.duplicates_removed = remove_duplicate_faces(mesh);
    outcome.unreferenced_removed = remove_unreferenced_vertices(mesh);
    outcome.vertices_welded = weld_vertices(mesh, params.weld_tolerance);

    match fix_winding_order(mesh) {
        Ok(_flipped) => {
            compute_vertex_normals(mesh);
            outcome.normals_fixed = true;
        }
        Err(e) => {
            warn!("Could not fix winding order: {:?}", e);
            outcome.skipped_steps.push(RepairStep::Normals);
        }
    }

    info!(
        "Repair complete: {} verts -> {}, {} faces -> {}",
        initial_verts,
        mesh.vertex_count(),
        initial_faces,
        mesh.face_count()
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vertex;
    use approx::assert_relative_eq;

    fn simple_mesh() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(10.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 10.0, 0.0));
        mesh.faces.push([0, 1, 2]);
        mesh
    }

    #[test]
    fn test_sanitize_removes_invalid_faces() {
        let mut mesh = simple_mesh();
        mesh.faces.push([0, 1, 99]);

        let (removed, nonfinite) = sanitize_faces(&mut mesh);
        assert_eq!(removed, 1);
        assert_eq!(nonfinite, 0);
        assert_eq!(mesh.face_count(), 1);
    }

    #[test]
    fn test_sanitize_counts_nonfinite() {
        let mut mesh = simple_mesh();
        mesh.vertices.push(Vertex::from_coords(f64::NAN, 0.0, 0.0));

        let (_, nonfinite) = sanitize_faces(&mut mesh);
        assert_eq!(nonfinite, 1);
    }

    #[test]
    fn test_remove_degenerate_faces() {
        let mut mesh = simple_mesh();
        // Collinear triangle
        mesh.vertices.push(Vertex::from_coords(5.0, 0.0, 0.0));
        mesh.faces.push([0, 1, 3]);
        // Coincident indices
        mesh.faces.push([0, 0, 1]);

        let removed = remove_degenerate_faces(&mut mesh, 1e-12, 1e-8);
        assert_eq!(removed, 2);
        assert_eq!(mesh.face_count(), 1);
    }

    #[test]
    fn test_remove_duplicate_faces_ignores_winding() {
        let mut mesh = simple_mesh();
        mesh.faces.push([1, 2, 0]); // same cycle
        mesh.faces.push([0, 2, 1]); // reversed winding

        let removed = remove_duplicate_faces(&mut mesh);
        assert_eq!(removed, 2);
        assert_eq!(mesh.face_count(), 1);
    }

    #[test]
    fn test_remove_unreferenced() {
        let mut mesh = simple_mesh();
        mesh.vertices.push(Vertex::from_coords(100.0, 100.0, 100.0));

        let removed = remove_unreferenced_vertices(&mut mesh);
        assert_eq!(removed, 1);
        assert_eq!(mesh.vertex_count(), 3);
    }

    #[test]
    fn test_weld_vertices_compacts() {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0)); // 0
        mesh.vertices.push(Vertex::from_coords(10.0, 0.0, 0.0)); // 1
        mesh.vertices.push(Vertex::from_coords(0.0, 10.0, 0.0)); // 2
        mesh.vertices.push(Vertex::from_coords(10.000001, 0.0, 0.0)); // 3, near-dup of 1
        mesh.vertices.push(Vertex::from_coords(10.0, 10.0, 0.0)); // 4
        mesh.faces.push([0, 1, 2]);
        mesh.faces.push([3, 2, 4]);

        let merged = weld_vertices(&mut mesh, 1e-5);
        assert_eq!(merged, 1);
        assert_eq!(mesh.vertex_count(), 4);

        // All faces reference valid vertices
        for face in &mesh.faces {
            for &v in face {
                assert!((v as usize) < mesh.vertex_count());
            }
        }
    }

    #[test]
    fn test_weld_collapses_near_duplicate_faces() {
        // Two triangles over near-duplicate vertex triples become copies of
        // each other after welding; only one survives.
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 1e-7));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 1e-7));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 1e-7));
        mesh.faces.push([0, 1, 2]);
        mesh.faces.push([3, 4, 5]);

        weld_vertices(&mut mesh, 1e-5);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.face_count(), 1);
    }

    #[test]
    fn test_compute_vertex_normals() {
        let mut mesh = simple_mesh();
        compute_vertex_normals(&mut mesh);

        for v in &mesh.vertices {
            let n = v.normal.expect("should have normal");
            assert_relative_eq!(n.z, 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_pre_repair_duplicate_and_degenerate() {
        // Scenario: one duplicate face and one zero-area face; final
        // face count = original - 2.
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(2.0, 0.0, 0.0));
        mesh.faces.push([0, 1, 2]);
        mesh.faces.push([0, 1, 2]); // duplicate
        mesh.faces.push([0, 1, 3]); // zero area (collinear)

        let original = mesh.face_count();
        let outcome = pre_repair(&mut mesh, &RepairParams::default());

        assert_eq!(mesh.face_count(), original - 2);
        assert_eq!(outcome.degenerates_removed, 1);
        assert_eq!(outcome.duplicates_removed, 1);
        assert!(outcome.is_complete());
    }

    #[test]
    fn test_pre_repair_idempotent() {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0000001, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 1.0, 0.0));
        mesh.faces.push([0, 1, 2]);
        mesh.faces.push([3, 2, 4]);
        mesh.faces.push([0, 1, 2]); // duplicate

        let params = RepairParams::default();
        pre_repair(&mut mesh, &params);

        let verts_after_first = mesh.vertex_count();
        let faces_after_first = mesh.face_count();

        let second = pre_repair(&mut mesh, &params);
        assert_eq!(mesh.vertex_count(), verts_after_first);
        assert_eq!(mesh.face_count(), faces_after_first);
        assert_eq!(second.faces_removed(), 0);
        assert_eq!(second.vertices_welded, 0);
        assert_eq!(second.unreferenced_removed, 0);
    }

    #[test]
    fn test_pre_repair_index_invariant() {
        let mut mesh = Mesh::new();
        for i in 0..10 {
            mesh.vertices
                .push(Vertex::from_coords(i as f64, (i % 3) as f64, 0.0));
        }
        mesh.faces.push([0, 1, 2]);
        mesh.faces.push([2, 3, 4]);
        mesh.faces.push([4, 5, 99]); // invalid
        mesh.faces.push([5, 6, 7]);

        pre_repair(&mut mesh, &RepairParams::default());

        let vcount = mesh.vertex_count() as u32;
        for face in &mesh.faces {
            for &v in face {
                assert!(v < vcount);
            }
        }
    }

    #[test]
    fn test_pre_repair_empty_mesh() {
        let mut mesh = Mesh::new();
        let outcome = pre_repair(&mut mesh, &RepairParams::default());
        assert!(outcome.is_complete());
        assert_eq!(outcome.faces_removed(), 0);
    }
}
