//! Edge adjacency tables for topology queries.

use hashbrown::HashMap;

/// Edge-to-face adjacency for a triangle mesh.
///
/// Edges are keyed by their canonical (smaller index, larger index) form.
/// Directed edge counts are kept alongside so winding consistency can be
/// checked without re-walking the faces.
#[derive(Debug, Clone)]
pub struct MeshAdjacency {
    /// Canonical edge -> indices of faces sharing it.
    pub edge_to_faces: HashMap<(u32, u32), Vec<u32>>,

    /// Directed edge -> number of faces traversing it in that direction.
    directed_counts: HashMap<(u32, u32), u32>,
}

impl MeshAdjacency {
    /// Build the adjacency tables from a face list.
    pub fn build(faces: &[[u32; 3]]) -> Self {
        let mut edge_to_faces: HashMap<(u32, u32), Vec<u32>> =
            HashMap::with_capacity(faces.len() * 3 / 2);
        let mut directed_counts: HashMap<(u32, u32), u32> =
            HashMap::with_capacity(faces.len() * 3);

        for (face_idx, face) in faces.iter().enumerate() {
            for i in 0..3 {
                let v0 = face[i];
                let v1 = face[(i + 1) % 3];
                let key = if v0 < v1 { (v0, v1) } else { (v1, v0) };
                edge_to_faces.entry(key).or_default().push(face_idx as u32);
                *directed_counts.entry((v0, v1)).or_insert(0) += 1;
            }
        }

        Self {
            edge_to_faces,
            directed_counts,
        }
    }

    /// Total number of distinct (undirected) edges.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edge_to_faces.len()
    }

    /// Number of boundary edges (edges with exactly 1 adjacent face).
    pub fn boundary_edge_count(&self) -> usize {
        self.edge_to_faces.values().filter(|f| f.len() == 1).count()
    }

    /// Number of non-manifold edges (edges with more than 2 adjacent faces).
    pub fn non_manifold_edge_count(&self) -> usize {
        self.edge_to_faces.values().filter(|f| f.len() > 2).count()
    }

    /// Iterate over non-manifold edges.
    pub fn non_manifold_edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edge_to_faces
            .iter()
            .filter(|(_, faces)| faces.len() > 2)
            .map(|(&edge, _)| edge)
    }

    /// Whether face winding is uniformly oriented.
    ///
    /// Consistent winding means every edge shared by two faces is traversed
    /// in opposite directions by them, so no directed edge appears twice.
    /// Non-manifold edges make orientation ambiguous and count as
    /// inconsistent.
    pub fn is_winding_consistent(&self) -> bool {
        if self.non_manifold_edge_count() > 0 {
            return false;
        }
        self.directed_counts.values().all(|&count| count <= 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron_faces() -> Vec<[u32; 3]> {
        vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]]
    }

    #[test]
    fn test_closed_mesh_has_no_boundary() {
        let adj = MeshAdjacency::build(&tetrahedron_faces());
        assert_eq!(adj.boundary_edge_count(), 0);
        assert_eq!(adj.non_manifold_edge_count(), 0);
        assert_eq!(adj.edge_count(), 6);
        assert!(adj.is_winding_consistent());
    }

    #[test]
    fn test_single_triangle_boundary() {
        let adj = MeshAdjacency::build(&[[0, 1, 2]]);
        assert_eq!(adj.boundary_edge_count(), 3);
        assert!(adj.is_winding_consistent());
    }

    #[test]
    fn test_inconsistent_winding_detected() {
        // Two triangles sharing edge (0,1), both traversing it as 0 -> 1.
        let adj = MeshAdjacency::build(&[[0, 1, 2], [0, 1, 3]]);
        assert!(!adj.is_winding_consistent());

        // Flip the second face and the shared edge is traversed both ways.
        let adj = MeshAdjacency::build(&[[0, 1, 2], [1, 0, 3]]);
        assert!(adj.is_winding_consistent());
    }

    #[test]
    fn test_non_manifold_edge() {
        // Three faces share edge (0,1).
        let adj = MeshAdjacency::build(&[[0, 1, 2], [1, 0, 3], [0, 1, 4]]);
        assert_eq!(adj.non_manifold_edge_count(), 1);
        assert!(!adj.is_winding_consistent());
        let nm: Vec<_> = adj.non_manifold_edges().collect();
        assert_eq!(nm, vec![(0, 1)]);
    }
}
