//! Winding order correction.

use hashbrown::HashSet;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::adjacency::MeshAdjacency;
use crate::error::RefineResult;
use crate::types::Mesh;

/// Fix winding order so all faces have consistent orientation.
///
/// BFS flood fill from an arbitrary start face in each connected component;
/// a face is flipped when it traverses a shared edge in the same direction
/// as its already-visited neighbor. Returns the number of faces flipped.
pub fn fix_winding_order(mesh: &mut Mesh) -> RefineResult<usize> {
    if mesh.faces.is_empty() {
        return Ok(0);
    }

    let adjacency = MeshAdjacency::build(&mesh.faces);
    let face_count = mesh.faces.len();

    let mut global_visited: HashSet<u32> = HashSet::new();
    let mut to_flip: HashSet<u32> = HashSet::new();
    let mut component_count = 0;

    for start_face in 0..face_count {
        let start_face = start_face as u32;
        if global_visited.contains(&start_face) {
            continue;
        }

        component_count += 1;
        let mut component_flips: HashSet<u32> = HashSet::new();
        let mut queue: VecDeque<u32> = VecDeque::new();

        queue.push_back(start_face);
        global_visited.insert(start_face);

        while let Some(face_idx) = queue.pop_front() {
            let face = mesh.faces[face_idx as usize];

            for edge_idx in 0..3 {
                let v0 = face[edge_idx];
                let v1 = face[(edge_idx + 1) % 3];
                let edge_key = if v0 < v1 { (v0, v1) } else { (v1, v0) };

                let Some(neighbors) = adjacency.edge_to_faces.get(&edge_key) else {
                    continue;
                };

                for &neighbor_idx in neighbors {
                    if neighbor_idx == face_idx || global_visited.contains(&neighbor_idx) {
                        continue;
                    }
                    global_visited.insert(neighbor_idx);

                    // For consistent winding the neighbor must traverse the
                    // shared edge in the opposite direction; same direction
                    // means one of the two needs flipping.
                    let neighbor_face = mesh.faces[neighbor_idx as usize];
                    let same_direction =
                        edge_direction_in_face(&neighbor_face, v0, v1).unwrap_or_default();

                    let should_flip = if component_flips.contains(&face_idx) {
                        // Current face was itself flipped, invert the decision
                        !same_direction
                    } else {
                        same_direction
                    };

                    if should_flip {
                        component_flips.insert(neighbor_idx);
                    }

                    queue.push_back(neighbor_idx);
                }
            }
        }

        to_flip.extend(component_flips);
    }

    let total_flipped = to_flip.len();
    for &face_idx in &to_flip {
        mesh.faces[face_idx as usize].swap(1, 2);
    }

    if total_flipped > 0 {
        info!(
            "Fixed winding order: flipped {} faces across {} component(s)",
            total_flipped, component_count
        );
    } else {
        debug!(
            "Winding order already consistent across {} component(s)",
            component_count
        );
    }

    Ok(total_flipped)
}

/// Check if edge (a, b) appears in face in the same direction (a -> b).
/// Returns Some(true) if same direction, Some(false) if opposite, None if
/// the edge is not part of the face.
fn edge_direction_in_face(face: &[u32; 3], a: u32, b: u32) -> Option<bool> {
    for i in 0..3 {
        let v0 = face[i];
        let v1 = face[(i + 1) % 3];

        if v0 == a && v1 == b {
            return Some(true);
        }
        if v0 == b && v1 == a {
            return Some(false);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vertex;

    #[test]
    fn test_fix_inconsistent() {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.5, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.5, -1.0, 0.0));

        mesh.faces.push([0, 1, 2]);
        mesh.faces.push([0, 1, 3]); // traverses (0,1) the same way

        let flipped = fix_winding_order(&mut mesh).unwrap();
        assert_eq!(flipped, 1);

        let dir0 = edge_direction_in_face(&mesh.faces[0], 0, 1);
        let dir1 = edge_direction_in_face(&mesh.faces[1], 0, 1);
        match (dir0, dir1) {
            (Some(d0), Some(d1)) => assert_ne!(d0, d1),
            _ => panic!("Edge should exist in both faces"),
        }

        assert!(MeshAdjacency::build(&mesh.faces).is_winding_consistent());
    }

    #[test]
    fn test_already_consistent_unchanged() {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.5, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.5, -1.0, 0.0));

        mesh.faces.push([0, 1, 2]);
        mesh.faces.push([1, 0, 3]);

        let flipped = fix_winding_order(&mut mesh).unwrap();
        assert_eq!(flipped, 0);
    }

    #[test]
    fn test_disconnected_components_each_fixed() {
        let mut mesh = Mesh::new();
        for base in [0.0, 10.0] {
            mesh.vertices.push(Vertex::from_coords(base, 0.0, 0.0));
            mesh.vertices.push(Vertex::from_coords(base + 1.0, 0.0, 0.0));
            mesh.vertices.push(Vertex::from_coords(base + 0.5, 1.0, 0.0));
            mesh.vertices.push(Vertex::from_coords(base + 0.5, -1.0, 0.0));
        }
        mesh.faces.push([0, 1, 2]);
        mesh.faces.push([0, 1, 3]); // wrong
        mesh.faces.push([4, 5, 6]);
        mesh.faces.push([4, 5, 7]); // wrong

        fix_winding_order(&mut mesh).unwrap();
        assert!(MeshAdjacency::build(&mesh.faces).is_winding_consistent());
    }

    #[test]
    fn test_empty_mesh() {
        let mut mesh = Mesh::new();
        assert_eq!(fix_winding_order(&mut mesh).unwrap(), 0);
    }
}
