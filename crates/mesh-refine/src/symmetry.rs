//! Symmetry probing via mirrored Chamfer distance.
//!
//! For each axis the vertex cloud is mirrored across the bounding-box center
//! on that axis and compared against itself with a symmetric nearest-neighbor
//! distance. Lower values mean the mesh is closer to mirror-symmetric about
//! that axis.

use nalgebra::{Point3, Vector3};
use serde::Serialize;

use crate::types::Mesh;

/// Target number of sampled vertices for the probe.
pub const SYMMETRY_SAMPLE_TARGET: usize = 2048;

/// A mirror axis candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

/// Per-axis Chamfer scores plus the winning axis.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SymmetryScores {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    /// Axis with the smallest Chamfer distance; ties break in x, y, z order.
    pub best_axis: Option<Axis>,
    pub best_chamfer: Option<f64>,
}

impl SymmetryScores {
    pub fn score(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// Probe mirror symmetry of a mesh about each axis.
///
/// Vertices are stride-sampled so the probe sees roughly
/// [`SYMMETRY_SAMPLE_TARGET`] points regardless of mesh size. Returns None
/// for meshes with no finite vertex positions.
pub fn symmetry_probe(mesh: &Mesh) -> Option<SymmetryScores> {
    let positions: Vec<Point3<f64>> = {
        let stride = (mesh.vertices.len() / SYMMETRY_SAMPLE_TARGET).max(1);
        mesh.vertices
            .iter()
            .step_by(stride)
            .map(|v| v.position)
            .filter(|p| p.coords.iter().all(|c| c.is_finite()))
            .collect()
    };

    if positions.is_empty() {
        return None;
    }

    let center = match mesh.bounds() {
        Some((min, max)) => Point3::from((min.coords + max.coords) / 2.0),
        None => return None,
    };

    let mut scores = [None; 3];
    for axis in Axis::ALL {
        scores[axis.index()] = Some(chamfer_for_axis(&positions, center, axis));
    }

    let mut best_axis = None;
    let mut best_chamfer: Option<f64> = None;
    for axis in Axis::ALL {
        if let Some(value) = scores[axis.index()]
            && best_chamfer.is_none_or(|best| value < best)
        {
            best_chamfer = Some(value);
            best_axis = Some(axis);
        }
    }

    Some(SymmetryScores {
        x: scores[0],
        y: scores[1],
        z: scores[2],
        best_axis,
        best_chamfer,
    })
}

/// Symmetric Chamfer distance between the samples and their mirror image
/// across `center` on `axis`.
fn chamfer_for_axis(samples: &[Point3<f64>], center: Point3<f64>, axis: Axis) -> f64 {
    let idx = axis.index();
    let mirrored: Vec<Point3<f64>> = samples
        .iter()
        .map(|p| {
            let mut m = *p;
            m.coords[idx] = 2.0 * center.coords[idx] - m.coords[idx];
            m
        })
        .collect();

    let forward = mean_nearest_distance(samples, &mirrored);
    let backward = mean_nearest_distance(&mirrored, samples);
    (forward + backward) / 2.0
}

/// Mean distance from each point in `from` to its nearest point in `to`.
fn mean_nearest_distance(from: &[Point3<f64>], to: &[Point3<f64>]) -> f64 {
    let total: f64 = from
        .iter()
        .map(|p| {
            to.iter()
                .map(|q| (p - q).norm_squared())
                .fold(f64::INFINITY, f64::min)
                .sqrt()
        })
        .sum();
    total / from.len() as f64
}

/// Mirror a vector's component on the given axis (utility for tests and
/// callers that mirror full meshes).
pub fn mirror_component(v: Vector3<f64>, axis: Axis, center: f64) -> Vector3<f64> {
    let mut out = v;
    out[axis.index()] = 2.0 * center - out[axis.index()];
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vertex;

    /// Mesh mirror-symmetric about the x center, but not about y or z.
    fn x_symmetric_mesh() -> Mesh {
        let mut mesh = Mesh::new();
        let pts = [
            [1.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            [1.0, 2.0, 0.5],
            [-1.0, 2.0, 0.5],
            [0.5, 3.0, 1.5],
            [-0.5, 3.0, 1.5],
            [0.0, 1.0, 2.0],
        ];
        for p in pts {
            mesh.vertices.push(Vertex::from_coords(p[0], p[1], p[2]));
        }
        mesh.faces.push([0, 2, 4]);
        mesh.faces.push([1, 3, 5]);
        mesh.faces.push([0, 1, 6]);
        mesh
    }

    #[test]
    fn test_perfect_mirror_scores_zero() {
        let mesh = x_symmetric_mesh();
        let scores = symmetry_probe(&mesh).expect("non-empty mesh");

        assert_eq!(scores.best_axis, Some(Axis::X));
        assert!(
            scores.best_chamfer.unwrap() < 1e-9,
            "x chamfer was {:?}",
            scores.x
        );
        assert!(scores.y.unwrap() > scores.x.unwrap());
        assert!(scores.z.unwrap() > scores.x.unwrap());
    }

    #[test]
    fn test_empty_mesh_returns_none() {
        assert!(symmetry_probe(&Mesh::new()).is_none());
    }

    #[test]
    fn test_tie_breaks_in_axis_order() {
        // A single point is trivially symmetric about every axis: all
        // scores are zero and x wins by first-seen order.
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(1.0, 2.0, 3.0));
        let scores = symmetry_probe(&mesh).unwrap();
        assert_eq!(scores.best_axis, Some(Axis::X));
    }

    #[test]
    fn test_nonfinite_vertices_filtered() {
        let mut mesh = x_symmetric_mesh();
        mesh.vertices.push(Vertex::from_coords(f64::NAN, 0.0, 0.0));

        let scores = symmetry_probe(&mesh).expect("finite samples remain");
        assert!(scores.best_chamfer.unwrap().is_finite());
    }
}
