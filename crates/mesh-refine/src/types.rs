//! Core mesh and scene data types.

use std::path::PathBuf;

use nalgebra::{Point2, Point3, Vector3};

/// A material referenced by faces, as carried by OBJ/glTF containers.
///
/// Only the properties the refinement pipeline touches are kept: the material
/// name (for `usemtl` round-trips) and the diffuse texture path (for texture
/// smoothing).
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDef {
    pub name: String,
    /// Absolute path to the diffuse texture (`map_Kd`), if the container
    /// referenced one and it could be resolved at load time.
    pub diffuse_texture: Option<PathBuf>,
}

impl MaterialDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            diffuse_texture: None,
        }
    }
}

/// A vertex with optional computed or loaded attributes.
#[derive(Debug, Clone)]
pub struct Vertex {
    /// 3D position.
    pub position: Point3<f64>,

    /// Unit normal vector, computed from adjacent faces.
    pub normal: Option<Vector3<f64>>,

    /// Texture-space coordinate, nominally in [0, 1].
    pub uv: Option<Point2<f64>>,
}

impl Vertex {
    /// Create a new vertex with only position set.
    #[inline]
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            normal: None,
            uv: None,
        }
    }

    /// Create a vertex from raw coordinates.
    #[inline]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }

    /// Create a vertex with position and texture coordinate.
    #[inline]
    pub fn with_uv(position: Point3<f64>, uv: Point2<f64>) -> Self {
        Self {
            position,
            normal: None,
            uv: Some(uv),
        }
    }
}

/// A triangle mesh with indexed vertices and faces.
///
/// Faces are `[v0, v1, v2]` index triples with counter-clockwise winding.
/// Per-face material assignment is optional; when present,
/// `face_materials[i]` indexes into `materials` for face `i` and is kept in
/// sync by every face-removal operation (use [`Mesh::retain_faces`]).
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub faces: Vec<[u32; 3]>,
    pub face_materials: Option<Vec<u32>>,
    pub materials: Vec<MaterialDef>,
}

impl Mesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(vertex_count: usize, face_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            faces: Vec::with_capacity(face_count),
            face_materials: None,
            materials: Vec::new(),
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if mesh is empty (no vertices or faces).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Whether every vertex carries a texture coordinate.
    ///
    /// Loaders assign UVs all-or-nothing, so a partially mapped mesh is
    /// treated as unmapped.
    pub fn has_uv(&self) -> bool {
        !self.vertices.is_empty() && self.vertices.iter().all(|v| v.uv.is_some())
    }

    /// Compute the axis-aligned bounding box.
    /// Returns (min_corner, max_corner) or None if mesh is empty.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        if self.vertices.is_empty() {
            return None;
        }

        let mut min = self.vertices[0].position;
        let mut max = self.vertices[0].position;

        for vertex in &self.vertices[1..] {
            let p = &vertex.position;
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }

        Some((min, max))
    }

    /// Area-weighted surface centroid, falling back to the vertex mean when
    /// the total face area is degenerate. None for an empty mesh.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.vertices.is_empty() {
            return None;
        }

        let mut weighted = Vector3::zeros();
        let mut total_area = 0.0;
        for tri in self.triangles() {
            let area = tri.area();
            weighted += tri.centroid().coords * area;
            total_area += area;
        }

        if total_area > f64::EPSILON {
            return Some(Point3::from(weighted / total_area));
        }

        let sum: Vector3<f64> = self.vertices.iter().map(|v| v.position.coords).sum();
        Some(Point3::from(sum / self.vertices.len() as f64))
    }

    /// Iterate over triangles, yielding Triangle structs with actual vertex data.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.faces.iter().map(|&[i0, i1, i2]| Triangle {
            v0: self.vertices[i0 as usize].position,
            v1: self.vertices[i1 as usize].position,
            v2: self.vertices[i2 as usize].position,
        })
    }

    /// Get a specific triangle by face index.
    pub fn triangle(&self, face_idx: usize) -> Option<Triangle> {
        self.faces.get(face_idx).map(|&[i0, i1, i2]| Triangle {
            v0: self.vertices[i0 as usize].position,
            v1: self.vertices[i1 as usize].position,
            v2: self.vertices[i2 as usize].position,
        })
    }

    /// Retain faces for which the predicate returns true, keeping the
    /// per-face material table in sync. Returns the number of faces removed.
    pub fn retain_faces(&mut self, mut keep: impl FnMut(usize, &[u32; 3]) -> bool) -> usize {
        let original = self.faces.len();
        let mask: Vec<bool> = self
            .faces
            .iter()
            .enumerate()
            .map(|(i, f)| keep(i, f))
            .collect();

        let mut idx = 0;
        self.faces.retain(|_| {
            let k = mask[idx];
            idx += 1;
            k
        });

        if let Some(mats) = &mut self.face_materials {
            let mut idx = 0;
            mats.retain(|_| {
                let k = mask[idx];
                idx += 1;
                k
            });
        }

        original - self.faces.len()
    }

    /// Append another mesh's geometry, offsetting its face indices.
    ///
    /// Per-face material tables are dropped: this is the merge-salvage path,
    /// where geometry survival matters and material fidelity does not.
    pub fn append(&mut self, other: &Mesh) {
        let offset = self.vertices.len() as u32;
        self.vertices.extend(other.vertices.iter().cloned());
        self.faces.extend(
            other
                .faces
                .iter()
                .map(|&[a, b, c]| [a + offset, b + offset, c + offset]),
        );
        self.face_materials = None;
        self.materials.clear();
    }

    /// Compute the total surface area of the mesh.
    pub fn surface_area(&self) -> f64 {
        self.triangles().map(|tri| tri.area()).sum()
    }
}

/// A triangle with concrete vertex positions.
///
/// Utility type for geometric calculations. Winding is counter-clockwise
/// when viewed from the front (normal points toward viewer).
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Point3<f64>,
    pub v1: Point3<f64>,
    pub v2: Point3<f64>,
}

impl Triangle {
    #[inline]
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Compute the (unnormalized) face normal via cross product.
    /// The direction follows the right-hand rule with CCW winding.
    #[inline]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        e1.cross(&e2)
    }

    /// Compute the unit face normal.
    /// Returns None for degenerate triangles (zero area).
    pub fn normal(&self) -> Option<Vector3<f64>> {
        let n = self.normal_unnormalized();
        let len_sq = n.norm_squared();
        if len_sq > f64::EPSILON {
            Some(n / len_sq.sqrt())
        } else {
            None
        }
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.normal_unnormalized().norm() * 0.5
    }

    #[inline]
    pub fn centroid(&self) -> Point3<f64> {
        Point3::new(
            (self.v0.x + self.v1.x + self.v2.x) / 3.0,
            (self.v0.y + self.v1.y + self.v2.y) / 3.0,
            (self.v0.z + self.v1.z + self.v2.z) / 3.0,
        )
    }

    /// Check if the triangle is degenerate (zero or near-zero area).
    pub fn is_degenerate(&self, epsilon: f64) -> bool {
        self.area() < epsilon
    }

    /// Check if triangle vertices are nearly collinear.
    ///
    /// Uses the cross product magnitude relative to edge lengths, so the
    /// check is scale-independent.
    pub fn is_nearly_collinear(&self, epsilon: f64) -> bool {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;

        let cross_magnitude = e1.cross(&e2).norm();
        let edge_product = e1.norm() * e2.norm();

        if edge_product < f64::EPSILON {
            return true; // coincident vertices
        }

        cross_magnitude / edge_product < epsilon
    }
}

/// One named part of a multi-part scene.
#[derive(Debug, Clone)]
pub struct ScenePart {
    /// Part name from the container; not necessarily unique.
    pub name: String,
    pub mesh: Mesh,
}

/// A multi-part scene: an ordered mapping from part name to mesh.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub parts: Vec<ScenePart>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, mesh: Mesh) {
        self.parts.push(ScenePart {
            name: name.into(),
            mesh,
        });
    }

    #[inline]
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// A scene with zero geometry parts is a terminal failure state for
    /// processing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// What the loader produced: a single mesh or a multi-part scene.
#[derive(Debug, Clone)]
pub enum Loaded {
    Mesh(Mesh),
    Scene(Scene),
}

impl Loaded {
    #[inline]
    pub fn is_scene(&self) -> bool {
        matches!(self, Loaded::Scene(_))
    }

    /// The single mesh, if this is not a scene.
    pub fn as_mesh(&self) -> Option<&Mesh> {
        match self {
            Loaded::Mesh(m) => Some(m),
            Loaded::Scene(_) => None,
        }
    }

    /// Total vertex count across all parts.
    pub fn total_vertices(&self) -> usize {
        match self {
            Loaded::Mesh(m) => m.vertex_count(),
            Loaded::Scene(s) => s.parts.iter().map(|p| p.mesh.vertex_count()).sum(),
        }
    }
}
