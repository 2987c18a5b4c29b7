//! Asset file I/O for OBJ, STL, and glTF/GLB containers.
//!
//! The loader returns a [`Loaded`] value: a single mesh, or a scene when the
//! container carries multiple parts. Saving dispatches on the output
//! extension so the pipeline can round-trip an asset through the container
//! format it arrived in.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use base64::Engine;
use nalgebra::Point2;
use tracing::{debug, info, warn};

use crate::error::{RefineError, RefineResult};
use crate::types::{Loaded, MaterialDef, Mesh, Scene, Vertex};

/// Extensions the pipeline can load and save.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["obj", "glb", "gltf", "stl"];

/// Supported asset container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Obj,
    Glb,
    Gltf,
    Stl,
}

impl MeshFormat {
    /// Detect format from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .and_then(|ext| match ext.as_str() {
                "obj" => Some(MeshFormat::Obj),
                "glb" => Some(MeshFormat::Glb),
                "gltf" => Some(MeshFormat::Gltf),
                "stl" => Some(MeshFormat::Stl),
                _ => None,
            })
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MeshFormat::Obj => "obj",
            MeshFormat::Glb => "glb",
            MeshFormat::Gltf => "gltf",
            MeshFormat::Stl => "stl",
        }
    }
}

/// Load an asset from file, auto-detecting format from extension.
///
/// A container with a single mesh part yields `Loaded::Mesh`; multiple parts
/// yield `Loaded::Scene`. A scene with zero parts is returned as-is; the
/// caller decides whether that is terminal.
pub fn load_asset(path: &Path) -> RefineResult<Loaded> {
    let format = MeshFormat::from_path(path).ok_or_else(|| RefineError::UnsupportedFormat {
        extension: path.extension().and_then(|e| e.to_str()).map(String::from),
    })?;

    info!("Loading asset from {:?} (format: {:?})", path, format);

    let loaded = match format {
        MeshFormat::Obj => load_obj(path)?,
        MeshFormat::Glb | MeshFormat::Gltf => load_gltf(path)?,
        MeshFormat::Stl => load_stl(path)?,
    };

    match &loaded {
        Loaded::Mesh(mesh) => {
            debug!(
                "Loaded single mesh: {} vertices, {} faces, uv={}",
                mesh.vertex_count(),
                mesh.face_count(),
                mesh.has_uv()
            );
            warn_on_defects(mesh, path);
        }
        Loaded::Scene(scene) => {
            debug!("Loaded scene with {} part(s)", scene.part_count());
            for part in &scene.parts {
                warn_on_defects(&part.mesh, path);
            }
        }
    }

    Ok(loaded)
}

/// Save an asset to file, auto-detecting format from extension.
pub fn save_asset(loaded: &Loaded, path: &Path) -> RefineResult<()> {
    let format = MeshFormat::from_path(path).ok_or_else(|| RefineError::UnsupportedFormat {
        extension: path.extension().and_then(|e| e.to_str()).map(String::from),
    })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| RefineError::io_write(path, e))?;
    }

    match format {
        MeshFormat::Obj => save_obj(loaded, path),
        MeshFormat::Glb => save_gltf_container(loaded, path, true),
        MeshFormat::Gltf => save_gltf_container(loaded, path, false),
        MeshFormat::Stl => save_stl(loaded, path),
    }
}

/// Log (but tolerate) defective face data; the repair stage cleans it up.
fn warn_on_defects(mesh: &Mesh, path: &Path) {
    let vcount = mesh.vertices.len() as u32;
    let invalid = mesh
        .faces
        .iter()
        .filter(|f| f.iter().any(|&v| v >= vcount))
        .count();
    if invalid > 0 {
        warn!(
            "{:?}: {} faces reference out-of-range vertices",
            path, invalid
        );
    }
}

// ---------------------------------------------------------------------------
// OBJ
// ---------------------------------------------------------------------------

fn load_obj(path: &Path) -> RefineResult<Loaded> {
    let (models, materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| RefineError::parse_error(path, e.to_string()))?;

    let obj_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let material_defs: Vec<MaterialDef> = match materials {
        Ok(mats) => mats
            .iter()
            .map(|m| {
                let mut def = MaterialDef::new(m.name.clone());
                def.diffuse_texture = m
                    .diffuse_texture
                    .as_ref()
                    .map(|rel| obj_dir.join(rel))
                    .filter(|p| p.exists());
                def
            })
            .collect(),
        Err(e) => {
            warn!("Could not load materials for {:?}: {}", path, e);
            Vec::new()
        }
    };

    let mut parts: Vec<(String, Mesh)> = Vec::new();

    for model in &models {
        let obj_mesh = &model.mesh;
        let mut mesh = Mesh::with_capacity(obj_mesh.positions.len() / 3, obj_mesh.indices.len() / 3);

        let has_uv = !obj_mesh.texcoords.is_empty();
        for (i, chunk) in obj_mesh.positions.chunks(3).enumerate() {
            if chunk.len() != 3 {
                continue;
            }
            let mut vertex =
                Vertex::from_coords(chunk[0] as f64, chunk[1] as f64, chunk[2] as f64);
            if has_uv && obj_mesh.texcoords.len() > i * 2 + 1 {
                vertex.uv = Some(Point2::new(
                    obj_mesh.texcoords[i * 2] as f64,
                    obj_mesh.texcoords[i * 2 + 1] as f64,
                ));
            }
            mesh.vertices.push(vertex);
        }

        for chunk in obj_mesh.indices.chunks(3) {
            if chunk.len() == 3 {
                mesh.faces.push([chunk[0], chunk[1], chunk[2]]);
            }
        }

        if let Some(mat_id) = obj_mesh.material_id
            && mat_id < material_defs.len()
        {
            mesh.face_materials = Some(vec![mat_id as u32; mesh.faces.len()]);
        }
        mesh.materials = material_defs.clone();

        parts.push((model.name.clone(), mesh));
    }

    Ok(parts_to_loaded(parts))
}

fn save_obj(loaded: &Loaded, path: &Path) -> RefineResult<()> {
    let parts = loaded_parts(loaded);

    // Gather materials across parts; an MTL companion is written only when
    // at least one material is present.
    let mut materials: Vec<MaterialDef> = Vec::new();
    for (_, mesh) in &parts {
        for mat in &mesh.materials {
            if !materials.iter().any(|m| m.name == mat.name) {
                materials.push(mat.clone());
            }
        }
    }

    let mtl_name = if materials.is_empty() {
        None
    } else {
        let name = path
            .with_extension("mtl")
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        name
    };

    let file = File::create(path).map_err(|e| RefineError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);

    (|| -> std::io::Result<()> {
        writeln!(writer, "# mesh-refine export")?;
        if let Some(mtl) = &mtl_name {
            writeln!(writer, "mtllib {}", mtl)?;
        }

        // OBJ indices are 1-based; v/vt/vn counters advance independently
        // because not every part carries every attribute
        let mut vertex_offset = 1usize;
        let mut uv_offset = 1usize;
        let mut normal_offset = 1usize;
        for (name, mesh) in &parts {
            if !name.is_empty() {
                writeln!(writer, "o {}", name)?;
            }

            let has_uv = mesh.has_uv();
            let has_normals =
                !mesh.vertices.is_empty() && mesh.vertices.iter().all(|v| v.normal.is_some());

            for v in &mesh.vertices {
                let p = &v.position;
                writeln!(writer, "v {} {} {}", p.x, p.y, p.z)?;
            }
            if has_uv {
                for v in &mesh.vertices {
                    let uv = v.uv.expect("has_uv checked");
                    writeln!(writer, "vt {} {}", uv.x, uv.y)?;
                }
            }
            if has_normals {
                for v in &mesh.vertices {
                    let n = v.normal.expect("has_normals checked");
                    writeln!(writer, "vn {} {} {}", n.x, n.y, n.z)?;
                }
            }

            let mut current_material: Option<u32> = None;
            for (face_idx, face) in mesh.faces.iter().enumerate() {
                if let Some(face_mats) = &mesh.face_materials
                    && let Some(&mat_id) = face_mats.get(face_idx)
                    && current_material != Some(mat_id)
                {
                    if let Some(mat) = mesh.materials.get(mat_id as usize) {
                        writeln!(writer, "usemtl {}", mat.name)?;
                    }
                    current_material = Some(mat_id);
                }

                write!(writer, "f")?;
                for &v in face {
                    let vi = v as usize + vertex_offset;
                    let ti = v as usize + uv_offset;
                    let ni = v as usize + normal_offset;
                    match (has_uv, has_normals) {
                        (true, true) => write!(writer, " {vi}/{ti}/{ni}")?,
                        (true, false) => write!(writer, " {vi}/{ti}")?,
                        (false, true) => write!(writer, " {vi}//{ni}")?,
                        (false, false) => write!(writer, " {vi}")?,
                    }
                }
                writeln!(writer)?;
            }

            vertex_offset += mesh.vertices.len();
            if has_uv {
                uv_offset += mesh.vertices.len();
            }
            if has_normals {
                normal_offset += mesh.vertices.len();
            }
        }

        writer.flush()
    })()
    .map_err(|e| RefineError::io_write(path, e))?;

    if let Some(mtl) = &mtl_name {
        let mtl_path = path.with_file_name(mtl);
        write_mtl(&materials, &mtl_path)?;
    }

    info!("Saved OBJ to {:?}", path);
    Ok(())
}

fn write_mtl(materials: &[MaterialDef], path: &Path) -> RefineResult<()> {
    let file = File::create(path).map_err(|e| RefineError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);

    (|| -> std::io::Result<()> {
        writeln!(writer, "# mesh-refine materials")?;
        for mat in materials {
            writeln!(writer, "newmtl {}", mat.name)?;
            if let Some(tex) = &mat.diffuse_texture {
                writeln!(writer, "map_Kd {}", tex.display())?;
            }
        }
        writer.flush()
    })()
    .map_err(|e| RefineError::io_write(path, e))
}

// ---------------------------------------------------------------------------
// STL
// ---------------------------------------------------------------------------

fn load_stl(path: &Path) -> RefineResult<Loaded> {
    let file = File::open(path).map_err(|e| RefineError::io_read(path, e))?;
    let mut reader = BufReader::new(file);

    let stl = stl_io::read_stl(&mut reader)
        .map_err(|e| RefineError::parse_error(path, e.to_string()))?;

    let mut mesh = Mesh::with_capacity(stl.vertices.len(), stl.faces.len());
    for v in &stl.vertices {
        mesh.vertices.push(Vertex::from_coords(
            v.0[0] as f64,
            v.0[1] as f64,
            v.0[2] as f64,
        ));
    }
    for face in &stl.faces {
        let indices = [
            face.vertices[0] as u32,
            face.vertices[1] as u32,
            face.vertices[2] as u32,
        ];
        if indices[0] != indices[1] && indices[1] != indices[2] && indices[0] != indices[2] {
            mesh.faces.push(indices);
        }
    }

    Ok(Loaded::Mesh(mesh))
}

fn save_stl(loaded: &Loaded, path: &Path) -> RefineResult<()> {
    // STL has no parts: scenes flatten into a single solid
    let mut triangles = Vec::new();
    for (_, mesh) in loaded_parts(loaded) {
        for tri in mesh.triangles() {
            let normal = tri
                .normal()
                .map(|n| [n.x as f32, n.y as f32, n.z as f32])
                .unwrap_or([0.0, 0.0, 0.0]);
            triangles.push(stl_io::Triangle {
                normal: stl_io::Normal::new(normal),
                vertices: [
                    stl_io::Vertex::new([tri.v0.x as f32, tri.v0.y as f32, tri.v0.z as f32]),
                    stl_io::Vertex::new([tri.v1.x as f32, tri.v1.y as f32, tri.v1.z as f32]),
                    stl_io::Vertex::new([tri.v2.x as f32, tri.v2.y as f32, tri.v2.z as f32]),
                ],
            });
        }
    }

    let file = File::create(path).map_err(|e| RefineError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);
    stl_io::write_stl(&mut writer, triangles.iter())
        .map_err(|e| RefineError::io_write(path, e))?;

    info!("Saved STL to {:?} ({} triangles)", path, triangles.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// glTF / GLB
// ---------------------------------------------------------------------------

fn load_gltf(path: &Path) -> RefineResult<Loaded> {
    let (doc, buffers, _images) =
        gltf::import(path).map_err(|e| RefineError::parse_error(path, e.to_string()))?;

    let mut parts: Vec<(String, Mesh)> = Vec::new();

    for gltf_mesh in doc.meshes() {
        let base_name = gltf_mesh
            .name()
            .map(String::from)
            .unwrap_or_else(|| format!("mesh{}", gltf_mesh.index()));

        for (prim_idx, prim) in gltf_mesh.primitives().enumerate() {
            let reader = prim.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));

            let Some(positions) = reader.read_positions() else {
                continue;
            };

            let mut mesh = Mesh::new();
            for p in positions {
                mesh.vertices
                    .push(Vertex::from_coords(p[0] as f64, p[1] as f64, p[2] as f64));
            }

            if let Some(tex0) = reader.read_tex_coords(0) {
                for (i, uv) in tex0.into_f32().enumerate() {
                    if let Some(vertex) = mesh.vertices.get_mut(i) {
                        vertex.uv = Some(Point2::new(uv[0] as f64, uv[1] as f64));
                    }
                }
            }

            if let Some(indices) = reader.read_indices() {
                let flat: Vec<u32> = indices.into_u32().collect();
                for chunk in flat.chunks(3) {
                    if chunk.len() == 3 {
                        mesh.faces.push([chunk[0], chunk[1], chunk[2]]);
                    }
                }
            } else if mesh.vertices.len() % 3 == 0 {
                // Non-indexed triangle list
                for i in (0..mesh.vertices.len() as u32).step_by(3) {
                    mesh.faces.push([i, i + 1, i + 2]);
                }
            }

            if mesh.is_empty() {
                continue;
            }

            let name = if prim_idx == 0 {
                base_name.clone()
            } else {
                format!("{base_name}.{prim_idx}")
            };
            parts.push((name, mesh));
        }
    }

    if parts.is_empty() {
        // No geometry at all: an empty scene, which the pipeline treats as
        // a terminal skip
        return Ok(Loaded::Scene(Scene::new()));
    }

    Ok(parts_to_loaded(parts))
}

/// Minimal glTF 2.0 writer: one buffer, one node per part, positions +
/// optional TEXCOORD_0 + u32 indices. `binary` selects the GLB container;
/// otherwise a standalone `.gltf` with a base64 data-URI buffer is written.
fn save_gltf_container(loaded: &Loaded, path: &Path, binary: bool) -> RefineResult<()> {
    let parts = loaded_parts(loaded);

    let mut bin: Vec<u8> = Vec::new();
    let mut buffer_views = Vec::new();
    let mut accessors = Vec::new();
    let mut meshes = Vec::new();
    let mut nodes = Vec::new();

    for (name, mesh) in &parts {
        if mesh.is_empty() {
            continue;
        }

        let has_uv = mesh.has_uv();

        // Positions
        let pos_offset = bin.len();
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for v in &mesh.vertices {
            let p = [v.position.x, v.position.y, v.position.z];
            for k in 0..3 {
                min[k] = min[k].min(p[k]);
                max[k] = max[k].max(p[k]);
                bin.extend_from_slice(&(p[k] as f32).to_le_bytes());
            }
        }
        let pos_view = buffer_views.len();
        buffer_views.push(serde_json::json!({
            "buffer": 0,
            "byteOffset": pos_offset,
            "byteLength": bin.len() - pos_offset,
        }));
        let pos_accessor = accessors.len();
        accessors.push(serde_json::json!({
            "bufferView": pos_view,
            "componentType": 5126,
            "count": mesh.vertices.len(),
            "type": "VEC3",
            "min": [min[0] as f32, min[1] as f32, min[2] as f32],
            "max": [max[0] as f32, max[1] as f32, max[2] as f32],
        }));

        // Texture coordinates
        let uv_accessor = if has_uv {
            let uv_offset = bin.len();
            for v in &mesh.vertices {
                let uv = v.uv.expect("has_uv checked");
                bin.extend_from_slice(&(uv.x as f32).to_le_bytes());
                bin.extend_from_slice(&(uv.y as f32).to_le_bytes());
            }
            let uv_view = buffer_views.len();
            buffer_views.push(serde_json::json!({
                "buffer": 0,
                "byteOffset": uv_offset,
                "byteLength": bin.len() - uv_offset,
            }));
            let idx = accessors.len();
            accessors.push(serde_json::json!({
                "bufferView": uv_view,
                "componentType": 5126,
                "count": mesh.vertices.len(),
                "type": "VEC2",
            }));
            Some(idx)
        } else {
            None
        };

        // Indices
        let idx_offset = bin.len();
        for face in &mesh.faces {
            for &v in face {
                bin.extend_from_slice(&v.to_le_bytes());
            }
        }
        let idx_view = buffer_views.len();
        buffer_views.push(serde_json::json!({
            "buffer": 0,
            "byteOffset": idx_offset,
            "byteLength": bin.len() - idx_offset,
        }));
        let idx_accessor = accessors.len();
        accessors.push(serde_json::json!({
            "bufferView": idx_view,
            "componentType": 5125,
            "count": mesh.faces.len() * 3,
            "type": "SCALAR",
        }));

        let mut attributes = serde_json::json!({ "POSITION": pos_accessor });
        if let Some(uv_idx) = uv_accessor {
            attributes["TEXCOORD_0"] = serde_json::json!(uv_idx);
        }

        let mesh_index = meshes.len();
        meshes.push(serde_json::json!({
            "name": name,
            "primitives": [{
                "attributes": attributes,
                "indices": idx_accessor,
            }],
        }));
        nodes.push(serde_json::json!({ "mesh": mesh_index }));
    }

    let node_indices: Vec<usize> = (0..nodes.len()).collect();
    let mut root = serde_json::json!({
        "asset": { "version": "2.0", "generator": "mesh-refine" },
        "bufferViews": buffer_views,
        "accessors": accessors,
        "meshes": meshes,
        "nodes": nodes,
        "scenes": [{ "nodes": node_indices }],
        "scene": 0,
    });
    if !bin.is_empty() {
        root["buffers"] = serde_json::json!([{ "byteLength": bin.len() }]);
    }

    if binary {
        write_glb(&root, &bin, path)?;
    } else {
        if !bin.is_empty() {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&bin);
            root["buffers"][0]["uri"] =
                serde_json::json!(format!("data:application/octet-stream;base64,{encoded}"));
        }
        let json = serde_json::to_string_pretty(&root)
            .map_err(|e| RefineError::parse_error(path, e.to_string()))?;
        std::fs::write(path, json).map_err(|e| RefineError::io_write(path, e))?;
    }

    info!("Saved glTF to {:?} ({} part(s))", path, parts.len());
    Ok(())
}

fn write_glb(root: &serde_json::Value, bin: &[u8], path: &Path) -> RefineResult<()> {
    let mut json_bytes = serde_json::to_vec(root)
        .map_err(|e| RefineError::parse_error(path, e.to_string()))?;
    while json_bytes.len() % 4 != 0 {
        json_bytes.push(b' ');
    }
    let mut bin_bytes = bin.to_vec();
    while bin_bytes.len() % 4 != 0 {
        bin_bytes.push(0);
    }

    let total_length = if bin_bytes.is_empty() {
        12 + 8 + json_bytes.len()
    } else {
        12 + 8 + json_bytes.len() + 8 + bin_bytes.len()
    };

    let file = File::create(path).map_err(|e| RefineError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);

    (|| -> std::io::Result<()> {
        writer.write_all(&0x4654_6C67u32.to_le_bytes())?; // "glTF"
        writer.write_all(&2u32.to_le_bytes())?;
        writer.write_all(&(total_length as u32).to_le_bytes())?;

        writer.write_all(&(json_bytes.len() as u32).to_le_bytes())?;
        writer.write_all(&0x4E4F_534Au32.to_le_bytes())?; // "JSON"
        writer.write_all(&json_bytes)?;

        if !bin_bytes.is_empty() {
            writer.write_all(&(bin_bytes.len() as u32).to_le_bytes())?;
            writer.write_all(&0x004E_4942u32.to_le_bytes())?; // "BIN"
            writer.write_all(&bin_bytes)?;
        }

        writer.flush()
    })()
    .map_err(|e| RefineError::io_write(path, e))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Collapse a loaded asset into (name, mesh) pairs for export.
fn loaded_parts(loaded: &Loaded) -> Vec<(String, &Mesh)> {
    match loaded {
        Loaded::Mesh(mesh) => vec![(String::new(), mesh)],
        Loaded::Scene(scene) => scene
            .parts
            .iter()
            .map(|p| (p.name.clone(), &p.mesh))
            .collect(),
    }
}

/// One part becomes a mesh; several become a scene.
fn parts_to_loaded(parts: Vec<(String, Mesh)>) -> Loaded {
    if parts.len() == 1 {
        let (_, mesh) = parts.into_iter().next().expect("length checked");
        Loaded::Mesh(mesh)
    } else {
        let mut scene = Scene::new();
        for (name, mesh) in parts {
            scene.push(name, mesh);
        }
        Loaded::Scene(scene)
    }
}
