//! End-to-end pipeline tests over real files on disk.

use std::path::PathBuf;

use mesh_refine::{
    Loaded, Mesh, Pipeline, PipelineConfig, UvRasterSettings, Vertex, analyze_loaded, analyze_mesh,
    load_asset,
};
use tempfile::tempdir;

fn unit_cube() -> Mesh {
    let mut mesh = Mesh::new();
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
    mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
    mesh.vertices.push(Vertex::from_coords(1.0, 1.0, 0.0));
    mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 1.0));
    mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 1.0));
    mesh.vertices.push(Vertex::from_coords(1.0, 1.0, 1.0));
    mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 1.0));

    mesh.faces.push([0, 2, 1]);
    mesh.faces.push([0, 3, 2]);
    mesh.faces.push([4, 5, 6]);
    mesh.faces.push([4, 6, 7]);
    mesh.faces.push([0, 1, 5]);
    mesh.faces.push([0, 5, 4]);
    mesh.faces.push([3, 7, 6]);
    mesh.faces.push([3, 6, 2]);
    mesh.faces.push([0, 4, 7]);
    mesh.faces.push([0, 7, 3]);
    mesh.faces.push([1, 2, 6]);
    mesh.faces.push([1, 6, 5]);

    mesh
}

/// A pipeline whose unwrap capability is guaranteed absent, so no external
/// tool is ever spawned from tests.
fn offline_pipeline(config: PipelineConfig) -> Pipeline {
    Pipeline::new(PipelineConfig {
        blender_exe: Some(PathBuf::from("/nonexistent/blender")),
        ..config
    })
}

#[test]
fn cube_through_pipeline_stays_watertight_without_uv() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("cube.obj");
    unit_cube().save(&input).unwrap();

    let outdir = dir.path().join("out");
    let out = offline_pipeline(PipelineConfig::default())
        .process_file(&input, &outdir)
        .unwrap()
        .expect("cube should be processed");

    let refined = load_asset(&out).unwrap();
    let mesh = refined.as_mesh().expect("single mesh");
    let analysis = analyze_mesh("cube", mesh, &UvRasterSettings::default());

    assert_eq!(analysis.geometry.num_vertices, 8);
    assert_eq!(analysis.geometry.num_faces, 12);
    assert_eq!(analysis.geometry.is_watertight, Some(true));
    assert!(!analysis.uv.has_uv);
}

#[test]
fn pipeline_preserves_counts_across_formats() {
    for ext in ["obj", "glb", "gltf", "stl"] {
        let dir = tempdir().unwrap();
        let input = dir.path().join(format!("cube.{ext}"));
        unit_cube().save(&input).unwrap();

        let out = offline_pipeline(PipelineConfig::default())
            .process_file(&input, &dir.path().join("out"))
            .unwrap()
            .unwrap_or_else(|| panic!("{ext} should be processed"));

        assert_eq!(
            out.extension().unwrap().to_string_lossy(),
            ext,
            "output container must match input container"
        );

        let refined = load_asset(&out).unwrap();
        let mesh = refined.as_mesh().expect("single mesh");
        // Smoothing moves positions, never counts; repair finds nothing to
        // remove on a clean cube.
        assert_eq!(mesh.vertex_count(), 8, "{ext} vertex count");
        assert_eq!(mesh.face_count(), 12, "{ext} face count");
    }
}

#[test]
fn smoothing_actually_moves_vertices() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("cube.obj");
    unit_cube().save(&input).unwrap();

    let out = offline_pipeline(PipelineConfig::default())
        .process_file(&input, &dir.path().join("out"))
        .unwrap()
        .unwrap();

    let refined = load_asset(&out).unwrap();
    let mesh = refined.as_mesh().unwrap();
    let original = unit_cube();

    let moved = mesh
        .vertices
        .iter()
        .zip(&original.vertices)
        .any(|(a, b)| (a.position - b.position).norm() > 1e-9);
    assert!(moved, "smoothing should displace at least one vertex");
}

#[test]
fn defective_mesh_is_cleaned_by_pipeline() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("dirty.obj");

    // Cube plus a duplicate face and a degenerate face
    let mut mesh = unit_cube();
    mesh.faces.push([0, 2, 1]); // duplicate of face 0
    mesh.vertices.push(Vertex::from_coords(0.5, 0.0, 0.0));
    mesh.faces.push([0, 1, 8]); // collinear with edge (0,1)
    mesh.save(&input).unwrap();

    let out = offline_pipeline(PipelineConfig::default())
        .process_file(&input, &dir.path().join("out"))
        .unwrap()
        .unwrap();

    let refined = load_asset(&out).unwrap();
    let cleaned = refined.as_mesh().unwrap();
    assert_eq!(cleaned.face_count(), 12);
    assert_eq!(cleaned.vertex_count(), 8);
}

#[test]
fn scene_parts_are_processed_independently() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("scene.glb");

    let mut scene = mesh_refine::Scene::new();
    scene.push("first", unit_cube());
    let mut second = unit_cube();
    for v in &mut second.vertices {
        v.position.x += 10.0;
    }
    scene.push("second", second);
    mesh_refine::save_asset(&Loaded::Scene(scene), &input).unwrap();

    let out = offline_pipeline(PipelineConfig::default())
        .process_file(&input, &dir.path().join("out"))
        .unwrap()
        .unwrap();

    let refined = load_asset(&out).unwrap();
    match refined {
        Loaded::Scene(s) => {
            assert_eq!(s.part_count(), 2);
            for part in &s.parts {
                assert_eq!(part.mesh.vertex_count(), 8);
                assert_eq!(part.mesh.face_count(), 12);
            }
        }
        Loaded::Mesh(_) => panic!("expected a scene"),
    }
}

#[test]
fn scene_analysis_yields_one_report_per_part() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("scene.glb");

    let mut scene = mesh_refine::Scene::new();
    scene.push("a", unit_cube());
    scene.push("b", unit_cube());
    mesh_refine::save_asset(&Loaded::Scene(scene), &input).unwrap();

    let loaded = load_asset(&input).unwrap();
    let reports = analyze_loaded(&loaded, &UvRasterSettings::default());

    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_eq!(report.geometry.num_vertices, 8);
        assert_eq!(report.geometry.is_watertight, Some(true));
    }
}

#[test]
fn batch_processes_directory_and_skips_failures() {
    let dir = tempdir().unwrap();
    let indir = dir.path().join("assets");
    std::fs::create_dir_all(&indir).unwrap();

    unit_cube().save(indir.join("one.obj")).unwrap();
    unit_cube().save(indir.join("two.stl")).unwrap();
    std::fs::write(indir.join("broken.glb"), b"not a glb").unwrap();
    std::fs::write(indir.join("ignored.txt"), b"text").unwrap();

    let results = offline_pipeline(PipelineConfig::default())
        .process_path(&indir, &dir.path().join("out"))
        .unwrap();

    assert_eq!(results.len(), 2);
    for path in &results {
        assert!(path.exists());
        assert!(
            path.file_stem()
                .unwrap()
                .to_string_lossy()
                .ends_with("_refined")
        );
    }
}

#[test]
fn symmetry_survives_pipeline_round_trip() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("cube.obj");
    unit_cube().save(&input).unwrap();

    let out = offline_pipeline(PipelineConfig::default())
        .process_file(&input, &dir.path().join("out"))
        .unwrap()
        .unwrap();

    let refined = load_asset(&out).unwrap();
    let mesh = refined.as_mesh().unwrap();
    let analysis = analyze_mesh("cube", mesh, &UvRasterSettings::default());

    // A cube is mirror-symmetric about every axis; whatever axis wins, the
    // score must be near zero.
    let scores = analysis.symmetry.expect("symmetry computable");
    assert!(scores.best_chamfer.unwrap() < 1e-6);
}
