//! UV-space quality metrics: out-of-bounds, coverage, overlap, stretch.
//!
//! Coverage and overlap are estimated by rasterizing every UV triangle's
//! filled footprint into a fixed-resolution visit-count grid. A pixel
//! touched by at least one triangle counts toward coverage; a pixel touched
//! by two or more counts as overlapping.

use nalgebra::Point2;

use crate::types::Mesh;

/// Default accumulation grid resolution.
pub const DEFAULT_RASTER_RESOLUTION: usize = 1024;

/// Settings for UV analysis.
#[derive(Debug, Clone, Copy)]
pub struct UvRasterSettings {
    /// Accumulation grid resolution (pixels per side).
    pub resolution: usize,
    /// Wrap UV coordinates into [0, 1] via modulo before rasterizing.
    pub wrap: bool,
}

impl Default for UvRasterSettings {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RASTER_RESOLUTION,
            wrap: true,
        }
    }
}

/// Computed UV metrics for a mesh with texture coordinates.
#[derive(Debug, Clone, Copy)]
pub struct UvMetrics {
    /// Percentage of vertices whose UV lies outside [0, 1]² (pre-wrap).
    pub oob_vertex_pct: f64,
    /// Percentage of grid pixels covered by at least one triangle.
    pub coverage_pct: f64,
    /// Number of pixels touched by two or more triangles.
    pub overlap_px: usize,
    /// Overlapping pixels as a percentage of covered pixels.
    pub overlap_pct_of_covered: f64,
    /// Mean of UV-area / 3D-area over triangles with non-degenerate 3D area.
    pub stretch_ratio_mean: f64,
    /// Median of the same ratio.
    pub stretch_ratio_median: f64,
    /// Percentage of triangles whose UV-space signed area is negative.
    pub inverted_tri_pct: f64,
}

/// Wrap a UV coordinate into [0, 1] via modulo.
#[inline]
pub fn wrap01(uv: Point2<f64>) -> Point2<f64> {
    Point2::new(uv.x.rem_euclid(1.0), uv.y.rem_euclid(1.0))
}

/// Signed area of a 2D triangle (positive for counter-clockwise).
#[inline]
fn signed_area_2d(a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> f64 {
    let v1 = b - a;
    let v2 = c - a;
    0.5 * (v1.x * v2.y - v1.y * v2.x)
}

/// Compute UV metrics for a mesh. Returns None when the mesh carries no
/// texture coordinates (or no geometry to rasterize).
pub fn analyze_uv(mesh: &Mesh, settings: &UvRasterSettings) -> Option<UvMetrics> {
    if !mesh.has_uv() || mesh.faces.is_empty() {
        return None;
    }

    let uv: Vec<Point2<f64>> = mesh
        .vertices
        .iter()
        .map(|v| v.uv.expect("has_uv checked"))
        .collect();

    // OOB fraction before any wrapping
    let oob = uv
        .iter()
        .filter(|p| p.x < 0.0 || p.x > 1.0 || p.y < 0.0 || p.y > 1.0)
        .count();
    let oob_vertex_pct = oob as f64 / uv.len().max(1) as f64 * 100.0;

    let uv_work: Vec<Point2<f64>> = if settings.wrap {
        uv.iter().map(|&p| wrap01(p)).collect()
    } else {
        uv.clone()
    };

    // Stretch ratios over triangles with meaningful 3D area
    let mut ratios: Vec<f64> = Vec::with_capacity(mesh.faces.len());
    let mut inverted = 0usize;
    for (face_idx, &[i0, i1, i2]) in mesh.faces.iter().enumerate() {
        let a = uv_work[i0 as usize];
        let b = uv_work[i1 as usize];
        let c = uv_work[i2 as usize];

        let uv_signed = signed_area_2d(a, b, c);
        if uv_signed < 0.0 {
            inverted += 1;
        }

        let geo_area = mesh.triangle(face_idx).map(|t| t.area()).unwrap_or(0.0);
        if geo_area > 1e-12 {
            ratios.push(uv_signed.abs() / geo_area);
        }
    }

    let (stretch_ratio_mean, stretch_ratio_median) = if ratios.is_empty() {
        (0.0, 0.0)
    } else {
        let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
        (mean, median(&mut ratios))
    };

    let inverted_tri_pct = inverted as f64 / mesh.faces.len() as f64 * 100.0;

    let (coverage_px, overlap_px) = rasterize_uv(&mesh.faces, &uv_work, settings.resolution);
    let total_px = (settings.resolution * settings.resolution) as f64;
    let coverage_pct = coverage_px as f64 / total_px * 100.0;
    let overlap_pct_of_covered = overlap_px as f64 / (coverage_px.max(1)) as f64 * 100.0;

    Some(UvMetrics {
        oob_vertex_pct,
        coverage_pct,
        overlap_px,
        overlap_pct_of_covered,
        stretch_ratio_mean,
        stretch_ratio_median,
        inverted_tri_pct,
    })
}

/// Rasterize UV triangles into a visit-count grid.
///
/// Returns (covered pixel count, overlapping pixel count). UV coordinates
/// are scaled to [0, res-1] and clamped; each triangle's filled footprint
/// increments the per-pixel counter once.
pub fn rasterize_uv(faces: &[[u32; 3]], uv: &[Point2<f64>], res: usize) -> (usize, usize) {
    if res == 0 || faces.is_empty() {
        return (0, 0);
    }

    let mut accum: Vec<u16> = vec![0; res * res];
    let scale = (res - 1) as f64;

    for &[i0, i1, i2] in faces {
        let clamp_px = |p: Point2<f64>| {
            Point2::new((p.x * scale).clamp(0.0, scale), (p.y * scale).clamp(0.0, scale))
        };
        let a = clamp_px(uv[i0 as usize]);
        let b = clamp_px(uv[i1 as usize]);
        let c = clamp_px(uv[i2 as usize]);

        fill_triangle(&mut accum, res, a, b, c);
    }

    let coverage = accum.iter().filter(|&&count| count >= 1).count();
    let overlap = accum.iter().filter(|&&count| count >= 2).count();
    (coverage, overlap)
}

/// Fill a triangle's footprint into the accumulator, inclusive of edges.
fn fill_triangle(accum: &mut [u16], res: usize, a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) {
    let area2 = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    if area2.abs() < 1e-12 {
        return; // degenerate in UV space, no footprint
    }

    let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as usize;
    let max_x = (a.x.max(b.x).max(c.x).ceil() as usize).min(res - 1);
    let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as usize;
    let max_y = (a.y.max(b.y).max(c.y).ceil() as usize).min(res - 1);

    // Edge-function test, sign-normalized so winding does not matter
    let sign = area2.signum();
    let eps = 1e-9 * area2.abs().max(1.0);

    for y in min_y..=max_y {
        let py = y as f64;
        for x in min_x..=max_x {
            let px = x as f64;
            let w0 = ((b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)) * sign;
            let w1 = ((c.x - b.x) * (py - b.y) - (c.y - b.y) * (px - b.x)) * sign;
            let w2 = ((a.x - c.x) * (py - c.y) - (a.y - c.y) * (px - c.x)) * sign;

            if w0 >= -eps && w1 >= -eps && w2 >= -eps {
                let cell = &mut accum[y * res + x];
                *cell = cell.saturating_add(1);
            }
        }
    }
}

/// Median of an unsorted slice (mutates order).
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vertex;
    use nalgebra::Point3;

    fn uv_mesh(positions: &[[f64; 3]], uvs: &[[f64; 2]], faces: &[[u32; 3]]) -> Mesh {
        let mut mesh = Mesh::new();
        for (p, t) in positions.iter().zip(uvs) {
            mesh.vertices.push(Vertex::with_uv(
                Point3::new(p[0], p[1], p[2]),
                Point2::new(t[0], t[1]),
            ));
        }
        mesh.faces.extend_from_slice(faces);
        mesh
    }

    #[test]
    fn test_no_uv_returns_none() {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.faces.push([0, 1, 2]);

        assert!(analyze_uv(&mesh, &UvRasterSettings::default()).is_none());
    }

    #[test]
    fn test_oob_percentage() {
        let mesh = uv_mesh(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
            &[[0.0, 0.0], [0.5, 0.0], [1.5, 0.5], [0.5, -0.25]],
            &[[0, 1, 2], [0, 1, 3]],
        );

        let metrics = analyze_uv(&mesh, &UvRasterSettings::default()).unwrap();
        // 2 of 4 vertices out of bounds
        assert!((metrics.oob_vertex_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_full_overlap_of_two_half_triangles() {
        // Two identical UV triangles, each covering the lower-left half of
        // the grid: coverage ~50%, overlap ~100% of covered.
        let mesh = uv_mesh(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
                [1.0, 0.0, 1.0],
                [0.0, 1.0, 1.0],
            ],
            &[
                [0.0, 0.0],
                [1.0, 0.0],
                [0.0, 1.0],
                [0.0, 0.0],
                [1.0, 0.0],
                [0.0, 1.0],
            ],
            &[[0, 1, 2], [3, 4, 5]],
        );

        let settings = UvRasterSettings {
            resolution: 1024,
            wrap: false,
        };
        let metrics = analyze_uv(&mesh, &settings).unwrap();

        assert!(
            (metrics.coverage_pct - 50.0).abs() < 1.0,
            "coverage was {}",
            metrics.coverage_pct
        );
        assert!(
            metrics.overlap_pct_of_covered > 99.0,
            "overlap of covered was {}",
            metrics.overlap_pct_of_covered
        );
    }

    #[test]
    fn test_inverted_triangles() {
        let mesh = uv_mesh(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
            &[[0, 1, 2], [0, 2, 1]],
        );

        let metrics = analyze_uv(&mesh, &UvRasterSettings::default()).unwrap();
        assert!((metrics.inverted_tri_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_stretch_ratio_identity_mapping() {
        // UV triangle congruent to the 3D triangle: ratio 1.0
        let mesh = uv_mesh(
            &[[0.0, 0.0, 0.0], [0.5, 0.0, 0.0], [0.0, 0.5, 0.0]],
            &[[0.0, 0.0], [0.5, 0.0], [0.0, 0.5]],
            &[[0, 1, 2]],
        );

        let metrics = analyze_uv(&mesh, &UvRasterSettings::default()).unwrap();
        assert!((metrics.stretch_ratio_mean - 1.0).abs() < 1e-9);
        assert!((metrics.stretch_ratio_median - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_wrap01() {
        let wrapped = wrap01(Point2::new(1.25, -0.25));
        assert!((wrapped.x - 0.25).abs() < 1e-12);
        assert!((wrapped.y - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_rasterize_empty() {
        assert_eq!(rasterize_uv(&[], &[], 64), (0, 0));
    }
}
