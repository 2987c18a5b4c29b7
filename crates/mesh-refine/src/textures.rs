//! Diffuse-texture smoothing for exported OBJ assets.
//!
//! The exported OBJ references an MTL companion file; every `map_Kd` texture
//! it names is smoothed with one of two kernels and the reference rewritten
//! to point at the smoothed copy. Original texture files are left untouched.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use tracing::{info, warn};

use crate::error::{RefineError, RefineResult};

/// Texture smoothing kernel selection, validated at configuration
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureMethod {
    /// Edge-preserving bilateral filter.
    Bilateral,
    /// Separable Gaussian blur.
    Gaussian,
}

impl TextureMethod {
    /// Parse a kernel name. Unknown names fail here, before any image is
    /// touched.
    pub fn parse(name: &str) -> RefineResult<Self> {
        match name {
            "bilateral" => Ok(TextureMethod::Bilateral),
            "gaussian" => Ok(TextureMethod::Gaussian),
            other => Err(RefineError::invalid_config(format!(
                "unknown texture method: {other:?} (expected bilateral or gaussian)"
            ))),
        }
    }
}

/// Texture smoothing parameters.
#[derive(Debug, Clone)]
pub struct TextureConfig {
    pub smooth_textures: bool,
    pub method: TextureMethod,
    /// Bilateral filter window diameter.
    pub bilateral_d: u32,
    pub bilateral_sigma_color: f64,
    pub bilateral_sigma_space: f64,
    /// Gaussian kernel size; forced odd with a minimum of 3.
    pub gaussian_ksize: u32,
    pub gaussian_sigma: f64,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            smooth_textures: false,
            method: TextureMethod::Bilateral,
            bilateral_d: 9,
            bilateral_sigma_color: 75.0,
            bilateral_sigma_space: 75.0,
            gaussian_ksize: 5,
            gaussian_sigma: 1.2,
        }
    }
}

/// Find the `mtllib` reference inside an OBJ file.
pub fn parse_obj_for_mtl(obj_path: &Path) -> Option<String> {
    let file = fs::File::open(obj_path).ok()?;
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        if line.to_lowercase().starts_with("mtllib") {
            let mut parts = line.split_whitespace();
            parts.next();
            if let Some(name) = parts.next() {
                return Some(name.to_string());
            }
        }
    }
    None
}

/// Locate the MTL companion of an exported OBJ: first via its `mtllib`
/// line, then by guessing `<stem>.mtl` next to it.
pub fn find_exported_mtl(output_obj: &Path) -> Option<PathBuf> {
    if let Some(mtl_name) = parse_obj_for_mtl(output_obj) {
        let mtl_path = output_obj
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(mtl_name);
        if mtl_path.exists() {
            return Some(mtl_path);
        }
    }
    let guessed = output_obj.with_extension("mtl");
    guessed.exists().then_some(guessed)
}

/// Smooth every `map_Kd` texture referenced by an MTL file and rewrite the
/// references to the `_smoothed` copies.
///
/// Returns the number of textures updated and the paths written. Unreadable
/// or missing textures are warned about and their lines kept unchanged; the
/// MTL is rewritten only when at least one texture was smoothed.
pub fn smooth_textures_in_mtl(
    mtl_path: &Path,
    out_dir: &Path,
    config: &TextureConfig,
) -> (usize, Vec<PathBuf>) {
    let content = match fs::read_to_string(mtl_path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read MTL {:?}: {e}", mtl_path);
            return (0, Vec::new());
        }
    };

    let mtl_dir = mtl_path.parent().unwrap_or_else(|| Path::new("."));
    let mut changed = 0;
    let mut written: Vec<PathBuf> = Vec::new();
    let mut new_lines: Vec<String> = Vec::new();

    for line in content.lines() {
        if !line.trim_start().to_lowercase().starts_with("map_kd") {
            new_lines.push(line.to_string());
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&tex_rel, options)) = tokens[1..].split_last() else {
            new_lines.push(line.to_string());
            continue;
        };

        let tex_path = mtl_dir.join(tex_rel);
        if !tex_path.exists() {
            warn!("Texture not found: {:?}", tex_path);
            new_lines.push(line.to_string());
            continue;
        }

        let img = match image::open(&tex_path) {
            Ok(img) => img.to_rgba8(),
            Err(e) => {
                warn!("Couldn't read texture {:?}: {e}", tex_path);
                new_lines.push(line.to_string());
                continue;
            }
        };

        let smoothed = match config.method {
            TextureMethod::Bilateral => bilateral_filter(
                &img,
                config.bilateral_d,
                config.bilateral_sigma_color,
                config.bilateral_sigma_space,
            ),
            TextureMethod::Gaussian => {
                gaussian_blur(&img, config.gaussian_ksize, config.gaussian_sigma)
            }
        };

        let stem = tex_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "texture".into());
        let ext = tex_path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "png".into());
        let out_tex_path = out_dir.join(format!("{stem}_smoothed.{ext}"));

        if let Err(e) = fs::create_dir_all(out_dir) {
            warn!("Could not create texture output dir: {e}");
            new_lines.push(line.to_string());
            continue;
        }

        match smoothed.save(&out_tex_path) {
            Ok(()) => {
                changed += 1;
                let new_ref = relative_to(&out_tex_path, mtl_dir);
                let mut rebuilt = vec![tokens[0].to_string()];
                rebuilt.extend(options.iter().map(|s| s.to_string()));
                rebuilt.push(new_ref);
                new_lines.push(rebuilt.join(" "));
                written.push(out_tex_path);
            }
            Err(e) => {
                warn!("Failed to write smoothed texture {:?}: {e}", out_tex_path);
                new_lines.push(line.to_string());
            }
        }
    }

    if changed > 0 {
        let mut output = new_lines.join("\n");
        output.push('\n');
        if let Err(e) = fs::write(mtl_path, output) {
            warn!("Failed to write updated MTL {:?}: {e}", mtl_path);
        } else {
            info!("Rewrote {:?} with {} smoothed texture(s)", mtl_path, changed);
        }
    }

    (changed, written)
}

/// Path of `target` relative to `base`, falling back to the absolute path
/// when `target` is not under `base`.
fn relative_to(target: &Path, base: &Path) -> String {
    match target.strip_prefix(base) {
        Ok(rel) => rel.display().to_string(),
        Err(_) => target.display().to_string(),
    }
}

/// Separable Gaussian blur with an explicit kernel size.
///
/// Kernel size is forced odd with a minimum of 3.
pub fn gaussian_blur(img: &RgbaImage, ksize: u32, sigma: f64) -> RgbaImage {
    let k = (ksize.max(3) | 1) as i64;
    let radius = k / 2;
    let sigma = if sigma > 0.0 { sigma } else { 1.0 };

    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-((i * i) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }

    let horizontal = convolve_1d(img, &kernel, true);
    convolve_1d(&horizontal, &kernel, false)
}

fn convolve_1d(img: &RgbaImage, kernel: &[f64], horizontal: bool) -> RgbaImage {
    let (width, height) = img.dimensions();
    let radius = (kernel.len() / 2) as i64;
    let mut out = RgbaImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let mut accum = [0.0f64; 4];
            for (ki, &w) in kernel.iter().enumerate() {
                let offset = ki as i64 - radius;
                let (sx, sy) = if horizontal {
                    ((x as i64 + offset).clamp(0, width as i64 - 1), y as i64)
                } else {
                    (x as i64, (y as i64 + offset).clamp(0, height as i64 - 1))
                };
                let p = img.get_pixel(sx as u32, sy as u32);
                for c in 0..4 {
                    accum[c] += p.0[c] as f64 * w;
                }
            }
            out.put_pixel(
                x,
                y,
                Rgba([
                    accum[0].round().clamp(0.0, 255.0) as u8,
                    accum[1].round().clamp(0.0, 255.0) as u8,
                    accum[2].round().clamp(0.0, 255.0) as u8,
                    accum[3].round().clamp(0.0, 255.0) as u8,
                ]),
            );
        }
    }

    out
}

/// Edge-preserving bilateral filter.
///
/// Each output pixel is a weighted average over a `d`-diameter window,
/// where weights combine spatial distance and RGB color distance. Alpha is
/// averaged with the same weights.
pub fn bilateral_filter(img: &RgbaImage, d: u32, sigma_color: f64, sigma_space: f64) -> RgbaImage {
    let (width, height) = img.dimensions();
    let radius = (d.max(1) / 2) as i64;
    let sigma_color = if sigma_color > 0.0 { sigma_color } else { 1.0 };
    let sigma_space = if sigma_space > 0.0 { sigma_space } else { 1.0 };

    let two_sc2 = 2.0 * sigma_color * sigma_color;
    let two_ss2 = 2.0 * sigma_space * sigma_space;

    let mut out = RgbaImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let center = img.get_pixel(x, y);
            let mut accum = [0.0f64; 4];
            let mut weight_sum = 0.0;

            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let sx = (x as i64 + dx).clamp(0, width as i64 - 1) as u32;
                    let sy = (y as i64 + dy).clamp(0, height as i64 - 1) as u32;
                    let sample = img.get_pixel(sx, sy);

                    let spatial2 = (dx * dx + dy * dy) as f64;
                    let mut color2 = 0.0;
                    for c in 0..3 {
                        let diff = sample.0[c] as f64 - center.0[c] as f64;
                        color2 += diff * diff;
                    }

                    let w = (-spatial2 / two_ss2).exp() * (-color2 / two_sc2).exp();
                    weight_sum += w;
                    for c in 0..4 {
                        accum[c] += sample.0[c] as f64 * w;
                    }
                }
            }

            out.put_pixel(
                x,
                y,
                Rgba([
                    (accum[0] / weight_sum).round().clamp(0.0, 255.0) as u8,
                    (accum[1] / weight_sum).round().clamp(0.0, 255.0) as u8,
                    (accum[2] / weight_sum).round().clamp(0.0, 255.0) as u8,
                    (accum[3] / weight_sum).round().clamp(0.0, 255.0) as u8,
                ]),
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_texture_method_parse_fails_fast() {
        assert!(TextureMethod::parse("bilateral").is_ok());
        assert!(TextureMethod::parse("gaussian").is_ok());
        assert!(TextureMethod::parse("median").is_err());
    }

    #[test]
    fn test_gaussian_preserves_uniform_image() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([120, 60, 30, 255]));
        let out = gaussian_blur(&img, 5, 1.2);
        assert_eq!(out.get_pixel(4, 4), &Rgba([120, 60, 30, 255]));
    }

    #[test]
    fn test_bilateral_preserves_uniform_image() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([10, 200, 90, 255]));
        let out = bilateral_filter(&img, 9, 75.0, 75.0);
        assert_eq!(out.get_pixel(3, 3), &Rgba([10, 200, 90, 255]));
    }

    #[test]
    fn test_gaussian_smooths_edges() {
        let mut img = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        for y in 0..8 {
            for x in 4..8 {
                img.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let out = gaussian_blur(&img, 5, 1.5);
        let edge = out.get_pixel(4, 4).0[0];
        assert!(edge > 0 && edge < 255, "edge pixel was {edge}");
    }

    #[test]
    fn test_parse_obj_for_mtl() {
        let dir = tempdir().unwrap();
        let obj = dir.path().join("model.obj");
        std::fs::write(&obj, "# comment\nmtllib model.mtl\nv 0 0 0\n").unwrap();
        assert_eq!(parse_obj_for_mtl(&obj), Some("model.mtl".into()));

        let no_mtl = dir.path().join("plain.obj");
        std::fs::write(&no_mtl, "v 0 0 0\n").unwrap();
        assert_eq!(parse_obj_for_mtl(&no_mtl), None);
    }

    #[test]
    fn test_find_exported_mtl_guesses_stem() {
        let dir = tempdir().unwrap();
        let obj = dir.path().join("model.obj");
        let mtl = dir.path().join("model.mtl");
        std::fs::write(&obj, "v 0 0 0\n").unwrap();
        std::fs::write(&mtl, "newmtl a\n").unwrap();

        assert_eq!(find_exported_mtl(&obj), Some(mtl));
    }

    #[test]
    fn test_smooth_textures_rewrites_mtl() {
        let dir = tempdir().unwrap();
        let tex = dir.path().join("diffuse.png");
        RgbaImage::from_pixel(4, 4, Rgba([100, 100, 100, 255]))
            .save(&tex)
            .unwrap();

        let mtl = dir.path().join("model.mtl");
        std::fs::write(&mtl, "newmtl a\nmap_Kd diffuse.png\n").unwrap();

        let config = TextureConfig {
            smooth_textures: true,
            ..Default::default()
        };
        let (changed, written) = smooth_textures_in_mtl(&mtl, dir.path(), &config);

        assert_eq!(changed, 1);
        assert_eq!(written.len(), 1);
        assert!(written[0].exists());

        let rewritten = std::fs::read_to_string(&mtl).unwrap();
        assert!(rewritten.contains("diffuse_smoothed.png"));
        // The original texture is untouched
        assert!(tex.exists());
    }

    #[test]
    fn test_missing_texture_keeps_line() {
        let dir = tempdir().unwrap();
        let mtl = dir.path().join("model.mtl");
        std::fs::write(&mtl, "newmtl a\nmap_Kd missing.png\n").unwrap();

        let (changed, written) = smooth_textures_in_mtl(&mtl, dir.path(), &TextureConfig::default());
        assert_eq!(changed, 0);
        assert!(written.is_empty());

        let content = std::fs::read_to_string(&mtl).unwrap();
        assert!(content.contains("map_Kd missing.png"));
    }
}
