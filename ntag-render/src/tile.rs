use std::path::{Path, PathBuf};

use ab_glyph::Font;
use image::imageops::FilterType;
use tiny_skia::{Color, IntSize, Pixmap};

use crate::text::{RenderError, render_label};

/// PIL-compatible named colors used by the tile sets.
pub fn named_color(name: &str) -> Option<[u8; 3]> {
    match name {
        "black" => Some([0, 0, 0]),
        "white" => Some([255, 255, 255]),
        "green" => Some([0, 128, 0]),
        "blue" => Some([0, 0, 255]),
        "gray" | "grey" => Some([128, 128, 128]),
        _ => None,
    }
}

/// Background of a key tile: a flat fill or a vertical sinusoidal
/// luminance grating.
#[derive(Debug, Clone, PartialEq)]
pub enum TileFace {
    Solid([u8; 3]),
    Grating { cycles: f32 },
}

impl TileFace {
    /// Resolves a color name from a condition's image set. "grating" is a
    /// synthesized face; anything else must be a named color.
    pub fn from_name(name: &str) -> Result<Self, RenderError> {
        if name == "grating" {
            return Ok(TileFace::Grating {
                cycles: DEFAULT_GRATING_CYCLES,
            });
        }
        named_color(name)
            .map(TileFace::Solid)
            .ok_or_else(|| RenderError::UnknownColor(name.to_string()))
    }
}

pub const DEFAULT_GRATING_CYCLES: f32 = 10.0;

/// Tile dimensions and label styling.
#[derive(Debug, Clone, Copy)]
pub struct TileStyle {
    pub size: u32,
    pub label_px: f32,
    pub text_color: [u8; 3],
}

impl Default for TileStyle {
    fn default() -> Self {
        Self {
            size: 150,
            label_px: 30.0,
            text_color: [128, 128, 128],
        }
    }
}

/// A full-contrast vertical grating: luminance varies sinusoidally along x.
pub fn grating_pixmap(size: u32, cycles: f32) -> Pixmap {
    let mut pm = Pixmap::new(size, size).expect("pixmap");
    let data = pm.data_mut();
    for x in 0..size {
        let phase = 2.0 * std::f32::consts::PI * cycles * x as f32 / size as f32;
        let lum = (127.5 + 127.5 * phase.sin()).round().clamp(0.0, 255.0) as u8;
        for y in 0..size {
            let i = ((y * size + x) * 4) as usize;
            data[i] = lum;
            data[i + 1] = lum;
            data[i + 2] = lum;
            data[i + 3] = 255;
        }
    }
    pm
}

fn solid_pixmap(size: u32, rgb: [u8; 3]) -> Pixmap {
    let mut pm = Pixmap::new(size, size).expect("pixmap");
    pm.fill(Color::from_rgba8(rgb[0], rgb[1], rgb[2], 255));
    pm
}

/// Renders one key tile: the face, with an optional label centered on it.
pub fn render_tile<F: Font>(
    label: Option<&str>,
    face: &TileFace,
    style: &TileStyle,
    font: &F,
) -> Pixmap {
    let mut tile = match face {
        TileFace::Solid(rgb) => solid_pixmap(style.size, *rgb),
        TileFace::Grating { cycles } => grating_pixmap(style.size, *cycles),
    };

    if let Some(text) = label {
        let c = style.text_color;
        let glyphs = render_label(
            text,
            style.label_px,
            font,
            Color::from_rgba8(c[0], c[1], c[2], 255),
        );
        let x = (style.size as f32 - glyphs.width() as f32) / 2.0;
        let y = (style.size as f32 - glyphs.height() as f32) / 2.0;
        tile.draw_pixmap(
            x as i32,
            y as i32,
            glyphs.as_ref(),
            &tiny_skia::PixmapPaint::default(),
            tiny_skia::Transform::identity(),
            None,
        );
    }

    tile
}

/// The label/color cross-product a tile set covers.
#[derive(Debug, Clone)]
pub struct TileSetSpec {
    /// (glyph, file stem) pairs.
    pub labels: Vec<(String, String)>,
    pub colors: Vec<String>,
    pub style: TileStyle,
}

impl TileSetSpec {
    /// The default full set: every speller label, the four classic colors
    /// plus the grating face, fixation crosses and blank tiles.
    pub fn full() -> Self {
        Self {
            labels: ntag_core::layout::TILE_LABELS
                .iter()
                .map(|(g, s)| (g.to_string(), s.to_string()))
                .collect(),
            colors: ["black", "white", "green", "blue", "gray", "grating"]
                .into_iter()
                .map(String::from)
                .collect(),
            style: TileStyle::default(),
        }
    }

    /// File names the set will produce: one per (label, color) pair, plus
    /// fixation (`+_{color}.png`) and blank (`{color}.png`) tiles.
    pub fn planned_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        for (_, stem) in &self.labels {
            for color in &self.colors {
                files.push(format!("{stem}_{color}.png"));
            }
        }
        for color in &self.colors {
            files.push(format!("+_{color}.png"));
        }
        for color in &self.colors {
            files.push(format!("{color}.png"));
        }
        files
    }
}

/// Writes the tile set into `dir`, returning the written paths.
pub fn generate_tile_set<F: Font>(
    dir: &Path,
    spec: &TileSetSpec,
    font: &F,
) -> Result<Vec<PathBuf>, RenderError> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let faces: Vec<(String, TileFace)> = spec
        .colors
        .iter()
        .map(|c| TileFace::from_name(c).map(|f| (c.clone(), f)))
        .collect::<Result<_, _>>()?;

    // Speller symbols.
    for (glyph, stem) in &spec.labels {
        for (color, face) in &faces {
            let tile = render_tile(Some(glyph.as_str()), face, &spec.style, font);
            let path = dir.join(format!("{stem}_{color}.png"));
            save_png(&tile, &path)?;
            written.push(path);
        }
    }

    // VEP fixation.
    for (color, face) in &faces {
        let tile = render_tile(Some("+"), face, &spec.style, font);
        let path = dir.join(format!("+_{color}.png"));
        save_png(&tile, &path)?;
        written.push(path);
    }

    // No symbol.
    for (color, face) in &faces {
        let tile = render_tile(None, face, &spec.style, font);
        let path = dir.join(format!("{color}.png"));
        save_png(&tile, &path)?;
        written.push(path);
    }

    Ok(written)
}

/// Encodes a pixmap as PNG. Tiles are fully opaque, so premultiplied and
/// straight alpha coincide.
pub fn save_png(pixmap: &Pixmap, path: &Path) -> Result<(), RenderError> {
    let img = image::RgbaImage::from_raw(pixmap.width(), pixmap.height(), pixmap.data().to_vec())
        .ok_or(RenderError::BadDimensions(pixmap.width(), pixmap.height()))?;
    img.save(path)?;
    Ok(())
}

/// Loads a tile image and scales it to the key's on-screen size.
pub fn load_tile(path: &Path, width: u32, height: u32) -> Result<Pixmap, RenderError> {
    if width == 0 || height == 0 {
        return Err(RenderError::BadDimensions(width, height));
    }
    let img = image::open(path)?.to_rgba8();
    let scaled = image::imageops::resize(&img, width, height, FilterType::Triangle);
    let size = IntSize::from_wh(width, height).ok_or(RenderError::BadDimensions(width, height))?;
    Pixmap::from_vec(scaled.into_raw(), size).ok_or(RenderError::BadDimensions(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn planned_files_are_unique_across_the_cross_product() {
        let spec = TileSetSpec::full();
        let files = spec.planned_files();
        let unique: HashSet<&String> = files.iter().collect();
        assert_eq!(unique.len(), files.len());
        // labels x colors + fixation + blanks
        assert_eq!(files.len(), 42 * 6 + 6 + 6);
    }

    #[test]
    fn question_mark_gets_a_safe_stem() {
        let spec = TileSetSpec::full();
        let files = spec.planned_files();
        assert!(files.contains(&"question_black.png".to_string()));
        assert!(!files.iter().any(|f| f.starts_with("?_")));
    }

    #[test]
    fn face_resolution_covers_both_image_sets() {
        assert_eq!(
            TileFace::from_name("white").unwrap(),
            TileFace::Solid([255, 255, 255])
        );
        assert!(matches!(
            TileFace::from_name("grating").unwrap(),
            TileFace::Grating { .. }
        ));
        assert!(TileFace::from_name("plaid").is_err());
    }

    #[test]
    fn grating_spans_the_full_luminance_range() {
        let pm = grating_pixmap(64, 4.0);
        let data = pm.data();
        let lums: Vec<u8> = (0..64).map(|x| data[(x * 4) as usize]).collect();
        assert!(lums.iter().any(|&l| l < 8));
        assert!(lums.iter().any(|&l| l > 247));
        // Grayscale and opaque.
        for px in data.chunks_exact(4) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
            assert_eq!(px[3], 255);
        }
    }

    #[test]
    fn solid_face_fills_uniformly() {
        let pm = solid_pixmap(8, [0, 128, 0]);
        for px in pm.data().chunks_exact(4) {
            assert_eq!(px, [0, 128, 0, 255]);
        }
    }
}
