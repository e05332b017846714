use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontVec, Glyph, PxScale, ScaleFont, point};
use thiserror::Error;
use tiny_skia::{Color, Paint, Pixmap, PremultipliedColorU8, Rect, Transform};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read font file {path}: {source}")]
    FontIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is not a valid font file")]
    InvalidFont { path: PathBuf },
    #[error("unknown tile color '{0}'")]
    UnknownColor(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid pixmap dimensions {0}x{1}")]
    BadDimensions(u32, u32),
}

/// Loads a TrueType/OpenType font from disk. Fonts are configured by path,
/// never embedded.
pub fn load_font(path: &Path) -> Result<FontVec, RenderError> {
    let bytes = std::fs::read(path).map_err(|source| RenderError::FontIo {
        path: path.to_path_buf(),
        source,
    })?;
    FontVec::try_from_vec(bytes).map_err(|_| RenderError::InvalidFont {
        path: path.to_path_buf(),
    })
}

/// Rasterizes a text label into a tightly-bounded transparent pixmap with
/// premultiplied alpha. Layout applies kerning and advances; the caller
/// positions the result.
pub fn render_label<F: Font>(text: &str, font_px: f32, font: &F, color: Color) -> Pixmap {
    let scale = PxScale::from(font_px);
    let sf = font.as_scaled(scale);

    // Layout with the baseline at the ascent.
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    // Union of the outlined pixel bounds.
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;

    for g in &glyphs {
        if let Some(out) = font.outline_glyph(g.clone()) {
            let b = out.px_bounds();
            min_x = min_x.min(b.min.x);
            min_y = min_y.min(b.min.y);
            max_x = max_x.max(b.max.x);
            max_y = max_y.max(b.max.y);
        }
    }

    if min_x == f32::INFINITY {
        return Pixmap::new(1, 1).expect("pixmap");
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;

    let mut pm = Pixmap::new(w, h).expect("pixmap");
    let mut clear = Paint::default();
    clear.set_color(Color::from_rgba8(0, 0, 0, 0));
    pm.fill_rect(
        Rect::from_xywh(0.0, 0.0, w as f32, h as f32).unwrap(),
        &clear,
        Transform::identity(),
        None,
    );

    let stride = pm.width() as usize;
    let dst = pm.pixels_mut();

    let cu = [
        (color.red() * 255.0) as u8,
        (color.green() * 255.0) as u8,
        (color.blue() * 255.0) as u8,
        (color.alpha() * 255.0) as u8,
    ];

    for g in &glyphs {
        if let Some(out) = font.outline_glyph(g.clone()) {
            let b = out.px_bounds();
            out.draw(|x, y, cov| {
                if cov <= f32::EPSILON {
                    return;
                }
                let fx = x as f32 + b.min.x - min_x;
                let fy = y as f32 + b.min.y - min_y;

                let ix = fx.floor() as i32;
                let iy = fy.floor() as i32;
                if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                    return;
                }

                let i = iy as usize * stride + ix as usize;
                if i >= dst.len() {
                    return;
                }

                // Premultiply source by coverage * alpha.
                let a_lin = (cov * cu[3] as f32 / 255.0).clamp(0.0, 1.0);
                let sr = (cu[0] as f32 * a_lin) as u8;
                let sg = (cu[1] as f32 * a_lin) as u8;
                let sb = (cu[2] as f32 * a_lin) as u8;
                let sa = (a_lin * 255.0) as u8;

                let src = PremultipliedColorU8::from_rgba(sr, sg, sb, sa).unwrap();
                let bg = dst[i];

                // Porter-Duff over in premultiplied space.
                let inv = 1.0 - (sa as f32 / 255.0);
                let r = src.red().saturating_add((bg.red() as f32 * inv) as u8);
                let g = src.green().saturating_add((bg.green() as f32 * inv) as u8);
                let b = src.blue().saturating_add((bg.blue() as f32 * inv) as u8);
                let a = src.alpha().saturating_add((bg.alpha() as f32 * inv) as u8);

                dst[i] = PremultipliedColorU8::from_rgba(r, g, b, a).unwrap();
            });
        }
    }

    pm
}
