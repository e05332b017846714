use bytemuck::{cast_slice, cast_slice_mut};
use tiny_skia::{Color, Pixmap};

/// Offscreen composition surface for the keyboard. Every frame is rebuilt
/// by clearing to the background and blitting one cached tile per key, so
/// the whole pipeline stays premultiplied and the final copy into the
/// surface buffer is a straight memcpy.
pub struct KeyCanvas {
    canvas: Pixmap,
    background: Color,
}

impl KeyCanvas {
    pub fn new(width: u32, height: u32, background: Color) -> Option<Self> {
        let mut canvas = Pixmap::new(width, height)?;
        canvas.fill(background);
        Some(Self { canvas, background })
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn clear(&mut self) {
        self.canvas.fill(self.background);
    }

    /// Raw premultiplied RGBA bytes, ready to copy into a surface buffer.
    pub fn data(&self) -> &[u8] {
        self.canvas.data()
    }

    /// Blits `tile` centered at `center` (raster coordinates), clipping at
    /// the canvas edges. Fully opaque rows take a memcpy fast path; the
    /// rest blend premultiplied per pixel.
    pub fn blit(&mut self, tile: &Pixmap, center: (f32, f32)) {
        let (w, h) = (tile.width(), tile.height());
        let (cw, ch) = (self.canvas.width() as usize, self.canvas.height() as usize);

        let x = (center.0 - w as f32 * 0.5) as i32;
        let y = (center.1 - h as f32 * 0.5) as i32;

        // Cull fully off-screen
        if x + w as i32 <= 0 || y + h as i32 <= 0 || x >= cw as i32 || y >= ch as i32 {
            return;
        }

        let dst_x = x.max(0) as usize;
        let dst_y = y.max(0) as usize;
        let src_x_offset = (-x).max(0) as usize;
        let src_y_offset = (-y).max(0) as usize;
        let copy_w = (w as usize - src_x_offset).min(cw - dst_x);
        let copy_h = (h as usize - src_y_offset).min(ch - dst_y);

        if copy_w == 0 || copy_h == 0 {
            return;
        }

        let src_data = tile.data();
        let src_row_bytes = w as usize * 4;

        // Detect full opacity once per blit.
        let fully_opaque = {
            let mut opaque = true;
            for row in 0..copy_h {
                let start = (src_y_offset + row) * src_row_bytes + src_x_offset * 4 + 3;
                let end = start + copy_w * 4;
                if src_data[start..end].iter().step_by(4).any(|&a| a != 255) {
                    opaque = false;
                    break;
                }
            }
            opaque
        };

        let dst_data = self.canvas.data_mut();
        let src_u32: &[u32] = cast_slice(src_data);
        let dst_u32: &mut [u32] = cast_slice_mut(dst_data);

        if fully_opaque {
            for row in 0..copy_h {
                let src_row_start = (src_y_offset + row) * w as usize + src_x_offset;
                let dst_row_start = (dst_y + row) * cw + dst_x;
                dst_u32[dst_row_start..dst_row_start + copy_w]
                    .copy_from_slice(&src_u32[src_row_start..src_row_start + copy_w]);
            }
        } else {
            for row in 0..copy_h {
                let src_row_start = (src_y_offset + row) * w as usize + src_x_offset;
                let dst_row_start = (dst_y + row) * cw + dst_x;

                for i in 0..copy_w {
                    let s = src_u32[src_row_start + i];
                    let d = dst_u32[dst_row_start + i];

                    let sa = (s >> 24) & 0xFF;
                    let inv = 255 - sa;

                    let sr = s & 0xFF;
                    let sg = (s >> 8) & 0xFF;
                    let sb = (s >> 16) & 0xFF;

                    let dr = d & 0xFF;
                    let dg = (d >> 8) & 0xFF;
                    let db = (d >> 16) & 0xFF;
                    let da = (d >> 24) & 0xFF;

                    let r = sr + (dr * inv + 127) / 255;
                    let g = sg + (dg * inv + 127) / 255;
                    let b = sb + (db * inv + 127) / 255;
                    let a = sa + (da * inv + 127) / 255;

                    dst_u32[dst_row_start + i] = (a << 24) | (b << 16) | (g << 8) | r;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(size: u32, rgba: [u8; 4]) -> Pixmap {
        let mut pm = Pixmap::new(size, size).unwrap();
        pm.fill(Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3]));
        pm
    }

    fn pixel(canvas: &KeyCanvas, x: usize, y: usize) -> [u8; 4] {
        let i = (y * canvas.width() as usize + x) * 4;
        canvas.data()[i..i + 4].try_into().unwrap()
    }

    #[test]
    fn opaque_blit_lands_centered() {
        let mut canvas = KeyCanvas::new(16, 16, Color::BLACK).unwrap();
        canvas.blit(&solid(4, [255, 255, 255, 255]), (8.0, 8.0));

        assert_eq!(pixel(&canvas, 7, 7), [255, 255, 255, 255]);
        assert_eq!(pixel(&canvas, 9, 9), [255, 255, 255, 255]);
        assert_eq!(pixel(&canvas, 4, 4), [0, 0, 0, 255]);
        assert_eq!(pixel(&canvas, 11, 11), [0, 0, 0, 255]);
    }

    #[test]
    fn blit_clips_at_edges() {
        let mut canvas = KeyCanvas::new(8, 8, Color::BLACK).unwrap();
        // Center in the top-left corner: only the bottom-right quadrant of
        // the tile is visible.
        canvas.blit(&solid(4, [255, 0, 0, 255]), (0.0, 0.0));
        assert_eq!(pixel(&canvas, 0, 0), [255, 0, 0, 255]);
        assert_eq!(pixel(&canvas, 1, 1), [255, 0, 0, 255]);
        assert_eq!(pixel(&canvas, 2, 2), [0, 0, 0, 255]);
    }

    #[test]
    fn fully_offscreen_blit_is_ignored() {
        let mut canvas = KeyCanvas::new(8, 8, Color::BLACK).unwrap();
        canvas.blit(&solid(4, [255, 0, 0, 255]), (-10.0, -10.0));
        canvas.blit(&solid(4, [255, 0, 0, 255]), (100.0, 100.0));
        for px in canvas.data().chunks_exact(4) {
            assert_eq!(px, [0, 0, 0, 255]);
        }
    }

    #[test]
    fn clear_restores_the_background() {
        let mut canvas = KeyCanvas::new(8, 8, Color::from_rgba8(10, 20, 30, 255)).unwrap();
        canvas.blit(&solid(4, [255, 255, 255, 255]), (4.0, 4.0));
        canvas.clear();
        for px in canvas.data().chunks_exact(4) {
            assert_eq!(px, [10, 20, 30, 255]);
        }
    }

    #[test]
    fn translucent_blit_blends_over_background() {
        let mut canvas = KeyCanvas::new(4, 4, Color::BLACK).unwrap();
        // Premultiplied half-transparent white.
        let mut tile = Pixmap::new(2, 2).unwrap();
        tile.fill(Color::from_rgba(0.5, 0.5, 0.5, 0.5).unwrap());
        canvas.blit(&tile, (2.0, 2.0));
        let px = pixel(&canvas, 2, 2);
        // Premultiplied 0.5 * 0.5 source channel over black stays ~64.
        assert!(px[0] > 50 && px[0] < 80, "blended value, got {:?}", px);
        assert_eq!(px[3], 255);
    }
}
