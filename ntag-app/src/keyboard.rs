use std::collections::HashMap;
use std::path::Path;

use ab_glyph::FontVec;
use anyhow::{Context, Result, bail};
use ntag_core::layout::KeyPlacement;
use ntag_render::{KeyCanvas, load_tile, render_label};
use tiny_skia::{Color, Pixmap};

struct Key {
    center_px: (f32, f32),
    variants: Vec<Pixmap>,
}

struct TextField {
    center_px: (f32, f32),
    size_px: (f32, f32),
    text: String,
    rendered: Option<Pixmap>,
}

/// The visual half of the speller: named keys with their pre-rendered,
/// pre-scaled image variants, a feedback text field, and the composition
/// canvas. Immutable once a run starts; the session decides per frame
/// which variant each key shows.
pub struct Keyboard {
    canvas: KeyCanvas,
    keys: HashMap<String, Key>,
    field: Option<TextField>,
    font: FontVec,
    window_px: (u32, u32),
}

impl Keyboard {
    pub fn new(window_px: (u32, u32), background: [u8; 3], font: FontVec) -> Result<Self> {
        let canvas = KeyCanvas::new(
            window_px.0,
            window_px.1,
            Color::from_rgba8(background[0], background[1], background[2], 255),
        )
        .context("window has zero area")?;
        Ok(Self {
            canvas,
            keys: HashMap::new(),
            field: None,
            font,
            window_px,
        })
    }

    /// Loads a key's image variants, scaled to its on-screen size. The
    /// variant order must match the code states that will drive the key.
    pub fn add_key(
        &mut self,
        placement: &KeyPlacement,
        image_dir: &Path,
        variant_files: &[String],
    ) -> Result<()> {
        if self.keys.contains_key(&placement.name) {
            bail!("key '{}' already exists", placement.name);
        }
        let (w, h) = (
            placement.size_px.0.round() as u32,
            placement.size_px.1.round() as u32,
        );
        let mut variants = Vec::with_capacity(variant_files.len());
        for file in variant_files {
            let path = image_dir.join(file);
            let tile = load_tile(&path, w, h)
                .with_context(|| format!("loading tile {} for key '{}'", path.display(), placement.name))?;
            variants.push(tile);
        }
        self.keys.insert(
            placement.name.clone(),
            Key {
                center_px: placement.center_px(self.window_px),
                variants,
            },
        );
        Ok(())
    }

    pub fn add_text_field(&mut self, placement: &KeyPlacement) {
        self.field = Some(TextField {
            center_px: placement.center_px(self.window_px),
            size_px: placement.size_px,
            text: String::new(),
            rendered: None,
        });
    }

    /// Re-renders the feedback line; the next composed frame shows it.
    /// Unchanged text keeps its cached pixmap.
    pub fn set_field_text(&mut self, text: &str) {
        let Some(field) = self.field.as_mut() else {
            return;
        };
        if field.text == text {
            return;
        }
        field.text = text.to_string();
        field.rendered = if text.is_empty() {
            None
        } else {
            let letter_px = field.size_px.1 * 0.5;
            Some(render_label(
                text,
                letter_px,
                &self.font,
                Color::from_rgba8(255, 255, 255, 255),
            ))
        };
    }

    /// Image variants a key has, for code-table validation.
    pub fn variant_count(&self, name: &str) -> Option<usize> {
        self.keys.get(name).map(|k| k.variants.len())
    }

    /// Composes one frame: every planned key at its planned variant, plus
    /// the text field, over the background. Returns the premultiplied RGBA
    /// bytes to copy into the surface.
    pub fn compose(&mut self, plan: &[(&str, u8)]) -> Result<&[u8]> {
        self.canvas.clear();
        for &(name, variant) in plan {
            let key = self
                .keys
                .get(name)
                .with_context(|| format!("frame plan names unknown key '{name}'"))?;
            let tile = key
                .variants
                .get(variant as usize)
                .with_context(|| format!("key '{name}' has no variant {variant}"))?;
            self.canvas.blit(tile, key.center_px);
        }
        if let Some(field) = &self.field {
            if let Some(text) = &field.rendered {
                // Left-aligned within the field.
                let center = (
                    field.center_px.0 - field.size_px.0 / 2.0 + text.width() as f32 / 2.0,
                    field.center_px.1,
                );
                self.canvas.blit(text, center);
            }
        }
        Ok(self.canvas.data())
    }
}
