use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("unsupported class count: {0} (supported: 5, 30)")]
    UnsupportedClassCount(usize),
}

/// Key grid of the 5-class condition.
const KEYS_5: &[&[&str]] = &[&["W"], &["A", "S", "D"], &["X"]];

/// Key grid of the 30-class condition.
const KEYS_30: &[&[&str]] = &[
    &["A", "B", "C", "D", "E", "F"],
    &["G", "H", "I", "J", "K", "L"],
    &["M", "N", "O", "P", "Q", "R"],
    &["S", "T", "U", "V", "W", "X"],
    &["Y", "Z", "_", ".", "question", "!"],
];

/// The key grid for a condition's class count, as rows of key names.
/// Names double as tile file stems.
pub fn grid_for_classes(classes: usize) -> Result<&'static [&'static [&'static str]], LayoutError> {
    match classes {
        5 => Ok(KEYS_5),
        30 => Ok(KEYS_30),
        other => Err(LayoutError::UnsupportedClassCount(other)),
    }
}

/// Grid keys flattened in reading order; index positions match the rows of
/// the shifted code set.
pub fn ordered_keys(grid: &'static [&'static [&'static str]]) -> Vec<&'static str> {
    grid.iter().flat_map(|row| row.iter().copied()).collect()
}

/// Every tile label the generator renders, paired with its filesystem-safe
/// file stem. Only `?` and `<` need a slug; the speller grid refers to keys
/// by stem (`question`), never by glyph.
pub const TILE_LABELS: &[(&str, &str)] = &[
    ("A", "A"),
    ("B", "B"),
    ("C", "C"),
    ("D", "D"),
    ("E", "E"),
    ("F", "F"),
    ("G", "G"),
    ("H", "H"),
    ("I", "I"),
    ("J", "J"),
    ("K", "K"),
    ("L", "L"),
    ("M", "M"),
    ("N", "N"),
    ("O", "O"),
    ("P", "P"),
    ("Q", "Q"),
    ("R", "R"),
    ("S", "S"),
    ("T", "T"),
    ("U", "U"),
    ("V", "V"),
    ("W", "W"),
    ("X", "X"),
    ("Y", "Y"),
    ("Z", "Z"),
    ("_", "_"),
    (".", "."),
    ("?", "question"),
    ("!", "!"),
    ("<", "back"),
    ("#", "#"),
    ("1", "1"),
    ("2", "2"),
    ("3", "3"),
    ("4", "4"),
    ("5", "5"),
    ("6", "6"),
    ("7", "7"),
    ("8", "8"),
    ("9", "9"),
    ("0", "0"),
];

/// Glyph drawn on a key's tiles, looked up by key name.
pub fn glyph_for(stem: &str) -> &str {
    TILE_LABELS
        .iter()
        .find(|(_, s)| *s == stem)
        .map(|(glyph, _)| *glyph)
        .unwrap_or(stem)
}

/// Physical display description; converts between degrees of visual angle
/// and pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Monitor {
    /// Resolution in pixels.
    pub size_px: (u32, u32),
    /// Physical width of the display surface in centimeters.
    pub width_cm: f32,
    /// Viewing distance in centimeters.
    pub distance_cm: f32,
}

impl Monitor {
    /// Pixels spanned by one degree of visual angle at the configured
    /// viewing distance.
    pub fn pixels_per_degree(&self) -> f32 {
        let px_per_cm = self.size_px.0 as f32 / self.width_cm;
        let cm_per_degree = self.distance_cm * 1.0_f32.to_radians().tan();
        px_per_cm * cm_per_degree
    }
}

/// Keyboard geometry in degrees of visual angle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LayoutSpec {
    pub key_width_deg: f32,
    pub key_height_deg: f32,
    pub key_space_deg: f32,
    pub stt_width_deg: f32,
    pub stt_height_deg: f32,
    pub text_field_height_deg: f32,
}

impl Default for LayoutSpec {
    fn default() -> Self {
        Self {
            key_width_deg: 3.75,
            key_height_deg: 3.75,
            key_space_deg: 1.0,
            stt_width_deg: 2.2,
            stt_height_deg: 2.2,
            text_field_height_deg: 5.0,
        }
    }
}

/// A key's on-screen footprint. Coordinates are window-centered with y up,
/// as the layout math is symmetric around the screen center; use
/// [`KeyPlacement::top_left_px`] for raster coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPlacement {
    pub name: String,
    pub size_px: (f32, f32),
    pub center: (f32, f32),
}

impl KeyPlacement {
    /// Top-left corner in raster coordinates (origin top-left, y down).
    pub fn top_left_px(&self, window: (u32, u32)) -> (f32, f32) {
        let x = window.0 as f32 / 2.0 + self.center.0 - self.size_px.0 / 2.0;
        let y = window.1 as f32 / 2.0 - self.center.1 - self.size_px.1 / 2.0;
        (x, y)
    }

    /// Center in raster coordinates.
    pub fn center_px(&self, window: (u32, u32)) -> (f32, f32) {
        (
            window.0 as f32 / 2.0 + self.center.0,
            window.1 as f32 / 2.0 - self.center.1,
        )
    }
}

/// Places the grid keys below the text field, rows centered horizontally.
pub fn place_grid(grid: &[&[&str]], spec: &LayoutSpec, monitor: &Monitor) -> Vec<KeyPlacement> {
    let ppd = monitor.pixels_per_degree();
    let key_w = spec.key_width_deg * ppd;
    let key_h = spec.key_height_deg * ppd;
    let pitch_x = (spec.key_width_deg + spec.key_space_deg) * ppd;
    let pitch_y = (spec.key_height_deg + spec.key_space_deg) * ppd;
    let field_h = spec.text_field_height_deg * ppd;
    let n_rows = grid.len() as f32;

    let mut placements = Vec::new();
    for (y, row) in grid.iter().enumerate() {
        let n_cols = row.len() as f32;
        for (x, name) in row.iter().enumerate() {
            let cx = (x as f32 - n_cols / 2.0 + 0.5) * pitch_x;
            let cy = -(y as f32 - n_rows / 2.0) * pitch_y - field_h;
            placements.push(KeyPlacement {
                name: name.to_string(),
                size_px: (key_w, key_h),
                center: (cx, cy),
            });
        }
    }
    placements
}

/// Places the stimulus timing tracker in the top-left screen corner.
pub fn place_stt(spec: &LayoutSpec, monitor: &Monitor) -> KeyPlacement {
    let ppd = monitor.pixels_per_degree();
    let w = spec.stt_width_deg * ppd;
    let h = spec.stt_height_deg * ppd;
    KeyPlacement {
        name: "stt".to_string(),
        size_px: (w, h),
        center: (
            -(monitor.size_px.0 as f32) / 2.0 + w / 2.0,
            monitor.size_px.1 as f32 / 2.0 - h / 2.0,
        ),
    }
}

/// Places the feedback text field along the top edge, right of the stt.
pub fn place_text_field(spec: &LayoutSpec, monitor: &Monitor) -> KeyPlacement {
    let ppd = monitor.pixels_per_degree();
    let stt_w = spec.stt_width_deg * ppd;
    let field_h = spec.text_field_height_deg * ppd;
    KeyPlacement {
        name: "text".to_string(),
        size_px: (monitor.size_px.0 as f32 - stt_w, field_h),
        center: (stt_w, monitor.size_px.1 as f32 / 2.0 - field_h / 2.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_monitor() -> Monitor {
        Monitor {
            size_px: (1920, 1080),
            width_cm: 53.0,
            distance_cm: 50.0,
        }
    }

    #[test]
    fn grids_match_their_class_counts() {
        assert_eq!(ordered_keys(grid_for_classes(5).unwrap()).len(), 5);
        assert_eq!(ordered_keys(grid_for_classes(30).unwrap()).len(), 30);
        assert_eq!(
            grid_for_classes(12),
            Err(LayoutError::UnsupportedClassCount(12))
        );
    }

    #[test]
    fn ordered_keys_flatten_in_reading_order() {
        let keys = ordered_keys(grid_for_classes(5).unwrap());
        assert_eq!(keys, vec!["W", "A", "S", "D", "X"]);
    }

    #[test]
    fn glyph_slugs_round_trip() {
        assert_eq!(glyph_for("question"), "?");
        assert_eq!(glyph_for("back"), "<");
        assert_eq!(glyph_for("A"), "A");
    }

    #[test]
    fn pixels_per_degree_is_positive_and_sane() {
        let ppd = test_monitor().pixels_per_degree();
        // ~0.87 cm/degree at 50 cm on a 36 px/cm screen.
        assert!(ppd > 20.0 && ppd < 50.0, "ppd = {ppd}");
    }

    #[test]
    fn stt_sits_in_the_top_left_corner() {
        let monitor = test_monitor();
        let stt = place_stt(&LayoutSpec::default(), &monitor);
        let (x, y) = stt.top_left_px(monitor.size_px);
        assert!(x.abs() < 0.5);
        assert!(y.abs() < 0.5);
    }

    #[test]
    fn grid_rows_are_centered() {
        let monitor = test_monitor();
        let placements = place_grid(
            grid_for_classes(5).unwrap(),
            &LayoutSpec::default(),
            &monitor,
        );
        // Single-key rows land on the vertical center line.
        let w = placements.iter().find(|p| p.name == "W").unwrap();
        let x = placements.iter().find(|p| p.name == "X").unwrap();
        assert!(w.center.0.abs() < 0.01);
        assert!(x.center.0.abs() < 0.01);
        // Middle row is symmetric around it.
        let a = placements.iter().find(|p| p.name == "A").unwrap();
        let d = placements.iter().find(|p| p.name == "D").unwrap();
        assert!((a.center.0 + d.center.0).abs() < 0.01);
        assert_eq!(a.center.1, d.center.1);
    }

    #[test]
    fn centered_to_raster_conversion_flips_y() {
        let p = KeyPlacement {
            name: "k".into(),
            size_px: (10.0, 10.0),
            center: (0.0, 100.0),
        };
        let (x, y) = p.top_left_px((200, 200));
        assert_eq!(x, 95.0);
        assert_eq!(y, -5.0);
    }
}
