pub mod canvas;
pub mod text;
pub mod tile;

pub use canvas::KeyCanvas;
pub use text::{RenderError, load_font, render_label};
pub use tile::{TileFace, TileSetSpec, TileStyle, generate_tile_set, load_tile, save_png};
