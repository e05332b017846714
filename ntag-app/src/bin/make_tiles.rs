use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use ntag_render::tile::TileStyle;
use ntag_render::{TileSetSpec, generate_tile_set, load_font};
use tracing::info;

const USAGE: &str = "\
make_tiles [options]
  -o, --out <DIR>     output directory (default: images)
  -f, --font <PATH>   ttf/otf font for the key labels
  -s, --size <PX>     tile edge length in pixels (default: 150)
  -h, --help          show this help";

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut out_dir = PathBuf::from("images");
    let mut font_path = PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf");
    let mut size = 150u32;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" | "--out" => out_dir = args.next().context("--out needs a path")?.into(),
            "-f" | "--font" => font_path = args.next().context("--font needs a path")?.into(),
            "-s" | "--size" => {
                size = args
                    .next()
                    .context("--size needs a number")?
                    .parse()
                    .context("--size must be an integer")?;
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            other => bail!("unknown argument '{other}'\n{USAGE}"),
        }
    }

    let font = load_font(&font_path)?;
    let mut spec = TileSetSpec::full();
    spec.style = TileStyle {
        size,
        ..TileStyle::default()
    };

    let written = generate_tile_set(&out_dir, &spec, &font)?;
    info!(
        count = written.len(),
        dir = %out_dir.display(),
        "tile set written"
    );
    Ok(())
}
