use std::path::PathBuf;

use anyhow::{Result, bail};
use ntag_analysis::histogram::CHANNEL_NAMES;
use ntag_analysis::{ContrastReport, write_histogram_csv};

const USAGE: &str = "\
contrast [--csv] <IMAGE>...
  Prints per-channel min/max/contrast for each image.
  --csv also writes <image>_histogram.csv next to each image.";

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut csv = false;
    let mut paths: Vec<PathBuf> = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--csv" => csv = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            _ => paths.push(arg.into()),
        }
    }
    if paths.is_empty() {
        bail!("no images given\n{USAGE}");
    }

    for path in &paths {
        let report = ContrastReport::from_path(path)?;
        println!("{}", path.display());
        for (name, stats) in CHANNEL_NAMES.iter().zip(report.stats.iter()) {
            println!("  {name}-channel: {stats}");
        }
        if csv {
            let stem = path.with_extension("");
            let out = PathBuf::from(format!("{}_histogram.csv", stem.display()));
            write_histogram_csv(&report, &out)?;
            println!("  histogram written to {}", out.display());
        }
    }
    Ok(())
}
