use std::fmt;
use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to open image {path}: {source}")]
    Open {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("image has no pixels")]
    EmptyImage,
    #[error("failed to write histogram csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 256-bin intensity histogram of one color channel.
#[derive(Debug, Clone)]
pub struct ChannelHistogram {
    pub bins: Box<[u32; 256]>,
}

impl ChannelHistogram {
    fn from_samples(samples: impl Iterator<Item = u8>) -> Self {
        let mut bins = Box::new([0u32; 256]);
        for v in samples {
            bins[v as usize] += 1;
        }
        Self { bins }
    }

    /// Total sample count; equals the image's pixel count.
    pub fn total(&self) -> u64 {
        self.bins.iter().map(|&b| b as u64).sum()
    }

    /// Min/max/contrast reduction over the histogram.
    pub fn stats(&self) -> Result<ChannelStats, AnalysisError> {
        let min = self
            .bins
            .iter()
            .position(|&b| b > 0)
            .ok_or(AnalysisError::EmptyImage)?;
        let max = self
            .bins
            .iter()
            .rposition(|&b| b > 0)
            .ok_or(AnalysisError::EmptyImage)?;
        Ok(ChannelStats::from_extrema(min as u8, max as u8))
    }
}

/// Per-channel contrast figures: `contrast = (max - min) / 255 * 100`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    pub min: u8,
    pub max: u8,
    pub contrast_range: u8,
    pub contrast_percentage: f64,
}

impl ChannelStats {
    fn from_extrema(min: u8, max: u8) -> Self {
        let contrast_range = max - min;
        Self {
            min,
            max,
            contrast_range,
            contrast_percentage: contrast_range as f64 / 255.0 * 100.0,
        }
    }
}

impl fmt::Display for ChannelStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min={}, max={}, contrast={:.1}%",
            self.min, self.max, self.contrast_percentage
        )
    }
}

/// Histograms and stats for all three channels of an image.
#[derive(Debug, Clone)]
pub struct ContrastReport {
    pub histograms: [ChannelHistogram; 3],
    pub stats: [ChannelStats; 3],
}

pub const CHANNEL_NAMES: [&str; 3] = ["R", "G", "B"];

impl ContrastReport {
    pub fn from_image(img: &RgbImage) -> Result<Self, AnalysisError> {
        if img.width() == 0 || img.height() == 0 {
            return Err(AnalysisError::EmptyImage);
        }
        let histograms = [0usize, 1, 2]
            .map(|c| ChannelHistogram::from_samples(img.pixels().map(move |p| p.0[c])));
        let stats = [
            histograms[0].stats()?,
            histograms[1].stats()?,
            histograms[2].stats()?,
        ];
        Ok(Self { histograms, stats })
    }

    pub fn from_path(path: &Path) -> Result<Self, AnalysisError> {
        let img = image::open(path)
            .map_err(|source| AnalysisError::Open {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgb8();
        Self::from_image(&img)
    }
}

/// Writes the three histograms side by side: `bin,R,G,B`.
pub fn write_histogram_csv(report: &ContrastReport, path: &Path) -> Result<(), AnalysisError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["bin", "R", "G", "B"])?;
    for bin in 0..256usize {
        writer.write_record([
            bin.to_string(),
            report.histograms[0].bins[bin].to_string(),
            report.histograms[1].bins[bin].to_string(),
            report.histograms[2].bins[bin].to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
