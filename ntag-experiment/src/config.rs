use std::path::{Path, PathBuf};

use ntag_core::layout::{LayoutSpec, Monitor};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Everything a condition run needs that is not decided by the condition
/// itself. Compiled-in defaults cover the lab setup; a JSON file can
/// override any subset of fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub monitor: Monitor,
    pub layout: LayoutSpec,
    /// Window background, RGB.
    pub background: [u8; 3],
    pub n_trials: usize,
    pub cue_secs: f32,
    pub trial_secs: f32,
    pub highlight_secs: f32,
    /// Nominal display refresh rate; duration-to-frame conversion uses it.
    pub frame_rate_hz: u32,
    /// Rate the codes are defined at; frames repeat by the ratio.
    pub presentation_rate_hz: u32,
    pub image_dir: PathBuf,
    pub font_path: PathBuf,
    pub log_dir: PathBuf,
    /// Whether to stream markers; off means the null sink.
    pub stream: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            monitor: Monitor {
                size_px: (2560, 1440),
                width_cm: 53.0,
                distance_cm: 50.0,
            },
            layout: LayoutSpec::default(),
            background: [0, 0, 0],
            n_trials: 30,
            cue_secs: 0.8,
            trial_secs: 4.2,
            highlight_secs: 5.0,
            frame_rate_hz: 60,
            presentation_rate_hz: 60,
            image_dir: PathBuf::from("images"),
            font_path: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"),
            log_dir: PathBuf::from("logs"),
            stream: true,
        }
    }
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let body = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&body).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Frames covering `secs` at the nominal refresh rate. Computed in f64
    /// so 4.2 s at 60 Hz is 252 frames, not 251.
    pub fn frames_for(&self, secs: f32) -> usize {
        (secs as f64 * self.frame_rate_hz as f64).round() as usize
    }

    /// How many frames each code element spans.
    pub fn upsample_factor(&self) -> usize {
        ((self.frame_rate_hz / self.presentation_rate_hz) as usize).max(1)
    }
}
