use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use thiserror::Error;

/// Base name of the speller's marker stream; a per-run numeric postfix is
/// appended to disambiguate consecutive condition runs.
pub const KEYBOARD_STREAM: &str = "KeyboardMarkerStream";

#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("failed to open marker stream at {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to append marker: {0}")]
    Append(#[from] csv::Error),
}

/// Destination for single-sample string markers. Markers are timestamped
/// at push time so a downstream consumer can align them with recorded
/// signals.
pub trait MarkerSink {
    fn push(&mut self, marker: &str) -> Result<(), MarkerError>;
    fn name(&self) -> &str;
}

/// Append-only timestamped marker log, one CSV file per stream.
pub struct CsvMarkerStream {
    name: String,
    writer: csv::Writer<fs::File>,
}

impl CsvMarkerStream {
    /// Creates `{dir}/{base}{postfix}.csv` and writes the header row.
    pub fn create(dir: &Path, base: &str, postfix: &str) -> Result<Self, MarkerError> {
        let name = format!("{base}{postfix}");
        let path = dir.join(format!("{name}.csv"));
        fs::create_dir_all(dir).map_err(|source| MarkerError::Open {
            path: path.clone(),
            source,
        })?;
        let file = fs::File::create(&path).map_err(|source| MarkerError::Open {
            path: path.clone(),
            source,
        })?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(["time_utc", "marker"])?;
        writer.flush().map_err(csv::Error::from)?;
        Ok(Self { name, writer })
    }
}

impl MarkerSink for CsvMarkerStream {
    fn push(&mut self, marker: &str) -> Result<(), MarkerError> {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        self.writer.write_record([stamp.as_str(), marker])?;
        self.writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Sink used when streaming is disabled; swallows every marker.
#[derive(Debug, Default)]
pub struct NullSink;

impl MarkerSink for NullSink {
    fn push(&mut self, _marker: &str) -> Result<(), MarkerError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// The sink for a run: a CSV stream under `dir` when `stream` is set,
/// otherwise the null sink.
pub fn open_sink(
    stream: bool,
    dir: &Path,
    postfix: &str,
) -> Result<Box<dyn MarkerSink>, MarkerError> {
    if stream {
        Ok(Box::new(CsvMarkerStream::create(
            dir,
            KEYBOARD_STREAM,
            postfix,
        )?))
    } else {
        Ok(Box::new(NullSink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ntag-marker-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn stream_name_carries_postfix() {
        let dir = temp_dir("name");
        let sink = CsvMarkerStream::create(&dir, KEYBOARD_STREAM, "3").unwrap();
        assert_eq!(sink.name(), "KeyboardMarkerStream3");
        assert!(dir.join("KeyboardMarkerStream3.csv").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn pushed_markers_append_in_order() {
        let dir = temp_dir("order");
        let mut sink = CsvMarkerStream::create(&dir, KEYBOARD_STREAM, "1").unwrap();
        sink.push("start_run").unwrap();
        sink.push("start_trial;trial=0").unwrap();
        sink.push("stop_run").unwrap();
        drop(sink);

        let body = fs::read_to_string(dir.join("KeyboardMarkerStream1.csv")).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "time_utc,marker");
        assert!(lines[1].ends_with(",start_run"));
        assert!(lines[2].ends_with(",start_trial;trial=0"));
        assert!(lines[3].ends_with(",stop_run"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn null_sink_accepts_everything() {
        let mut sink = NullSink;
        assert!(sink.push("anything").is_ok());
    }
}
