pub mod stream;

pub use stream::{CsvMarkerStream, MarkerError, MarkerSink, NullSink, open_sink};
