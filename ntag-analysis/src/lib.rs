pub mod histogram;

pub use histogram::{
    AnalysisError, ChannelHistogram, ChannelStats, ContrastReport, write_histogram_csv,
};
