pub mod clock;

pub use clock::{FrameClock, MonotonicClock, RefreshStats};
