pub mod condition;
pub mod config;
pub mod session;

pub use condition::{Condition, ConditionError, ImageSet, schedule_for};
pub use config::{ConfigError, SessionConfig};
pub use session::{FrameCount, SegmentKind, SessionError, SessionState, SpellerSession};
