pub mod code;
pub mod layout;

pub use code::{CodeError, CodeSequence, CodeTable, m_sequence, shift_set, stt_sequence, upsample};
pub use layout::{KeyPlacement, LayoutError, LayoutSpec, Monitor, grid_for_classes};
