// src/pattern/mod.rs

pub mod binding;
pub mod chain;
pub mod column;
pub mod pattern;
pub mod playback;
pub mod runtime;
pub mod step;

pub use binding::SequencerBinding;
pub use chain::{ChainEntry, PatternChain};
pub use column::{ColumnCategory, ColumnConfig};
pub use pattern::Pattern;
pub use playback::PatternPlaybackState;
pub use runtime::{PatternRuntime, TriggerEvent};
pub use step::Step;
