// src/pattern/binding.rs
//
// Association of a sequencer module to a current pattern and, optionally,
// a chain driving progression.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequencerBinding {
    /// Empty string if unbound.
    pub pattern_name: String,

    /// Empty string if no chain drives this sequencer.
    pub chain_name: String,

    pub chain_enabled: bool,
}

impl SequencerBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pattern(&self) -> bool {
        !self.pattern_name.is_empty()
    }

    pub fn has_chain(&self) -> bool {
        !self.chain_name.is_empty()
    }
}
