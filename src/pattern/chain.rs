// src/pattern/chain.rs
//
// Ordered progression of pattern names.
//
// `get_next_pattern` is the single state-mutating progression primitive;
// `peek_next_pattern` must never mutate state. The split mirrors
// PatternRuntime's own two-phase evaluate/apply discipline: Phase 1 peeks,
// Phase 2 (under the exclusive lock) calls the mutating form.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub pattern_name: String,
    pub repeat_count: u32,
    pub disabled: bool,
}

impl ChainEntry {
    pub fn new(pattern_name: impl Into<String>) -> Self {
        Self {
            pattern_name: pattern_name.into(),
            repeat_count: 1,
            disabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternChain {
    pub entries: Vec<ChainEntry>,
    pub enabled: bool,

    current_index: usize,
    current_repeat: u32,
}

impl Default for PatternChain {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            enabled: true,
            current_index: 0,
            current_repeat: 1,
        }
    }
}

impl PatternChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_repeat(&self) -> u32 {
        self.current_repeat
    }

    pub fn add(&mut self, entry: ChainEntry) {
        self.entries.push(entry);
    }

    pub fn remove(&mut self, index: usize) {
        if index < self.entries.len() {
            self.entries.remove(index);
            if self.current_index >= self.entries.len() {
                self.current_index = 0;
                self.current_repeat = 1;
            }
        }
    }

    pub fn set_entry(&mut self, index: usize, entry: ChainEntry) {
        if let Some(slot) = self.entries.get_mut(index) {
            *slot = entry;
        }
    }

    pub fn set_repeat(&mut self, index: usize, repeat_count: u32) {
        if let Some(slot) = self.entries.get_mut(index) {
            slot.repeat_count = repeat_count.max(1);
        }
    }

    pub fn set_entry_disabled(&mut self, index: usize, disabled: bool) {
        if let Some(slot) = self.entries.get_mut(index) {
            slot.disabled = disabled;
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.reset();
    }

    pub fn reset(&mut self) {
        self.current_index = 0;
        self.current_repeat = 1;
    }

    fn any_enabled(&self) -> bool {
        self.entries.iter().any(|e| !e.disabled)
    }

    /// Advance `current_index` to the next non-disabled entry, wrapping.
    /// Returns `None` if every entry is disabled.
    fn advance_index(&self, from: usize) -> Option<usize> {
        if !self.any_enabled() {
            return None;
        }
        let len = self.entries.len();
        let mut next = (from + 1) % len;
        for _ in 0..len {
            if !self.entries[next].disabled {
                return Some(next);
            }
            next = (next + 1) % len;
        }
        None
    }

    /// What `get_next_pattern` would return, without mutating state.
    pub fn peek_next_pattern(&self) -> Option<String> {
        if self.entries.is_empty() || !self.any_enabled() {
            return None;
        }
        let current = &self.entries[self.current_index];
        if !current.disabled && self.current_repeat < current.repeat_count {
            return Some(current.pattern_name.clone());
        }
        let next_index = self.advance_index(self.current_index)?;
        Some(self.entries[next_index].pattern_name.clone())
    }

    /// Authoritative progression: if the current entry's repeat count is not
    /// yet reached, increment the repeat and return the current pattern;
    /// otherwise advance to the next non-disabled entry (wrapping) and reset
    /// the repeat counter to 1. Empty, or fully-disabled, chains return `None`.
    pub fn get_next_pattern(&mut self) -> Option<String> {
        if self.entries.is_empty() || !self.any_enabled() {
            return None;
        }
        let current_disabled = self.entries[self.current_index].disabled;
        let repeat_count = self.entries[self.current_index].repeat_count;
        if !current_disabled && self.current_repeat < repeat_count {
            self.current_repeat += 1;
            return Some(self.entries[self.current_index].pattern_name.clone());
        }
        let next_index = self.advance_index(self.current_index)?;
        self.current_index = next_index;
        self.current_repeat = 1;
        Some(self.entries[next_index].pattern_name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_ab() -> PatternChain {
        let mut chain = PatternChain::new();
        let mut a = ChainEntry::new("A");
        a.repeat_count = 2;
        chain.add(a);
        chain.add(ChainEntry::new("B"));
        chain
    }

    #[test]
    fn scenario_d_chain_switch() {
        let mut chain = chain_ab();
        assert_eq!(chain.get_next_pattern().as_deref(), Some("A")); // repeat 1 -> 2
        assert_eq!(chain.get_next_pattern().as_deref(), Some("B")); // A exhausted, switch
        assert_eq!(chain.current_index(), 1);
    }

    #[test]
    fn peek_does_not_mutate() {
        let mut chain = chain_ab();
        let before = chain.current_index();
        let before_repeat = chain.current_repeat();
        let peeked = chain.peek_next_pattern();
        assert_eq!(chain.current_index(), before);
        assert_eq!(chain.current_repeat(), before_repeat);
        assert_eq!(peeked, chain.peek_next_pattern());
    }

    #[test]
    fn empty_chain_returns_none() {
        let mut chain = PatternChain::new();
        assert_eq!(chain.get_next_pattern(), None);
        assert_eq!(chain.peek_next_pattern(), None);
    }

    #[test]
    fn all_disabled_returns_none() {
        let mut chain = chain_ab();
        chain.set_entry_disabled(0, true);
        chain.set_entry_disabled(1, true);
        assert_eq!(chain.get_next_pattern(), None);
    }

    #[test]
    fn skips_disabled_entries_when_advancing() {
        let mut chain = PatternChain::new();
        chain.add(ChainEntry::new("A"));
        let mut b = ChainEntry::new("B");
        b.disabled = true;
        chain.add(b);
        chain.add(ChainEntry::new("C"));
        assert_eq!(chain.get_next_pattern().as_deref(), Some("C"));
    }
}
