// src/pattern/step.rs
//
// One row of a pattern.
//
// The direct fields are authoritative for their names; `parameters` never
// stores a key that shadows one of them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Names reserved for the fixed fields; never stored in `Step::parameters`.
pub const RESERVED_KEYS: &[&str] = &["index", "length", "note", "chance", "ratio", "ratioA", "ratioB"];

#[inline]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_KEYS.contains(&name)
}

/// One row of a pattern grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// `-1` means rest (no trigger).
    pub index: i32,

    /// Step duration in steps, `1..16`.
    pub length: i32,

    /// `-1` means unset.
    pub note: i32,

    /// Probability of firing, `0..100`.
    pub chance: i32,

    /// Ratio-gate numerator, clamped to `1..16`.
    pub ratio_a: i32,

    /// Ratio-gate denominator, clamped to `1..16`.
    pub ratio_b: i32,

    /// Module-addressed parameters, keyed by name. Never contains a
    /// [`RESERVED_KEYS`] entry.
    #[serde(default)]
    pub parameters: HashMap<String, f32>,
}

impl Default for Step {
    fn default() -> Self {
        Self {
            index: -1,
            length: 1,
            note: -1,
            chance: 100,
            ratio_a: 1,
            ratio_b: 1,
            parameters: HashMap::new(),
        }
    }
}

impl Step {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a module parameter. Silently ignored (not an error, matching
    /// the pack's general "no-op and log" style for obviously-wrong but
    /// non-catastrophic input) if `name` collides with a reserved field.
    pub fn set_parameter(&mut self, name: &str, value: f32) {
        if is_reserved(name) {
            log::warn!("step parameter '{name}' shadows a reserved field, ignoring");
            return;
        }
        self.parameters.insert(name.to_string(), value);
    }

    pub fn parameter(&self, name: &str) -> Option<f32> {
        self.parameters.get(name).copied()
    }

    #[inline]
    pub fn has_trigger(&self) -> bool {
        self.index >= 0
    }

    /// Fields clamped to their documented ranges.
    pub fn clamped(mut self) -> Self {
        self.length = self.length.clamp(1, 16);
        self.chance = self.chance.clamp(0, 100);
        self.ratio_a = self.ratio_a.clamp(1, 16);
        self.ratio_b = self.ratio_b.clamp(1, 16);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_keys_are_rejected() {
        let mut step = Step::new();
        step.set_parameter("chance", 5.0);
        assert!(step.parameters.is_empty());
    }

    #[test]
    fn round_trips_through_json() {
        let mut step = Step::new();
        step.index = 5;
        step.set_parameter("cutoff", 0.5);
        let json = serde_json::to_string(&step).unwrap();
        let back: Step = serde_json::from_str(&json).unwrap();
        assert_eq!(step, back);
    }

    #[test]
    fn clamped_enforces_ranges() {
        let mut step = Step::new();
        step.chance = 500;
        step.ratio_a = 0;
        step.ratio_b = 99;
        let step = step.clamped();
        assert_eq!(step.chance, 100);
        assert_eq!(step.ratio_a, 1);
        assert_eq!(step.ratio_b, 16);
    }
}
