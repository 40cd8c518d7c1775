// src/pattern/pattern.rs
//
// Pure-data step grid. Mutation requires external synchronisation when the
// pattern is shared — PatternRuntime is what provides that synchronisation
// for patterns registered with it; a bare `Pattern` has no locking of its own.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::pattern::column::{ColumnCategory, ColumnConfig, trigger_columns};
use crate::pattern::step::Step;

/// Ordered grid of steps with a column schema and a playback-direction
/// steps-per-beat value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    steps: Vec<Step>,

    /// Steps hidden when the grid shrinks via `set_step_count`, restored in
    /// original order when it grows back.
    #[serde(default)]
    overflow: Vec<Step>,

    columns: Vec<ColumnConfig>,

    /// In `[-96, 96]`, excluding `0`. Negative plays the pattern in reverse.
    steps_per_beat: f32,
}

impl Pattern {
    /// Creates a pattern with `step_count` steps (clamped to `1..=256`,
    /// matching the grid's practical size) and the two mandatory trigger
    /// columns plus a `note` column.
    pub fn new(step_count: usize, steps_per_beat: f32) -> EngineResult<Self> {
        if steps_per_beat == 0.0 || !(-96.0..=96.0).contains(&steps_per_beat) {
            return Err(EngineError::InvalidArgument(format!(
                "stepsPerBeat {steps_per_beat} out of range [-96,96]\\{{0}}"
            )));
        }
        let step_count = step_count.max(1);
        let mut columns = trigger_columns();
        columns.push(ColumnConfig::new("note", ColumnCategory::Trigger, 2));
        Ok(Self {
            steps: vec![Step::new(); step_count],
            overflow: Vec::new(),
            columns,
            steps_per_beat,
        })
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn steps_per_beat(&self) -> f32 {
        self.steps_per_beat
    }

    pub fn set_steps_per_beat(&mut self, value: f32) -> EngineResult<()> {
        if value == 0.0 || !(-96.0..=96.0).contains(&value) {
            return Err(EngineError::InvalidArgument(format!(
                "stepsPerBeat {value} out of range [-96,96]\\{{0}}"
            )));
        }
        self.steps_per_beat = value;
        Ok(())
    }

    pub fn columns(&self) -> &[ColumnConfig] {
        &self.columns
    }

    pub fn get_step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn set_step(&mut self, index: usize, step: Step) -> EngineResult<()> {
        let slot = self
            .steps
            .get_mut(index)
            .ok_or_else(|| EngineError::OutOfBounds(format!("step index {index}")))?;
        *slot = step.clamped();
        Ok(())
    }

    /// Resets every step to its default value; step count and columns are unchanged.
    pub fn clear(&mut self) {
        for step in &mut self.steps {
            *step = Step::new();
        }
    }

    /// Shrinking moves the trailing steps to the overflow buffer in order;
    /// growing restores them first, padding any remainder with defaults.
    pub fn set_step_count(&mut self, count: usize) {
        let count = count.max(1);
        match count.cmp(&self.steps.len()) {
            std::cmp::Ordering::Less => {
                let tail = self.steps.split_off(count);
                self.overflow.splice(0..0, tail);
            }
            std::cmp::Ordering::Greater => {
                let needed = count - self.steps.len();
                let take = needed.min(self.overflow.len());
                let restored: Vec<Step> = self.overflow.drain(0..take).collect();
                self.steps.extend(restored);
                while self.steps.len() < count {
                    self.steps.push(Step::new());
                }
            }
            std::cmp::Ordering::Equal => {}
        }
    }

    /// Doubles the step count by duplicating the existing pattern after itself.
    pub fn double_steps(&mut self) {
        let doubled: Vec<Step> = self.steps.clone();
        self.steps.extend(doubled);
    }

    /// Copies `[from, to]` into steps starting at `dest`. Rejects an inverted
    /// range or an out-of-bounds destination; tolerates source/dest overlap
    /// via an intermediate buffer.
    pub fn duplicate_range(&mut self, from: usize, to: usize, dest: usize) -> EngineResult<()> {
        if from > to {
            return Err(EngineError::InvalidArgument(format!(
                "inverted range [{from},{to}]"
            )));
        }
        if to >= self.steps.len() {
            return Err(EngineError::OutOfBounds(format!("range end {to}")));
        }
        let len = to - from + 1;
        if dest + len > self.steps.len() {
            return Err(EngineError::OutOfBounds(format!(
                "destination {dest} with length {len} exceeds pattern"
            )));
        }
        let buffer: Vec<Step> = self.steps[from..=to].to_vec();
        self.steps[dest..dest + len].clone_from_slice(&buffer);
        Ok(())
    }

    pub fn add_column(&mut self, column: ColumnConfig) {
        self.columns.push(column);
        self.renumber_columns();
    }

    /// Refuses to remove a required column, and refuses to remove the last
    /// `index`/`note` column. Step parameter values for the removed column
    /// are preserved in `Step::parameters` so re-adding restores them.
    pub fn remove_column(&mut self, name: &str) -> EngineResult<()> {
        let column = self
            .columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| EngineError::NotFound(format!("column '{name}'")))?;
        if column.required {
            return Err(EngineError::PreconditionFailed(format!(
                "column '{name}' is required"
            )));
        }
        if (name == "index" || name == "note")
            && self
                .columns
                .iter()
                .filter(|c| c.name == "index" || c.name == "note")
                .count()
                <= 1
        {
            return Err(EngineError::PreconditionFailed(
                "cannot remove the last index/note column".into(),
            ));
        }
        self.columns.retain(|c| c.name != name);
        self.renumber_columns();
        Ok(())
    }

    pub fn reorder_column(&mut self, name: &str, new_order: u32) -> EngineResult<()> {
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| EngineError::NotFound(format!("column '{name}'")))?;
        column.display_order = new_order;
        self.renumber_columns();
        Ok(())
    }

    /// Swaps the values stored under two parameter column names across every
    /// step. Never deletes step values — only the grid's visibility of them
    /// changes via column order.
    pub fn swap_column_parameter(&mut self, a: &str, b: &str) {
        for step in &mut self.steps {
            let av = step.parameters.remove(a);
            let bv = step.parameters.remove(b);
            if let Some(v) = bv {
                step.parameters.insert(a.to_string(), v);
            }
            if let Some(v) = av {
                step.parameters.insert(b.to_string(), v);
            }
        }
    }

    /// Re-maps `display_order` to a contiguous `0..K-1` permutation,
    /// preserving relative order.
    fn renumber_columns(&mut self) {
        let mut indices: Vec<usize> = (0..self.columns.len()).collect();
        indices.sort_by_key(|&i| self.columns[i].display_order);
        for (order, &i) in indices.iter().enumerate() {
            self.columns[i].display_order = order as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_steps_per_beat() {
        assert!(Pattern::new(4, 0.0).is_err());
    }

    #[test]
    fn set_step_count_round_trip_restores_overflow_in_order() {
        let mut pattern = Pattern::new(8, 4.0).unwrap();
        for i in 0..8 {
            let mut step = Step::new();
            step.index = i as i32;
            pattern.set_step(i, step).unwrap();
        }
        pattern.set_step_count(4);
        assert_eq!(pattern.step_count(), 4);
        pattern.set_step_count(8);
        assert_eq!(pattern.step_count(), 8);
        for i in 0..8 {
            assert_eq!(pattern.get_step(i).unwrap().index, i as i32);
        }
    }

    #[test]
    fn duplicate_range_identity_when_dest_equals_from() {
        let mut pattern = Pattern::new(8, 4.0).unwrap();
        let mut step = Step::new();
        step.index = 3;
        pattern.set_step(2, step).unwrap();
        let before = pattern.clone();
        pattern.duplicate_range(0, 3, 0).unwrap();
        assert_eq!(pattern.get_step(2), before.get_step(2));
    }

    #[test]
    fn duplicate_range_rejects_inverted_or_oob() {
        let mut pattern = Pattern::new(8, 4.0).unwrap();
        assert!(pattern.duplicate_range(3, 1, 0).is_err());
        assert!(pattern.duplicate_range(0, 10, 0).is_err());
        assert!(pattern.duplicate_range(0, 3, 7).is_err());
    }

    #[test]
    fn remove_column_refuses_required_columns() {
        let mut pattern = Pattern::new(4, 4.0).unwrap();
        assert!(pattern.remove_column("index").is_err());
        assert!(pattern.remove_column("length").is_err());
    }

    #[test]
    fn remove_column_refuses_only_the_last_index_note_column() {
        let mut pattern = Pattern::new(4, 4.0).unwrap();
        // "note" is not required, but it is the only other index/note-category
        // column besides "index" itself, so removing it would leave the grid
        // with no note column at all — still fine, since "index" remains.
        assert!(pattern.remove_column("note").is_ok());

        // Now add a second note-like column back; with two such columns
        // present, removing one more should still succeed...
        pattern.add_column(ColumnConfig::new("note", ColumnCategory::Trigger, 3));
        assert!(pattern.remove_column("note").is_ok());

        // ...but once only "index" remains, removing it is refused by the
        // required-column guard, and there is no other index/note column to
        // remove instead.
        assert!(pattern.remove_column("index").is_err());
    }

    #[test]
    fn swap_column_parameter_preserves_values() {
        let mut pattern = Pattern::new(2, 4.0).unwrap();
        let mut step = Step::new();
        step.set_parameter("cutoff", 0.5);
        pattern.set_step(0, step).unwrap();
        pattern.swap_column_parameter("cutoff", "resonance");
        assert_eq!(pattern.get_step(0).unwrap().parameter("resonance"), Some(0.5));
        assert_eq!(pattern.get_step(0).unwrap().parameter("cutoff"), None);
    }

    #[test]
    fn round_trips_through_json() {
        let pattern = Pattern::new(4, 4.0).unwrap();
        let json = serde_json::to_string(&pattern).unwrap();
        let back: Pattern = serde_json::from_str(&json).unwrap();
        assert_eq!(pattern.step_count(), back.step_count());
    }
}
