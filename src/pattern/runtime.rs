// src/pattern/runtime.rs
//
// The central real-time component: owns patterns, chains, playback states,
// and sequencer bindings; evaluates on every audio buffer and emits the
// trigger stream.
//
// Locking: one RwLock protects map membership (insert/remove of patterns,
// chains, bindings, playback states). Once a playback state exists, its
// per-buffer scheduling fields are mutated through its own uncontended
// Mutex so Phase 1 only needs a shared lock on the outer maps — the audio
// thread is the sole writer of any given playback state in practice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::pattern::binding::SequencerBinding;
use crate::pattern::chain::{ChainEntry, PatternChain};
use crate::pattern::column::ColumnConfig;
use crate::pattern::pattern::Pattern;
use crate::pattern::playback::PatternPlaybackState;
use crate::pattern::step::{is_reserved, Step};

/// Emitted when a step fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub pattern_name: String,
    pub step: i32,
    pub duration: f32,
    pub parameters: HashMap<String, f32>,
}

type TriggerObserver = Box<dyn Fn(&TriggerEvent) + Send + Sync>;
type BindingObserver = Box<dyn Fn(&str) + Send + Sync>;
type PatternDeletedObserver = Box<dyn Fn(&str) + Send + Sync>;

struct Inner {
    patterns: HashMap<String, Pattern>,
    chains: HashMap<String, PatternChain>,
    bindings: HashMap<String, SequencerBinding>,
    playback_states: HashMap<String, Mutex<PatternPlaybackState>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            patterns: HashMap::new(),
            chains: HashMap::new(),
            bindings: HashMap::new(),
            playback_states: HashMap::new(),
        }
    }
}

enum DeferredKind {
    Switch { new_pattern: String },
    Repeat,
}

struct Deferred {
    sequencer: String,
    old_pattern: String,
    kind: DeferredKind,
}

pub struct PatternRuntime {
    inner: RwLock<Inner>,
    rng: Mutex<ChaCha8Rng>,
    pattern_counter: AtomicU64,
    chain_counter: AtomicU64,
    trigger_observers: Mutex<Vec<TriggerObserver>>,
    binding_observers: Mutex<Vec<BindingObserver>>,
    pattern_deleted_observers: Mutex<Vec<PatternDeletedObserver>>,
}

impl Default for PatternRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternRuntime {
    pub fn new() -> Self {
        Self::with_seed(0xA5F3_1C2D_9E77_B001)
    }

    /// Deterministic constructor for reproducible chance-gate draws in tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            inner: RwLock::new(Inner::new()),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            pattern_counter: AtomicU64::new(0),
            chain_counter: AtomicU64::new(0),
            trigger_observers: Mutex::new(Vec::new()),
            binding_observers: Mutex::new(Vec::new()),
            pattern_deleted_observers: Mutex::new(Vec::new()),
        }
    }

    pub fn on_trigger(&self, f: impl Fn(&TriggerEvent) + Send + Sync + 'static) {
        self.trigger_observers.lock().push(Box::new(f));
    }

    pub fn on_sequencer_binding_changed(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.binding_observers.lock().push(Box::new(f));
    }

    pub fn on_pattern_deleted(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.pattern_deleted_observers.lock().push(Box::new(f));
    }

    fn notify_trigger(&self, event: &TriggerEvent) {
        for f in self.trigger_observers.lock().iter() {
            f(event);
        }
    }

    fn notify_binding_changed(&self, sequencer: &str) {
        for f in self.binding_observers.lock().iter() {
            f(sequencer);
        }
    }

    fn notify_pattern_deleted(&self, pattern_name: &str) {
        for f in self.pattern_deleted_observers.lock().iter() {
            f(pattern_name);
        }
    }

    // ------------------------------------------------------------------
    // Evaluation (audio thread)
    // ------------------------------------------------------------------

    /// Called once per audio buffer. Never blocks on a contended lock in
    /// practice: Phase 1 takes the shared lock, Phase 2 takes the exclusive
    /// lock only when at least one pattern finished this buffer.
    pub fn evaluate(&self, clock: &Clock, n_frames: u32) {
        let (deferred, trigger_events) = self.evaluate_phase1(clock, n_frames);

        for event in &trigger_events {
            self.notify_trigger(event);
        }

        if !deferred.is_empty() {
            self.apply_phase2(clock, deferred);
        }
    }

    fn evaluate_phase1(&self, clock: &Clock, n_frames: u32) -> (Vec<Deferred>, Vec<TriggerEvent>) {
        let mut deferred = Vec::new();
        let mut trigger_events = Vec::new();

        let inner = self.inner.read();

        // Patterns bound to at least one sequencer; others are ignored.
        let bound: Vec<&str> = inner
            .bindings
            .values()
            .filter(|b| b.has_pattern())
            .map(|b| b.pattern_name.as_str())
            .collect();

        for &pattern_name in &bound {
            let Some(pattern) = inner.patterns.get(pattern_name) else {
                continue;
            };
            let Some(state_lock) = inner.playback_states.get(pattern_name) else {
                continue;
            };
            let mut state = state_lock.lock();
            if !state.is_playing || !clock.is_playing() {
                continue;
            }

            let samples_per_step = clock.samples_per_step(pattern.steps_per_beat());
            state.last_bpm = clock.bpm();
            state.sample_accumulator += n_frames as f64;

            let mut finished_this_buffer = false;
            let forward = pattern.steps_per_beat() >= 0.0;
            let step_count = pattern.step_count() as i32;

            while state.sample_accumulator >= samples_per_step as f64 && step_count > 0 {
                state.sample_accumulator -= samples_per_step as f64;

                let next_step = if forward {
                    state.playback_step + 1
                } else {
                    state.playback_step - 1
                };
                let wrapped = next_step.rem_euclid(step_count);
                let wrapped_around = if forward {
                    next_step >= step_count
                } else {
                    next_step < 0
                };
                state.playback_step = wrapped;

                if wrapped_around {
                    state.pattern_cycle_count += 1;
                    finished_this_buffer = true;
                }

                if let Some(step) = pattern.get_step(wrapped as usize) {
                    if let Some(event) = trigger_step(clock, &mut self.rng.lock(), pattern_name, pattern, &mut state, step) {
                        trigger_events.push(event);
                    }
                }
            }

            if finished_this_buffer {
                for (seq_name, binding) in inner.bindings.iter() {
                    if binding.pattern_name != pattern_name || !binding.chain_enabled || !binding.has_chain() {
                        continue;
                    }
                    let Some(chain) = inner.chains.get(&binding.chain_name) else {
                        continue;
                    };
                    let next = chain.peek_next_pattern();
                    match next {
                        Some(ref next_name) if next_name != pattern_name => {
                            deferred.push(Deferred {
                                sequencer: seq_name.clone(),
                                old_pattern: pattern_name.to_string(),
                                kind: DeferredKind::Switch {
                                    new_pattern: next_name.clone(),
                                },
                            });
                        }
                        Some(_) => {
                            deferred.push(Deferred {
                                sequencer: seq_name.clone(),
                                old_pattern: pattern_name.to_string(),
                                kind: DeferredKind::Repeat,
                            });
                        }
                        None => {}
                    }
                }
            }
        }

        (deferred, trigger_events)
    }

    fn apply_phase2(&self, clock: &Clock, deferred: Vec<Deferred>) {
        let mut changed_bindings = Vec::new();

        {
            let mut inner = self.inner.write();
            for record in deferred {
                let Some(chain) = inner.chains.get_mut(
                    &inner
                        .bindings
                        .get(&record.sequencer)
                        .map(|b| b.chain_name.clone())
                        .unwrap_or_default(),
                ) else {
                    continue;
                };
                let advanced = chain.get_next_pattern();

                match record.kind {
                    DeferredKind::Switch { new_pattern } => {
                        let actual = advanced.unwrap_or(new_pattern);
                        if let Some(binding) = inner.bindings.get_mut(&record.sequencer) {
                            binding.pattern_name = actual.clone();
                        }
                        inner
                            .playback_states
                            .entry(actual.clone())
                            .or_insert_with(|| Mutex::new(PatternPlaybackState::new()));
                        if let Some(state_lock) = inner.playback_states.get(&actual) {
                            let mut state = state_lock.lock();
                            state.reset_position();
                            state.is_playing = clock.is_playing();
                        }

                        let still_bound = inner
                            .bindings
                            .values()
                            .any(|b| b.pattern_name == record.old_pattern);
                        if !still_bound {
                            if let Some(state_lock) = inner.playback_states.get(&record.old_pattern) {
                                let mut state = state_lock.lock();
                                state.is_playing = false;
                                state.current_playing_step = -1;
                            }
                        }
                        changed_bindings.push(record.sequencer.clone());
                    }
                    DeferredKind::Repeat => match advanced {
                        Some(ref advanced_name) if advanced_name != &record.old_pattern => {
                            log::warn!(
                                "chain for sequencer '{}' diverged: expected repeat of '{}', got '{}'",
                                record.sequencer,
                                record.old_pattern,
                                advanced_name
                            );
                            if let Some(binding) = inner.bindings.get_mut(&record.sequencer) {
                                binding.pattern_name = advanced_name.clone();
                            }
                            changed_bindings.push(record.sequencer.clone());
                        }
                        _ => {
                            if let Some(state_lock) = inner.playback_states.get(&record.old_pattern) {
                                state_lock.lock().reset_position();
                            }
                        }
                    },
                }
            }
        } // exclusive lock released here

        for seq in changed_bindings {
            self.notify_binding_changed(&seq);
        }
    }

    // ------------------------------------------------------------------
    // Management operations (non-audio threads)
    // ------------------------------------------------------------------

    pub fn add_pattern(&self, name: Option<String>, pattern: Pattern) -> String {
        let mut inner = self.inner.write();
        let name = name.unwrap_or_else(|| self.generate_pattern_name());
        inner.patterns.insert(name.clone(), pattern);
        inner
            .playback_states
            .insert(name.clone(), Mutex::new(PatternPlaybackState::new()));
        name
    }

    fn generate_pattern_name(&self) -> String {
        format!("P{}", self.pattern_counter.fetch_add(1, Ordering::Relaxed))
    }

    fn generate_chain_name(&self) -> String {
        format!("chain{}", self.chain_counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn update_pattern(&self, name: &str, pattern: Pattern) -> EngineResult<()> {
        let mut inner = self.inner.write();
        if !inner.patterns.contains_key(name) {
            log::warn!("updatePattern: unknown pattern '{name}'");
            return Err(EngineError::NotFound(format!("pattern '{name}'")));
        }
        inner.patterns.insert(name.to_string(), pattern);
        Ok(())
    }

    pub fn remove_pattern(&self, name: &str) -> EngineResult<()> {
        {
            let inner = self.inner.read();
            if !inner.patterns.contains_key(name) {
                log::warn!("removePattern: unknown pattern '{name}'");
                return Err(EngineError::NotFound(format!("pattern '{name}'")));
            }
        }
        self.notify_pattern_deleted(name);
        let mut inner = self.inner.write();
        inner.patterns.remove(name);
        inner.playback_states.remove(name);
        Ok(())
    }

    pub fn get_pattern(&self, name: &str) -> Option<Pattern> {
        self.inner.read().patterns.get(name).cloned()
    }

    pub fn pattern_names(&self) -> Vec<String> {
        self.inner.read().patterns.keys().cloned().collect()
    }

    pub fn add_chain(&self, name: Option<String>) -> String {
        let mut inner = self.inner.write();
        let name = name.unwrap_or_else(|| self.generate_chain_name());
        inner.chains.entry(name.clone()).or_default();
        name
    }

    pub fn chain_add_entry(&self, chain_name: &str, entry: ChainEntry) -> EngineResult<()> {
        let mut inner = self.inner.write();
        match inner.chains.get_mut(chain_name) {
            Some(chain) => {
                chain.add(entry);
                Ok(())
            }
            None => {
                log::warn!("chainAdd: unknown chain '{chain_name}'");
                Err(EngineError::NotFound(format!("chain '{chain_name}'")))
            }
        }
    }

    pub fn chain_remove_entry(&self, chain_name: &str, index: usize) -> EngineResult<()> {
        let mut inner = self.inner.write();
        match inner.chains.get_mut(chain_name) {
            Some(chain) => {
                chain.remove(index);
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("chain '{chain_name}'"))),
        }
    }

    pub fn chain_set_entry(&self, chain_name: &str, index: usize, entry: ChainEntry) -> EngineResult<()> {
        let mut inner = self.inner.write();
        match inner.chains.get_mut(chain_name) {
            Some(chain) => {
                chain.set_entry(index, entry);
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("chain '{chain_name}'"))),
        }
    }

    pub fn chain_set_repeat(&self, chain_name: &str, index: usize, repeat_count: u32) -> EngineResult<()> {
        let mut inner = self.inner.write();
        match inner.chains.get_mut(chain_name) {
            Some(chain) => {
                chain.set_repeat(index, repeat_count);
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("chain '{chain_name}'"))),
        }
    }

    pub fn chain_set_enabled(&self, chain_name: &str, enabled: bool) -> EngineResult<()> {
        let mut inner = self.inner.write();
        match inner.chains.get_mut(chain_name) {
            Some(chain) => {
                chain.set_enabled(enabled);
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("chain '{chain_name}'"))),
        }
    }

    pub fn chain_set_entry_disabled(&self, chain_name: &str, index: usize, disabled: bool) -> EngineResult<()> {
        let mut inner = self.inner.write();
        match inner.chains.get_mut(chain_name) {
            Some(chain) => {
                chain.set_entry_disabled(index, disabled);
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("chain '{chain_name}'"))),
        }
    }

    pub fn chain_clear(&self, chain_name: &str) -> EngineResult<()> {
        let mut inner = self.inner.write();
        match inner.chains.get_mut(chain_name) {
            Some(chain) => {
                chain.clear();
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("chain '{chain_name}'"))),
        }
    }

    pub fn chain_reset(&self, chain_name: &str) -> EngineResult<()> {
        let mut inner = self.inner.write();
        match inner.chains.get_mut(chain_name) {
            Some(chain) => {
                chain.reset();
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("chain '{chain_name}'"))),
        }
    }

    pub fn set_binding(&self, sequencer_name: &str, pattern_name: &str, clock_playing: bool) {
        let mut inner = self.inner.write();
        let binding = inner.bindings.entry(sequencer_name.to_string()).or_default();
        binding.pattern_name = pattern_name.to_string();
        inner
            .playback_states
            .entry(pattern_name.to_string())
            .or_insert_with(|| Mutex::new(PatternPlaybackState::new()));
        if let Some(state_lock) = inner.playback_states.get(pattern_name) {
            let mut state = state_lock.lock();
            state.is_playing = clock_playing;
        }
    }

    pub fn set_binding_chain(&self, sequencer_name: &str, chain_name: &str, chain_enabled: bool) {
        let mut inner = self.inner.write();
        let binding = inner.bindings.entry(sequencer_name.to_string()).or_default();
        binding.chain_name = chain_name.to_string();
        binding.chain_enabled = chain_enabled;
    }

    pub fn binding(&self, sequencer_name: &str) -> Option<SequencerBinding> {
        self.inner.read().bindings.get(sequencer_name).cloned()
    }

    /// Names of every sequencer currently bound to `pattern_name`. Used by
    /// Engine to dispatch a fired `TriggerEvent` to its consuming modules.
    pub fn bound_sequencers(&self, pattern_name: &str) -> Vec<String> {
        self.inner
            .read()
            .bindings
            .iter()
            .filter(|(_, binding)| binding.pattern_name == pattern_name)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Clears `patternName` on every binding that referenced `pattern_name`.
    /// Called after a pattern is removed so bindings never dangle (§8
    /// invariant 3: a non-empty `patternName` always names an existing
    /// pattern).
    pub fn clear_bindings_to_pattern(&self, pattern_name: &str) {
        let mut inner = self.inner.write();
        for binding in inner.bindings.values_mut() {
            if binding.pattern_name == pattern_name {
                binding.pattern_name.clear();
            }
        }
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    pub fn to_json(&self) -> Value {
        let inner = self.inner.read();
        serde_json::json!({
            "patterns": inner.patterns,
            "chains": inner.chains,
            "sequencerBindings": inner.bindings,
        })
    }

    /// Clears all maps, then loads in order: patterns, chains (given the
    /// freshly loaded pattern name set so orphan references can be
    /// detected by the caller), then bindings. Does not itself validate
    /// binding consistency — the caller (SessionManager) does that after
    /// every subsystem has loaded.
    pub fn from_json(&self, value: &Value) -> EngineResult<()> {
        let patterns: HashMap<String, Pattern> = value
            .get("patterns")
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(|e| EngineError::SerializationFailed(e.to_string()))?
            .unwrap_or_default();
        let chains: HashMap<String, PatternChain> = value
            .get("chains")
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(|e| EngineError::SerializationFailed(e.to_string()))?
            .unwrap_or_default();
        let bindings: HashMap<String, SequencerBinding> = value
            .get("sequencerBindings")
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(|e| EngineError::SerializationFailed(e.to_string()))?
            .unwrap_or_default();

        let mut inner = self.inner.write();
        inner.patterns.clear();
        inner.chains.clear();
        inner.bindings.clear();
        inner.playback_states.clear();

        for name in patterns.keys() {
            inner
                .playback_states
                .insert(name.clone(), Mutex::new(PatternPlaybackState::new()));
        }
        inner.patterns = patterns;
        inner.chains = chains;
        inner.bindings = bindings;
        Ok(())
    }
}

/// Ratio gate, then chance gate, then emits a trigger event. Returns `None`
/// when the step has no trigger, the gates don't pass, or the step is a
/// rest that wasn't already playing.
fn trigger_step(
    clock: &Clock,
    rng: &mut ChaCha8Rng,
    pattern_name: &str,
    pattern: &Pattern,
    state: &mut PatternPlaybackState,
    step: &Step,
) -> Option<TriggerEvent> {
    if !step.has_trigger() {
        if state.current_playing_step < 0 {
            state.current_playing_step = -1;
        }
        return None;
    }

    let ratio_a = step.ratio_a.clamp(1, 16);
    let ratio_b = step.ratio_b.clamp(1, 16);
    let cycle = state.pattern_cycle_count + 1;
    if ((cycle - 1).rem_euclid(ratio_b)) + 1 != ratio_a {
        state.current_playing_step = -1;
        return None;
    }

    let chance = step.chance.clamp(0, 100);
    let fires = if chance >= 100 {
        true
    } else {
        rng.random_range(0..100) < chance
    };
    if !fires {
        return None;
    }

    let duration = clock.step_duration_seconds(step.length, pattern.steps_per_beat());
    state.step_start_time = 0.0;
    state.step_end_time = duration;
    state.current_playing_step = step.index;

    let mut parameters: HashMap<String, f32> = HashMap::new();
    parameters.insert("note".to_string(), step.index as f32);
    for column in pattern.columns() {
        if is_reserved(&column.name) {
            continue;
        }
        if let Some(value) = step.parameter(&column.name) {
            parameters.insert(column.name.clone(), value);
        }
    }

    Some(TriggerEvent {
        pattern_name: pattern_name.to_string(),
        step: step.index,
        duration,
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::step::Step;

    fn make_pattern_with_trigger(index: i32, length: i32, chance: i32) -> Pattern {
        let mut pattern = Pattern::new(4, 4.0).unwrap();
        let mut step = Step::new();
        step.index = index;
        step.length = length;
        step.chance = chance;
        pattern.set_step(0, step).unwrap();
        pattern
    }

    #[test]
    fn scenario_a_simple_trigger() {
        let runtime = PatternRuntime::new();
        let pattern = make_pattern_with_trigger(5, 1, 100);
        runtime.add_pattern(Some("P0".into()), pattern);
        runtime.set_binding("seq1", "P0", true);

        let mut clock = Clock::new(48_000.0);
        clock.set_bpm(120.0);
        clock.start();

        let samples_per_step = clock.samples_per_step(4.0);
        assert_eq!(samples_per_step, 6000);

        let events = std::sync::Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        runtime.on_trigger(move |e| events_clone.lock().push(e.clone()));

        runtime.evaluate(&clock, samples_per_step as u32);

        let fired = events.lock();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].pattern_name, "P0");
        assert_eq!(fired[0].step, 5);
        assert_eq!(fired[0].parameters.get("note"), Some(&5.0));
        assert!((fired[0].duration - 0.125).abs() < 1e-6);
    }

    #[test]
    fn scenario_b_chance_gate_boundary() {
        // `trigger_step` draws a fresh `0..100` value per attempt, so re-seeding
        // an identical rng reproduces the same draw on demand. Probe it once to
        // learn that draw, then drive `trigger_step` itself at chance == draw,
        // chance == draw-1, and chance == draw+1 so the test actually exercises
        // the real `<` comparison (draw < chance fires) rather than a literal
        // restatement of it.
        const SEED: u64 = 1;
        let draw = ChaCha8Rng::seed_from_u64(SEED).random_range(0..100);

        let mut clock = Clock::new(48_000.0);
        clock.set_bpm(120.0);
        clock.start();

        let fire = |chance: i32| -> bool {
            let mut rng = ChaCha8Rng::seed_from_u64(SEED);
            let mut state = PatternPlaybackState::new();
            let pattern = make_pattern_with_trigger(5, 1, chance);
            let step = pattern.get_step(0).unwrap();
            trigger_step(&clock, &mut rng, "P0", &pattern, &mut state, step).is_some()
        };

        // draw < chance is required: chance == draw does not fire, chance ==
        // draw+1 fires. (draw+1 can reach 100, which trigger_step short-circuits
        // to "always fires" — still a correct fire outcome either way.)
        assert!(!fire(draw), "chance == draw ({draw}) must not fire");
        assert!(fire(draw + 1), "chance == draw+1 ({}) must fire", draw + 1);
        if draw > 0 {
            assert!(!fire(draw - 1), "chance == draw-1 ({}) must not fire", draw - 1);
        }
    }

    #[test]
    fn scenario_c_ratio_gate() {
        let ratio_a = 2;
        let ratio_b = 3;
        let firing_cycles: Vec<i32> = (1..=9)
            .filter(|&cycle| ((cycle - 1).rem_euclid(ratio_b)) + 1 == ratio_a)
            .collect();
        assert_eq!(firing_cycles, vec![2, 5, 8]);
    }

    #[test]
    fn no_trigger_event_for_rest_step() {
        let runtime = PatternRuntime::new();
        let pattern = Pattern::new(4, 4.0).unwrap(); // all rests by default
        runtime.add_pattern(Some("P0".into()), pattern);
        runtime.set_binding("seq1", "P0", true);

        let mut clock = Clock::new(48_000.0);
        clock.set_bpm(120.0);
        clock.start();

        let fired = std::sync::Arc::new(Mutex::new(0));
        let fired_clone = fired.clone();
        runtime.on_trigger(move |_| *fired_clone.lock() += 1);

        runtime.evaluate(&clock, clock.samples_per_step(4.0) as u32 * 4);
        assert_eq!(*fired.lock(), 0);
    }

    #[test]
    fn remove_unknown_pattern_is_notfound_not_panic() {
        let runtime = PatternRuntime::new();
        assert!(runtime.remove_pattern("missing").is_err());
    }

    #[test]
    fn clear_bindings_to_pattern_unbinds_without_dangling() {
        let runtime = PatternRuntime::new();
        runtime.add_pattern(Some("P0".into()), Pattern::new(4, 4.0).unwrap());
        runtime.set_binding("seq1", "P0", false);
        assert_eq!(runtime.bound_sequencers("P0"), vec!["seq1".to_string()]);
        runtime.remove_pattern("P0").unwrap();
        runtime.clear_bindings_to_pattern("P0");
        assert!(runtime.binding("seq1").unwrap().pattern_name.is_empty());
    }

    #[test]
    fn json_round_trip() {
        let runtime = PatternRuntime::new();
        runtime.add_pattern(Some("P0".into()), Pattern::new(4, 4.0).unwrap());
        runtime.add_chain(Some("chain1".into()));
        runtime.set_binding("seq1", "P0", false);

        let json = runtime.to_json();
        let restored = PatternRuntime::new();
        restored.from_json(&json).unwrap();
        assert_eq!(restored.pattern_names(), runtime.pattern_names());
    }
}
