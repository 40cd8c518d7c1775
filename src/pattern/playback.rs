// src/pattern/playback.rs
//
// Transient per-pattern runtime scheduling state. Distinct from the
// pattern's data (src/pattern/pattern.rs) and owned exclusively by
// PatternRuntime — never shared, never serialized.

#[derive(Debug, Clone)]
pub struct PatternPlaybackState {
    pub playback_step: i32,

    /// `-1` when silent.
    pub current_playing_step: i32,

    pub is_playing: bool,

    /// Seconds, for UI time readouts.
    pub step_start_time: f32,
    pub step_end_time: f32,

    pub sample_accumulator: f64,
    pub last_bpm: f32,
    pub pattern_cycle_count: i32,

    /// Name of the chain this pattern is currently playing as part of, if any.
    pub chain_back_reference: Option<String>,
}

impl Default for PatternPlaybackState {
    fn default() -> Self {
        Self {
            playback_step: 0,
            current_playing_step: -1,
            is_playing: false,
            step_start_time: 0.0,
            step_end_time: 0.0,
            sample_accumulator: 0.0,
            last_bpm: 120.0,
            pattern_cycle_count: 0,
            chain_back_reference: None,
        }
    }
}

impl PatternPlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets scheduling position to the start of the pattern, as done when
    /// a sequencer binds to a freshly-switched-to pattern.
    pub fn reset_position(&mut self) {
        self.playback_step = 0;
        self.current_playing_step = -1;
        self.sample_accumulator = 0.0;
        self.pattern_cycle_count = 0;
    }
}
