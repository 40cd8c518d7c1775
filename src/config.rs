// src/config.rs
//
// Engine construction parameters.
//
// This is not a config-file/env parser — the spec defines no external
// configuration surface beyond the session file itself. It is a plain
// struct with sensible defaults, mirroring how Session is constructed.

/// Parameters used to construct an [`crate::engine::Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Audio sample rate in Hz.
    pub sample_rate: f64,

    /// Maximum frames the audio thread will pass to `evaluate` in one call.
    pub max_block_frames: usize,

    /// Capacity of the lock-free UI -> audio command queue.
    pub command_queue_capacity: usize,

    /// Interval between automatic session saves, in seconds. `None` disables autosave.
    pub autosave_interval: Option<f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            max_block_frames: 1024,
            command_queue_capacity: 256,
            autosave_interval: None,
        }
    }
}

impl EngineConfig {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    pub fn max_block_frames(mut self, frames: usize) -> Self {
        self.max_block_frames = frames;
        self
    }

    pub fn command_queue_capacity(mut self, capacity: usize) -> Self {
        self.command_queue_capacity = capacity;
        self
    }

    pub fn autosave_interval(mut self, seconds: f64) -> Self {
        self.autosave_interval = Some(seconds);
        self
    }
}
