// src/clock.rs
//
// Sample-accurate transport.
//
// This struct:
// - is mutated only from the audio thread (BPM is set via command, applied
//   at the top of the next buffer)
// - contains no allocation on its hot path
// - derives step timing from sample counts, never wall clock

const MIN_BPM: f32 = 20.0;
const MAX_BPM: f32 = 999.0;

/// Sample-rate-aware transport: BPM, play flag, and a per-buffer beat pulse.
#[derive(Debug, Clone)]
pub struct Clock {
    sample_rate: f64,
    bpm: f32,
    playing: bool,

    /// Cumulative beats since the last `reset`.
    current_beat: f64,

    /// Decays linearly over one beat; 1.0 immediately after a beat boundary.
    beat_pulse: f32,
}

impl Clock {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            bpm: 120.0,
            playing: false,
            current_beat: 0.0,
            beat_pulse: 0.0,
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    #[inline]
    pub fn current_beat(&self) -> f64 {
        self.current_beat
    }

    #[inline]
    pub fn beat_pulse(&self) -> f32 {
        self.beat_pulse
    }

    pub fn set_bpm(&mut self, bpm: f32) {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
    }

    /// Idempotent: calling while already playing is a no-op.
    pub fn start(&mut self) {
        self.playing = true;
    }

    /// Idempotent: calling while already stopped is a no-op.
    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// Stops the transport and zeroes the cumulative beat counter.
    pub fn reset(&mut self) {
        self.playing = false;
        self.current_beat = 0.0;
        self.beat_pulse = 0.0;
    }

    /// Advance by `n_frames` samples. A no-op when the sample rate is invalid
    /// (<= 0) or when the transport is stopped — the audio thread must never
    /// observe an error here, only a frozen clock.
    pub fn tick(&mut self, n_frames: u32) {
        if self.sample_rate <= 0.0 || !self.playing {
            return;
        }
        let seconds = n_frames as f64 / self.sample_rate;
        let beats = seconds * (self.bpm as f64 / 60.0);
        self.current_beat += beats;

        // Linear decay over one beat, restarted at every integer beat crossed.
        let frac = self.current_beat.fract() as f32;
        self.beat_pulse = 1.0 - frac;
    }

    /// `max(1, round(60 / (bpm * |steps_per_beat|) * sample_rate))`.
    ///
    /// `steps_per_beat == 0` is invalid; callers must reject it at the data
    /// model layer (see `Pattern::steps_per_beat`).
    pub fn samples_per_step(&self, steps_per_beat: f32) -> u64 {
        let spb = steps_per_beat.abs().max(f32::EPSILON) as f64;
        let seconds_per_step = 60.0 / (self.bpm as f64 * spb);
        let samples = (seconds_per_step * self.sample_rate).round();
        samples.max(1.0) as u64
    }

    /// Seconds for a step of the given `length` at the current BPM/SPB.
    pub fn step_duration_seconds(&self, length: i32, steps_per_beat: f32) -> f32 {
        let spb = steps_per_beat.abs().max(f32::EPSILON);
        (length as f32) * 60.0 / (self.bpm * spb)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(48_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bpm_clamps_at_extremes() {
        let mut clock = Clock::new(48_000.0);
        clock.set_bpm(5.0);
        assert_eq!(clock.bpm(), MIN_BPM);
        clock.set_bpm(5000.0);
        assert_eq!(clock.bpm(), MAX_BPM);
    }

    #[test]
    fn tick_is_noop_when_stopped() {
        let mut clock = Clock::new(48_000.0);
        clock.tick(48_000);
        assert_eq!(clock.current_beat(), 0.0);
    }

    #[test]
    fn samples_per_step_matches_scenario_a() {
        let mut clock = Clock::new(48_000.0);
        clock.set_bpm(120.0);
        // 120 BPM, SPB=4 -> step duration 0.125s -> 6000 samples at 48kHz.
        assert_eq!(clock.samples_per_step(4.0), 6000);
    }

    #[test]
    fn reset_is_idempotent_and_zeroes_beat() {
        let mut clock = Clock::new(48_000.0);
        clock.start();
        clock.tick(48_000);
        clock.reset();
        assert_eq!(clock.current_beat(), 0.0);
        assert!(!clock.is_playing());
        clock.reset();
        assert_eq!(clock.current_beat(), 0.0);
    }

    #[test]
    fn invalid_sample_rate_freezes_clock() {
        let mut clock = Clock::new(0.0);
        clock.start();
        clock.tick(1000);
        assert_eq!(clock.current_beat(), 0.0);
    }
}
