// src/state.rs
//
// Serialisable projection of engine state: the immutable snapshot root
// published after every command drain, and the lighter delta payload used
// for incremental UI updates.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::ConnectionInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSnapshot {
    pub is_playing: bool,
    pub bpm: f32,
    pub current_beat: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleState {
    pub uuid: uuid::Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub enabled: bool,
    pub parameters: HashMap<String, f32>,
    pub data: Value,
}

/// Minimal pattern summary carried on the snapshot so observers (chiefly
/// `ScriptManager`) can emit `pattern(name, stepCount)` lines without
/// touching `PatternRuntime` directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSummary {
    pub step_count: usize,
}

/// Snapshot root: `version` is monotonically increasing; each increment
/// corresponds to one observable mutation batch (one successful drain).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub version: u64,
    pub transport: TransportSnapshot,
    pub modules: HashMap<String, ModuleState>,
    pub connections: Vec<ConnectionInfo>,
    pub patterns: HashMap<String, PatternSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportDelta {
    pub is_playing_changed: bool,
    pub is_playing: bool,
    pub bpm_changed: bool,
    pub bpm: f32,
    pub current_beat_changed: bool,
    pub current_beat: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterChange {
    pub parameter_name: String,
    pub value: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleDelta {
    pub enabled_changed: bool,
    pub enabled: bool,
    pub parameter_changes: Vec<ParameterChange>,
}

/// Incremental view of what changed since the previous published snapshot.
/// `connections_changed = true` means "re-read the full connection list
/// from the snapshot"; deltas never enumerate connection changes directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDelta {
    pub transport: TransportDelta,
    pub module_changes: HashMap<String, ModuleDelta>,
    pub connections_changed: bool,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        !self.transport.is_playing_changed
            && !self.transport.bpm_changed
            && !self.transport.current_beat_changed
            && self.module_changes.is_empty()
            && !self.connections_changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_state_round_trips_through_json() {
        let state = EngineState {
            version: 1,
            transport: TransportSnapshot {
                is_playing: true,
                bpm: 120.0,
                current_beat: 4.0,
            },
            modules: HashMap::new(),
            connections: Vec::new(),
            patterns: HashMap::new(),
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: EngineState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.version, state.version);
        assert_eq!(back.transport.bpm, state.transport.bpm);
    }

    #[test]
    fn empty_delta_reports_empty() {
        assert!(StateDelta::default().is_empty());
    }
}
