// src/modules/mixer.rs
//
// Combines multiple incoming audio connections; restores per-connection
// volumes after the connection topology is reloaded (the mixer-parameter
// restoration hook SessionManager calls after connections are restored).

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::modules::module::{Module, ModuleContext, ModuleIdentity, ParameterDescriptor};

pub struct Mixer {
    identity: ModuleIdentity,
    enabled: bool,
    parameters: HashMap<String, f32>,

    /// Per-source-module volume, restored after connection reload.
    channel_volumes: HashMap<String, f32>,
}

impl Mixer {
    pub fn new(identity: ModuleIdentity) -> Self {
        let mut parameters = HashMap::new();
        parameters.insert("masterVolume".to_string(), 1.0);
        Self {
            identity,
            enabled: true,
            parameters,
            channel_volumes: HashMap::new(),
        }
    }

    /// Called after ConnectionManager restores topology on session load.
    pub fn restore_channel_volume(&mut self, source_module: &str, volume: f32) {
        self.channel_volumes.insert(source_module.to_string(), volume);
    }

    pub fn channel_volume(&self, source_module: &str) -> f32 {
        self.channel_volumes.get(source_module).copied().unwrap_or(1.0)
    }
}

impl Module for Mixer {
    fn identity(&self) -> &ModuleIdentity {
        &self.identity
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn get_parameter(&self, name: &str) -> Option<f32> {
        self.parameters.get(name).copied()
    }

    fn set_parameter(&mut self, name: &str, value: f32, _broadcast: bool) -> EngineResult<()> {
        if !self.parameters.contains_key(name) {
            return Err(EngineError::NotFound(format!("parameter '{name}'")));
        }
        self.parameters.insert(name.to_string(), value);
        Ok(())
    }

    fn parameters(&self) -> Vec<ParameterDescriptor> {
        vec![ParameterDescriptor::float("masterVolume", 0.0, 2.0, 1.0)]
    }

    fn initialize(&mut self, _context: &ModuleContext) {}

    fn to_json(&self) -> Value {
        serde_json::json!({
            "parameters": self.parameters,
            "channelVolumes": self.channel_volumes,
        })
    }

    fn from_json(&mut self, value: &Value) -> EngineResult<()> {
        if let Some(params) = value.get("parameters").and_then(Value::as_object) {
            for (k, v) in params {
                if let Some(f) = v.as_f64() {
                    self.parameters.insert(k.clone(), f as f32);
                }
            }
        }
        if let Some(volumes) = value.get("channelVolumes").and_then(Value::as_object) {
            for (k, v) in volumes {
                if let Some(f) = v.as_f64() {
                    self.channel_volumes.insert(k.clone(), f as f32);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn channel_volume_defaults_to_unity() {
        let identity = ModuleIdentity {
            uuid: Uuid::new_v4(),
            instance_name: "mix1".into(),
            type_name: "Mixer".into(),
        };
        let mixer = Mixer::new(identity);
        assert_eq!(mixer.channel_volume("s1"), 1.0);
    }
}
