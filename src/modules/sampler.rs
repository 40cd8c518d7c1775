// src/modules/sampler.rs
//
// Plays back a sample in response to trigger events. The core only cares
// about its parameter bag and its TriggerEvent consumption; the decode/
// playback itself is treated as a leaf service the spec explicitly puts
// out of scope.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::modules::module::{Module, ModuleContext, ModuleIdentity, ParameterDescriptor};

pub struct Sampler {
    identity: ModuleIdentity,
    enabled: bool,
    sample_path: String,
    parameters: HashMap<String, f32>,
}

impl Sampler {
    pub fn new(identity: ModuleIdentity) -> Self {
        let mut parameters = HashMap::new();
        parameters.insert("volume".to_string(), 1.0);
        parameters.insert("pitch".to_string(), 0.0);
        parameters.insert("pan".to_string(), 0.0);
        Self {
            identity,
            enabled: true,
            sample_path: String::new(),
            parameters,
        }
    }

    /// Invoked by a bound sequencer's trigger forwarding; not part of the
    /// uniform Module contract (trigger consumption is opt-in per §4.10).
    pub fn on_trigger(&mut self, note: f32) {
        if !self.enabled {
            return;
        }
        log::debug!("{} triggered with note {note}", self.identity.instance_name);
    }
}

impl Module for Sampler {
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
        vec![
            ParameterDescriptor::float("volume", 0.0, 2.0, 1.0),
            ParameterDescriptor::float("pitch", -24.0, 24.0, 0.0),
            ParameterDescriptor::float("pan", -1.0, 1.0, 0.0),
        ]
    }

    fn initialize(&mut self, _context: &ModuleContext) {}

    fn to_json(&self) -> Value {
        serde_json::json!({
            "samplePath": self.sample_path,
            "parameters": self.parameters,
        })
    }

    fn from_json(&mut self, value: &Value) -> EngineResult<()> {
        if let Some(path) = value.get("samplePath").and_then(Value::as_str) {
            self.sample_path = path.to_string();
        }
        if let Some(params) = value.get("parameters").and_then(Value::as_object) {
            for (k, v) in params {
                if let Some(f) = v.as_f64() {
                    self.parameters.insert(k.clone(), f as f32);
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

    fn identity() -> ModuleIdentity {
        ModuleIdentity {
            uuid: Uuid::new_v4(),
            instance_name: "s1".into(),
            type_name: "Sampler".into(),
        }
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let mut sampler = Sampler::new(identity());
        assert!(sampler.set_parameter("nope", 1.0, false).is_err());
    }

    #[test]
    fn json_round_trip_preserves_parameters() {
        let mut sampler = Sampler::new(identity());
        sampler.set_parameter("volume", 0.5, false).unwrap();
        let json = sampler.to_json();
        let mut restored = Sampler::new(identity());
        restored.from_json(&json).unwrap();
        assert_eq!(restored.get_parameter("volume"), Some(0.5));
    }
}
