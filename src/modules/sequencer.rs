// src/modules/sequencer.rs
//
// A sequencer owns no pattern data itself — it is only an address that
// PatternRuntime's sequencer bindings point at, and a TriggerEvent
// subscriber. Its own parameter bag is limited to playback controls that
// are not part of the pattern data model.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::modules::module::{Module, ModuleContext, ModuleIdentity, ParameterDescriptor};
use crate::pattern::TriggerEvent;

pub struct Sequencer {
    identity: ModuleIdentity,
    enabled: bool,
    parameters: HashMap<String, f32>,
    last_trigger: Option<TriggerEvent>,
}

impl Sequencer {
    pub fn new(identity: ModuleIdentity) -> Self {
        let mut parameters = HashMap::new();
        parameters.insert("swing".to_string(), 0.0);
        Self {
            identity,
            enabled: true,
            parameters,
            last_trigger: None,
        }
    }

    pub fn last_trigger(&self) -> Option<&TriggerEvent> {
        self.last_trigger.as_ref()
    }
}

impl Module for Sequencer {
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
        vec![ParameterDescriptor::float("swing", 0.0, 1.0, 0.0)]
    }

    fn initialize(&mut self, _context: &ModuleContext) {}

    fn to_json(&self) -> Value {
        serde_json::json!({ "parameters": self.parameters })
    }

    fn from_json(&mut self, value: &Value) -> EngineResult<()> {
        if let Some(params) = value.get("parameters").and_then(Value::as_object) {
            for (k, v) in params {
                if let Some(f) = v.as_f64() {
                    self.parameters.insert(k.clone(), f as f32);
                }
            }
        }
        Ok(())
    }

    /// Called by Engine's trigger dispatch when this sequencer's bound
    /// pattern fires.
    fn receive_trigger(&mut self, event: &TriggerEvent) {
        self.last_trigger = Some(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn stores_last_trigger() {
        let identity = ModuleIdentity {
            uuid: Uuid::new_v4(),
            instance_name: "seq1".into(),
            type_name: "Sequencer".into(),
        };
        let mut sequencer = Sequencer::new(identity);
        assert!(sequencer.last_trigger().is_none());
        sequencer.receive_trigger(&TriggerEvent {
            pattern_name: "P0".into(),
            step: 0,
            duration: 0.1,
            parameters: HashMap::new(),
        });
        assert!(sequencer.last_trigger().is_some());
    }
}
