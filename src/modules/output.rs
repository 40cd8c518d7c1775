// src/modules/output.rs
//
// Terminal module. ModuleRegistry::ensure_system_modules instantiates two
// of these under well-known names (MasterAudioOut, MasterVideoOut).

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::modules::module::{Module, ModuleContext, ModuleIdentity, ParameterDescriptor};

pub struct Output {
    identity: ModuleIdentity,
    enabled: bool,
    parameters: HashMap<String, f32>,
}

impl Output {
    pub fn new(identity: ModuleIdentity) -> Self {
        let mut parameters = HashMap::new();
        parameters.insert("level".to_string(), 1.0);
        Self {
            identity,
            enabled: true,
            parameters,
        }
    }
}

impl Module for Output {
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
        vec![ParameterDescriptor::float("level", 0.0, 2.0, 1.0)]
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
}
