// src/modules/module.rs
//
// The uniform contract every concrete module (Sampler, Sequencer, Mixer,
// Output, ...) honours. Modules are black boxes to the core: only their
// parameter bag, descriptor table, and lifecycle hooks are specified.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::clock::Clock;
use crate::connection::ConnectionManager;
use crate::error::EngineResult;
use crate::pattern::runtime::{PatternRuntime, TriggerEvent};
use crate::registry::ModuleRegistry;
use crate::routing::ParameterRouter;

/// Parameter value-type tag for descriptor display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Float,
    Int,
    Bool,
    Enum,
    String,
}

/// Describes one module parameter for UI/serialization purposes.
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    pub name: String,
    pub param_type: ParamType,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    /// Display options for `ParamType::Enum`.
    pub options: Vec<String>,
}

impl ParameterDescriptor {
    pub fn float(name: impl Into<String>, min: f32, max: f32, default: f32) -> Self {
        Self {
            name: name.into(),
            param_type: ParamType::Float,
            min,
            max,
            default,
            options: Vec::new(),
        }
    }

    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        Self {
            name: name.into(),
            param_type: ParamType::Bool,
            min: 0.0,
            max: 1.0,
            default: if default { 1.0 } else { 0.0 },
            options: Vec::new(),
        }
    }

    pub fn int(name: impl Into<String>, min: i32, max: i32, default: i32) -> Self {
        Self {
            name: name.into(),
            param_type: ParamType::Int,
            min: min as f32,
            max: max as f32,
            default: default as f32,
            options: Vec::new(),
        }
    }

    pub fn enum_(name: impl Into<String>, options: Vec<String>, default_index: usize) -> Self {
        Self {
            name: name.into(),
            param_type: ParamType::Enum,
            min: 0.0,
            max: options.len().saturating_sub(1) as f32,
            default: default_index as f32,
            options,
        }
    }
}

/// Identity shared by every module instance.
#[derive(Debug, Clone)]
pub struct ModuleIdentity {
    pub uuid: Uuid,
    pub instance_name: String,
    pub type_name: String,
}

/// Collaborators a module receives once, at `initialize` time.
pub struct ModuleContext<'a> {
    pub clock: &'a Clock,
    pub registry: &'a ModuleRegistry,
    pub connections: &'a ConnectionManager,
    pub router: &'a ParameterRouter,
    pub pattern_runtime: &'a Arc<PatternRuntime>,
    pub is_restored: bool,
}

/// The contract every module type implements.
pub trait Module: Send + Sync {
    fn identity(&self) -> &ModuleIdentity;

    fn enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);

    fn get_parameter(&self, name: &str) -> Option<f32>;

    /// `broadcast` indicates whether downstream routed connections should be
    /// notified of this change; modules that have no outgoing parameter
    /// routes may ignore it.
    fn set_parameter(&mut self, name: &str, value: f32, broadcast: bool) -> EngineResult<()>;

    fn parameters(&self) -> Vec<ParameterDescriptor>;

    /// Called once after creation and registration, and again after a
    /// session load with `context.is_restored == true`.
    fn initialize(&mut self, context: &ModuleContext);

    fn to_json(&self) -> Value;
    fn from_json(&mut self, value: &Value) -> EngineResult<()>;

    /// Trigger-stream consumption is opt-in: only sequencer-like modules
    /// override this. Dispatched by Engine after PatternRuntime fires a
    /// step whose pattern this module's binding currently names.
    fn receive_trigger(&mut self, _event: &TriggerEvent) {}

    /// Opaque module-scoped command the core never inspects the shape of.
    fn handle_command(&mut self, _payload: &Value) -> EngineResult<()> {
        Ok(())
    }

    /// Type-erased downcasting for collaborators (SessionManager's mixer-
    /// parameter restoration hook) that need a concrete module behind the
    /// uniform contract. Mirrors the `dyn Any` widget-state pattern used
    /// for GUI state downcasting.
    fn as_any(&self) -> &dyn std::any::Any
    where
        Self: 'static,
    {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any
    where
        Self: 'static,
    {
        self
    }
}
