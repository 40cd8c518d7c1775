// src/modules/mod.rs

pub mod mixer;
pub mod module;
pub mod output;
pub mod sampler;
pub mod sequencer;

pub use mixer::Mixer;
pub use module::{Module, ModuleContext, ModuleIdentity, ParamType, ParameterDescriptor};
pub use output::Output;
pub use sampler::Sampler;
pub use sequencer::Sequencer;

use crate::modules::module::ModuleIdentity as Identity;

/// Module-type names known to the core, used by `ensure_system_modules` and
/// by the demo binary to populate a fresh registry.
pub mod type_names {
    pub const SAMPLER: &str = "Sampler";
    pub const SEQUENCER: &str = "Sequencer";
    pub const MIXER: &str = "Mixer";
    pub const OUTPUT: &str = "Output";
}

/// Registers the four built-in module types with `registry`.
pub fn register_standard_modules(registry: &crate::registry::ModuleRegistry) {
    registry.register_type(type_names::SAMPLER, |id: Identity| Box::new(Sampler::new(id)));
    registry.register_type(type_names::SEQUENCER, |id: Identity| Box::new(Sequencer::new(id)));
    registry.register_type(type_names::MIXER, |id: Identity| Box::new(Mixer::new(id)));
    registry.register_type(type_names::OUTPUT, |id: Identity| Box::new(Output::new(id)));
}
