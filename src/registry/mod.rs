// src/registry/mod.rs
//
// ModuleRegistry and its type factory.
//
// Grounded on node_factory.rs's "factory table populated by registration"
// shape, generalized from an integer NodeTypeId to the spec's
// (uuid, instanceName, typeName) module identity.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::modules::module::{Module, ModuleIdentity};

pub const MASTER_AUDIO_OUTPUT: &str = "MasterAudioOut";
pub const MASTER_VIDEO_OUTPUT: &str = "MasterVideoOut";

/// Creates a fresh, default-configured instance of one module type.
pub type ModuleCreator = fn(identity: ModuleIdentity) -> Box<dyn Module>;

struct Registry {
    factories: HashMap<String, ModuleCreator>,
    by_uuid: HashMap<Uuid, std::sync::Arc<parking_lot::RwLock<Box<dyn Module>>>>,
    name_to_uuid: HashMap<String, Uuid>,
}

impl Registry {
    fn new() -> Self {
        Self {
            factories: HashMap::new(),
            by_uuid: HashMap::new(),
            name_to_uuid: HashMap::new(),
        }
    }
}

/// Owning handle to a module instance, shared between the registry and
/// any other subsystem that resolves a non-owning reference through it.
pub type ModuleHandle = std::sync::Arc<parking_lot::RwLock<Box<dyn Module>>>;

/// Type registry (factory table) plus instance identity maps.
///
/// Both maps share a single reader-writer lock; iteration helpers copy the
/// key set under the lock and invoke callbacks without it held.
pub struct ModuleRegistry {
    inner: RwLock<Registry>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Registry::new()),
        }
    }

    /// Registers a module type so new instances can be created without
    /// modifying the registry itself.
    pub fn register_type(&self, type_name: &str, creator: ModuleCreator) {
        self.inner.write().factories.insert(type_name.to_string(), creator);
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.inner.read().factories.contains_key(type_name)
    }

    /// Creates, registers, and returns a new instance of `type_name`. A
    /// unique human name is auto-generated as `{typeName}{N}` when
    /// `requested_name` is `None`, collision-free against existing names.
    pub fn create(&self, type_name: &str, requested_name: Option<&str>) -> EngineResult<ModuleHandle> {
        let mut inner = self.inner.write();
        let creator = *inner
            .factories
            .get(type_name)
            .ok_or_else(|| EngineError::NotFound(format!("module type '{type_name}'")))?;

        let name = match requested_name {
            Some(name) => {
                if inner.name_to_uuid.contains_key(name) {
                    return Err(EngineError::AlreadyExists(format!("module '{name}'")));
                }
                name.to_string()
            }
            None => {
                let mut n = 0u64;
                loop {
                    let candidate = format!("{type_name}{n}");
                    if !inner.name_to_uuid.contains_key(&candidate) {
                        break candidate;
                    }
                    n += 1;
                }
            }
        };

        let identity = ModuleIdentity {
            uuid: Uuid::new_v4(),
            instance_name: name.clone(),
            type_name: type_name.to_string(),
        };
        let module = creator(identity.clone());
        let handle: ModuleHandle = std::sync::Arc::new(parking_lot::RwLock::new(module));

        inner.by_uuid.insert(identity.uuid, handle.clone());
        inner.name_to_uuid.insert(name, identity.uuid);

        Ok(handle)
    }

    pub fn get_by_name(&self, name: &str) -> Option<ModuleHandle> {
        let inner = self.inner.read();
        let uuid = inner.name_to_uuid.get(name)?;
        inner.by_uuid.get(uuid).cloned()
    }

    pub fn get_by_uuid(&self, uuid: Uuid) -> Option<ModuleHandle> {
        self.inner.read().by_uuid.get(&uuid).cloned()
    }

    pub fn remove(&self, name: &str) -> EngineResult<()> {
        let mut inner = self.inner.write();
        let uuid = inner
            .name_to_uuid
            .remove(name)
            .ok_or_else(|| EngineError::NotFound(format!("module '{name}'")))?;
        inner.by_uuid.remove(&uuid);
        Ok(())
    }

    /// Stable (insertion order) iteration over every registered instance
    /// name, without holding the lock during the callback.
    pub fn for_each_module(&self, mut f: impl FnMut(&str, &ModuleHandle)) {
        let names: Vec<(String, ModuleHandle)> = {
            let inner = self.inner.read();
            inner
                .name_to_uuid
                .iter()
                .filter_map(|(name, uuid)| inner.by_uuid.get(uuid).map(|h| (name.clone(), h.clone())))
                .collect()
        };
        for (name, handle) in &names {
            f(name, handle);
        }
    }

    pub fn instance_names(&self) -> Vec<String> {
        self.inner.read().name_to_uuid.keys().cloned().collect()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_uuid.clear();
        inner.name_to_uuid.clear();
    }

    /// Creates a master audio output and master video output with known
    /// names if they do not already exist. This is the only place the core
    /// knows those names.
    pub fn ensure_system_modules(&self, output_type: &str) {
        if self.get_by_name(MASTER_AUDIO_OUTPUT).is_none() && self.has_type(output_type) {
            let _ = self.create(output_type, Some(MASTER_AUDIO_OUTPUT));
        }
        if self.get_by_name(MASTER_VIDEO_OUTPUT).is_none() && self.has_type(output_type) {
            let _ = self.create(output_type, Some(MASTER_VIDEO_OUTPUT));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::output::Output;

    fn create_output(identity: ModuleIdentity) -> Box<dyn Module> {
        Box::new(Output::new(identity))
    }

    #[test]
    fn auto_generated_names_are_collision_free() {
        let registry = ModuleRegistry::new();
        registry.register_type("Output", create_output);
        let a = registry.create("Output", None).unwrap();
        let b = registry.create("Output", None).unwrap();
        assert_ne!(a.read().identity().instance_name, b.read().identity().instance_name);
    }

    #[test]
    fn duplicate_requested_name_is_rejected() {
        let registry = ModuleRegistry::new();
        registry.register_type("Output", create_output);
        registry.create("Output", Some("out1")).unwrap();
        assert!(registry.create("Output", Some("out1")).is_err());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let registry = ModuleRegistry::new();
        assert!(registry.create("NoSuchType", None).is_err());
    }

    #[test]
    fn ensure_system_modules_is_idempotent() {
        let registry = ModuleRegistry::new();
        registry.register_type("Output", create_output);
        registry.ensure_system_modules("Output");
        registry.ensure_system_modules("Output");
        assert_eq!(
            registry
                .instance_names()
                .iter()
                .filter(|n| n.as_str() == MASTER_AUDIO_OUTPUT)
                .count(),
            1
        );
    }
}
