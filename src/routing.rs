// src/routing.rs
//
// Parameter-path grammar and the modulation routing graph.
//
// Path grammar: <instanceName>.<parameterName>[<index>]. Parsing that
// violates the grammar yields an invalid path rather than a panic.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterPath {
    pub instance_name: String,
    pub parameter_name: String,
    pub index: Option<u32>,
}

impl ParameterPath {
    pub fn parse(path: &str) -> EngineResult<Self> {
        let (instance_name, rest) = path
            .split_once('.')
            .ok_or_else(|| EngineError::InvalidArgument(format!("malformed parameter path '{path}'")))?;
        validate_identifier(instance_name, path)?;

        let (parameter_name, index) = if let Some(open) = rest.find('[') {
            if !rest.ends_with(']') {
                return Err(EngineError::InvalidArgument(format!(
                    "malformed parameter path '{path}'"
                )));
            }
            let name = &rest[..open];
            let index_str = &rest[open + 1..rest.len() - 1];
            let index: u32 = index_str
                .parse()
                .map_err(|_| EngineError::InvalidArgument(format!("malformed index in '{path}'")))?;
            (name, Some(index))
        } else {
            (rest, None)
        };
        validate_identifier(parameter_name, path)?;

        Ok(Self {
            instance_name: instance_name.to_string(),
            parameter_name: parameter_name.to_string(),
            index,
        })
    }
}

fn validate_identifier(name: &str, full_path: &str) -> EngineResult<()> {
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !first_ok || !rest_ok {
        return Err(EngineError::InvalidArgument(format!(
            "malformed parameter path '{full_path}'"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulationRoute {
    pub source: ParameterPath,
    pub target: ParameterPath,
    pub depth: f32,
}

/// Parameter-path graph for modulation routing. A source parameter may feed
/// any number of targets; a target may be fed by any number of sources.
#[derive(Default)]
pub struct ParameterRouter {
    routes: RwLock<Vec<ModulationRoute>>,
}

impl ParameterRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(&self, source: &str, target: &str, depth: f32) -> EngineResult<()> {
        let route = ModulationRoute {
            source: ParameterPath::parse(source)?,
            target: ParameterPath::parse(target)?,
            depth,
        };
        let mut routes = self.routes.write();
        if !routes.iter().any(|r| r.source == route.source && r.target == route.target) {
            routes.push(route);
        }
        Ok(())
    }

    pub fn remove_route(&self, source: &str, target: &str) -> EngineResult<()> {
        let source = ParameterPath::parse(source)?;
        let target = ParameterPath::parse(target)?;
        let mut routes = self.routes.write();
        let before = routes.len();
        routes.retain(|r| !(r.source == source && r.target == target));
        if routes.len() == before {
            return Err(EngineError::NotFound("modulation route".into()));
        }
        Ok(())
    }

    pub fn routes_targeting(&self, instance_name: &str) -> Vec<ModulationRoute> {
        self.routes
            .read()
            .iter()
            .filter(|r| r.target.instance_name == instance_name)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.routes.write().clear();
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!(self.routes.read().clone())
    }

    pub fn from_json(&self, value: &Value) -> EngineResult<()> {
        let routes: Vec<ModulationRoute> =
            serde_json::from_value(value.clone()).map_err(|e| EngineError::SerializationFailed(e.to_string()))?;
        *self.routes.write() = routes;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_path() {
        let path = ParameterPath::parse("sampler1.gain").unwrap();
        assert_eq!(path.instance_name, "sampler1");
        assert_eq!(path.parameter_name, "gain");
        assert_eq!(path.index, None);
    }

    #[test]
    fn parses_indexed_path() {
        let path = ParameterPath::parse("mixer1.volume[2]").unwrap();
        assert_eq!(path.index, Some(2));
    }

    #[test]
    fn rejects_malformed_path() {
        assert!(ParameterPath::parse("no_dot_here").is_err());
        assert!(ParameterPath::parse("1bad.name").is_err());
        assert!(ParameterPath::parse("ok.name[abc]").is_err());
    }

    #[test]
    fn route_idempotent_add() {
        let router = ParameterRouter::new();
        router.add_route("lfo1.out", "sampler1.gain", 1.0).unwrap();
        router.add_route("lfo1.out", "sampler1.gain", 1.0).unwrap();
        assert_eq!(router.routes_targeting("sampler1").len(), 1);
    }
}
