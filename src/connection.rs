// src/connection.rs
//
// Typed connection records between modules, partitioned by connection type.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionType {
    Audio,
    Video,
    Parameter,
    Event,
}

impl ConnectionType {
    pub fn as_lower_str(&self) -> &'static str {
        match self {
            ConnectionType::Audio => "audio",
            ConnectionType::Video => "video",
            ConnectionType::Parameter => "parameter",
            ConnectionType::Event => "event",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub source_module: String,
    pub target_module: String,
    pub connection_type: ConnectionType,
    pub source_path: String,
    pub target_path: String,
    pub event_name: String,
    pub active: bool,
}

impl ConnectionInfo {
    fn key(&self) -> (String, String, ConnectionType, String, String) {
        (
            self.source_module.clone(),
            self.target_module.clone(),
            self.connection_type,
            self.source_path.clone(),
            self.target_path.clone(),
        )
    }
}

#[derive(Default)]
struct Inner {
    audio: Vec<ConnectionInfo>,
    video: Vec<ConnectionInfo>,
    parameter: Vec<ConnectionInfo>,
    event: Vec<ConnectionInfo>,
}

impl Inner {
    fn bucket(&mut self, t: ConnectionType) -> &mut Vec<ConnectionInfo> {
        match t {
            ConnectionType::Audio => &mut self.audio,
            ConnectionType::Video => &mut self.video,
            ConnectionType::Parameter => &mut self.parameter,
            ConnectionType::Event => &mut self.event,
        }
    }

    fn bucket_ref(&self, t: ConnectionType) -> &Vec<ConnectionInfo> {
        match t {
            ConnectionType::Audio => &self.audio,
            ConnectionType::Video => &self.video,
            ConnectionType::Parameter => &self.parameter,
            ConnectionType::Event => &self.event,
        }
    }
}

/// Stores connection records by type; idempotent connect, typed query,
/// bulk JSON import/export.
pub struct ConnectionManager {
    inner: RwLock<Inner>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Re-issuing an identical connection is a no-op.
    pub fn connect(&self, connection: ConnectionInfo) {
        let mut inner = self.inner.write();
        let bucket = inner.bucket(connection.connection_type);
        if bucket.iter().any(|c| c.key() == connection.key()) {
            return;
        }
        bucket.push(connection);
    }

    pub fn disconnect(
        &self,
        source: &str,
        target: &str,
        connection_type: ConnectionType,
        source_path: &str,
        target_path: &str,
    ) -> EngineResult<()> {
        let mut inner = self.inner.write();
        let bucket = inner.bucket(connection_type);
        let before = bucket.len();
        bucket.retain(|c| {
            !(c.source_module == source
                && c.target_module == target
                && c.source_path == source_path
                && c.target_path == target_path)
        });
        if bucket.len() == before {
            return Err(EngineError::NotFound("connection".into()));
        }
        Ok(())
    }

    pub fn connections(&self, connection_type: ConnectionType) -> Vec<ConnectionInfo> {
        self.inner.read().bucket_ref(connection_type).clone()
    }

    /// Every connection record, across all four types, flattened for
    /// snapshot publication.
    pub fn all(&self) -> Vec<ConnectionInfo> {
        let inner = self.inner.read();
        [&inner.audio, &inner.video, &inner.parameter, &inner.event]
            .into_iter()
            .flat_map(|bucket| bucket.iter().cloned())
            .collect()
    }

    pub fn connections_for_module(&self, module_name: &str) -> Vec<ConnectionInfo> {
        let inner = self.inner.read();
        [&inner.audio, &inner.video, &inner.parameter, &inner.event]
            .into_iter()
            .flat_map(|bucket| bucket.iter())
            .filter(|c| c.source_module == module_name || c.target_module == module_name)
            .cloned()
            .collect()
    }

    /// Drops every connection referencing `module_name`, logging a warning
    /// for each one (used when a module referenced by a connection is
    /// missing at load time, or removed live).
    pub fn drop_connections_for_module(&self, module_name: &str) {
        let mut inner = self.inner.write();
        for bucket in [
            &mut inner.audio,
            &mut inner.video,
            &mut inner.parameter,
            &mut inner.event,
        ] {
            bucket.retain(|c| {
                let touches = c.source_module == module_name || c.target_module == module_name;
                if touches {
                    log::warn!(
                        "dropping connection {} -> {} referencing missing module '{module_name}'",
                        c.source_module,
                        c.target_module
                    );
                }
                !touches
            });
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        *inner = Inner::default();
    }

    pub fn to_json(&self) -> Value {
        let inner = self.inner.read();
        serde_json::json!({
            "audioConnections": inner.audio,
            "videoConnections": inner.video,
            "parameterConnections": inner.parameter,
            "eventSubscriptions": inner.event,
        })
    }

    pub fn from_json(&self, value: &Value) -> EngineResult<()> {
        let parse = |key: &str| -> EngineResult<Vec<ConnectionInfo>> {
            value
                .get(key)
                .map(|v| serde_json::from_value(v.clone()))
                .transpose()
                .map_err(|e| EngineError::SerializationFailed(e.to_string()))
                .map(|v| v.unwrap_or_default())
        };
        let mut inner = self.inner.write();
        inner.audio = parse("audioConnections")?;
        inner.video = parse("videoConnections")?;
        inner.parameter = parse("parameterConnections")?;
        inner.event = parse("eventSubscriptions")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(source: &str, target: &str) -> ConnectionInfo {
        ConnectionInfo {
            source_module: source.into(),
            target_module: target.into(),
            connection_type: ConnectionType::Audio,
            source_path: String::new(),
            target_path: String::new(),
            event_name: String::new(),
            active: true,
        }
    }

    #[test]
    fn connect_is_idempotent() {
        let manager = ConnectionManager::new();
        manager.connect(conn("s1", "t1"));
        manager.connect(conn("s1", "t1"));
        assert_eq!(manager.connections(ConnectionType::Audio).len(), 1);
    }

    #[test]
    fn disconnect_unknown_errors() {
        let manager = ConnectionManager::new();
        assert!(manager
            .disconnect("a", "b", ConnectionType::Audio, "", "")
            .is_err());
    }

    #[test]
    fn all_flattens_every_bucket() {
        let manager = ConnectionManager::new();
        manager.connect(conn("s1", "t1"));
        let mut video = conn("s2", "t2");
        video.connection_type = ConnectionType::Video;
        manager.connect(video);
        assert_eq!(manager.all().len(), 2);
    }

    #[test]
    fn round_trips_through_json() {
        let manager = ConnectionManager::new();
        manager.connect(conn("s1", "t1"));
        let json = manager.to_json();
        let restored = ConnectionManager::new();
        restored.from_json(&json).unwrap();
        assert_eq!(
            restored.connections(ConnectionType::Audio),
            manager.connections(ConnectionType::Audio)
        );
    }
}
