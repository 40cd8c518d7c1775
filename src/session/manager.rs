// src/session/manager.rs
//
// Session persistence: synchronous load, asynchronous save via a single
// background serialization thread, legacy single-file migration, and
// optional periodic autosave.
//
// Grounded on the teacher's UI/engine channel style (a plain blocking
// `std::sync::mpsc` pair, not `rtrb` — this path is not real-time) and on
// `original_source/src/core/SessionManager.cpp`'s async-save-queue /
// `.migrated`-suffix legacy path, since the teacher itself has no
// session-file persistence layer at all (see DESIGN.md).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::modules::Mixer;
use crate::state::EngineState;

const QUEUE_CAPACITY: usize = 8;
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(100);
const SESSION_VERSION: &str = "1.0";

/// One pending write, as enqueued by `save_session_async`.
pub struct SerializationRequest {
    pub file_path: PathBuf,
    pub snapshot: Arc<EngineState>,
    pub snapshot_version: u64,
    pub timestamp: DateTime<Utc>,
}

type PostLoadObserver = Box<dyn Fn() + Send + Sync>;

/// Owns the background serialization thread and (optionally) a periodic
/// autosave thread. Both are stopped and joined on `Drop`.
pub struct SessionManager {
    engine: Arc<Engine>,
    request_tx: SyncSender<SerializationRequest>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    autosave: Mutex<Option<JoinHandle<()>>>,
    last_path: Mutex<Option<PathBuf>>,
    post_load_observers: RwLock<Vec<PostLoadObserver>>,
}

impl SessionManager {
    pub fn new(engine: Arc<Engine>) -> Arc<Self> {
        let (request_tx, request_rx) = mpsc::sync_channel(QUEUE_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));

        let worker = spawn_worker(engine.clone(), request_rx, stop.clone());

        Arc::new(Self {
            engine,
            request_tx,
            stop,
            worker: Mutex::new(Some(worker)),
            autosave: Mutex::new(None),
            last_path: Mutex::new(None),
            post_load_observers: RwLock::new(Vec::new()),
        })
    }

    pub fn on_loaded(&self, f: impl Fn() + Send + Sync + 'static) {
        self.post_load_observers.write().push(Box::new(f));
    }

    fn notify_loaded(&self) {
        for f in self.post_load_observers.read().iter() {
            f();
        }
    }

    // ------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------

    /// Enqueues a save of the current snapshot. Never blocks; a full queue
    /// is reported as `QueueFull` rather than applying backpressure to the
    /// caller.
    pub fn save_session_async(&self, path: impl Into<PathBuf>) -> EngineResult<()> {
        let path = path.into();
        *self.last_path.lock() = Some(path.clone());

        let snapshot = self.engine.get_state_snapshot();
        let request = SerializationRequest {
            file_path: path,
            snapshot_version: snapshot.version,
            snapshot,
            timestamp: Utc::now(),
        };
        self.request_tx.try_send(request).map_err(|_| {
            log::warn!("session save queue full, dropping save request");
            EngineError::QueueFull
        })
    }

    /// Starts a periodic autosave loop at `engine.config().autosave_interval`.
    /// A no-op (with a warning) if no interval is configured. Only one
    /// autosave loop may run at a time; calling this again replaces it.
    pub fn start_autosave(self: &Arc<Self>, path: impl Into<PathBuf>) {
        let Some(interval) = self.engine.config().autosave_interval else {
            log::warn!("start_autosave called with no autosave_interval configured");
            return;
        };
        let path = path.into();
        let manager = self.clone();
        let stop = self.stop.clone();
        let handle = thread::spawn(move || {
            let period = Duration::from_secs_f64(interval.max(0.1));
            loop {
                thread::sleep(period);
                if stop.load(Ordering::Acquire) {
                    break;
                }
                if let Err(e) = manager.save_session_async(path.clone()) {
                    log::warn!("autosave failed to enqueue: {e}");
                }
            }
        });
        *self.autosave.lock() = Some(handle);
    }

    /// Best-effort synchronous save performed on shutdown, bypassing the
    /// queue entirely so it can't be dropped by a full channel.
    pub fn save_session_sync(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let snapshot = self.engine.get_state_snapshot();
        write_snapshot(&self.engine, path.as_ref(), &snapshot, Utc::now())
    }

    /// Stops autosave and the background writer, attempting one final
    /// synchronous save first if a path is known. Safe to call more than
    /// once.
    pub fn shutdown(&self) {
        if let Some(path) = self.last_path.lock().clone() {
            if let Err(e) = self.save_session_sync(&path) {
                log::warn!("best-effort save on shutdown failed: {e}");
            }
        }
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.autosave.lock().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    // ------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------

    /// Loads a session file synchronously on the calling thread.
    pub fn load_session(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| EngineError::SerializationFailed(e.to_string()))?;
        let mut root: Value =
            serde_json::from_str(&raw).map_err(|e| EngineError::SerializationFailed(e.to_string()))?;

        if root.get("version").and_then(Value::as_str).is_none() {
            root = self.migrate_legacy(path)?;
        } else if root.get("version").and_then(Value::as_str) != Some(SESSION_VERSION) {
            log::warn!(
                "session '{}' has unknown version, loading in best-effort mode",
                path.display()
            );
        }

        self.engine.registry().clear();
        self.engine.connections().clear();
        self.engine.router().clear();

        self.load_modules(&root)?;

        if let Some(routing) = root.get("modules").and_then(|m| m.get("routing")) {
            self.engine.router().from_json(routing)?;
        }
        if let Some(connections) = root.get("modules").and_then(|m| m.get("connections")) {
            self.engine.connections().from_json(connections)?;
        }
        if let Some(pattern_runtime) = root.get("patternRuntime") {
            self.engine.patterns().from_json(pattern_runtime)?;
        }
        if let Some(clock) = root.get("clock") {
            if let Some(bpm) = clock.get("bpm").and_then(Value::as_f64) {
                self.engine.enqueue(crate::command::Command::SetBpm { bpm: bpm as f32 })?;
            }
        }

        self.engine.initialize_all_modules(true);
        self.restore_mixer_parameters();
        self.validate_sequencer_bindings();

        *self.last_path.lock() = Some(path.to_path_buf());
        self.notify_loaded();
        Ok(())
    }

    fn load_modules(&self, root: &Value) -> EngineResult<()> {
        let registry = self.engine.registry();
        let instances = root
            .get("modules")
            .and_then(|m| m.get("instances"))
            .and_then(Value::as_object);

        if let Some(instances) = instances {
            for record in instances.values() {
                let Some(type_name) = record.get("type").and_then(Value::as_str) else {
                    log::warn!("session record missing 'type', skipping");
                    continue;
                };
                let name = record.get("name").and_then(Value::as_str);
                let handle = match registry.create(type_name, name) {
                    Ok(handle) => handle,
                    Err(e) => {
                        log::warn!("failed to recreate module '{type_name}': {e}");
                        continue;
                    }
                };
                let mut module = handle.write();
                if let Some(enabled) = record.get("enabled").and_then(Value::as_bool) {
                    module.set_enabled(enabled);
                }
                if let Some(data) = record.get("data") {
                    if let Err(e) = module.from_json(data) {
                        log::warn!("module '{type_name}' failed to restore its data: {e}");
                    }
                }
                if let Some(parameters) = record.get("parameters").and_then(Value::as_object) {
                    for (name, value) in parameters {
                        if let Some(f) = value.as_f64() {
                            let _ = module.set_parameter(name, f as f32, false);
                        }
                    }
                }
            }
        }

        // Legacy single-file sequencer import: land it on the first
        // Sequencer instance, creating one if the migration produced none.
        if let Some(legacy_sequencer) = root.get("legacy").and_then(|l| l.get("sequencerSnapshot")) {
            let first_sequencer = registry.instance_names().into_iter().find(|name| {
                registry
                    .get_by_name(name)
                    .map(|h| h.read().identity().type_name == crate::modules::type_names::SEQUENCER)
                    .unwrap_or(false)
            });
            let handle = match first_sequencer {
                Some(name) => registry.get_by_name(&name),
                None => registry.create(crate::modules::type_names::SEQUENCER, None).ok(),
            };
            if let Some(handle) = handle {
                if let Err(e) = handle.write().from_json(legacy_sequencer) {
                    log::warn!("legacy sequencer import failed: {e}");
                }
            }
        }

        Ok(())
    }

    /// Ensures each Mixer's channel-volume map has an entry for every audio
    /// connection now targeting it. Most of the time this is a no-op —
    /// `Mixer::from_json` already restored its own map — but it also covers
    /// a connection that exists in the topology without a corresponding
    /// persisted channel entry.
    fn restore_mixer_parameters(&self) {
        for connection in self.engine.connections().all() {
            let Some(handle) = self.engine.registry().get_by_name(&connection.target_module) else {
                continue;
            };
            let mut module = handle.write();
            if let Some(mixer) = module.as_any_mut().downcast_mut::<Mixer>() {
                let current = mixer.channel_volume(&connection.source_module);
                mixer.restore_channel_volume(&connection.source_module, current);
            }
        }
    }

    /// Clears any sequencer binding whose `patternName` no longer resolves,
    /// satisfying the "no dangling bindings" invariant after a load.
    fn validate_sequencer_bindings(&self) {
        for name in self.engine.registry().instance_names() {
            let Some(binding) = self.engine.patterns().binding(&name) else {
                continue;
            };
            if binding.has_pattern() && self.engine.patterns().get_pattern(&binding.pattern_name).is_none() {
                log::warn!(
                    "sequencer '{name}' bound to missing pattern '{}', clearing",
                    binding.pattern_name
                );
                self.engine.patterns().clear_bindings_to_pattern(&binding.pattern_name);
            }
        }
    }

    /// Produces a current-format root from an old, versionless file: a
    /// single legacy sequencer snapshot (`<stem>.sequencer.json`) is staged
    /// for import into the first sequencer module, and any loose
    /// `*.legacy.json` siblings are folded into `legacy.consolidated`. Every
    /// file touched is renamed with a `.migrated` suffix.
    fn migrate_legacy(&self, path: &Path) -> EngineResult<Value> {
        log::warn!(
            "session '{}' has no version field, attempting legacy migration",
            path.display()
        );

        let mut root = serde_json::json!({
            "version": SESSION_VERSION,
            "clock": { "bpm": 120.0, "isPlaying": false },
            "modules": { "instances": {}, "connections": {}, "routing": [] },
            "patternRuntime": {},
            "legacy": {},
        });

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("session");

        let legacy_sequencer = dir.join(format!("{stem}.sequencer.json"));
        if legacy_sequencer.is_file() {
            match self.read_and_migrate(&legacy_sequencer) {
                Ok(value) => root["legacy"]["sequencerSnapshot"] = value,
                Err(e) => log::warn!("failed to migrate '{}': {e}", legacy_sequencer.display()),
            }
        }

        if let Ok(entries) = fs::read_dir(dir) {
            let mut consolidated = serde_json::Map::new();
            for entry in entries.flatten() {
                let entry_path = entry.path();
                let is_legacy_loose = entry_path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| s.ends_with(".legacy"))
                    .unwrap_or(false);
                if !is_legacy_loose {
                    continue;
                }
                let key = entry_path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("legacy")
                    .to_string();
                match self.read_and_migrate(&entry_path) {
                    Ok(value) => {
                        consolidated.insert(key, value);
                    }
                    Err(e) => log::warn!("failed to migrate '{}': {e}", entry_path.display()),
                }
            }
            if !consolidated.is_empty() {
                root["legacy"]["consolidated"] = Value::Object(consolidated);
            }
        }

        Ok(root)
    }

    /// Reads `path` as JSON, then renames it with a `.migrated` suffix so a
    /// repeated load doesn't re-import the same legacy file.
    fn read_and_migrate(&self, path: &Path) -> EngineResult<Value> {
        let data = fs::read_to_string(path).map_err(|e| EngineError::MigrationFailed(e.to_string()))?;
        let value: Value = serde_json::from_str(&data).map_err(|e| EngineError::MigrationFailed(e.to_string()))?;

        let mut migrated_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        migrated_name.push(".migrated");
        let migrated_path = path.with_file_name(migrated_name);
        fs::rename(path, &migrated_path).map_err(|e| EngineError::MigrationFailed(e.to_string()))?;

        Ok(value)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.autosave.lock().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

fn spawn_worker(engine: Arc<Engine>, rx: Receiver<SerializationRequest>, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        loop {
            match rx.recv_timeout(DEQUEUE_TIMEOUT) {
                Ok(mut request) => {
                    if request.snapshot_version < engine.state_version() {
                        request.snapshot = engine.get_state_snapshot();
                        request.snapshot_version = request.snapshot.version;
                    }
                    if let Err(e) = write_snapshot(&engine, &request.file_path, &request.snapshot, request.timestamp) {
                        log::error!("session save to '{}' failed: {e}", request.file_path.display());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    })
}

fn write_snapshot(
    engine: &Arc<Engine>,
    file_path: &Path,
    snapshot: &Arc<EngineState>,
    timestamp: DateTime<Utc>,
) -> EngineResult<()> {
    let root = build_root(engine, snapshot, timestamp);
    let json = serde_json::to_string_pretty(&root).map_err(|e| EngineError::SerializationFailed(e.to_string()))?;

    if file_path.exists() {
        let mut backup_name = file_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        backup_name.push(".backup");
        let backup_path = file_path.with_file_name(backup_name);
        fs::copy(file_path, &backup_path).map_err(|e| EngineError::SerializationFailed(e.to_string()))?;
    }

    fs::write(file_path, json).map_err(|e| EngineError::SerializationFailed(e.to_string()))
}

fn build_root(engine: &Arc<Engine>, snapshot: &Arc<EngineState>, timestamp: DateTime<Utc>) -> Value {
    let instances: serde_json::Map<String, Value> = snapshot
        .modules
        .values()
        .map(|module| {
            (
                module.uuid.to_string(),
                serde_json::json!({
                    "uuid": module.uuid,
                    "name": module.name,
                    "type": module.type_name,
                    "enabled": module.enabled,
                    "parameters": module.parameters,
                    "data": module.data,
                }),
            )
        })
        .collect();

    serde_json::json!({
        "version": SESSION_VERSION,
        "metadata": { "modified": timestamp.to_rfc3339() },
        "clock": {
            "bpm": snapshot.transport.bpm,
            "isPlaying": snapshot.transport.is_playing,
            "currentBeat": snapshot.transport.current_beat,
        },
        "modules": {
            "instances": instances,
            "connections": engine.connections().to_json(),
            "routing": engine.router().to_json(),
        },
        "patternRuntime": engine.patterns().to_json(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::command::Command;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("stagecore-session-test-{name}-{}.json", std::process::id()))
    }

    #[test]
    fn save_then_load_round_trips_bpm() {
        let engine = Engine::new(EngineConfig::new(48_000.0));
        engine.enqueue(Command::SetBpm { bpm: 133.0 }).unwrap();
        engine.run_callback(0);

        let manager = SessionManager::new(engine.clone());
        let path = temp_path("roundtrip");
        manager.save_session_sync(&path).unwrap();

        let engine2 = Engine::new(EngineConfig::new(48_000.0));
        let manager2 = SessionManager::new(engine2.clone());
        manager2.load_session(&path).unwrap();
        engine2.run_callback(0);

        assert_eq!(engine2.bpm(), 133.0);
        let _ = fs::remove_file(&path);
        let mut backup_name = path.file_name().unwrap().to_os_string();
        backup_name.push(".backup");
        let _ = fs::remove_file(path.with_file_name(backup_name));
    }

    #[test]
    fn loading_versionless_file_does_not_error() {
        let engine = Engine::new(EngineConfig::new(48_000.0));
        let manager = SessionManager::new(engine);
        let path = temp_path("legacy");
        fs::write(&path, r#"{"someOldKey": 1}"#).unwrap();

        assert!(manager.load_session(&path).is_ok());
        let _ = fs::remove_file(&path);
    }

    /// A request enqueued with a stale snapshot must be refreshed to the
    /// engine's current snapshot before the worker writes it, so the file
    /// ends up reflecting a BPM change that committed after the request was
    /// built (§4.8, Scenario F). Built directly against `request_tx` rather
    /// than racing `save_session_async` against the audio-thread drain on a
    /// background thread, which would make the outcome timing-dependent.
    #[test]
    fn scenario_f_async_save_refreshes_stale_snapshot() {
        let engine = Engine::new(EngineConfig::new(48_000.0));
        let stale_snapshot = engine.get_state_snapshot();
        assert_eq!(stale_snapshot.version, 0);

        engine.enqueue(Command::SetBpm { bpm: 130.0 }).unwrap();
        engine.run_callback(0);
        assert!(engine.state_version() >= 1);

        let manager = SessionManager::new(engine.clone());
        let path = temp_path("async-save");
        manager
            .request_tx
            .try_send(SerializationRequest {
                file_path: path.clone(),
                snapshot: stale_snapshot,
                snapshot_version: 0,
                timestamp: Utc::now(),
            })
            .unwrap();

        manager.shutdown();

        let raw = fs::read_to_string(&path).unwrap();
        let root: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(root["clock"]["bpm"].as_f64(), Some(130.0));

        let _ = fs::remove_file(&path);
        let mut backup_name = path.file_name().unwrap().to_os_string();
        backup_name.push(".backup");
        let _ = fs::remove_file(path.with_file_name(backup_name));
    }

    #[test]
    fn validate_sequencer_bindings_clears_dangling_reference() {
        let engine = Engine::new(EngineConfig::new(48_000.0));
        engine
            .enqueue(Command::AddModule { type_name: "Sequencer".into(), instance_name: Some("seq1".into()) })
            .unwrap();
        engine.run_callback(0);
        engine.patterns().set_binding("seq1", "ghost-pattern", false);

        let manager = SessionManager::new(engine.clone());
        manager.validate_sequencer_bindings();

        assert!(engine.patterns().binding("seq1").unwrap().pattern_name.is_empty());
    }
}
