// src/engine.rs
//
// The command queue owner and snapshot publisher. Engine is the single
// object shared between UI threads (which enqueue commands and read
// snapshots) and the audio thread (which drains commands, advances the
// clock, and runs pattern evaluation once per callback).
//
// Locking discipline: each owned subsystem guards its own state (see
// clock.rs, registry/mod.rs, connection.rs, routing.rs, pattern/runtime.rs).
// Engine itself never nests a lock from one subsystem inside a lock from
// another; the command queue is lock-free (queue.rs); the published
// snapshot is swapped under a short, uncontended RwLock read/write rather
// than a true atomic pointer — this stack has no `arc-swap` dependency, so
// a single-writer RwLock swap is the closest approximation to the
// lock-free publication the design calls for.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::clock::Clock;
use crate::command::{Command, CommandResult};
use crate::config::EngineConfig;
use crate::connection::{ConnectionInfo, ConnectionManager};
use crate::error::{EngineError, EngineResult};
use crate::modules::{Module, ModuleContext, ModuleIdentity};
use crate::pattern::{Pattern, PatternRuntime, TriggerEvent};
use crate::queue::{AudioCommandHandle, UiCommandHandle, create_command_queue};
use crate::registry::{ModuleHandle, ModuleRegistry};
use crate::routing::ParameterRouter;
use crate::state::{EngineState, ModuleState, PatternSummary, TransportSnapshot};

/// Observer list is bounded: Engine is a core runtime object, not a general
/// pub/sub bus, and an unbounded observer list would let a leaked
/// subscription grow without limit.
const MAX_OBSERVERS: usize = 64;

type SnapshotObserver = Box<dyn Fn(&Arc<EngineState>) + Send + Sync>;

thread_local! {
    /// Set for the duration of a snapshot rebuild + observer notification on
    /// whichever thread is doing the publishing. Lets an observer that might
    /// itself trigger a rebuild (e.g. a synchronous UI handler) detect
    /// re-entrancy and bail out instead of recursing.
    static BUILDING_SNAPSHOT: Cell<bool> = const { Cell::new(false) };
}

/// `true` iff the calling thread is currently inside Engine's own
/// snapshot-rebuild-and-notify phase.
pub fn is_building_snapshot() -> bool {
    BUILDING_SNAPSHOT.with(|flag| flag.get())
}

pub struct Engine {
    config: EngineConfig,
    clock: RwLock<Clock>,
    registry: Arc<ModuleRegistry>,
    patterns: Arc<PatternRuntime>,
    connections: ConnectionManager,
    router: ParameterRouter,

    ui_handle: Mutex<UiCommandHandle>,
    audio_handle: Mutex<AudioCommandHandle>,

    state_version: AtomicU64,
    snapshot: RwLock<Arc<EngineState>>,

    commands_being_processed: AtomicBool,
    executing_script: AtomicBool,
    rendering: AtomicBool,

    observers: RwLock<Vec<SnapshotObserver>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        let registry = Arc::new(ModuleRegistry::new());
        crate::modules::register_standard_modules(&registry);
        registry.ensure_system_modules(crate::modules::type_names::OUTPUT);

        let patterns = Arc::new(PatternRuntime::new());
        let (ui_handle, audio_handle) = create_command_queue(config.command_queue_capacity);

        let empty_state = Arc::new(EngineState {
            version: 0,
            transport: TransportSnapshot {
                is_playing: false,
                bpm: 120.0,
                current_beat: 0.0,
            },
            modules: HashMap::new(),
            connections: Vec::new(),
            patterns: HashMap::new(),
        });

        let engine = Arc::new(Self {
            clock: RwLock::new(Clock::new(config.sample_rate)),
            config,
            registry: registry.clone(),
            patterns: patterns.clone(),
            connections: ConnectionManager::new(),
            router: ParameterRouter::new(),
            ui_handle: Mutex::new(ui_handle),
            audio_handle: Mutex::new(audio_handle),
            state_version: AtomicU64::new(0),
            snapshot: RwLock::new(empty_state),
            commands_being_processed: AtomicBool::new(false),
            executing_script: AtomicBool::new(false),
            rendering: AtomicBool::new(false),
            observers: RwLock::new(Vec::new()),
        });

        // Wire trigger dispatch: a fired step is forwarded to every module
        // whose sequencer binding currently names that pattern. This is the
        // one place Engine reaches past the uniform Module contract's
        // `receive_trigger` hook — PatternRuntime has no concept of modules.
        let dispatch_registry = registry.clone();
        let dispatch_patterns = patterns.clone();
        patterns.on_trigger(move |event: &TriggerEvent| {
            for sequencer_name in dispatch_patterns.bound_sequencers(&event.pattern_name) {
                if let Some(handle) = dispatch_registry.get_by_name(&sequencer_name) {
                    handle.write().receive_trigger(event);
                }
            }
        });

        engine
    }

    // ------------------------------------------------------------------
    // Accessors (read-only collaborators for SessionManager / ScriptManager)
    // ------------------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn patterns(&self) -> &PatternRuntime {
        &self.patterns
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn router(&self) -> &ParameterRouter {
        &self.router
    }

    pub fn bpm(&self) -> f32 {
        self.clock.read().bpm()
    }

    pub fn is_playing(&self) -> bool {
        self.clock.read().is_playing()
    }

    pub fn state_version(&self) -> u64 {
        self.state_version.load(Ordering::Acquire)
    }

    pub fn commands_being_processed(&self) -> bool {
        self.commands_being_processed.load(Ordering::Acquire)
    }

    pub fn is_executing_script(&self) -> bool {
        self.executing_script.load(Ordering::Acquire)
    }

    pub fn set_executing_script(&self, value: bool) {
        self.executing_script.store(value, Ordering::Release);
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering.load(Ordering::Acquire)
    }

    pub fn set_rendering(&self, value: bool) {
        self.rendering.store(value, Ordering::Release);
    }

    // ------------------------------------------------------------------
    // UI-thread API
    // ------------------------------------------------------------------

    /// Enqueues a command for the next audio-thread drain. Never blocks; on
    /// a full queue the command is rejected so the caller can log and drop,
    /// or apply its own synchronous fallback for a latency-insensitive path.
    pub fn enqueue(&self, command: Command) -> EngineResult<()> {
        self.ui_handle.lock().enqueue(command)
    }

    /// Drains any `CommandResult`s published since the last call. Never blocks.
    pub fn poll_results(&self) -> Vec<CommandResult> {
        self.ui_handle.lock().poll_results()
    }

    /// Read of the latest published snapshot. See module docs for why this
    /// is an RwLock-guarded `Arc` swap rather than a literal atomic pointer.
    pub fn get_state_snapshot(&self) -> Arc<EngineState> {
        self.snapshot.read().clone()
    }

    /// Materialises a fresh `EngineState` directly from live subsystem
    /// state. Slower than `get_state_snapshot`; must not be called from the
    /// audio thread.
    pub fn get_state(&self) -> EngineState {
        self.build_state(self.state_version())
    }

    pub fn on_snapshot(&self, f: impl Fn(&Arc<EngineState>) + Send + Sync + 'static) {
        let mut observers = self.observers.write();
        if observers.len() >= MAX_OBSERVERS {
            log::warn!("snapshot observer list at capacity ({MAX_OBSERVERS}), dropping new subscription");
            return;
        }
        observers.push(Box::new(f));
    }

    // ------------------------------------------------------------------
    // Audio-thread API
    // ------------------------------------------------------------------

    /// Drains the command queue, applies each command, and — if at least
    /// one succeeded — bumps `stateVersion` and publishes a fresh snapshot.
    /// Called once per audio callback, before `advance`.
    pub fn process_commands(&self) {
        self.commands_being_processed.store(true, Ordering::Release);
        let commands = self.audio_handle.lock().drain();

        let mut applied = 0u32;
        for command in commands {
            let kind = command.kind();
            let (result, ok) = match self.apply_command(command) {
                Ok(result) => (result, true),
                Err(error) => {
                    log::warn!("command '{kind}' failed: {error}");
                    (CommandResult::Error { message: error.to_string() }, false)
                }
            };
            if ok {
                applied += 1;
            }
            self.audio_handle.lock().send_result(result);
        }

        self.commands_being_processed.store(false, Ordering::Release);

        if applied > 0 {
            self.bump_and_publish();
        }
    }

    /// Advances Clock by `n_frames` and runs one PatternRuntime evaluation.
    /// Called once per audio callback, after `process_commands`.
    pub fn advance(&self, n_frames: u32) {
        self.clock.write().tick(n_frames);
        let clock = self.clock.read();
        self.patterns.evaluate(&clock, n_frames);
    }

    /// Convenience wrapper combining the two audio-thread calls above, for
    /// callers (tests, the demo binary) that don't need to interleave work
    /// between them.
    pub fn run_callback(&self, n_frames: u32) {
        self.process_commands();
        self.advance(n_frames);
    }

    // ------------------------------------------------------------------
    // Command application
    // ------------------------------------------------------------------

    fn apply_command(&self, command: Command) -> EngineResult<CommandResult> {
        match command {
            Command::SetBpm { bpm } => {
                self.clock.write().set_bpm(bpm);
                Ok(CommandResult::Ok)
            }
            Command::StartTransport => {
                self.clock.write().start();
                Ok(CommandResult::Ok)
            }
            Command::StopTransport => {
                self.clock.write().stop();
                Ok(CommandResult::Ok)
            }
            Command::ResetTransport => {
                self.clock.write().reset();
                Ok(CommandResult::Ok)
            }
            Command::AddModule { type_name, instance_name } => {
                let handle = self.registry.create(&type_name, instance_name.as_deref())?;
                let created_name = handle.read().identity().instance_name.clone();
                self.initialize_module(&handle, false);
                Ok(CommandResult::ModuleCreated { instance_name: created_name })
            }
            Command::RemoveModule { instance_name } => {
                self.registry.remove(&instance_name)?;
                self.connections.drop_connections_for_module(&instance_name);
                Ok(CommandResult::Ok)
            }
            Command::SetParameter { instance_name, parameter_name, value, broadcast } => {
                let handle = self
                    .registry
                    .get_by_name(&instance_name)
                    .ok_or_else(|| EngineError::NotFound(format!("module '{instance_name}'")))?;
                handle.write().set_parameter(&parameter_name, value, broadcast)?;
                Ok(CommandResult::Ok)
            }
            Command::SetModuleEnabled { instance_name, enabled } => {
                let handle = self
                    .registry
                    .get_by_name(&instance_name)
                    .ok_or_else(|| EngineError::NotFound(format!("module '{instance_name}'")))?;
                handle.write().set_enabled(enabled);
                Ok(CommandResult::Ok)
            }
            Command::Connect { source, target, connection_type, source_path, target_path } => {
                self.connections.connect(ConnectionInfo {
                    source_module: source,
                    target_module: target,
                    connection_type,
                    source_path,
                    target_path,
                    event_name: String::new(),
                    active: true,
                });
                Ok(CommandResult::Ok)
            }
            Command::Disconnect { source, target, connection_type, source_path, target_path } => {
                self.connections
                    .disconnect(&source, &target, connection_type, &source_path, &target_path)?;
                Ok(CommandResult::Ok)
            }
            Command::AddPattern { name, step_count, steps_per_beat } => {
                let pattern = Pattern::new(step_count, steps_per_beat)?;
                let created = self.patterns.add_pattern(name, pattern);
                Ok(CommandResult::ModuleCreated { instance_name: created })
            }
            Command::RemovePattern { name } => {
                self.patterns.remove_pattern(&name)?;
                self.patterns.clear_bindings_to_pattern(&name);
                Ok(CommandResult::Ok)
            }
            Command::SetStep { pattern_name, step_index, step } => {
                let mut pattern = self
                    .patterns
                    .get_pattern(&pattern_name)
                    .ok_or_else(|| EngineError::NotFound(format!("pattern '{pattern_name}'")))?;
                pattern.set_step(step_index, step)?;
                self.patterns.update_pattern(&pattern_name, pattern)?;
                Ok(CommandResult::Ok)
            }
            Command::AddChain { name } => {
                let created = self.patterns.add_chain(name);
                Ok(CommandResult::ModuleCreated { instance_name: created })
            }
            Command::ChainAddEntry { chain_name, entry } => {
                self.patterns.chain_add_entry(&chain_name, entry)?;
                Ok(CommandResult::Ok)
            }
            Command::ChainSetEnabled { chain_name, enabled } => {
                self.patterns.chain_set_enabled(&chain_name, enabled)?;
                Ok(CommandResult::Ok)
            }
            Command::BindSequencerPattern { sequencer_name, pattern_name } => {
                self.patterns
                    .set_binding(&sequencer_name, &pattern_name, self.clock.read().is_playing());
                Ok(CommandResult::Ok)
            }
            Command::BindSequencerChain { sequencer_name, chain_name, chain_enabled } => {
                self.patterns.set_binding_chain(&sequencer_name, &chain_name, chain_enabled);
                Ok(CommandResult::Ok)
            }
            Command::ModuleCommand { instance_name, payload } => {
                let handle = self
                    .registry
                    .get_by_name(&instance_name)
                    .ok_or_else(|| EngineError::NotFound(format!("module '{instance_name}'")))?;
                handle.write().handle_command(&payload)?;
                Ok(CommandResult::Ok)
            }
        }
    }

    fn initialize_module(&self, handle: &ModuleHandle, is_restored: bool) {
        let clock = self.clock.read();
        let context = ModuleContext {
            clock: &clock,
            registry: &self.registry,
            connections: &self.connections,
            router: &self.router,
            pattern_runtime: &self.patterns,
            is_restored,
        };
        handle.write().initialize(&context);
    }

    /// Re-runs `initialize(isRestored=true)` for every registered module.
    /// Used by SessionManager after a full load.
    pub fn initialize_all_modules(&self, is_restored: bool) {
        let names = self.registry.instance_names();
        for name in names {
            if let Some(handle) = self.registry.get_by_name(&name) {
                self.initialize_module(&handle, is_restored);
            }
        }
    }

    // ------------------------------------------------------------------
    // Snapshot publication
    // ------------------------------------------------------------------

    fn bump_and_publish(&self) {
        let version = self.state_version.fetch_add(1, Ordering::AcqRel) + 1;
        let state = Arc::new(self.build_state(version));
        *self.snapshot.write() = state.clone();

        BUILDING_SNAPSHOT.with(|flag| flag.set(true));
        for observer in self.observers.read().iter() {
            observer(&state);
        }
        BUILDING_SNAPSHOT.with(|flag| flag.set(false));
    }

    fn build_state(&self, version: u64) -> EngineState {
        let clock = self.clock.read();
        let transport = TransportSnapshot {
            is_playing: clock.is_playing(),
            bpm: clock.bpm(),
            current_beat: clock.current_beat(),
        };
        drop(clock);

        let mut modules = HashMap::new();
        self.registry.for_each_module(|name, handle| {
            let module = handle.read();
            let identity: &ModuleIdentity = module.identity();
            modules.insert(
                name.to_string(),
                ModuleState {
                    uuid: identity.uuid,
                    name: identity.instance_name.clone(),
                    type_name: identity.type_name.clone(),
                    enabled: module.enabled(),
                    parameters: module
                        .parameters()
                        .into_iter()
                        .filter_map(|descriptor| {
                            module.get_parameter(&descriptor.name).map(|value| (descriptor.name, value))
                        })
                        .collect(),
                    data: module.to_json(),
                },
            );
        });

        let patterns = self
            .patterns
            .pattern_names()
            .into_iter()
            .filter_map(|name| {
                let step_count = self.patterns.get_pattern(&name)?.step_count();
                Some((name, PatternSummary { step_count }))
            })
            .collect();

        EngineState {
            version,
            transport,
            modules,
            connections: self.connections.all(),
            patterns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Step;

    fn test_engine() -> Arc<Engine> {
        Engine::new(EngineConfig::new(48_000.0).command_queue_capacity(64))
    }

    #[test]
    fn state_version_is_monotonic_across_drains() {
        let engine = test_engine();
        assert_eq!(engine.state_version(), 0);
        engine.enqueue(Command::SetBpm { bpm: 130.0 }).unwrap();
        engine.run_callback(0);
        assert_eq!(engine.state_version(), 1);
        engine.enqueue(Command::StartTransport).unwrap();
        engine.run_callback(0);
        assert_eq!(engine.state_version(), 2);
    }

    #[test]
    fn failed_command_does_not_bump_version() {
        let engine = test_engine();
        engine
            .enqueue(Command::RemoveModule { instance_name: "nope".into() })
            .unwrap();
        engine.run_callback(0);
        assert_eq!(engine.state_version(), 0);
    }

    #[test]
    fn snapshot_reflects_committed_bpm() {
        let engine = test_engine();
        engine.enqueue(Command::SetBpm { bpm: 140.0 }).unwrap();
        engine.run_callback(0);
        let snapshot = engine.get_state_snapshot();
        assert_eq!(snapshot.transport.bpm, 140.0);
    }

    #[test]
    fn system_modules_exist_after_construction() {
        let engine = test_engine();
        assert!(engine.registry().get_by_name(crate::registry::MASTER_AUDIO_OUTPUT).is_some());
        assert!(engine.registry().get_by_name(crate::registry::MASTER_VIDEO_OUTPUT).is_some());
    }

    #[test]
    fn scenario_a_end_to_end_trigger_through_sequencer_module() {
        let engine = test_engine();
        engine
            .enqueue(Command::AddModule { type_name: "Sequencer".into(), instance_name: Some("seq1".into()) })
            .unwrap();
        engine
            .enqueue(Command::AddPattern { name: Some("P0".into()), step_count: 4, steps_per_beat: 4.0 })
            .unwrap();
        engine.run_callback(0);

        let mut step = Step::new();
        step.index = 5;
        step.length = 1;
        engine
            .enqueue(Command::SetStep { pattern_name: "P0".into(), step_index: 0, step })
            .unwrap();
        engine
            .enqueue(Command::BindSequencerPattern { sequencer_name: "seq1".into(), pattern_name: "P0".into() })
            .unwrap();
        engine.enqueue(Command::SetBpm { bpm: 120.0 }).unwrap();
        engine.enqueue(Command::StartTransport).unwrap();
        engine.run_callback(0);

        let samples_per_step = engine.clock.read().samples_per_step(4.0);
        engine.run_callback(samples_per_step as u32);

        let snapshot = engine.get_state_snapshot();
        assert!(snapshot.modules.contains_key("seq1"));
    }

    #[test]
    fn removing_pattern_clears_dangling_bindings() {
        let engine = test_engine();
        engine
            .enqueue(Command::AddModule { type_name: "Sequencer".into(), instance_name: Some("seq1".into()) })
            .unwrap();
        engine
            .enqueue(Command::AddPattern { name: Some("P0".into()), step_count: 4, steps_per_beat: 4.0 })
            .unwrap();
        engine.run_callback(0);
        engine
            .enqueue(Command::BindSequencerPattern { sequencer_name: "seq1".into(), pattern_name: "P0".into() })
            .unwrap();
        engine.run_callback(0);
        engine.enqueue(Command::RemovePattern { name: "P0".into() }).unwrap();
        engine.run_callback(0);

        let binding = engine.patterns().binding("seq1").unwrap();
        assert!(binding.pattern_name.is_empty());
    }

    #[test]
    fn set_parameter_on_unknown_module_is_error_result() {
        let engine = test_engine();
        engine
            .enqueue(Command::SetParameter {
                instance_name: "ghost".into(),
                parameter_name: "gain".into(),
                value: 0.5,
                broadcast: false,
            })
            .unwrap();
        engine.run_callback(0);
        let results = engine.poll_results();
        assert!(matches!(results.last(), Some(CommandResult::Error { .. })));
    }
}
