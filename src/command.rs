// src/command.rs
//
// Commands from UI threads to the Engine.
//
// Commands are the only way a UI thread may mutate engine state. They are
// queued and drained on the audio thread at the start of each callback.

use crate::pattern::ChainEntry;

/// A command enqueued by a UI thread, applied atomically by the audio
/// thread during a drain.
#[derive(Debug, Clone)]
pub enum Command {
    // ═══════════════════════════════════════════
    // Transport
    // ═══════════════════════════════════════════
    SetBpm { bpm: f32 },
    StartTransport,
    StopTransport,
    ResetTransport,

    // ═══════════════════════════════════════════
    // Modules
    // ═══════════════════════════════════════════
    AddModule {
        type_name: String,
        instance_name: Option<String>,
    },
    RemoveModule {
        instance_name: String,
    },
    SetParameter {
        instance_name: String,
        parameter_name: String,
        value: f32,
        broadcast: bool,
    },
    SetModuleEnabled {
        instance_name: String,
        enabled: bool,
    },

    // ═══════════════════════════════════════════
    // Connections
    // ═══════════════════════════════════════════
    Connect {
        source: String,
        target: String,
        connection_type: crate::connection::ConnectionType,
        source_path: String,
        target_path: String,
    },
    Disconnect {
        source: String,
        target: String,
        connection_type: crate::connection::ConnectionType,
        source_path: String,
        target_path: String,
    },

    // ═══════════════════════════════════════════
    // Patterns
    // ═══════════════════════════════════════════
    AddPattern {
        name: Option<String>,
        step_count: usize,
        steps_per_beat: f32,
    },
    RemovePattern {
        name: String,
    },
    SetStep {
        pattern_name: String,
        step_index: usize,
        step: crate::pattern::Step,
    },

    // ═══════════════════════════════════════════
    // Chains
    // ═══════════════════════════════════════════
    AddChain {
        name: Option<String>,
    },
    ChainAddEntry {
        chain_name: String,
        entry: ChainEntry,
    },
    ChainSetEnabled {
        chain_name: String,
        enabled: bool,
    },

    // ═══════════════════════════════════════════
    // Sequencer bindings
    // ═══════════════════════════════════════════
    BindSequencerPattern {
        sequencer_name: String,
        pattern_name: String,
    },
    BindSequencerChain {
        sequencer_name: String,
        chain_name: String,
        chain_enabled: bool,
    },

    /// Opaque module-scoped command. The module decides how to interpret
    /// `payload`; the core never inspects it.
    ModuleCommand {
        instance_name: String,
        payload: serde_json::Value,
    },
}

impl Command {
    /// Short tag used for logging; stable across payload changes.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::SetBpm { .. } => "SetBpm",
            Command::StartTransport => "StartTransport",
            Command::StopTransport => "StopTransport",
            Command::ResetTransport => "ResetTransport",
            Command::AddModule { .. } => "AddModule",
            Command::RemoveModule { .. } => "RemoveModule",
            Command::SetParameter { .. } => "SetParameter",
            Command::SetModuleEnabled { .. } => "SetModuleEnabled",
            Command::Connect { .. } => "Connect",
            Command::Disconnect { .. } => "Disconnect",
            Command::AddPattern { .. } => "AddPattern",
            Command::RemovePattern { .. } => "RemovePattern",
            Command::SetStep { .. } => "SetStep",
            Command::AddChain { .. } => "AddChain",
            Command::ChainAddEntry { .. } => "ChainAddEntry",
            Command::ChainSetEnabled { .. } => "ChainSetEnabled",
            Command::BindSequencerPattern { .. } => "BindSequencerPattern",
            Command::BindSequencerChain { .. } => "BindSequencerChain",
            Command::ModuleCommand { .. } => "ModuleCommand",
        }
    }
}

/// Response delivered back to the producer after a command is applied.
#[derive(Debug, Clone)]
pub enum CommandResult {
    Ok,
    ModuleCreated { instance_name: String },
    Error { message: String },
}
