// src/bin/engine_demo.rs

use stagecore::{Command, EngineConfig, Engine, SessionManager, ScriptManager};

fn main() {
    env_logger::init();

    let sample_rate = 48_000.0;
    let config = EngineConfig::new(sample_rate).command_queue_capacity(256);
    let engine = Engine::new(config);

    let script_manager = ScriptManager::new(&engine);
    script_manager.set_callback(|script| {
        println!("--- regenerated script ---");
        print!("{script}");
    });

    println!("Starting engine demo: Sequencer(seq1) -> Pattern(P0) -> Mixer(mix1)");
    println!();

    engine
        .enqueue(Command::AddModule { type_name: "Sequencer".into(), instance_name: Some("seq1".into()) })
        .unwrap();
    engine
        .enqueue(Command::AddModule { type_name: "Mixer".into(), instance_name: Some("mix1".into()) })
        .unwrap();
    engine
        .enqueue(Command::AddPattern { name: Some("P0".into()), step_count: 8, steps_per_beat: 4.0 })
        .unwrap();
    engine.run_callback(0);

    engine
        .enqueue(Command::Connect {
            source: "seq1".into(),
            target: "mix1".into(),
            connection_type: stagecore::ConnectionType::Audio,
            source_path: String::new(),
            target_path: String::new(),
        })
        .unwrap();
    engine
        .enqueue(Command::BindSequencerPattern { sequencer_name: "seq1".into(), pattern_name: "P0".into() })
        .unwrap();
    engine.enqueue(Command::SetBpm { bpm: 120.0 }).unwrap();
    engine.enqueue(Command::StartTransport).unwrap();
    engine.run_callback(0);

    let bpm = 120.0_f64;
    let steps_per_beat = 4.0_f64;
    let samples_per_step = (sample_rate * 60.0 / bpm / steps_per_beat) as u32;
    for _ in 0..8 {
        engine.run_callback(samples_per_step);
    }

    println!();
    println!("Ran 8 steps at {samples_per_step} frames each.");

    let session_manager = SessionManager::new(engine.clone());
    let path = std::env::temp_dir().join("engine_demo_session.json");
    session_manager.save_session_sync(&path).unwrap();
    println!("Session saved to {}", path.display());

    let snapshot = engine.get_state_snapshot();
    println!();
    println!("Final state version: {}", snapshot.version);
    println!("Modules: {:?}", snapshot.modules.keys().collect::<Vec<_>>());

    session_manager.shutdown();
}
