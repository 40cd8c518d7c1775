// src/queue.rs
//
// Lock-free command queue isolating UI threads from the audio thread.
//
// UI threads push Commands into a bounded rtrb ring buffer and never touch
// live engine state directly. The audio thread drains the queue once per
// callback. Command results flow back over a plain channel since that path
// is not real-time sensitive.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use rtrb::{Consumer, Producer, RingBuffer};

use crate::command::{Command, CommandResult};

/// UI-side handle: produces commands, consumes results.
pub struct UiCommandHandle {
    producer: Producer<Command>,
    result_rx: Receiver<CommandResult>,
}

/// Audio-side handle: consumes commands, produces results.
pub struct AudioCommandHandle {
    consumer: Consumer<Command>,
    result_tx: Sender<CommandResult>,
}

/// Creates a linked pair of handles with the given ring-buffer capacity.
pub fn create_command_queue(capacity: usize) -> (UiCommandHandle, AudioCommandHandle) {
    let (producer, consumer) = RingBuffer::new(capacity);
    let (result_tx, result_rx) = mpsc::channel();
    (
        UiCommandHandle { producer, result_rx },
        AudioCommandHandle { consumer, result_tx },
    )
}

/// Enqueue-full policy. Commands are latency-sensitive by default, so the
/// documented fallback here is simply "drop and log" — callers that need
/// the synchronous-fallback alternative may match on `QueueFull` and retry.
impl UiCommandHandle {
    /// Enqueues `command`. Returns `Err(EngineError::QueueFull)` if the
    /// ring buffer has no free slot; the caller may log and drop, or apply
    /// the documented synchronous fallback for latency-insensitive paths.
    pub fn enqueue(&mut self, command: Command) -> Result<(), crate::error::EngineError> {
        self.producer.push(command).map_err(|_| {
            log::warn!("command queue full, dropping command");
            crate::error::EngineError::QueueFull
        })
    }

    /// Drains any command results published since the last call. Never blocks.
    pub fn poll_results(&self) -> Vec<CommandResult> {
        let mut results = Vec::new();
        loop {
            match self.result_rx.try_recv() {
                Ok(result) => results.push(result),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        results
    }
}

impl AudioCommandHandle {
    /// Pops every currently-available command, in enqueue order. Never
    /// allocates beyond the returned Vec's growth, and never blocks.
    pub fn drain(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        while let Ok(command) = self.consumer.pop() {
            commands.push(command);
        }
        commands
    }

    pub fn send_result(&self, result: CommandResult) {
        let _ = self.result_tx.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_ordering_preserved() {
        let (mut ui, mut audio) = create_command_queue(8);
        ui.enqueue(Command::SetBpm { bpm: 100.0 }).unwrap();
        ui.enqueue(Command::StartTransport).unwrap();
        let drained = audio.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].kind(), "SetBpm");
        assert_eq!(drained[1].kind(), "StartTransport");
    }

    #[test]
    fn full_queue_reports_queue_full() {
        let (mut ui, _audio) = create_command_queue(1);
        ui.enqueue(Command::StartTransport).unwrap();
        let err = ui.enqueue(Command::StopTransport).unwrap_err();
        assert_eq!(err, crate::error::EngineError::QueueFull);
    }

    #[test]
    fn results_flow_back_to_ui() {
        let (ui, audio) = create_command_queue(8);
        audio.send_result(CommandResult::Ok);
        let results = ui.poll_results();
        assert_eq!(results.len(), 1);
    }
}
