//! Lock-free command queue for real-time engine control
//!
//! The control thread sends commands via a lock-free SPSC queue and the
//! audio thread drains them at block boundaries. Pushes are wait-free
//! (~50ns) so parameter edits never block, and the audio thread never
//! touches a mutex.
//!
//! Large payloads (a full stem set, an entry's stored state) are boxed or
//! reference-counted so every variant stays pointer-sized-ish and the queue
//! slots remain cache-friendly.

use basedrop::Shared;

use crate::control::{EntryState, StemControl};
use crate::engine::master::StutterRate;
use crate::sequencer::DrumVoice;
use crate::supply::StemSet;
use crate::types::Stem;

/// Commands sent from the control thread to the audio thread
///
/// Each variant is an atomic operation on the engine, applied at the start
/// of the next audio block.
pub enum EngineCommand {
    // ─────────────────────────────────────────────────────────────
    // Entry / transport
    // ─────────────────────────────────────────────────────────────
    /// Swap in a freshly decoded stem set (stops playback first)
    ///
    /// `Shared` so the previous set's deallocation is deferred to the GC
    /// thread instead of running inside the audio callback.
    LoadStems { stems: Shared<StemSet> },
    /// Replace all controls and the tempo with an entry's stored state
    LoadEntryState(Box<EntryState>),
    /// Start playback (builds fresh chains for every available stem)
    Play,
    /// Stop playback, tearing down chains and cancelling automations
    Stop,
    /// Jump the loop playhead to a position (0.0 - 1.0 of the loop)
    Seek { position: f64 },

    // ─────────────────────────────────────────────────────────────
    // Parameters
    // ─────────────────────────────────────────────────────────────
    /// Replace one stem's control record (copy-on-write edits from the UI)
    SetStemControl { stem: Stem, control: StemControl },
    /// Set the shared tempo factor (0.5 - 1.5)
    SetTempo(f64),
    /// Set the step-grid BPM (stutter periods, echo clock, sequencer)
    SetGridBpm(f64),
    /// Set master output gain (0.0 - 1.0)
    SetMasterGain(f32),

    // ─────────────────────────────────────────────────────────────
    // Master automations
    // ─────────────────────────────────────────────────────────────
    /// Toggle the stutter gate at a subdivision
    ToggleStutter(StutterRate),
    /// Trigger the tape stop/start sequence
    TriggerTapeStop,
    /// Trigger the build sweep
    TriggerBuildSweep,
    /// Insert/remove the master limiter
    SetLimiterEnabled(bool),

    // ─────────────────────────────────────────────────────────────
    // Drum sequencer
    // ─────────────────────────────────────────────────────────────
    /// Start a drum voice at an absolute audio-clock frame
    /// (scheduled ahead of time by the lookahead scheduler)
    TriggerDrumVoice { voice: DrumVoice, at_frame: u64 },
}

/// Capacity of the command queue
///
/// Loading an entry sends a handful of commands; live knob twisting a few
/// dozen per UI frame. 1024 leaves generous headroom.
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Create a new command channel (producer/consumer pair)
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

/// Command sender for the control thread
///
/// Wraps the lock-free producer. All sends are non-blocking; a full queue
/// drops the command and reports it, which the UI treats as "try again next
/// frame".
pub struct CommandSender {
    producer: rtrb::Producer<EngineCommand>,
}

impl CommandSender {
    pub fn new(producer: rtrb::Producer<EngineCommand>) -> Self {
        Self { producer }
    }

    /// Push a command; returns false if the queue was full
    pub fn send(&mut self, command: EngineCommand) -> bool {
        match self.producer.push(command) {
            Ok(()) => true,
            Err(_) => {
                log::warn!("Engine command queue full, command dropped");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_channel_roundtrip() {
        let (mut tx, mut rx) = command_channel();

        tx.push(EngineCommand::Play).unwrap();
        tx.push(EngineCommand::SetTempo(1.25)).unwrap();

        assert!(matches!(rx.pop().unwrap(), EngineCommand::Play));
        match rx.pop().unwrap() {
            EngineCommand::SetTempo(t) => assert_eq!(t, 1.25),
            _ => panic!("wrong command order"),
        }
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_sender_reports_full_queue() {
        let (tx, _rx) = command_channel();
        let mut sender = CommandSender::new(tx);

        for _ in 0..COMMAND_QUEUE_CAPACITY {
            assert!(sender.send(EngineCommand::Play));
        }
        assert!(!sender.send(EngineCommand::Play));
    }
}
