//! The remix engine
//!
//! Owns the decoded stem set, the per-stem chains, the send buses and the
//! master bus, and renders one block at a time. The audio thread owns the
//! engine exclusively; the control thread talks to it through the command
//! queue and reads state back through lock-free atomics.
//!
//! `process()` is the single signal path: the live CPAL callback and the
//! offline render engine both drive it, so a mixdown is a faithful bounce
//! of what is currently audible by construction.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use basedrop::Shared;
use rayon::prelude::*;

use crate::control::{clamp_tempo, EntryState, StemControl};
use crate::dsp::{EchoBus, ReverbBus, METER_FLOOR_DB};
use crate::engine::chain::StemChain;
use crate::engine::command::EngineCommand;
use crate::engine::master::MasterBus;
use crate::sequencer::DrumSequencer;
use crate::supply::StemSet;
use crate::types::{Stem, StereoBuffer, MAX_BUFFER_SIZE, NUM_STEMS};

/// Default step-grid BPM (stutter periods, echo clock, sequencer)
pub const DEFAULT_GRID_BPM: f64 = 120.0;

/// Lock-free engine state for control-thread reads
///
/// The audio thread writes these after every block; the UI and the
/// scheduler read them without touching the engine. `Relaxed` everywhere —
/// we need visibility, not ordering.
pub struct PlayerAtomics {
    /// Whether stems are currently playing
    pub playing: AtomicBool,
    /// Loop progress 0.0 - 1.0 (f32 bits)
    progress_bits: AtomicU32,
    /// Completed loop count since the entry was loaded
    pub loop_count: AtomicU64,
    /// Total frames rendered since engine start - the audio clock
    pub samples_rendered: AtomicU64,
    /// Master output level in dB (f32 bits)
    meter_db_bits: AtomicU32,
    /// Tape stop/start sequence in flight
    pub taping: AtomicBool,
    /// Build sweep in flight
    pub build_active: AtomicBool,
}

impl PlayerAtomics {
    fn new() -> Self {
        Self {
            playing: AtomicBool::new(false),
            progress_bits: AtomicU32::new(0),
            loop_count: AtomicU64::new(0),
            samples_rendered: AtomicU64::new(0),
            meter_db_bits: AtomicU32::new((METER_FLOOR_DB as f32).to_bits()),
            taping: AtomicBool::new(false),
            build_active: AtomicBool::new(false),
        }
    }

    /// Loop progress 0.0 - 1.0 (lock-free)
    #[inline]
    pub fn progress(&self) -> f32 {
        f32::from_bits(self.progress_bits.load(Ordering::Relaxed))
    }

    /// Master level in dB, floored (lock-free)
    #[inline]
    pub fn meter_db(&self) -> f32 {
        f32::from_bits(self.meter_db_bits.load(Ordering::Relaxed))
    }

    /// Audio-clock time in seconds at a sample rate (lock-free)
    #[inline]
    pub fn clock_seconds(&self, sample_rate: u32) -> f64 {
        self.samples_rendered.load(Ordering::Relaxed) as f64 / sample_rate as f64
    }
}

/// The remix engine: four stem chains into a master bus
pub struct RemixEngine {
    sample_rate: u32,

    stems: Option<Shared<StemSet>>,
    chains: [Option<StemChain>; NUM_STEMS],
    controls: [StemControl; NUM_STEMS],
    tempo: f64,
    grid_bpm: f64,

    playing: bool,
    /// Loop playhead in source frames
    position: f64,
    loop_count: u64,
    /// Audio clock: frames rendered since engine start
    clock_frames: u64,

    master: MasterBus,
    echo: EchoBus,
    reverb: ReverbBus,
    sequencer: DrumSequencer,

    atomics: Arc<PlayerAtomics>,

    // Pre-allocated scratch (audio callback never allocates)
    stem_buffers: [StereoBuffer; NUM_STEMS],
    echo_sends: [StereoBuffer; NUM_STEMS],
    reverb_sends: [StereoBuffer; NUM_STEMS],
    echo_send_sum: StereoBuffer,
    reverb_send_sum: StereoBuffer,
}

impl RemixEngine {
    pub fn new(sample_rate: u32) -> Self {
        let mut echo = EchoBus::new(sample_rate);
        echo.set_clock(DEFAULT_GRID_BPM, 1.0);
        Self {
            sample_rate,
            stems: None,
            chains: Default::default(),
            controls: [StemControl::default(); NUM_STEMS],
            tempo: 1.0,
            grid_bpm: DEFAULT_GRID_BPM,
            playing: false,
            position: 0.0,
            loop_count: 0,
            clock_frames: 0,
            master: MasterBus::new(sample_rate),
            echo,
            reverb: ReverbBus::new(sample_rate),
            sequencer: DrumSequencer::new(sample_rate),
            atomics: Arc::new(PlayerAtomics::new()),
            stem_buffers: std::array::from_fn(|_| StereoBuffer::silence(MAX_BUFFER_SIZE)),
            echo_sends: std::array::from_fn(|_| StereoBuffer::silence(MAX_BUFFER_SIZE)),
            reverb_sends: std::array::from_fn(|_| StereoBuffer::silence(MAX_BUFFER_SIZE)),
            echo_send_sum: StereoBuffer::silence(MAX_BUFFER_SIZE),
            reverb_send_sum: StereoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }

    /// Lock-free state handle for the control thread
    pub fn atomics(&self) -> Arc<PlayerAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Mutable access to the master bus (offline render setup)
    pub fn master_mut(&mut self) -> &mut MasterBus {
        &mut self.master
    }

    pub fn master(&self) -> &MasterBus {
        &self.master
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn loop_count(&self) -> u64 {
        self.loop_count
    }

    /// Loop progress 0.0 - 1.0
    pub fn progress(&self) -> f64 {
        match &self.stems {
            Some(stems) if stems.frames() > 0 => self.position / stems.frames() as f64,
            _ => 0.0,
        }
    }

    // --- Entry management ---

    /// Swap in a decoded stem set; stops playback and rewinds
    pub fn load_stems(&mut self, stems: Shared<StemSet>) {
        self.stop();
        log::info!(
            "Loaded stem set: {} frames at {}Hz, stems [{}]",
            stems.frames(),
            stems.sample_rate(),
            stems
                .available()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.stems = Some(stems);
        self.position = 0.0;
        self.loop_count = 0;
        self.publish_state();
    }

    /// Replace all controls and the tempo with an entry's stored state
    pub fn set_entry_state(&mut self, state: &EntryState) {
        let state = state.clamped();
        self.controls = state.controls;
        self.set_tempo(state.tempo);
        for stem in Stem::ALL {
            if let Some(chain) = &mut self.chains[stem as usize] {
                chain.apply_control(&self.controls[stem as usize], self.tempo, false);
            }
        }
    }

    /// Current controls + tempo as an entry record (for persistence)
    pub fn entry_state(&self) -> EntryState {
        EntryState {
            controls: self.controls,
            tempo: self.tempo,
        }
    }

    // --- Transport ---

    /// Start playback: construct a fresh chain per available stem
    pub fn play(&mut self) {
        let Some(stems) = self.stems.clone() else {
            log::warn!("Play requested with no stems loaded");
            return;
        };

        for stem in Stem::ALL {
            let idx = stem as usize;
            self.chains[idx] = match StemChain::new(stem, stems.clone(), self.sample_rate) {
                Some(mut chain) => {
                    // Snap so the live graph starts exactly where an offline
                    // render of the same state would
                    chain.apply_control(&self.controls[idx], self.tempo, true);
                    Some(chain)
                }
                None => None,
            };
        }

        self.echo.reset();
        self.echo.set_clock(self.grid_bpm, self.tempo);
        self.reverb.reset();
        self.playing = true;
        self.publish_state();
    }

    /// Stop playback
    ///
    /// Every exit path releases the per-play chains (their stem references
    /// drop RT-safely via the GC), clears the send buses, cancels all
    /// pending automations and drops in-flight drum voices.
    pub fn stop(&mut self) {
        self.playing = false;
        self.chains = Default::default();
        self.echo.reset();
        self.reverb.reset();
        self.master.cancel_automations();
        self.sequencer.clear();
        self.publish_state();
    }

    /// Jump the loop playhead (0.0 - 1.0 of the loop)
    pub fn seek(&mut self, fraction: f64) {
        if let Some(stems) = &self.stems {
            self.position = fraction.clamp(0.0, 1.0) * stems.frames() as f64;
        }
    }

    /// Set the shared tempo factor
    pub fn set_tempo(&mut self, tempo: f64) {
        self.tempo = clamp_tempo(tempo);
        for chain in self.chains.iter_mut().flatten() {
            chain.set_tempo(self.tempo);
        }
        self.echo.set_clock(self.grid_bpm, self.tempo);
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Set the step-grid BPM
    pub fn set_grid_bpm(&mut self, bpm: f64) {
        self.grid_bpm = bpm.clamp(30.0, 300.0);
        self.echo.set_clock(self.grid_bpm, self.tempo);
    }

    /// Replace one stem's control record
    pub fn set_stem_control(&mut self, stem: Stem, control: StemControl) {
        let control = control.clamped();
        self.controls[stem as usize] = control;
        if let Some(chain) = &mut self.chains[stem as usize] {
            chain.apply_control(&control, self.tempo, false);
        }
    }

    /// Queue a drum voice at an absolute audio-clock frame
    pub fn trigger_drum_voice(&mut self, voice: crate::sequencer::DrumVoice, at_frame: u64) {
        self.sequencer.trigger(voice, at_frame);
    }

    // --- Commands ---

    /// Drain and apply pending commands (audio thread, block boundary)
    pub fn apply_commands(&mut self, rx: &mut rtrb::Consumer<EngineCommand>) {
        while let Ok(command) = rx.pop() {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::LoadStems { stems } => self.load_stems(stems),
            EngineCommand::LoadEntryState(state) => self.set_entry_state(&state),
            EngineCommand::Play => self.play(),
            EngineCommand::Stop => self.stop(),
            EngineCommand::Seek { position } => self.seek(position),
            EngineCommand::SetStemControl { stem, control } => {
                self.set_stem_control(stem, control)
            }
            EngineCommand::SetTempo(tempo) => self.set_tempo(tempo),
            EngineCommand::SetGridBpm(bpm) => self.set_grid_bpm(bpm),
            EngineCommand::SetMasterGain(gain) => self.master.set_gain(gain),
            EngineCommand::ToggleStutter(rate) => {
                self.master.toggle_stutter(rate, self.grid_bpm, self.tempo)
            }
            EngineCommand::TriggerTapeStop => self.master.trigger_tape_stop(),
            EngineCommand::TriggerBuildSweep => self.master.trigger_build_sweep(),
            EngineCommand::SetLimiterEnabled(enabled) => {
                self.master.set_limiter_enabled(enabled)
            }
            EngineCommand::TriggerDrumVoice { voice, at_frame } => {
                self.sequencer.trigger(voice, at_frame)
            }
        }
    }

    // --- Audio processing ---

    /// Render one block into `output`
    ///
    /// The single signal path shared by the live callback and the offline
    /// renderer. Per-stem chains run in parallel with Rayon, then the sums
    /// and buses run sequentially, exactly as the fixed topology dictates.
    pub fn process(&mut self, output: &mut StereoBuffer) {
        let frames = output.len();
        output.fill_silence();

        // Source-facing automation first: the tape timeline scales this
        // block's playback rate for every stem.
        let rate_mult = self.master.begin_block(frames);
        let rate = self.tempo * rate_mult;

        self.echo_send_sum.set_len_from_capacity(frames);
        self.reverb_send_sum.set_len_from_capacity(frames);
        self.echo_send_sum.fill_silence();
        self.reverb_send_sum.fill_silence();

        if self.playing {
            if let Some(stems) = &self.stems {
                let position = self.position;

                for buf in self
                    .stem_buffers
                    .iter_mut()
                    .chain(self.echo_sends.iter_mut())
                    .chain(self.reverb_sends.iter_mut())
                {
                    buf.set_len_from_capacity(frames);
                    buf.fill_silence();
                }

                // Parallel per-stem rendering: each chain owns its output
                // and send buffers, so there is no contention
                self.chains
                    .par_iter_mut()
                    .zip(self.stem_buffers.par_iter_mut())
                    .zip(self.echo_sends.par_iter_mut())
                    .zip(self.reverb_sends.par_iter_mut())
                    .for_each(|(((chain, buf), echo), reverb)| {
                        if let Some(chain) = chain {
                            chain.process(position, rate, buf, echo, reverb);
                        }
                    });

                // Sequential summing into the master input
                for buf in &self.stem_buffers {
                    output.add_buffer(buf);
                }
                for buf in &self.echo_sends {
                    self.echo_send_sum.add_buffer(buf);
                }
                for buf in &self.reverb_sends {
                    self.reverb_send_sum.add_buffer(buf);
                }

                // Advance the shared playhead and count loop wraps
                let loop_frames = stems.frames() as f64;
                self.position += frames as f64 * rate;
                while self.position >= loop_frames {
                    self.position -= loop_frames;
                    self.loop_count += 1;
                }
            }
        }

        // Drum one-shots join the master input
        self.sequencer.mix_into(output, self.clock_frames);

        // Send-bus returns join the master input
        self.echo.process(&self.echo_send_sum, output);
        self.reverb.process(&self.reverb_send_sum, output);

        // Master chain: gain → stutter → sweep filters → limiter → meter
        self.master.process(output);

        self.clock_frames += frames as u64;
        self.publish_state();
    }

    /// Write engine state to the atomics for lock-free control-thread reads
    fn publish_state(&self) {
        let a = &self.atomics;
        a.playing.store(self.playing, Ordering::Relaxed);
        a.progress_bits
            .store((self.progress() as f32).to_bits(), Ordering::Relaxed);
        a.loop_count.store(self.loop_count, Ordering::Relaxed);
        a.samples_rendered.store(self.clock_frames, Ordering::Relaxed);
        a.meter_db_bits
            .store(self.master.meter_db().to_bits(), Ordering::Relaxed);
        a.taping.store(self.master.is_taping(), Ordering::Relaxed);
        a.build_active
            .store(self.master.build_active(), Ordering::Relaxed);
    }
}
