//! Step-sequenced drum voices
//!
//! A 16-step pattern bank on the control side and a sample-accurate one-shot
//! player on the audio side. The lookahead scheduler fires `(step, when)`
//! ticks; the control loop turns pattern hits into trigger commands stamped
//! with an absolute audio-clock frame, and the audio thread starts each
//! voice exactly at that frame inside the right block.
//!
//! Voices are short synthesized bursts pre-rendered at construction, so
//! triggering costs nothing on the audio thread.

use crate::types::{Sample, StereoBuffer, StereoSample};

/// Steps per bar (sixteenth-note grid)
pub const STEPS_PER_BAR: usize = 16;

/// Number of drum voices
pub const NUM_VOICES: usize = 3;

/// Maximum simultaneous one-shots before the oldest is dropped
const MAX_ACTIVE_VOICES: usize = 32;

/// Drum voice identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum DrumVoice {
    Kick = 0,
    Snare = 1,
    Hat = 2,
}

impl DrumVoice {
    pub const ALL: [DrumVoice; NUM_VOICES] = [DrumVoice::Kick, DrumVoice::Snare, DrumVoice::Hat];
}

/// A 16-step trigger pattern per voice
#[derive(Debug, Clone)]
pub struct StepPattern {
    steps: [[bool; STEPS_PER_BAR]; NUM_VOICES],
}

impl StepPattern {
    /// Empty pattern
    pub fn empty() -> Self {
        Self { steps: [[false; STEPS_PER_BAR]; NUM_VOICES] }
    }

    /// Basic four-on-the-floor starter pattern
    pub fn four_on_the_floor() -> Self {
        let mut pattern = Self::empty();
        for step in (0..STEPS_PER_BAR).step_by(4) {
            pattern.steps[DrumVoice::Kick as usize][step] = true;
        }
        pattern.steps[DrumVoice::Snare as usize][4] = true;
        pattern.steps[DrumVoice::Snare as usize][12] = true;
        for step in (2..STEPS_PER_BAR).step_by(4) {
            pattern.steps[DrumVoice::Hat as usize][step] = true;
        }
        pattern
    }

    /// Set one step on/off
    pub fn set(&mut self, voice: DrumVoice, step: usize, on: bool) {
        if step < STEPS_PER_BAR {
            self.steps[voice as usize][step] = on;
        }
    }

    /// Whether a voice fires on a step
    pub fn is_set(&self, voice: DrumVoice, step: usize) -> bool {
        step < STEPS_PER_BAR && self.steps[voice as usize][step]
    }

    /// Voices that fire on a step
    pub fn voices_at(&self, step: usize) -> impl Iterator<Item = DrumVoice> + '_ {
        DrumVoice::ALL.into_iter().filter(move |v| self.is_set(*v, step))
    }
}

impl Default for StepPattern {
    fn default() -> Self {
        Self::four_on_the_floor()
    }
}

/// Pre-rendered voice audio
struct VoiceBank {
    buffers: [Vec<Sample>; NUM_VOICES],
}

impl VoiceBank {
    fn new(sample_rate: u32) -> Self {
        Self {
            buffers: [
                Self::render_kick(sample_rate),
                Self::render_snare(sample_rate),
                Self::render_hat(sample_rate),
            ],
        }
    }

    /// Sine burst with a pitch drop and exponential decay
    fn render_kick(sample_rate: u32) -> Vec<Sample> {
        let sr = sample_rate as f32;
        let len = (0.25 * sr) as usize;
        let mut out = Vec::with_capacity(len);
        let mut phase = 0.0_f32;
        for i in 0..len {
            let t = i as f32 / len as f32;
            let freq = 120.0 - 80.0 * t;
            phase += 2.0 * std::f32::consts::PI * freq / sr;
            let env = (-t * 7.0).exp();
            out.push(phase.sin() * env * 0.9);
        }
        out
    }

    /// Body tone plus a noise snap
    fn render_snare(sample_rate: u32) -> Vec<Sample> {
        let sr = sample_rate as f32;
        let len = (0.18 * sr) as usize;
        let mut out = Vec::with_capacity(len);
        let mut noise_state = 0x12345678_u32;
        for i in 0..len {
            let t = i as f32 / len as f32;
            let tone = (2.0 * std::f32::consts::PI * 190.0 * i as f32 / sr).sin() * 0.4;
            // xorshift noise, deterministic so renders are reproducible
            noise_state ^= noise_state << 13;
            noise_state ^= noise_state >> 17;
            noise_state ^= noise_state << 5;
            let noise = (noise_state as f32 / u32::MAX as f32) * 2.0 - 1.0;
            let env = (-t * 9.0).exp();
            out.push((tone + noise * 0.5) * env * 0.7);
        }
        out
    }

    /// Short bright noise burst
    fn render_hat(sample_rate: u32) -> Vec<Sample> {
        let sr = sample_rate as f32;
        let len = (0.06 * sr) as usize;
        let mut out = Vec::with_capacity(len);
        let mut noise_state = 0x87654321_u32;
        let mut hp_last = 0.0_f32;
        for i in 0..len {
            let t = i as f32 / len as f32;
            noise_state ^= noise_state << 13;
            noise_state ^= noise_state >> 17;
            noise_state ^= noise_state << 5;
            let noise = (noise_state as f32 / u32::MAX as f32) * 2.0 - 1.0;
            // Crude one-pole high-pass brightens the burst
            let brightened = noise - hp_last;
            hp_last = noise * 0.7;
            let env = (-t * 14.0).exp();
            out.push(brightened * env * 0.35);
        }
        out
    }

    fn voice(&self, voice: DrumVoice) -> &[Sample] {
        &self.buffers[voice as usize]
    }
}

/// Turn one scheduler tick into trigger commands for the pattern's hits
///
/// Called from the scheduler's `on_tick(step, when)` on the control thread;
/// the scheduled audio-clock time converts to an absolute frame so the
/// audio thread can start each voice sample-accurately.
pub fn schedule_pattern_step(
    pattern: &StepPattern,
    step: usize,
    when_secs: f64,
    sample_rate: u32,
    sender: &mut crate::engine::CommandSender,
) {
    let at_frame = (when_secs * sample_rate as f64).round() as u64;
    for voice in pattern.voices_at(step % STEPS_PER_BAR) {
        sender.send(crate::engine::EngineCommand::TriggerDrumVoice { voice, at_frame });
    }
}

/// A one-shot in flight
struct ActiveVoice {
    voice: DrumVoice,
    /// Absolute audio-clock frame at which playback starts
    start_frame: u64,
    /// Samples already played
    pos: usize,
}

/// Audio-side one-shot player
///
/// Lives inside the engine; triggers arrive as commands carrying the
/// scheduler's absolute target frame, so playback is sample-accurate no
/// matter where in a block the trigger lands.
pub struct DrumSequencer {
    bank: VoiceBank,
    active: Vec<ActiveVoice>,
}

impl DrumSequencer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            bank: VoiceBank::new(sample_rate),
            active: Vec::with_capacity(MAX_ACTIVE_VOICES),
        }
    }

    /// Queue a voice to start at an absolute audio-clock frame
    ///
    /// A start frame already in the past plays immediately at the head of
    /// the next block (late, but never dropped).
    pub fn trigger(&mut self, voice: DrumVoice, start_frame: u64) {
        if self.active.len() >= MAX_ACTIVE_VOICES {
            self.active.remove(0);
        }
        self.active.push(ActiveVoice { voice, start_frame, pos: 0 });
    }

    /// Mix active one-shots into a block beginning at `block_start` on the
    /// audio clock
    pub fn mix_into(&mut self, out: &mut StereoBuffer, block_start: u64) {
        let frames = out.len() as u64;
        for active in &mut self.active {
            let data = self.bank.voice(active.voice);
            // Offset of this voice's next sample within the block
            let begin = if active.start_frame > block_start {
                if active.start_frame >= block_start + frames {
                    continue; // not due yet
                }
                (active.start_frame - block_start) as usize
            } else {
                0
            };

            let out_slice = out.as_mut_slice();
            for frame in begin..frames as usize {
                if active.pos >= data.len() {
                    break;
                }
                let v = data[active.pos];
                out_slice[frame] += StereoSample::mono(v);
                active.pos += 1;
            }
        }
        self.active.retain(|a| a.pos < self.bank.voice(a.voice).len());
    }

    /// Drop all in-flight one-shots (stop)
    pub fn clear(&mut self) {
        self.active.clear();
    }
}
