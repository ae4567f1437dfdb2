//! Per-stem control records and per-entry state
//!
//! A [`StemControl`] is the complete user-editable state of one stem's
//! processing chain. One record exists per stem; an [`EntryState`] bundles
//! all four plus the shared tempo factor so each loaded entry keeps its own
//! settings.
//!
//! Every field carries a `#[serde(default)]` so records written by older
//! versions deserialize with per-field fallbacks (additive schema evolution).

use serde::{Deserialize, Serialize};

use crate::types::{Stem, NUM_STEMS};

/// Tempo factor range (playback-rate multiplier, pitch coupled to speed)
pub const MIN_TEMPO: f64 = 0.5;
pub const MAX_TEMPO: f64 = 1.5;

/// Clamp a tempo factor into the supported range
pub fn clamp_tempo(tempo: f64) -> f64 {
    tempo.clamp(MIN_TEMPO, MAX_TEMPO)
}

/// Macro toggle flags
///
/// Stored uniformly on every stem for simplicity; each flag is only
/// meaningful on its designated stem (resolved by the macro engine).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroFlags {
    pub vocal_clean: bool,
    pub drum_punch: bool,
    pub bass_tighten: bool,
    pub bass_boost: bool,
}

/// User-editable state for a single stem's chain
///
/// All ranges are validated by [`StemControl::clamped`]; deserialized records
/// go through the same clamping before they reach the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StemControl {
    /// Output gain (0.0 - 1.0)
    pub gain: f32,
    /// Stereo position (-1.0 = hard left, 0.0 = center, 1.0 = hard right)
    pub pan: f32,
    /// Stereo width (0.0 = mono, 1.0 = natural, up to 4.0 = exaggerated)
    pub width: f32,
    /// Echo send level (0.0 - 1.0)
    pub echo_send: f32,
    /// Bit-depth reduction amount (0.0 = clean, 1.0 = destroyed)
    pub bitcrush: f32,
    /// Filter sweep position (-1.0 = full LP sweep, 0.0 = neutral, 1.0 = full HP sweep)
    pub filter_position: f32,
    /// Rhythmic gate depth (0.0 = off, 1.0 = full chop)
    pub gate: f32,
    /// Reverb send level (0.0 - 1.0)
    pub reverb_send: f32,
    /// Macro toggles
    pub macros: MacroFlags,
}

impl Default for StemControl {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pan: 0.0,
            width: 1.0,
            echo_send: 0.0,
            bitcrush: 0.0,
            filter_position: 0.0,
            gate: 0.0,
            reverb_send: 0.0,
            macros: MacroFlags::default(),
        }
    }
}

impl StemControl {
    /// Return a copy with every field clamped to its documented range
    pub fn clamped(&self) -> Self {
        Self {
            gain: self.gain.clamp(0.0, 1.0),
            pan: self.pan.clamp(-1.0, 1.0),
            width: self.width.clamp(0.0, 4.0),
            echo_send: self.echo_send.clamp(0.0, 1.0),
            bitcrush: self.bitcrush.clamp(0.0, 1.0),
            filter_position: self.filter_position.clamp(-1.0, 1.0),
            gate: self.gate.clamp(0.0, 1.0),
            reverb_send: self.reverb_send.clamp(0.0, 1.0),
            macros: self.macros,
        }
    }
}

fn default_controls() -> [StemControl; NUM_STEMS] {
    [StemControl::default(); NUM_STEMS]
}

fn default_tempo() -> f64 {
    1.0
}

/// Complete stored state for one loaded entry (stem set)
///
/// Loading an entry replaces the active control/tempo state wholesale with
/// its record; edits always update the active entry's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryState {
    /// One control record per stem, indexed by `Stem as usize`
    #[serde(default = "default_controls")]
    pub controls: [StemControl; NUM_STEMS],
    /// Shared playback-rate multiplier (0.5 - 1.5)
    #[serde(default = "default_tempo")]
    pub tempo: f64,
}

impl Default for EntryState {
    fn default() -> Self {
        Self {
            controls: default_controls(),
            tempo: default_tempo(),
        }
    }
}

impl EntryState {
    /// Get the control record for a stem
    pub fn control(&self, stem: Stem) -> &StemControl {
        &self.controls[stem as usize]
    }

    /// Get a mutable control record for a stem
    pub fn control_mut(&mut self, stem: Stem) -> &mut StemControl {
        &mut self.controls[stem as usize]
    }

    /// Return a copy with all controls and the tempo clamped to valid ranges
    pub fn clamped(&self) -> Self {
        let mut controls = self.controls;
        for control in &mut controls {
            *control = control.clamped();
        }
        Self {
            controls,
            tempo: clamp_tempo(self.tempo),
        }
    }
}
